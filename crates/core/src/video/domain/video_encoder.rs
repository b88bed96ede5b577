use std::path::Path;

use crate::shared::frame::Frame;

/// Output container, which also fixes the video codec used inside it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Container {
    /// VP8 in WebM: lossy and suited to streaming.
    #[default]
    WebM,
    /// MPEG-4 Part 2 in MP4, available in virtually every ffmpeg build.
    Mp4,
}

impl Container {
    pub fn extension(self) -> &'static str {
        match self {
            Container::WebM => "webm",
            Container::Mp4 => "mp4",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "webm" => Some(Container::WebM),
            "mp4" => Some(Container::Mp4),
            _ => None,
        }
    }
}

/// Encoding parameters bound to one output file.
#[derive(Clone, Debug, PartialEq)]
pub struct EncoderSettings {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub container: Container,
}

/// Abstracts video encoding so the recorder can write output without
/// depending on a specific codec library.
///
/// Frames passed to `write` must match the dimensions given to `open`;
/// encoders reject mismatched frames instead of resizing them.
pub trait VideoEncoder: Send {
    fn open(
        &mut self,
        path: &Path,
        settings: &EncoderSettings,
    ) -> Result<(), Box<dyn std::error::Error>>;

    fn write(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>>;

    /// Flushes buffered packets and finalizes the container. Idempotent.
    fn close(&mut self) -> Result<(), Box<dyn std::error::Error>>;
}

/// Produces a fresh encoder for every recording session.
pub type EncoderFactory = Box<dyn Fn() -> Box<dyn VideoEncoder> + Send>;
