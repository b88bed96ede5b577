use std::path::{Path, PathBuf};

use crate::capture::error::CaptureError;
use crate::capture::frame_source::FrameSource;
use crate::capture::infrastructure::ffmpeg_capture::FfmpegCapture;
use crate::capture::infrastructure::image_file_reader::ImageFileReader;
use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;

/// Where frames come from, as selected on the command line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MediaLocation {
    Camera(u32),
    Stream(PathBuf),
    Image(PathBuf),
}

impl MediaLocation {
    /// Human-readable location for log and error messages.
    pub fn describe(&self) -> String {
        match self {
            MediaLocation::Camera(index) => format!("camera {index}"),
            MediaLocation::Stream(path) | MediaLocation::Image(path) => path.display().to_string(),
        }
    }
}

/// Returns true when the extension names a still-image format.
pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Returns true for `scheme://…` locations (rtsp, http, udp, …) that
/// ffmpeg opens as network streams rather than local files.
pub fn is_url(path: &Path) -> bool {
    path.to_str()
        .and_then(|s| s.split_once("://"))
        .map(|(scheme, _)| {
            scheme.len() > 1
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        })
        .unwrap_or(false)
}

/// An opened capture source. Every operation dispatches on the variant of
/// this instance.
pub enum MediaSource {
    Camera(FfmpegCapture),
    Video(FfmpegCapture),
    Image(ImageFileReader),
}

impl MediaSource {
    pub fn open(location: &MediaLocation) -> Result<Self, CaptureError> {
        match location {
            MediaLocation::Camera(index) => Ok(Self::Camera(FfmpegCapture::open_camera(*index)?)),
            MediaLocation::Stream(path) => Ok(Self::Video(FfmpegCapture::open_file(path)?)),
            MediaLocation::Image(path) => Ok(Self::Image(ImageFileReader::open(path)?)),
        }
    }

    pub fn is_still_image(&self) -> bool {
        matches!(self, MediaSource::Image(_))
    }

    /// Stream properties of a camera or video source. Still images have none.
    pub fn metadata(&self) -> Option<&VideoMetadata> {
        match self {
            MediaSource::Camera(capture) | MediaSource::Video(capture) => Some(capture.metadata()),
            MediaSource::Image(_) => None,
        }
    }

    fn inner(&self) -> &dyn FrameSource {
        match self {
            MediaSource::Camera(capture) | MediaSource::Video(capture) => capture,
            MediaSource::Image(reader) => reader,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn FrameSource {
        match self {
            MediaSource::Camera(capture) | MediaSource::Video(capture) => capture,
            MediaSource::Image(reader) => reader,
        }
    }
}

impl FrameSource for MediaSource {
    fn read(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        self.inner_mut().read()
    }

    fn is_opened(&self) -> bool {
        self.inner().is_opened()
    }

    fn frame_rate(&self) -> f64 {
        self.inner().frame_rate()
    }

    fn frame_dimensions(&self) -> (u32, u32) {
        self.inner().frame_dimensions()
    }

    fn frame_count(&self) -> Option<usize> {
        self.inner().frame_count()
    }

    fn close(&mut self) {
        self.inner_mut().close()
    }
}
