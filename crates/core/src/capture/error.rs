use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("input file not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to open video source {path}: {source}")]
    OpenStream {
        path: PathBuf,
        #[source]
        source: ffmpeg_next::Error,
    },
    #[error("no video stream in {0}")]
    NoVideoStream(PathBuf),
    #[error("camera {index} unavailable: {reason}")]
    Camera { index: u32, reason: String },
    #[error("failed to decode image {path}: {reason}")]
    DecodeImage { path: PathBuf, reason: String },
    #[error("decoder setup failed: {0}")]
    Decoder(#[from] ffmpeg_next::Error),
}
