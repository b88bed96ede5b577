use std::path::PathBuf;

use crate::shared::constants::FALLBACK_FPS;

/// Stream properties reported by a capture source.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    /// Frames per second; `0.0` for still images and sources that don't report it.
    pub fps: f64,
    /// Frame count declared by the container; `None` for live sources.
    pub total_frames: Option<usize>,
    pub codec: String,
    pub source_path: Option<PathBuf>,
}

impl VideoMetadata {
    /// Frame rate to encode at, substituting [`FALLBACK_FPS`] for unknown rates.
    pub fn effective_fps(&self) -> f64 {
        if self.fps.is_finite() && self.fps > 0.0 {
            self.fps
        } else {
            FALLBACK_FPS
        }
    }
}
