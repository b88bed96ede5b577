use std::path::Path;

use crate::shared::frame::Frame;

/// Writes a single annotated frame to an image file.
pub trait ImageWriter: Send {
    /// The format is chosen from the path's extension.
    fn write(&self, path: &Path, frame: &Frame) -> Result<(), Box<dyn std::error::Error>>;
}
