use crate::shared::frame::Frame;

/// A pull-based source of frames: camera, video file/stream, or still image.
///
/// `read` returns `Ok(None)` once the source is exhausted; the capture loop
/// treats both `None` and an error as the end of input.
pub trait FrameSource: Send {
    fn read(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>>;

    fn is_opened(&self) -> bool;

    /// Frames per second reported by the source, `0.0` if unknown.
    fn frame_rate(&self) -> f64;

    /// `(width, height)` of the frames `read` produces.
    fn frame_dimensions(&self) -> (u32, u32);

    /// Number of frames the source will yield, when known up front.
    fn frame_count(&self) -> Option<usize> {
        None
    }

    /// Releases the underlying device or file. Idempotent.
    fn close(&mut self);
}
