use crate::shared::frame::Frame;

/// Where annotated frames are shown while a capture loop runs.
pub trait DisplaySink: Send {
    /// Shows `frame`. Returns true once the user asked to stop.
    fn render(&mut self, frame: &Frame) -> bool;

    /// Whether a person is watching and can ask to stop. A still image is
    /// kept on screen only for interactive sinks.
    fn is_interactive(&self) -> bool {
        false
    }
}
