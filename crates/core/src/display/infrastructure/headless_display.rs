use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::display::domain::display_sink::DisplaySink;
use crate::shared::frame::Frame;

/// Display that shows nothing and stops on Ctrl-C.
pub struct HeadlessDisplay {
    stop: Arc<AtomicBool>,
    rendered: usize,
}

impl HeadlessDisplay {
    /// Installs a Ctrl-C handler that requests a stop. If a handler is
    /// already installed, the display runs until the source ends.
    pub fn new() -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        {
            let stop = stop.clone();
            if let Err(err) = ctrlc::set_handler(move || {
                stop.store(true, Ordering::SeqCst);
            }) {
                log::warn!("Failed to install Ctrl+C handler: {err}");
            }
        }
        Self::with_stop_flag(stop)
    }

    /// Uses `stop` as the stop request instead of Ctrl-C.
    pub fn with_stop_flag(stop: Arc<AtomicBool>) -> Self {
        Self { stop, rendered: 0 }
    }

    pub fn rendered(&self) -> usize {
        self.rendered
    }
}

impl Default for HeadlessDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplaySink for HeadlessDisplay {
    fn render(&mut self, _frame: &Frame) -> bool {
        self.rendered += 1;
        self.stop.load(Ordering::SeqCst)
    }
}
