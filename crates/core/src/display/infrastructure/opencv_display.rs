use opencv::core::{Mat, Scalar, CV_8UC3};
use opencv::highgui;
use opencv::prelude::*;

use crate::display::domain::display_sink::DisplaySink;
use crate::shared::frame::Frame;

const KEY_ESC: i32 = 27;

/// OpenCV `highgui` window. Stops when the window is closed or `q`/Esc is
/// pressed.
pub struct OpencvDisplay {
    window: String,
    mat: Mat,
}

impl OpencvDisplay {
    pub fn new(window: &str) -> Result<Self, Box<dyn std::error::Error>> {
        highgui::named_window(window, highgui::WINDOW_AUTOSIZE)?;
        Ok(Self {
            window: window.to_string(),
            mat: Mat::default(),
        })
    }

    fn show(&mut self, frame: &Frame) -> Result<bool, Box<dyn std::error::Error>> {
        let (w, h) = (frame.width() as i32, frame.height() as i32);
        if self.mat.cols() != w || self.mat.rows() != h {
            self.mat = Mat::new_rows_cols_with_default(h, w, CV_8UC3, Scalar::all(0.0))?;
        }

        // highgui expects BGR.
        let dst = self.mat.data_bytes_mut()?;
        for (out, px) in dst.chunks_exact_mut(3).zip(frame.data().chunks_exact(3)) {
            out[0] = px[2];
            out[1] = px[1];
            out[2] = px[0];
        }

        highgui::imshow(&self.window, &self.mat)?;
        let key = highgui::wait_key(1)?;
        if key == 'q' as i32 || key == KEY_ESC {
            return Ok(true);
        }
        let visible = highgui::get_window_property(&self.window, highgui::WND_PROP_VISIBLE)?;
        Ok(visible < 1.0)
    }
}

impl DisplaySink for OpencvDisplay {
    fn render(&mut self, frame: &Frame) -> bool {
        if frame.is_empty() {
            return false;
        }
        match self.show(frame) {
            Ok(stop) => stop,
            Err(e) => {
                log::error!("Display failed: {e}");
                true
            }
        }
    }

    fn is_interactive(&self) -> bool {
        true
    }
}

impl Drop for OpencvDisplay {
    fn drop(&mut self) {
        let _ = highgui::destroy_window(&self.window);
    }
}
