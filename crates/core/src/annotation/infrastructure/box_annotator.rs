use crate::annotation::domain::frame_annotator::FrameAnnotator;
use crate::detection::domain::detection::Detection;
use crate::shared::frame::Frame;

/// Default outline thickness in pixels.
const DEFAULT_THICKNESS: u32 = 2;

/// Outline colors, picked by class id.
const PALETTE: [[u8; 3]; 10] = [
    [255, 56, 56],
    [255, 157, 151],
    [255, 112, 31],
    [255, 178, 29],
    [207, 210, 49],
    [72, 249, 10],
    [26, 147, 52],
    [0, 212, 187],
    [52, 69, 147],
    [203, 56, 255],
];

pub fn class_color(class_id: usize) -> [u8; 3] {
    PALETTE[class_id % PALETTE.len()]
}

/// Draws a colored rectangle outline around every detection.
///
/// Boxes are clipped to the frame; a box thinner than the outline is
/// filled solid.
pub struct BoxAnnotator {
    thickness: u32,
}

impl BoxAnnotator {
    pub fn new(thickness: u32) -> Self {
        Self {
            thickness: thickness.max(1),
        }
    }
}

impl Default for BoxAnnotator {
    fn default() -> Self {
        Self::new(DEFAULT_THICKNESS)
    }
}

impl FrameAnnotator for BoxAnnotator {
    fn annotate(
        &self,
        frame: &mut Frame,
        detections: &[Detection],
    ) -> Result<(), Box<dyn std::error::Error>> {
        let (width, height) = frame.dimensions();
        let fw = width as usize;
        let fh = height as usize;
        if fw == 0 || fh == 0 {
            return Ok(());
        }
        let t = self.thickness as usize;
        let mut pixels = frame.as_ndarray_mut();

        for det in detections {
            let b = det.bbox.clamp(width, height);
            let x1 = b.x1.floor() as usize;
            let y1 = b.y1.floor() as usize;
            let x2 = (b.x2.ceil() as usize).min(fw);
            let y2 = (b.y2.ceil() as usize).min(fh);
            if x2 <= x1 || y2 <= y1 {
                continue;
            }

            let color = class_color(det.class_id);
            for y in y1..y2 {
                let edge_row = y < y1 + t || y + t >= y2;
                for x in x1..x2 {
                    if edge_row || x < x1 + t || x + t >= x2 {
                        for (c, value) in color.iter().enumerate() {
                            pixels[[y, x, c]] = *value;
                        }
                    }
                }
            }

            log::debug!(
                "{} ({:.2}) at [{:.0}, {:.0}, {:.0}, {:.0}]",
                det.label,
                det.confidence,
                b.x1,
                b.y1,
                b.x2,
                b.y2
            );
        }

        Ok(())
    }
}
