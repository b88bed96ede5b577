use std::path::Path;

use crate::annotation::domain::frame_annotator::FrameAnnotator;
use crate::capture::frame_source::FrameSource;
use crate::detection::domain::detection::Detection;
use crate::detection::domain::object_detector::ObjectDetector;
use crate::display::domain::display_sink::DisplaySink;
use crate::video::domain::image_writer::ImageWriter;

/// Single-image pipeline: read → detect → annotate → write → display.
///
/// The annotated image is saved before it is shown, and stays on screen
/// until the user quits when the display is interactive.
pub struct DetectImageUseCase {
    source: Box<dyn FrameSource>,
    detector: Box<dyn ObjectDetector>,
    annotator: Box<dyn FrameAnnotator>,
    image_writer: Box<dyn ImageWriter>,
    display: Box<dyn DisplaySink>,
}

impl DetectImageUseCase {
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: Box<dyn ObjectDetector>,
        annotator: Box<dyn FrameAnnotator>,
        image_writer: Box<dyn ImageWriter>,
        display: Box<dyn DisplaySink>,
    ) -> Self {
        Self {
            source,
            detector,
            annotator,
            image_writer,
            display,
        }
    }

    /// Returns the detections drawn onto the saved image.
    pub fn execute(&mut self, output_path: &Path) -> Result<Vec<Detection>, Box<dyn std::error::Error>> {
        let frame = self.source.read();
        self.source.close();
        let mut frame = frame?.ok_or("No frame in image")?;

        let detections = self.detector.detect(&frame)?;
        for det in &detections {
            log::info!("Detected {} ({:.2})", det.label, det.confidence);
        }

        self.annotator.annotate(&mut frame, &detections)?;
        self.image_writer.write(output_path, &frame)?;

        if self.display.is_interactive() {
            while !self.display.render(&frame) {}
        } else {
            self.display.render(&frame);
        }

        Ok(detections)
    }
}
