use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::annotation::domain::frame_annotator::FrameAnnotator;
use crate::capture::frame_source::FrameSource;
use crate::detection::domain::object_detector::ObjectDetector;
use crate::display::domain::display_sink::DisplaySink;
use crate::recording::background_video_writer::BackgroundVideoWriter;

use super::pipeline_logger::{NullPipelineLogger, PipelineLogger};

/// Why the capture loop ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The source ran out of frames.
    Exhausted,
    /// Reading the next frame failed.
    ReadFailed,
    /// The display reported a quit request.
    UserQuit,
    /// The shared cancel flag was raised.
    Cancelled,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StreamOutcome {
    pub output_path: PathBuf,
    pub frames: usize,
    pub dropped_frames: usize,
    pub stop_reason: StopReason,
}

/// Live capture loop: read → detect → annotate → display → record.
///
/// Recording happens off-thread through the [`BackgroundVideoWriter`], so a
/// slow encoder never stalls the display. Single-use: `execute` consumes
/// the source and always stops the recorder before returning.
pub struct DetectStreamUseCase {
    source: Box<dyn FrameSource>,
    detector: Box<dyn ObjectDetector>,
    annotator: Box<dyn FrameAnnotator>,
    display: Box<dyn DisplaySink>,
    recorder: BackgroundVideoWriter,
    logger: Box<dyn PipelineLogger>,
    cancelled: Arc<AtomicBool>,
}

impl DetectStreamUseCase {
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: Box<dyn ObjectDetector>,
        annotator: Box<dyn FrameAnnotator>,
        display: Box<dyn DisplaySink>,
        recorder: BackgroundVideoWriter,
    ) -> Self {
        Self {
            source,
            detector,
            annotator,
            display,
            recorder,
            logger: Box::new(NullPipelineLogger),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_logger(mut self, logger: Box<dyn PipelineLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Shares a flag that ends the loop after the current frame when set.
    pub fn with_cancel_flag(mut self, cancelled: Arc<AtomicBool>) -> Self {
        self.cancelled = cancelled;
        self
    }

    pub fn recorder(&self) -> &BackgroundVideoWriter {
        &self.recorder
    }

    pub fn execute(&mut self) -> Result<StreamOutcome, Box<dyn std::error::Error>> {
        self.recorder.start()?;

        let run = self.run_loop();

        self.source.close();
        self.recorder.stop()?;
        self.logger.summary();

        let (frames, stop_reason) = run?;
        Ok(StreamOutcome {
            output_path: self.recorder.get_path().to_path_buf(),
            frames,
            dropped_frames: self.recorder.dropped_frames(),
            stop_reason,
        })
    }

    fn run_loop(&mut self) -> Result<(usize, StopReason), Box<dyn std::error::Error>> {
        let total = self.source.frame_count();
        let mut frames = 0usize;
        let mut detect_failures = 0usize;

        loop {
            if self.cancelled.load(Ordering::Relaxed) {
                return Ok((frames, StopReason::Cancelled));
            }

            let t0 = Instant::now();
            let mut frame = match self.source.read() {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok((frames, StopReason::Exhausted)),
                Err(e) => {
                    log::warn!("Stopping capture: {e}");
                    return Ok((frames, StopReason::ReadFailed));
                }
            };
            self.logger.timing("read", elapsed_ms(t0));

            let t0 = Instant::now();
            let detections = match self.detector.detect(&frame) {
                Ok(detections) => detections,
                Err(e) => {
                    detect_failures += 1;
                    if detect_failures == 1 {
                        log::warn!("Detection failed on frame {}: {e}", frame.index());
                    }
                    Vec::new()
                }
            };
            self.logger.timing("detect", elapsed_ms(t0));
            self.logger.metric("detections", detections.len() as f64);

            let t0 = Instant::now();
            self.annotator.annotate(&mut frame, &detections)?;
            self.logger.timing("annotate", elapsed_ms(t0));

            let t0 = Instant::now();
            let quit = self.display.render(&frame);
            self.logger.timing("display", elapsed_ms(t0));

            let t0 = Instant::now();
            self.recorder.write(frame);
            self.logger.timing("enqueue", elapsed_ms(t0));
            self.logger
                .metric("queued", self.recorder.queued_frames() as f64);

            frames += 1;
            self.logger.progress(frames, total);

            if quit {
                return Ok((frames, StopReason::UserQuit));
            }
        }
    }
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}
