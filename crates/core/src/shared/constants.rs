use std::time::Duration;

pub const DEFAULT_MODEL_PATH: &str = "model/yolov12s-handgestures.onnx";

/// Default detection confidence threshold.
pub const DEFAULT_CONFIDENCE: f32 = 0.25;

/// Directory (relative to the working directory) that receives all outputs.
pub const CAPTURE_DIR: &str = "captures";

pub const VIDEO_BASE_NAME: &str = "annotated_output";
pub const IMAGE_BASE_NAME: &str = "annotated_output";
pub const IMAGE_EXTENSION: &str = "jpg";

/// Length of the random alphabetic suffix appended to output file names.
pub const NAME_SUFFIX_LEN: usize = 5;

/// Seconds of video the frame buffer may hold before dropping the oldest frame.
pub const BUFFER_SECONDS: f64 = 5.0;

/// Frame rate assumed when a source does not report one (e.g. some webcams).
pub const FALLBACK_FPS: f64 = 30.0;

/// How long the writer thread waits on an empty buffer before re-checking its flags.
pub const WRITER_IDLE_INTERVAL: Duration = Duration::from_millis(10);

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
