use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgGroup, Parser};
use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;

use gesture_core::annotation::domain::frame_annotator::FrameAnnotator;
use gesture_core::annotation::infrastructure::box_annotator::BoxAnnotator;
use gesture_core::capture::error::CaptureError;
use gesture_core::capture::frame_source::FrameSource;
use gesture_core::capture::media_source::{is_image, is_url, MediaLocation, MediaSource};
use gesture_core::detection::domain::object_detector::ObjectDetector;
use gesture_core::detection::error::DetectorError;
use gesture_core::detection::infrastructure::onnx_yolo_detector::OnnxYoloDetector;
use gesture_core::display::domain::display_sink::DisplaySink;
use gesture_core::display::infrastructure::headless_display::HeadlessDisplay;
use gesture_core::pipeline::detect_image_use_case::DetectImageUseCase;
use gesture_core::pipeline::detect_stream_use_case::DetectStreamUseCase;
use gesture_core::pipeline::pipeline_logger::SummaryPipelineLogger;
use gesture_core::recording::background_video_writer::{BackgroundVideoWriter, RecorderConfig};
use gesture_core::recording::error::RecorderError;
use gesture_core::recording::unique_name::generate_unique_name;
use gesture_core::shared::constants::{
    CAPTURE_DIR, DEFAULT_CONFIDENCE, DEFAULT_MODEL_PATH, FALLBACK_FPS, IMAGE_BASE_NAME,
    IMAGE_EXTENSION,
};
use gesture_core::shared::video_metadata::VideoMetadata;
use gesture_core::video::domain::video_encoder::{Container, VideoEncoder};
use gesture_core::video::infrastructure::ffmpeg_encoder::FfmpegEncoder;
use gesture_core::video::infrastructure::image_file_writer::ImageFileWriter;

const WINDOW_TITLE: &str = "YOLO Gesture Detection";

/// Hand gesture detection on a camera, a video file or a still image.
#[derive(Parser, Debug)]
#[command(name = "yolo-gesture", version)]
#[command(group(ArgGroup::new("source").args(["camera", "stream", "image"])))]
struct Cli {
    /// Detection confidence threshold (0.0-1.0).
    #[arg(short = 't', long, default_value_t = DEFAULT_CONFIDENCE)]
    threshold: f32,

    /// ONNX model file.
    #[arg(short, long, default_value = DEFAULT_MODEL_PATH)]
    model: PathBuf,

    /// Camera index (default when no source is given: 0).
    #[arg(short, long)]
    camera: Option<u32>,

    /// Video file or stream URL (an image file is handled as --image).
    #[arg(short, long)]
    stream: Option<PathBuf>,

    /// Still image file.
    #[arg(short, long)]
    image: Option<PathBuf>,

    /// Directory that receives annotated outputs.
    #[arg(long, default_value = CAPTURE_DIR)]
    output_dir: PathBuf,

    /// Container for recorded video: webm or mp4.
    #[arg(long, default_value = "webm", value_parser = parse_container)]
    container: Container,

    /// Log writer-thread state on every iteration.
    #[arg(long)]
    debug: bool,

    /// Never open a window, even when built with display support.
    #[arg(long)]
    headless: bool,
}

fn parse_container(value: &str) -> Result<Container, String> {
    Container::from_extension(value)
        .ok_or_else(|| format!("unsupported container '{value}' (expected webm or mp4)"))
}

impl Cli {
    fn location(&self) -> MediaLocation {
        if let Some(path) = &self.image {
            MediaLocation::Image(path.clone())
        } else if let Some(path) = &self.stream {
            if is_image(path) {
                MediaLocation::Image(path.clone())
            } else {
                MediaLocation::Stream(path.clone())
            }
        } else {
            MediaLocation::Camera(self.camera.unwrap_or(0))
        }
    }
}

#[derive(Error, Debug)]
enum AppError {
    #[error("{0}")]
    InvalidInput(String),
    #[error(transparent)]
    Model(#[from] DetectorError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Output(#[from] RecorderError),
    #[error("could not open video encoder for {0}")]
    EncoderUnavailable(PathBuf),
    #[error("{0}")]
    Other(Box<dyn std::error::Error>),
}

impl AppError {
    fn exit_code(&self) -> u8 {
        match self {
            AppError::InvalidInput(_) => 2,
            AppError::Model(_) => 3,
            AppError::Capture(_) => 4,
            AppError::Output(_) | AppError::EncoderUnavailable(_) => 5,
            AppError::Other(_) => 1,
        }
    }
}

impl From<Box<dyn std::error::Error>> for AppError {
    fn from(err: Box<dyn std::error::Error>) -> Self {
        match err.downcast::<RecorderError>() {
            Ok(recorder) => AppError::Output(*recorder),
            Err(err) => AppError::Other(err),
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    validate(&cli)?;

    let location = cli.location();
    log::info!("Using {}", location.describe());

    let detector: Box<dyn ObjectDetector> =
        Box::new(OnnxYoloDetector::new(&cli.model, cli.threshold)?);
    let annotator: Box<dyn FrameAnnotator> = Box::new(BoxAnnotator::default());
    let source = MediaSource::open(&location)?;

    if source.is_still_image() {
        run_image(&cli, source, detector, annotator)
    } else {
        run_stream(&cli, source, detector, annotator)
    }
}

fn run_image(
    cli: &Cli,
    source: MediaSource,
    detector: Box<dyn ObjectDetector>,
    annotator: Box<dyn FrameAnnotator>,
) -> Result<(), AppError> {
    let mut rng = StdRng::from_entropy();
    let output = generate_unique_name(&cli.output_dir, IMAGE_BASE_NAME, IMAGE_EXTENSION, &mut rng);

    let mut use_case = DetectImageUseCase::new(
        Box::new(source),
        detector,
        annotator,
        Box::new(ImageFileWriter::new()),
        build_display(cli),
    );
    let detections = use_case.execute(&output)?;
    log::info!("{} detection(s) in image", detections.len());

    println!("Annotated image file saved! ({})", output.display());
    Ok(())
}

fn run_stream(
    cli: &Cli,
    source: MediaSource,
    detector: Box<dyn ObjectDetector>,
    annotator: Box<dyn FrameAnnotator>,
) -> Result<(), AppError> {
    let fps = source
        .metadata()
        .map_or(FALLBACK_FPS, VideoMetadata::effective_fps);
    let frame_size = source.frame_dimensions();

    let config = RecorderConfig {
        output_dir: cli.output_dir.clone(),
        container: cli.container,
        debug: cli.debug,
        ..RecorderConfig::default()
    };
    let mut recorder = BackgroundVideoWriter::new(
        config,
        fps,
        frame_size,
        Box::new(|| -> Box<dyn VideoEncoder> { Box::new(FfmpegEncoder::new()) }),
    );

    // Starting here surfaces output failures before the first frame is read.
    recorder.start()?;
    if !recorder.is_file_open() {
        let path = recorder.get_path().to_path_buf();
        recorder.stop()?;
        return Err(AppError::EncoderUnavailable(path));
    }
    log::info!(
        "Recording {}x{} @ {fps:.1} fps to {}",
        frame_size.0,
        frame_size.1,
        recorder.get_path().display()
    );

    let mut use_case = DetectStreamUseCase::new(
        Box::new(source),
        detector,
        annotator,
        build_display(cli),
        recorder,
    )
    .with_logger(Box::new(SummaryPipelineLogger::default()));
    let outcome = use_case.execute()?;

    log::info!(
        "Capture ended ({:?}) after {} frames, {} dropped",
        outcome.stop_reason,
        outcome.frames,
        outcome.dropped_frames
    );
    println!("Annotated video file saved! ({})", outcome.output_path.display());
    Ok(())
}

#[cfg(feature = "opencv-display")]
fn build_display(cli: &Cli) -> Box<dyn DisplaySink> {
    use gesture_core::display::infrastructure::opencv_display::OpencvDisplay;

    if cli.headless {
        return Box::new(HeadlessDisplay::new());
    }
    match OpencvDisplay::new(WINDOW_TITLE) {
        Ok(display) => Box::new(display),
        Err(e) => {
            log::warn!("No display available ({e}), running headless");
            Box::new(HeadlessDisplay::new())
        }
    }
}

#[cfg(not(feature = "opencv-display"))]
fn build_display(cli: &Cli) -> Box<dyn DisplaySink> {
    if !cli.headless {
        log::info!("Built without display support; press Ctrl+C to stop ({WINDOW_TITLE})");
    }
    Box::new(HeadlessDisplay::new())
}

fn validate(cli: &Cli) -> Result<(), AppError> {
    if !(0.0..=1.0).contains(&cli.threshold) {
        return Err(AppError::InvalidInput(format!(
            "Threshold must be between 0.0 and 1.0, got {}",
            cli.threshold
        )));
    }
    if let Some(path) = &cli.image {
        require_file(path)?;
    }
    if let Some(path) = cli.stream.as_deref().filter(|p| !is_url(p)) {
        require_file(path)?;
    }
    Ok(())
}

fn require_file(path: &Path) -> Result<(), AppError> {
    if path.exists() {
        Ok(())
    } else {
        Err(AppError::InvalidInput(format!(
            "Input file not found: {}",
            path.display()
        )))
    }
}
