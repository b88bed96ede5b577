use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::recording::error::RecorderError;
use crate::recording::frame_buffer::{capacity_for, FrameBuffer};
use crate::recording::output_file::OutputFile;
use crate::recording::unique_name::generate_unique_name;
use crate::recording::writer_task::{WriterFlags, WriterOutcome, WriterState, WriterTask};
use crate::shared::constants::{BUFFER_SECONDS, CAPTURE_DIR, VIDEO_BASE_NAME};
use crate::shared::frame::Frame;
use crate::video::domain::video_encoder::{Container, EncoderFactory, EncoderSettings};

/// Where and how a recording session writes its video.
#[derive(Clone, Debug, PartialEq)]
pub struct RecorderConfig {
    pub output_dir: PathBuf,
    pub base_name: String,
    pub container: Container,
    /// Seconds of video the buffer holds before dropping the oldest frame.
    pub buffer_seconds: f64,
    pub debug: bool,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(CAPTURE_DIR),
            base_name: VIDEO_BASE_NAME.to_string(),
            container: Container::default(),
            buffer_seconds: BUFFER_SECONDS,
            debug: false,
        }
    }
}

/// Records frames to a video file on a background thread.
///
/// `write` only enqueues into a bounded drop-oldest buffer and never waits
/// on the encoder. `start` and `stop` are idempotent; `stop` drains what
/// is still queued, joins the writer thread and finalizes the file.
/// Dropping a running writer stops it.
pub struct BackgroundVideoWriter {
    config: RecorderConfig,
    fps: f64,
    frame_size: (u32, u32),
    encoder_factory: EncoderFactory,
    rng: Box<dyn RngCore + Send>,
    path: PathBuf,
    path_used: bool,
    flags: Arc<WriterFlags>,
    buffer: Option<FrameBuffer>,
    task: Option<WriterTask>,
    last_dropped: usize,
}

impl BackgroundVideoWriter {
    pub fn new(
        config: RecorderConfig,
        fps: f64,
        frame_size: (u32, u32),
        encoder_factory: EncoderFactory,
    ) -> Self {
        Self::with_rng(
            config,
            fps,
            frame_size,
            encoder_factory,
            Box::new(StdRng::from_entropy()),
        )
    }

    /// Same as [`new`](Self::new) with the randomness behind file names
    /// supplied by the caller.
    pub fn with_rng(
        config: RecorderConfig,
        fps: f64,
        frame_size: (u32, u32),
        encoder_factory: EncoderFactory,
        mut rng: Box<dyn RngCore + Send>,
    ) -> Self {
        let path = next_path(&config, &mut *rng);
        let flags = Arc::new(WriterFlags::new(config.debug));
        Self {
            config,
            fps,
            frame_size,
            encoder_factory,
            rng,
            path,
            path_used: false,
            flags,
            buffer: None,
            task: None,
            last_dropped: 0,
        }
    }

    pub fn start(&mut self) -> Result<&mut Self, RecorderError> {
        if self.task.is_some() {
            return Ok(self);
        }

        if self.path_used {
            self.path = next_path(&self.config, &mut *self.rng);
        }
        self.path_used = true;

        let mut file = OutputFile::create(&self.path)?;
        let settings = EncoderSettings {
            width: self.frame_size.0,
            height: self.frame_size.1,
            fps: self.fps,
            container: self.config.container,
        };
        if !file.open((self.encoder_factory)(), &settings) {
            log::warn!(
                "Recording disabled: no encoder for {}",
                self.path.display()
            );
            return Ok(self);
        }

        let buffer = FrameBuffer::with_capacity(capacity_for(self.fps, self.config.buffer_seconds));
        let task = WriterTask::spawn(file, buffer.reader(), self.flags.clone())?;
        log::info!(
            "Recording to {} ({}x{} @ {:.2} fps, buffer {} frames)",
            self.path.display(),
            self.frame_size.0,
            self.frame_size.1,
            self.fps,
            buffer.capacity()
        );

        self.last_dropped = 0;
        self.buffer = Some(buffer);
        self.task = Some(task);
        Ok(self)
    }

    /// Enqueues `frame` for the writer thread. Does nothing unless running.
    pub fn write(&mut self, frame: Frame) {
        if let Some(buffer) = self.buffer.as_mut() {
            buffer.push(frame);
        }
    }

    pub fn stop(&mut self) -> Result<&mut Self, RecorderError> {
        let Some(task) = self.task.take() else {
            return Ok(self);
        };

        if let Some(mut buffer) = self.buffer.take() {
            buffer.close();
            self.last_dropped = buffer.dropped();
        }

        let WriterOutcome {
            mut file,
            written,
            failed,
            skipped,
        } = task.join()?;

        log::info!(
            "Stopped recording {}: {written} frames written, {} dropped, {failed} failed, {skipped} skipped",
            file.path().display(),
            self.last_dropped
        );

        file.finalize().map_err(|e| RecorderError::Finalize {
            path: file.path().to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(self)
    }

    /// Current or most recent output path. Valid right after construction.
    pub fn get_path(&self) -> &Path {
        &self.path
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn is_file_open(&self) -> bool {
        self.task.is_some() && self.flags.is_open()
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.config.debug = debug;
        self.flags.set_debug(debug);
    }

    /// Frames evicted by the overload policy in the current or last session.
    pub fn dropped_frames(&self) -> usize {
        self.buffer
            .as_ref()
            .map_or(self.last_dropped, FrameBuffer::dropped)
    }

    pub fn queued_frames(&self) -> usize {
        self.buffer.as_ref().map_or(0, FrameBuffer::len)
    }

    /// Buffer capacity in frames for this writer's fps.
    pub fn capacity(&self) -> usize {
        capacity_for(self.fps, self.config.buffer_seconds)
    }

    pub fn state(&self) -> WriterState {
        match &self.task {
            Some(task) => task.state(),
            None if self.path_used => WriterState::Terminated,
            None => WriterState::NotStarted,
        }
    }
}

impl Drop for BackgroundVideoWriter {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("Stopping recorder on drop failed: {e}");
        }
    }
}

fn next_path(config: &RecorderConfig, rng: &mut dyn RngCore) -> PathBuf {
    generate_unique_name(
        &config.output_dir,
        &config.base_name,
        config.container.extension(),
        rng,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame_source::FrameSource;
    use crate::capture::infrastructure::ffmpeg_capture::FfmpegCapture;
    use crate::video::domain::video_encoder::VideoEncoder;
    use crate::video::infrastructure::ffmpeg_encoder::{find_codec, FfmpegEncoder};
    use crossbeam_channel::{Receiver, Sender};
    use rstest::rstest;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    const W: u32 = 8;
    const H: u32 = 6;

    #[derive(Default)]
    struct Log {
        opened: usize,
        written: Vec<usize>,
        closed: usize,
    }

    /// Records every frame index it receives.
    struct RecordingEncoder {
        log: Arc<Mutex<Log>>,
        fail_open: bool,
        fail_odd: bool,
        delay: Duration,
    }

    impl VideoEncoder for RecordingEncoder {
        fn open(&mut self, _: &Path, _: &EncoderSettings) -> Result<(), Box<dyn std::error::Error>> {
            if self.fail_open {
                return Err("no such codec".into());
            }
            self.log.lock().unwrap().opened += 1;
            Ok(())
        }

        fn write(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
            if self.fail_odd && frame.index() % 2 == 1 {
                return Err("corrupt frame".into());
            }
            self.log.lock().unwrap().written.push(frame.index());
            Ok(())
        }

        fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
            self.log.lock().unwrap().closed += 1;
            Ok(())
        }
    }

    #[derive(Clone, Copy, Default)]
    struct Behaviour {
        fail_open: bool,
        fail_odd: bool,
        delay: Duration,
    }

    fn recording_factory(log: &Arc<Mutex<Log>>, behaviour: Behaviour) -> EncoderFactory {
        let log = log.clone();
        Box::new(move || -> Box<dyn VideoEncoder> {
            Box::new(RecordingEncoder {
                log: log.clone(),
                fail_open: behaviour.fail_open,
                fail_odd: behaviour.fail_odd,
                delay: behaviour.delay,
            })
        })
    }

    /// Blocks inside the first `write` until released.
    struct GatedEncoder {
        entered: Sender<()>,
        release: Receiver<()>,
        gated: bool,
        written: Arc<Mutex<Vec<usize>>>,
    }

    impl VideoEncoder for GatedEncoder {
        fn open(&mut self, _: &Path, _: &EncoderSettings) -> Result<(), Box<dyn std::error::Error>> {
            Ok(())
        }

        fn write(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
            if self.gated {
                self.gated = false;
                self.entered.send(())?;
                self.release.recv()?;
            }
            self.written.lock().unwrap().push(frame.index());
            Ok(())
        }

        fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
            Ok(())
        }
    }

    fn config(dir: &Path) -> RecorderConfig {
        RecorderConfig {
            output_dir: dir.join("captures"),
            ..RecorderConfig::default()
        }
    }

    fn recorder(dir: &Path, fps: f64, factory: EncoderFactory) -> BackgroundVideoWriter {
        BackgroundVideoWriter::with_rng(
            config(dir),
            fps,
            (W, H),
            factory,
            Box::new(StdRng::seed_from_u64(7)),
        )
    }

    fn frame(index: usize) -> Frame {
        Frame::filled(W, H, [index as u8, 64, 128], index)
    }

    fn files_in(dir: &Path) -> Vec<PathBuf> {
        match std::fs::read_dir(dir) {
            Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
            Err(_) => Vec::new(),
        }
    }

    #[test]
    fn test_default_config() {
        let config = RecorderConfig::default();
        assert_eq!(config.output_dir, PathBuf::from("captures"));
        assert_eq!(config.base_name, "annotated_output");
        assert_eq!(config.container, Container::WebM);
        approx::assert_relative_eq!(config.buffer_seconds, 5.0);
        assert!(!config.debug);
    }

    #[test]
    fn test_path_is_known_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(Mutex::new(Log::default()));
        let writer = recorder(dir.path(), 30.0, recording_factory(&log, Behaviour::default()));

        let path = writer.get_path();
        assert_eq!(path.parent(), Some(dir.path().join("captures").as_path()));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("annotated_output_"));
        assert!(name.ends_with(".webm"));
        assert_eq!(writer.state(), WriterState::NotStarted);
    }

    #[test]
    fn test_write_before_start_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(Mutex::new(Log::default()));
        let mut writer = recorder(dir.path(), 30.0, recording_factory(&log, Behaviour::default()));

        writer.write(frame(0));
        writer.stop().unwrap();

        assert!(!writer.is_running());
        assert!(!writer.get_path().exists());
        assert_eq!(log.lock().unwrap().opened, 0);
    }

    #[test]
    fn test_start_twice_creates_one_file_and_one_encoder() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(Mutex::new(Log::default()));
        let mut writer = recorder(dir.path(), 30.0, recording_factory(&log, Behaviour::default()));

        writer.start().unwrap();
        let path = writer.get_path().to_path_buf();
        writer.start().unwrap();

        assert!(writer.is_running());
        assert!(writer.is_file_open());
        assert_eq!(writer.get_path(), path.as_path());
        assert_eq!(log.lock().unwrap().opened, 1);
        assert_eq!(files_in(&dir.path().join("captures")).len(), 1);
        writer.stop().unwrap();
    }

    #[test]
    fn test_stop_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(Mutex::new(Log::default()));
        let mut writer = recorder(dir.path(), 30.0, recording_factory(&log, Behaviour::default()));

        writer.start().unwrap();
        writer.write(frame(0));
        writer.stop().unwrap().stop().unwrap();

        assert!(!writer.is_running());
        assert!(!writer.is_file_open());
        assert_eq!(writer.state(), WriterState::Terminated);
        assert_eq!(log.lock().unwrap().closed, 1);
    }

    #[test]
    fn test_frames_are_written_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(Mutex::new(Log::default()));
        let mut writer = recorder(dir.path(), 30.0, recording_factory(&log, Behaviour::default()));

        writer.start().unwrap();
        for i in 0..100 {
            writer.write(frame(i));
        }
        writer.stop().unwrap();

        assert_eq!(log.lock().unwrap().written, (0..100).collect::<Vec<_>>());
        assert_eq!(writer.dropped_frames(), 0);
    }

    #[test]
    fn test_blocked_writer_keeps_last_capacity_frames() {
        let dir = tempfile::tempdir().unwrap();
        let written = Arc::new(Mutex::new(Vec::new()));
        let (entered_tx, entered_rx) = crossbeam_channel::unbounded();
        let (release_tx, release_rx) = crossbeam_channel::unbounded();
        let factory: EncoderFactory = {
            let written = written.clone();
            Box::new(move || -> Box<dyn VideoEncoder> {
                Box::new(GatedEncoder {
                    entered: entered_tx.clone(),
                    release: release_rx.clone(),
                    gated: true,
                    written: written.clone(),
                })
            })
        };
        let mut writer = recorder(dir.path(), 30.0, factory);
        assert_eq!(writer.capacity(), 150);

        writer.start().unwrap();
        writer.write(frame(0));
        entered_rx.recv_timeout(Duration::from_secs(10)).unwrap();

        for i in 1..=200 {
            writer.write(frame(i));
        }
        assert_eq!(writer.queued_frames(), 150);
        assert_eq!(writer.dropped_frames(), 50);

        release_tx.send(()).unwrap();
        writer.stop().unwrap();

        let expected: Vec<usize> = std::iter::once(0).chain(51..=200).collect();
        assert_eq!(*written.lock().unwrap(), expected);
        assert_eq!(writer.dropped_frames(), 50);
    }

    #[test]
    fn test_write_does_not_wait_for_a_slow_encoder() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(Mutex::new(Log::default()));
        let behaviour = Behaviour {
            delay: Duration::from_millis(20),
            ..Behaviour::default()
        };
        let mut writer = recorder(dir.path(), 10.0, recording_factory(&log, behaviour));

        writer.start().unwrap();
        let started = Instant::now();
        for i in 0..200 {
            writer.write(frame(i));
        }
        let elapsed = started.elapsed();
        writer.stop().unwrap();

        assert!(elapsed < Duration::from_secs(1), "writes took {elapsed:?}");
        let written = &log.lock().unwrap().written;
        assert!(written.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(written.last(), Some(&199));
        assert_eq!(written.len() + writer.dropped_frames(), 200);
    }

    #[test]
    fn test_unwritable_output_dir_fails_start() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();
        let log = Arc::new(Mutex::new(Log::default()));
        let mut writer = BackgroundVideoWriter::new(
            RecorderConfig {
                output_dir: blocker.join("captures"),
                ..RecorderConfig::default()
            },
            30.0,
            (W, H),
            recording_factory(&log, Behaviour::default()),
        );

        assert!(writer.start().is_err());
        assert!(!writer.is_running());
        writer.write(frame(0));
        writer.stop().unwrap();
    }

    #[test]
    fn test_codec_failure_disables_recording() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(Mutex::new(Log::default()));
        let behaviour = Behaviour {
            fail_open: true,
            ..Behaviour::default()
        };
        let mut writer = recorder(dir.path(), 30.0, recording_factory(&log, behaviour));

        writer.start().unwrap();
        assert!(!writer.is_running());
        assert!(!writer.is_file_open());

        writer.write(frame(0));
        assert_eq!(writer.queued_frames(), 0);
        writer.stop().unwrap();
        assert!(log.lock().unwrap().written.is_empty());
    }

    #[test]
    fn test_restart_uses_a_fresh_path() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(Mutex::new(Log::default()));
        let mut writer = recorder(dir.path(), 30.0, recording_factory(&log, Behaviour::default()));

        writer.start().unwrap().stop().unwrap();
        let first = writer.get_path().to_path_buf();
        writer.start().unwrap().stop().unwrap();
        let second = writer.get_path().to_path_buf();

        assert_ne!(first, second);
        assert!(first.exists());
        assert!(second.exists());
        assert_eq!(log.lock().unwrap().opened, 2);
    }

    #[test]
    fn test_encode_errors_do_not_stop_the_writer() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(Mutex::new(Log::default()));
        let behaviour = Behaviour {
            fail_odd: true,
            ..Behaviour::default()
        };
        let mut writer = recorder(dir.path(), 30.0, recording_factory(&log, behaviour));

        writer.start().unwrap();
        for i in 0..10 {
            writer.write(frame(i));
        }
        writer.stop().unwrap();

        assert_eq!(log.lock().unwrap().written, vec![0, 2, 4, 6, 8]);
    }

    #[test]
    fn test_empty_frames_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(Mutex::new(Log::default()));
        let mut writer = recorder(dir.path(), 30.0, recording_factory(&log, Behaviour::default()));

        writer.start().unwrap();
        writer.write(frame(0));
        writer.write(Frame::new(Vec::new(), 0, 0, 1));
        writer.write(Frame::filled(W, H, [0, 0, 0], 2));
        writer.stop().unwrap();

        assert_eq!(log.lock().unwrap().written, vec![0, 2]);
    }

    #[test]
    fn test_debug_mode_still_writes() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(Mutex::new(Log::default()));
        let mut writer = recorder(dir.path(), 30.0, recording_factory(&log, Behaviour::default()));

        writer.set_debug(true);
        writer.start().unwrap();
        writer.write(frame(3));
        writer.stop().unwrap();

        assert_eq!(log.lock().unwrap().written, vec![3]);
    }

    #[test]
    fn test_drop_stops_and_finalizes() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(Mutex::new(Log::default()));
        {
            let mut writer =
                recorder(dir.path(), 30.0, recording_factory(&log, Behaviour::default()));
            writer.start().unwrap();
            for i in 0..5 {
                writer.write(frame(i));
            }
        }

        let log = log.lock().unwrap();
        assert_eq!(log.written, vec![0, 1, 2, 3, 4]);
        assert_eq!(log.closed, 1);
    }

    const ROUND_TRIP_COLORS: [[u8; 3]; 4] = [
        [220, 30, 30],
        [30, 220, 30],
        [30, 30, 220],
        [230, 230, 230],
    ];

    /// Index of the palette entry closest to `px`.
    fn nearest_color(px: &[u8]) -> usize {
        ROUND_TRIP_COLORS
            .iter()
            .enumerate()
            .min_by_key(|(_, c)| {
                c.iter()
                    .zip(px)
                    .map(|(&a, &b)| (a as i32 - b as i32).pow(2))
                    .sum::<i32>()
            })
            .map(|(i, _)| i)
            .unwrap()
    }

    #[rstest]
    #[case(Container::WebM)]
    #[case(Container::Mp4)]
    fn test_ffmpeg_recording_round_trip_keeps_frame_order(#[case] container: Container) {
        ffmpeg_next::init().unwrap();
        if find_codec(container).is_err() {
            eprintln!("skipping: no .{} encoder in this ffmpeg build", container.extension());
            return;
        }

        let dir = tempfile::tempdir().unwrap();
        let mut writer = BackgroundVideoWriter::new(
            RecorderConfig {
                container,
                ..config(dir.path())
            },
            30.0,
            (64, 48),
            Box::new(|| -> Box<dyn VideoEncoder> { Box::new(FfmpegEncoder::new()) }),
        );

        writer.start().unwrap();
        assert!(writer.is_file_open());
        for i in 0..12 {
            let color = ROUND_TRIP_COLORS[(i / 3) % ROUND_TRIP_COLORS.len()];
            writer.write(Frame::filled(64, 48, color, i));
        }
        writer.stop().unwrap();
        assert_eq!(
            writer.get_path().extension().and_then(|e| e.to_str()),
            Some(container.extension())
        );

        let mut capture = FfmpegCapture::open_file(writer.get_path()).unwrap();
        assert_eq!(capture.frame_dimensions(), (64, 48));
        let center = ((24 * 64 + 32) * 3) as usize;
        let mut decoded = Vec::new();
        while let Some(frame) = capture.read().unwrap() {
            decoded.push(nearest_color(&frame.data()[center..center + 3]));
        }

        let expected: Vec<usize> = (0..12).map(|i| (i / 3) % ROUND_TRIP_COLORS.len()).collect();
        assert_eq!(decoded, expected);
    }
}
