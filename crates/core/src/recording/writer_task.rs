use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::recording::error::RecorderError;
use crate::recording::frame_buffer::{FrameBufferReader, Popped};
use crate::recording::output_file::OutputFile;
use crate::shared::constants::WRITER_IDLE_INTERVAL;

/// Lifecycle of the writer thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriterState {
    NotStarted,
    Running,
    /// Stop was requested; the thread is draining the buffer.
    Stopping,
    Terminated,
}

impl WriterState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => WriterState::Running,
            2 => WriterState::Stopping,
            3 => WriterState::Terminated,
            _ => WriterState::NotStarted,
        }
    }
}

/// Flags shared between the controller and the writer thread.
#[derive(Debug)]
pub struct WriterFlags {
    open: AtomicBool,
    debug: AtomicBool,
    state: AtomicU8,
}

impl WriterFlags {
    pub fn new(debug: bool) -> Self {
        Self {
            open: AtomicBool::new(false),
            debug: AtomicBool::new(debug),
            state: AtomicU8::new(WriterState::NotStarted as u8),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub fn set_debug(&self, debug: bool) {
        self.debug.store(debug, Ordering::Relaxed);
    }

    pub fn debug(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> WriterState {
        WriterState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: WriterState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

impl Default for WriterFlags {
    fn default() -> Self {
        Self::new(false)
    }
}

/// What the writer thread hands back when it exits.
#[derive(Debug)]
pub struct WriterOutcome {
    pub file: OutputFile,
    pub written: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Background thread that drains a frame buffer into an output file.
///
/// The file moves into the thread and comes back through the join handle,
/// so only one side ever touches the encoder.
pub struct WriterTask {
    handle: JoinHandle<WriterOutcome>,
    flags: Arc<WriterFlags>,
    path: std::path::PathBuf,
}

impl WriterTask {
    pub fn spawn(
        file: OutputFile,
        reader: FrameBufferReader,
        flags: Arc<WriterFlags>,
    ) -> Result<Self, RecorderError> {
        let path = file.path().to_path_buf();
        let name = format!(
            "writer-{}",
            path.file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("output")
        );

        flags.open.store(true, Ordering::Release);
        flags.set_state(WriterState::Running);

        let thread_flags = flags.clone();
        let spawned = thread::Builder::new()
            .name(name)
            .spawn(move || run_writer(file, reader, &thread_flags));

        match spawned {
            Ok(handle) => Ok(Self {
                handle,
                flags,
                path,
            }),
            Err(e) => {
                flags.open.store(false, Ordering::Release);
                flags.set_state(WriterState::NotStarted);
                Err(RecorderError::Spawn(e))
            }
        }
    }

    /// Tells the thread to exit once the buffer is drained.
    pub fn request_stop(&self) {
        self.flags.open.store(false, Ordering::Release);
        // Only a running thread moves to Stopping; never overwrite Terminated.
        let _ = self.flags.state.compare_exchange(
            WriterState::Running as u8,
            WriterState::Stopping as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub fn state(&self) -> WriterState {
        self.flags.state()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the thread to exit and takes back the output file.
    pub fn join(self) -> Result<WriterOutcome, RecorderError> {
        self.request_stop();
        let outcome = self
            .handle
            .join()
            .map_err(|_| RecorderError::WriterPanicked(self.path.clone()));
        self.flags.set_state(WriterState::Terminated);
        outcome
    }
}

fn run_writer(mut file: OutputFile, reader: FrameBufferReader, flags: &WriterFlags) -> WriterOutcome {
    let thread_name = thread::current().name().unwrap_or("writer").to_string();
    let mut written = 0usize;
    let mut failed = 0usize;
    let mut skipped = 0usize;

    log::debug!("{thread_name} started for {}", file.path().display());

    while flags.is_open() || !reader.is_empty() {
        if flags.debug() {
            log::debug!(
                "{thread_name}/File Open:{}/Queue Empty:{}",
                flags.is_open(),
                reader.is_empty()
            );
        }

        let frame = match reader.pop(WRITER_IDLE_INTERVAL) {
            Popped::Frame(frame) => frame,
            Popped::Empty => continue,
            Popped::Closed => break,
        };

        if frame.is_empty() {
            skipped += 1;
            continue;
        }

        match file.encode(&frame) {
            Ok(()) => written += 1,
            Err(e) => {
                failed += 1;
                if failed == 1 {
                    log::warn!("Dropping frame {} for {}: {e}", frame.index(), file.path().display());
                } else {
                    log::debug!("Dropping frame {}: {e}", frame.index());
                }
            }
        }
    }

    log::debug!("{thread_name} finished: {written} written, {failed} failed, {skipped} skipped");
    flags.set_state(WriterState::Terminated);

    WriterOutcome {
        file,
        written,
        failed,
        skipped,
    }
}
