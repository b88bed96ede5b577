use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::recording::error::RecorderError;
use crate::shared::frame::Frame;
use crate::video::domain::video_encoder::{EncoderSettings, VideoEncoder};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FileState {
    Created,
    Open,
    Closed,
}

/// Creates the parent directories and a new, empty file at `path`.
///
/// Never truncates: an occupied `path` is [`RecorderError::PathExists`].
pub fn create_output(path: &Path) -> Result<File, RecorderError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| RecorderError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|source| match source.kind() {
            ErrorKind::AlreadyExists => RecorderError::PathExists(path.to_path_buf()),
            _ => RecorderError::CreateFile {
                path: path.to_path_buf(),
                source,
            },
        })
}

/// One output video file and the encoder bound to it.
///
/// Lifecycle: `create` reserves the path on disk, `open` binds an encoder,
/// `finalize` releases it. The handle moves from open to closed exactly
/// once and is never reopened.
pub struct OutputFile {
    path: PathBuf,
    encoder: Option<Box<dyn VideoEncoder>>,
    state: FileState,
}

impl std::fmt::Debug for OutputFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputFile")
            .field("path", &self.path)
            .field("state", &self.state)
            .finish()
    }
}

impl OutputFile {
    /// Creates the parent directories and an empty file at `path`.
    ///
    /// Fails with [`RecorderError::PathExists`] if something already
    /// occupies `path`.
    pub fn create(path: &Path) -> Result<Self, RecorderError> {
        create_output(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            encoder: None,
            state: FileState::Created,
        })
    }

    /// Binds `encoder` to this file. Returns whether the file is now open;
    /// a failed bind is logged and leaves the handle closed.
    pub fn open(&mut self, mut encoder: Box<dyn VideoEncoder>, settings: &EncoderSettings) -> bool {
        if self.state != FileState::Created {
            return self.is_open();
        }

        match encoder.open(&self.path, settings) {
            Ok(()) => {
                self.encoder = Some(encoder);
                self.state = FileState::Open;
                true
            }
            Err(e) => {
                log::error!("Could not open encoder for {}: {e}", self.path.display());
                self.state = FileState::Closed;
                false
            }
        }
    }

    /// Forwards one frame to the encoder. The frame must already have the
    /// size given to `open`.
    pub fn encode(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        let encoder = self.encoder.as_mut().ok_or("output file is not open")?;
        encoder.write(frame)
    }

    /// Flushes and releases the encoder. Idempotent.
    pub fn finalize(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.state = FileState::Closed;
        match self.encoder.take() {
            Some(mut encoder) => encoder.close(),
            None => Ok(()),
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == FileState::Open
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for OutputFile {
    fn drop(&mut self) {
        if let Err(e) = self.finalize() {
            log::warn!("Finalizing {} on drop failed: {e}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::domain::video_encoder::Container;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Calls {
        opened: usize,
        written: Vec<usize>,
        closed: usize,
    }

    struct StubEncoder {
        calls: Arc<Mutex<Calls>>,
        fail_open: bool,
    }

    impl VideoEncoder for StubEncoder {
        fn open(
            &mut self,
            _path: &Path,
            _settings: &EncoderSettings,
        ) -> Result<(), Box<dyn std::error::Error>> {
            if self.fail_open {
                return Err("codec unavailable".into());
            }
            self.calls.lock().unwrap().opened += 1;
            Ok(())
        }

        fn write(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
            self.calls.lock().unwrap().written.push(frame.index());
            Ok(())
        }

        fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
            self.calls.lock().unwrap().closed += 1;
            Ok(())
        }
    }

    fn stub(calls: &Arc<Mutex<Calls>>, fail_open: bool) -> Box<dyn VideoEncoder> {
        Box::new(StubEncoder {
            calls: calls.clone(),
            fail_open,
        })
    }

    fn settings() -> EncoderSettings {
        EncoderSettings {
            width: 4,
            height: 4,
            fps: 30.0,
            container: Container::WebM,
        }
    }

    #[test]
    fn test_create_makes_parent_dirs_and_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("clip.webm");

        let file = OutputFile::create(&path).unwrap();
        assert_eq!(file.path(), path.as_path());
        assert!(!file.is_open());
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn test_create_refuses_existing_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.webm");
        fs::write(&path, b"keep me").unwrap();

        let err = OutputFile::create(&path).unwrap_err();
        assert!(matches!(err, RecorderError::PathExists(p) if p == path));
        assert_eq!(fs::read(&path).unwrap(), b"keep me");
    }

    #[test]
    fn test_create_under_a_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        fs::write(&blocker, b"").unwrap();

        let err = OutputFile::create(&blocker.join("clip.webm")).unwrap_err();
        assert!(matches!(err, RecorderError::CreateDir { .. }));
    }

    #[test]
    fn test_open_encode_finalize() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(Mutex::new(Calls::default()));
        let mut file = OutputFile::create(&dir.path().join("clip.webm")).unwrap();

        assert!(file.open(stub(&calls, false), &settings()));
        assert!(file.is_open());
        file.encode(&Frame::filled(4, 4, [0, 0, 0], 3)).unwrap();
        file.finalize().unwrap();
        file.finalize().unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls.opened, 1);
        assert_eq!(calls.written, vec![3]);
        assert_eq!(calls.closed, 1);
    }

    #[test]
    fn test_failed_open_leaves_file_closed() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(Mutex::new(Calls::default()));
        let mut file = OutputFile::create(&dir.path().join("clip.webm")).unwrap();

        assert!(!file.open(stub(&calls, true), &settings()));
        assert!(!file.is_open());
        assert!(file.encode(&Frame::filled(4, 4, [0, 0, 0], 0)).is_err());
    }

    #[test]
    fn test_never_reopened() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(Mutex::new(Calls::default()));
        let mut file = OutputFile::create(&dir.path().join("clip.webm")).unwrap();

        assert!(file.open(stub(&calls, false), &settings()));
        file.finalize().unwrap();
        assert!(!file.open(stub(&calls, false), &settings()));
        assert_eq!(calls.lock().unwrap().opened, 1);
    }

    #[test]
    fn test_drop_finalizes() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(Mutex::new(Calls::default()));
        {
            let mut file = OutputFile::create(&dir.path().join("clip.webm")).unwrap();
            file.open(stub(&calls, false), &settings());
        }
        assert_eq!(calls.lock().unwrap().closed, 1);
    }
}
