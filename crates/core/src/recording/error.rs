use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("failed to create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to create output file {path}: {source}")]
    CreateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("output file already exists: {0}")]
    PathExists(PathBuf),
    #[error("failed to spawn writer thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("writer thread panicked while recording {0}")]
    WriterPanicked(PathBuf),
    #[error("failed to finalize {path}: {reason}")]
    Finalize { path: PathBuf, reason: String },
}
