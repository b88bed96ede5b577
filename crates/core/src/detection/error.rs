use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(PathBuf),
    #[error("failed to load model {path}: {reason}")]
    ModelLoad { path: PathBuf, reason: String },
    #[error("unexpected model output shape {0:?}")]
    OutputShape(Vec<usize>),
    #[error("inference failed: {0}")]
    Inference(String),
}
