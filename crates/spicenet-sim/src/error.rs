//! Error types for spicenet-sim.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("simulator executable not found: {0}")]
    NotFound(String),

    #[error("simulator run failed: {0}")]
    ExecutionFailed(String),

    #[error("simulator timed out after {0}s")]
    Timeout(u64),

    #[error("temp file error: {0}")]
    TempFile(String),

    #[error("rawfile decode error: {0}")]
    Rawfile(String),
}

pub type Result<T> = std::result::Result<T, Error>;
