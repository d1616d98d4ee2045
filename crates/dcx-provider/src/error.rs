//! Error types for process runners

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Failed to start {program}: {source}")]
    SpawnError {
        program: String,
        source: std::io::Error,
    },

    #[error("Process failed: {0}")]
    ProcessFailed(String),

    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    #[error("Exec failed: {0}")]
    ExecError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, ProviderError>;
