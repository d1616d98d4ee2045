//! Error types for dcx-core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] dcx_config::ConfigError),

    #[error("Provider error: {0}")]
    Provider(#[from] dcx_provider::ProviderError),

    #[error("devcontainer.json has no image, Dockerfile or compose file")]
    NoContainerKind,

    #[error("{label} exited with code {exit_code}")]
    CommandFailed { label: String, exit_code: i32 },

    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    #[error("Failed to start process in container: {0}")]
    ExecStart(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Recipe task aborted unexpectedly: {0}")]
    TaskAborted(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
