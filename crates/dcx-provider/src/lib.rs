//! Process runner trait and implementations for dcx
//!
//! The lifecycle engine only ever talks to `docker`/`docker compose` through
//! their command lines. This crate provides the seam: a [`ProcessRunner`]
//! that launches a [`ProcessSpec`] and reports output line by line.

mod error;
mod runner;
mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use error::*;
pub use runner::*;
pub use types::*;

use async_trait::async_trait;

/// Trait for launching host processes
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run a process to completion, streaming its output lines to `on_line`
    async fn run(&self, spec: &ProcessSpec, on_line: Option<LineCallback>) -> Result<ProcessOutput>;

    /// Start a process and return a handle to wait on or kill it
    async fn spawn(
        &self,
        spec: &ProcessSpec,
        on_line: Option<LineCallback>,
    ) -> Result<Box<dyn RunningProcess>>;

    /// Like [`ProcessRunner::run`] but a non-zero exit is an error
    async fn run_checked(
        &self,
        spec: &ProcessSpec,
        on_line: Option<LineCallback>,
    ) -> Result<ProcessOutput> {
        let output = self.run(spec, on_line).await?;
        if !output.success() {
            let detail = output.stderr.last().cloned().unwrap_or_default();
            return Err(ProviderError::ProcessFailed(format!(
                "`{}` exited with code {}: {}",
                spec, output.exit_code, detail
            )));
        }
        Ok(output)
    }
}

/// A started process
#[async_trait]
pub trait RunningProcess: Send {
    /// OS process id, if still known
    fn id(&self) -> Option<u32>;

    /// Wait for the process to exit
    async fn wait(&mut self) -> Result<ProcessOutput>;

    /// Kill the process; only this process is affected
    async fn kill(&mut self) -> Result<()>;
}
