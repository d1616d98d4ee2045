//! Test support utilities for dcx-core
//!
//! Scripted runners and workspaces for exercising recipes and the
//! orchestrator without a docker daemon.

use crate::{InstanceConfig, LogSink};
use dcx_provider::test_support::{MockResponse, MockRunner};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Id `docker run -d` reports in [`container_runner`]
pub const CONTAINER_ID: &str = "c0ffee0123456789";

/// passwd entry the probe sees in [`container_runner`]
pub const PASSWD_ENTRY: &str = "vscode:x:1000:1000:,,,:/home/vscode:/bin/bash";

/// A runner that behaves like a healthy docker: `run -d` creates
/// [`CONTAINER_ID`], the probe finds `vscode`, and everything else succeeds
pub fn container_runner() -> MockRunner {
    let runner = MockRunner::new();
    runner
        .respond("run -d", MockResponse::stdout(&[CONTAINER_ID]))
        .respond("getent passwd", MockResponse::stdout(&[PASSWD_ENTRY]))
        .respond(
            "-lic env",
            MockResponse::stdout(&[
                "PATH=/usr/local/bin:/usr/bin:/bin",
                "HOME=/home/vscode",
                "USER=vscode",
            ]),
        );
    runner
}

/// A temporary workspace and an instance config pointing at it
pub fn workspace() -> (TempDir, InstanceConfig) {
    let dir = tempfile::tempdir().expect("create temp workspace");
    let ic = InstanceConfig::new(
        dir.path(),
        dir.path().join(".devcontainer").join("devcontainer.json"),
    )
    .with_state_dir(dir.path().join("state"));
    (dir, ic)
}

/// A log sink that records every message
pub fn capture_log() -> (LogSink, Arc<Mutex<Vec<String>>>) {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink_lines = Arc::clone(&lines);
    let sink = LogSink::new(move |message| {
        if let Ok(mut lines) = sink_lines.lock() {
            lines.push(message.to_string());
        }
    });
    (sink, lines)
}
