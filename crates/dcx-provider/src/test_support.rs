//! Test support utilities for dcx-provider
//!
//! Provides MockRunner, a scripted [`ProcessRunner`] that records every
//! command it is asked to run, so recipe and orchestrator logic can be tested
//! without a docker daemon.

use crate::*;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Scripted reply for commands matching a pattern
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockResponse {
    pub exit_code: i32,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    /// Sleep before replying
    pub delay: Option<Duration>,
}

impl MockResponse {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn stdout(lines: &[&str]) -> Self {
        Self {
            stdout: lines.iter().map(|l| l.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn fail(exit_code: i32, stderr: &str) -> Self {
        Self {
            exit_code,
            stderr: vec![stderr.to_string()],
            ..Self::default()
        }
    }

    /// A reply that never arrives within a test's lifetime
    pub fn hang() -> Self {
        Self::default().after(Duration::from_secs(3600))
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[derive(Debug, Clone)]
struct MockRule {
    pattern: String,
    response: MockResponse,
    once: bool,
}

/// Scripted process runner for testing
///
/// Responses are chosen by substring match on the command line; the most
/// recently registered matching rule wins. Unmatched commands succeed with
/// no output.
#[derive(Clone, Default)]
pub struct MockRunner {
    pub calls: Arc<Mutex<Vec<ProcessSpec>>>,
    rules: Arc<Mutex<Vec<MockRule>>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `response` to every command containing `pattern`
    pub fn respond(&self, pattern: &str, response: MockResponse) -> &Self {
        self.push_rule(pattern, response, false)
    }

    /// Reply with `response` to the next command containing `pattern` only
    pub fn respond_once(&self, pattern: &str, response: MockResponse) -> &Self {
        self.push_rule(pattern, response, true)
    }

    fn push_rule(&self, pattern: &str, response: MockResponse, once: bool) -> &Self {
        self.rules.lock().unwrap().push(MockRule {
            pattern: pattern.to_string(),
            response,
            once,
        });
        self
    }

    fn record(&self, spec: &ProcessSpec) -> MockResponse {
        self.calls.lock().unwrap().push(spec.clone());

        let line = spec.command_line();
        let mut rules = self.rules.lock().unwrap();
        let Some(pos) = rules.iter().rposition(|r| line.contains(&r.pattern)) else {
            return MockResponse::ok();
        };
        if rules[pos].once {
            rules.remove(pos).response
        } else {
            rules[pos].response.clone()
        }
    }

    /// Get all recorded calls
    pub fn get_calls(&self) -> Vec<ProcessSpec> {
        self.calls.lock().unwrap().clone()
    }

    /// Recorded command lines, in call order
    pub fn command_lines(&self) -> Vec<String> {
        self.get_calls().iter().map(ProcessSpec::command_line).collect()
    }

    /// Check if any recorded command line contains `pattern`
    pub fn was_called(&self, pattern: &str) -> bool {
        self.command_lines().iter().any(|l| l.contains(pattern))
    }

    /// Index of the first recorded command line containing `pattern`
    pub fn position(&self, pattern: &str) -> Option<usize> {
        self.command_lines().iter().position(|l| l.contains(pattern))
    }

    /// The first recorded call whose command line contains `pattern`
    pub fn find_call(&self, pattern: &str) -> Option<ProcessSpec> {
        self.get_calls()
            .into_iter()
            .find(|c| c.command_line().contains(pattern))
    }
}

fn replay(response: &MockResponse, on_line: &Option<LineCallback>) -> ProcessOutput {
    if let Some(callback) = on_line {
        for line in &response.stdout {
            callback(&OutputLine {
                stream: OutputStream::Stdout,
                line: line.clone(),
            });
        }
        for line in &response.stderr {
            callback(&OutputLine {
                stream: OutputStream::Stderr,
                line: line.clone(),
            });
        }
    }
    ProcessOutput {
        exit_code: response.exit_code,
        stdout: response.stdout.clone(),
        stderr: response.stderr.clone(),
    }
}

#[async_trait]
impl ProcessRunner for MockRunner {
    async fn run(&self, spec: &ProcessSpec, on_line: Option<LineCallback>) -> Result<ProcessOutput> {
        let response = self.record(spec);
        if let Some(delay) = response.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(replay(&response, &on_line))
    }

    async fn spawn(
        &self,
        spec: &ProcessSpec,
        on_line: Option<LineCallback>,
    ) -> Result<Box<dyn RunningProcess>> {
        let response = self.record(spec);
        Ok(Box::new(MockProcess {
            response,
            on_line,
            killed: false,
        }))
    }
}

/// Process handle returned by [`MockRunner::spawn`]
pub struct MockProcess {
    response: MockResponse,
    on_line: Option<LineCallback>,
    killed: bool,
}

#[async_trait]
impl RunningProcess for MockProcess {
    fn id(&self) -> Option<u32> {
        if self.killed {
            None
        } else {
            Some(4242)
        }
    }

    async fn wait(&mut self) -> Result<ProcessOutput> {
        if self.killed {
            return Ok(ProcessOutput {
                exit_code: -1,
                ..ProcessOutput::default()
            });
        }
        if let Some(delay) = self.response.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(replay(&self.response, &self.on_line))
    }

    async fn kill(&mut self) -> Result<()> {
        self.killed = true;
        Ok(())
    }
}
