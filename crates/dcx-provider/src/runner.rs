//! Process runner backed by `tokio::process`
//!
//! Both output pipes are read concurrently, line by line, so a chatty stream
//! can never fill its pipe buffer and stall the child. Children are spawned
//! with `kill_on_drop`, so dropping an in-flight `run` future (for example when
//! the scheduler aborts a task) terminates the subprocess.

use crate::{
    LineCallback, OutputLine, OutputStream, ProcessOutput, ProcessRunner, ProcessSpec,
    ProviderError, Result, RunningProcess,
};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::process::Stdio;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;

/// Runs processes on the local host
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioRunner;

impl TokioRunner {
    pub fn new() -> Self {
        Self
    }

    fn build_command(spec: &ProcessSpec) -> Command {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        if let Some(ref cwd) = spec.cwd {
            cmd.current_dir(cwd);
        }
        cmd.envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        cmd.kill_on_drop(true);

        if spec.interactive {
            cmd.stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit());
        } else {
            cmd.stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());
        }
        cmd
    }

    fn spawn_child(spec: &ProcessSpec) -> Result<Child> {
        tracing::debug!("Running: {}", spec);
        Self::build_command(spec)
            .spawn()
            .map_err(|e| ProviderError::SpawnError {
                program: spec.program.clone(),
                source: e,
            })
    }
}

fn emit(on_line: &Option<LineCallback>, stream: OutputStream, line: &str) {
    if let Some(callback) = on_line {
        callback(&OutputLine {
            stream,
            line: line.to_string(),
        });
    }
}

/// Next `\n`-terminated line as lossy UTF-8; `None` at end of stream.
///
/// Invalid UTF-8 never ends the stream: the bytes are replaced and reading
/// continues, so the pipe keeps draining until the child closes it.
async fn next_line<R: AsyncBufRead + Unpin>(reader: &mut R, buf: &mut Vec<u8>) -> Option<String> {
    loop {
        buf.clear();
        match reader.read_until(b'\n', buf).await {
            Ok(0) => return None,
            Ok(_) => {
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                    if buf.last() == Some(&b'\r') {
                        buf.pop();
                    }
                }
                return Some(String::from_utf8_lossy(buf).into_owned());
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::warn!("Failed to read process output: {}", e);
                return None;
            }
        }
    }
}

/// Read stdout and stderr until both close, returning the collected lines
async fn pump_lines(
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    on_line: Option<LineCallback>,
) -> (Vec<String>, Vec<String>) {
    let mut stdout_reader = stdout.map(BufReader::new);
    let mut stderr_reader = stderr.map(BufReader::new);
    let mut stdout_buf = Vec::new();
    let mut stderr_buf = Vec::new();
    let mut out = Vec::new();
    let mut err = Vec::new();

    while stdout_reader.is_some() || stderr_reader.is_some() {
        tokio::select! {
            line = async {
                match stdout_reader.as_mut() {
                    Some(reader) => next_line(reader, &mut stdout_buf).await,
                    None => std::future::pending().await,
                }
            } => match line {
                Some(line) => {
                    emit(&on_line, OutputStream::Stdout, &line);
                    out.push(line);
                }
                None => stdout_reader = None,
            },
            line = async {
                match stderr_reader.as_mut() {
                    Some(reader) => next_line(reader, &mut stderr_buf).await,
                    None => std::future::pending().await,
                }
            } => match line {
                Some(line) => {
                    emit(&on_line, OutputStream::Stderr, &line);
                    err.push(line);
                }
                None => stderr_reader = None,
            },
        }
    }

    (out, err)
}

fn exit_code(status: std::process::ExitStatus) -> i32 {
    // killed by a signal
    status.code().unwrap_or(-1)
}

#[async_trait]
impl ProcessRunner for TokioRunner {
    async fn run(&self, spec: &ProcessSpec, on_line: Option<LineCallback>) -> Result<ProcessOutput> {
        let mut child = Self::spawn_child(spec)?;
        let (stdout, stderr) = pump_lines(child.stdout.take(), child.stderr.take(), on_line).await;
        let status = child.wait().await?;

        Ok(ProcessOutput {
            exit_code: exit_code(status),
            stdout,
            stderr,
        })
    }

    async fn spawn(
        &self,
        spec: &ProcessSpec,
        on_line: Option<LineCallback>,
    ) -> Result<Box<dyn RunningProcess>> {
        let mut child = Self::spawn_child(spec)?;
        let pump = if spec.interactive {
            None
        } else {
            let stdout = child.stdout.take();
            let stderr = child.stderr.take();
            Some(tokio::spawn(pump_lines(stdout, stderr, on_line)))
        };
        Ok(Box::new(TokioProcess { child, pump }))
    }
}

/// A child started with [`TokioRunner::spawn`]
pub struct TokioProcess {
    child: Child,
    pump: Option<JoinHandle<(Vec<String>, Vec<String>)>>,
}

#[async_trait]
impl RunningProcess for TokioProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    async fn wait(&mut self) -> Result<ProcessOutput> {
        let status = self.child.wait().await?;
        let (stdout, stderr) = match self.pump.take() {
            Some(handle) => handle.await.unwrap_or_default(),
            None => Default::default(),
        };
        Ok(ProcessOutput {
            exit_code: exit_code(status),
            stdout,
            stderr,
        })
    }

    async fn kill(&mut self) -> Result<()> {
        self.child.kill().await?;
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn sh(script: &str) -> ProcessSpec {
        ProcessSpec::new("sh").args(["-c", script])
    }

    #[tokio::test]
    async fn test_run_collects_lines_from_both_streams() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: LineCallback = Arc::new(move |line: &OutputLine| {
            sink.lock().unwrap().push(line.clone());
        });

        let output = TokioRunner
            .run(&sh("echo one; echo two >&2; printf three"), Some(callback))
            .await
            .unwrap();

        assert!(output.success());
        assert_eq!(output.stdout, vec!["one", "three"]);
        assert_eq!(output.stderr, vec!["two"]);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen.contains(&OutputLine {
            stream: OutputStream::Stderr,
            line: "two".to_string(),
        }));
    }

    #[tokio::test]
    async fn test_run_keeps_reading_after_invalid_utf8() {
        let output = TokioRunner
            .run(
                &sh("printf 'caf\\351\\n'; sleep 0.2; echo after; printf 'crlf\\r\\n'"),
                None,
            )
            .await
            .unwrap();

        assert!(output.success());
        assert_eq!(output.stdout, vec!["caf\u{FFFD}", "after", "crlf"]);
    }

    #[tokio::test]
    async fn test_run_reports_exit_code() {
        let output = TokioRunner.run(&sh("exit 3"), None).await.unwrap();
        assert_eq!(output.exit_code, 3);
        assert!(!output.success());
    }

    #[tokio::test]
    async fn test_run_applies_cwd_and_env() {
        let tmp = std::env::temp_dir();
        let spec = sh("pwd; echo $DCX_RUNNER_TEST")
            .cwd(&tmp)
            .env("DCX_RUNNER_TEST", "value");
        let output = TokioRunner.run(&spec, None).await.unwrap();
        let expected = std::fs::canonicalize(&tmp).unwrap();
        assert_eq!(
            std::fs::canonicalize(&output.stdout[0]).unwrap(),
            expected
        );
        assert_eq!(output.stdout[1], "value");
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let err = TokioRunner
            .run(&ProcessSpec::new("dcx-definitely-not-a-program"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::SpawnError { .. }));
    }

    #[tokio::test]
    async fn test_spawn_and_kill() {
        let mut process = TokioRunner.spawn(&sh("sleep 30"), None).await.unwrap();
        assert!(process.id().is_some());
        process.kill().await.unwrap();
        let output = process.wait().await.unwrap();
        assert!(!output.success());
    }

    #[tokio::test]
    async fn test_spawn_and_wait_collects_output() {
        let mut process = TokioRunner.spawn(&sh("echo done"), None).await.unwrap();
        let output = process.wait().await.unwrap();
        assert_eq!(output.stdout, vec!["done"]);
    }
}
