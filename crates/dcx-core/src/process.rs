//! Launching processes inside the running container
//!
//! Environment precedence, lowest to highest:
//! 1. the container's own environment (as probed)
//! 2. `containerEnv`
//! 3. host variables the caller forwards
//! 4. `remoteEnv`, where `null` removes the variable and `${containerEnv:NAME}`
//!    resolves against the container's environment

use crate::{CoreError, Result, RunningInstance};
use crate::running::ContainerSnapshot;
use dcx_config::{container_env_resolvers, Transform};
use dcx_provider::{
    LineCallback, ProcessOutput, ProcessRunner, ProcessSpec, RunningProcess, TokioRunner,
};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;

/// Effective environment for a process in the container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayeredEnv {
    pub vars: IndexMap<String, String>,
    /// Variables removed by a `null` remoteEnv entry
    pub unset: Vec<String>,
}

/// Merge the environment layers of `snapshot`
pub fn layered_env(snapshot: &ContainerSnapshot) -> LayeredEnv {
    let mut vars = snapshot.baked_env.clone();
    for (key, value) in snapshot.container_env.iter().chain(&snapshot.forwarded_env) {
        vars.insert(key.clone(), value.clone());
    }

    // remoteEnv sees the container as it is before remoteEnv applies
    let container_view: HashMap<String, String> = snapshot
        .baked_env
        .iter()
        .chain(&snapshot.container_env)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let transform = Transform::new(snapshot.resolvers.clone())
        .then(container_env_resolvers(container_view));

    let mut unset = Vec::new();
    for (key, value) in &snapshot.remote_env {
        match value {
            Some(value) => {
                vars.insert(key.clone(), transform.apply(value));
                unset.retain(|k| k != key);
            }
            None => {
                vars.shift_remove(key);
                if !unset.contains(key) {
                    unset.push(key.clone());
                }
            }
        }
    }

    LayeredEnv { vars, unset }
}

/// Per-process options for [`ProcessInterfaceFactory`]
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Working directory; defaults to the container workspace folder
    pub workdir: Option<String>,
    /// Overrides the snapshot's user
    pub user: Option<String>,
    /// Variables applied on top of the layered environment
    pub env: Vec<(String, String)>,
    /// Attach stdin and the terminal
    pub interactive: bool,
    pub tty: bool,
}

/// Creates processes that run inside the container through `docker exec`
#[derive(Clone)]
pub struct ProcessInterfaceFactory {
    running: RunningInstance,
    runner: Arc<dyn ProcessRunner>,
}

/// Factory for `running` using the local process runner
pub fn create_process_interface(running: RunningInstance) -> ProcessInterfaceFactory {
    ProcessInterfaceFactory::new(running, Arc::new(TokioRunner::new()))
}

impl ProcessInterfaceFactory {
    pub fn new(running: RunningInstance, runner: Arc<dyn ProcessRunner>) -> Self {
        Self { running, runner }
    }

    pub fn running(&self) -> &RunningInstance {
        &self.running
    }

    /// The `docker exec` command line that runs `argv` in the container.
    ///
    /// Only variables that differ from what a bare `docker exec` starts with
    /// are passed with `-e`, so variables the user's profile adds still reach
    /// the process; removed variables go through `env -u`.
    pub fn command_spec(&self, argv: &[String], options: &ExecOptions) -> Result<ProcessSpec> {
        let snapshot = self.running.snapshot();
        let container_id = snapshot
            .container_id
            .clone()
            .ok_or_else(|| CoreError::ExecStart("no running container".to_string()))?;
        if argv.is_empty() {
            return Err(CoreError::ExecStart("empty command".to_string()));
        }

        let mut env = layered_env(&snapshot);
        for (key, value) in &options.env {
            env.vars.insert(key.clone(), value.clone());
            env.unset.retain(|k| k != key);
        }

        let mut spec = ProcessSpec::new(&snapshot.docker_cli)
            .arg("exec")
            .interactive(options.interactive);
        if options.interactive {
            spec = spec.arg("-i");
        }
        if options.tty {
            spec = spec.arg("-t");
        }
        if let Some(user) = options.user.as_ref().or(snapshot.user.as_ref()) {
            spec = spec.args(["-u", user.as_str()]);
        }
        let workdir = options
            .workdir
            .as_deref()
            .unwrap_or(snapshot.workspace_folder.as_str());
        if !workdir.is_empty() {
            spec = spec.args(["-w", workdir]);
        }
        for (key, value) in &env.vars {
            if snapshot.exec_env.get(key) != Some(value) {
                spec = spec.args(["-e".to_string(), format!("{}={}", key, value)]);
            }
        }
        spec = spec.arg(container_id.0.as_str());
        if !env.unset.is_empty() {
            spec = spec.arg("env");
            for key in &env.unset {
                spec = spec.args(["-u", key.as_str()]);
            }
        }
        Ok(spec.args(argv.iter().cloned()))
    }

    /// Run `argv` in the container to completion
    pub async fn run(
        &self,
        argv: &[String],
        options: &ExecOptions,
        on_line: Option<LineCallback>,
    ) -> Result<ProcessOutput> {
        let spec = self.command_spec(argv, options)?;
        let output = self.runner.run(&spec, on_line).await?;
        check_exec_start(&output)?;
        Ok(output)
    }

    /// Start `argv` in the container.
    ///
    /// Killing the returned process stops the local `docker exec` client
    /// only; the container keeps running.
    pub async fn spawn(
        &self,
        argv: &[String],
        options: &ExecOptions,
        on_line: Option<LineCallback>,
    ) -> Result<Box<dyn RunningProcess>> {
        let spec = self.command_spec(argv, options)?;
        Ok(self.runner.spawn(&spec, on_line).await?)
    }
}

/// docker reports a vanished container as an ordinary non-zero exit
fn check_exec_start(output: &ProcessOutput) -> Result<()> {
    if output.success() {
        return Ok(());
    }
    let vanished = output
        .stderr
        .iter()
        .find(|l| l.contains("No such container") || l.contains("is not running"));
    match vanished {
        Some(line) => Err(CoreError::ExecStart(line.clone())),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcx_config::Resolvers;
    use dcx_provider::test_support::{MockResponse, MockRunner};
    use dcx_provider::ContainerId;

    fn snapshot() -> ContainerSnapshot {
        let mut s = ContainerSnapshot {
            container_id: Some(ContainerId::new("abc123")),
            user: Some("vscode".to_string()),
            workspace_folder: "/workspaces/proj".to_string(),
            docker_cli: "docker".to_string(),
            ..Default::default()
        };
        s.baked_env.insert("CONTAINER_VAR".into(), "container_value".into());
        s.baked_env.insert("PATH".into(), "/usr/bin".into());
        s.baked_env.insert("CONTAINER_UNSET_ME".into(), "present".into());
        s.forwarded_env
            .insert("CONTAINER_VAR".into(), "changed_container_value".into());
        s.remote_env.insert("TEST_VAR".into(), Some("test_value".into()));
        s.remote_env.insert("CONTAINER_UNSET_ME".into(), None);
        s.exec_env = s.baked_env.clone();
        s
    }

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn test_env_layering() {
        let env = layered_env(&snapshot());
        assert_eq!(env.vars["CONTAINER_VAR"], "changed_container_value");
        assert_eq!(env.vars["TEST_VAR"], "test_value");
        assert_eq!(env.vars["PATH"], "/usr/bin");
        assert!(!env.vars.contains_key("CONTAINER_UNSET_ME"));
        assert_eq!(env.unset, vec!["CONTAINER_UNSET_ME"]);
    }

    #[test]
    fn test_container_env_over_baked_and_remote_over_forwarded() {
        let mut s = snapshot();
        s.container_env.insert("PATH".into(), "/opt/bin:/usr/bin".into());
        s.forwarded_env.insert("TEST_VAR".into(), "from_host".into());
        let env = layered_env(&s);
        assert_eq!(env.vars["PATH"], "/opt/bin:/usr/bin");
        assert_eq!(env.vars["TEST_VAR"], "test_value");
    }

    #[test]
    fn test_remote_env_resolves_against_container() {
        let mut s = snapshot();
        s.remote_env.insert(
            "PATH".into(),
            Some("${containerEnv:PATH}:/home/vscode/.local/bin".into()),
        );
        s.remote_env
            .insert("MISSING".into(), Some("${containerEnv:NOPE:fallback}".into()));
        s.resolvers = Resolvers::new().with_value("extra", "x");
        s.remote_env.insert("EXTRA".into(), Some("${extra}".into()));

        let env = layered_env(&s);
        assert_eq!(env.vars["PATH"], "/usr/bin:/home/vscode/.local/bin");
        assert_eq!(env.vars["MISSING"], "fallback");
        assert_eq!(env.vars["EXTRA"], "x");
    }

    #[test]
    fn test_command_spec() {
        let factory = ProcessInterfaceFactory::new(
            RunningInstance::new(snapshot()),
            Arc::new(MockRunner::new()),
        );
        let spec = factory
            .command_spec(&argv(&["ls", "-la"]), &ExecOptions::default())
            .unwrap();
        assert_eq!(
            spec.command_line(),
            "docker exec -u vscode -w /workspaces/proj \
             -e CONTAINER_VAR=changed_container_value -e TEST_VAR=test_value \
             abc123 env -u CONTAINER_UNSET_ME ls -la"
        );
    }

    #[test]
    fn test_command_spec_passes_profile_env() {
        let mut s = snapshot();
        s.baked_env
            .insert("PATH".into(), "/home/vscode/.cargo/bin:/usr/bin".into());
        s.baked_env.insert("NVM_DIR".into(), "/home/vscode/.nvm".into());
        let factory =
            ProcessInterfaceFactory::new(RunningInstance::new(s), Arc::new(MockRunner::new()));

        let line = factory
            .command_spec(&argv(&["cargo"]), &ExecOptions::default())
            .unwrap()
            .command_line();
        assert!(line.contains("-e PATH=/home/vscode/.cargo/bin:/usr/bin"));
        assert!(line.contains("-e NVM_DIR=/home/vscode/.nvm"));
        assert!(!line.contains("-e CONTAINER_VAR=container_value"));
    }

    #[test]
    fn test_command_spec_options() {
        let factory = ProcessInterfaceFactory::new(
            RunningInstance::new(snapshot()),
            Arc::new(MockRunner::new()),
        );
        let options = ExecOptions {
            workdir: Some("/tmp".to_string()),
            user: Some("root".to_string()),
            env: vec![("CONTAINER_UNSET_ME".to_string(), "back".to_string())],
            interactive: true,
            tty: true,
        };
        let spec = factory.command_spec(&argv(&["bash"]), &options).unwrap();
        let line = spec.command_line();
        assert!(line.starts_with("docker exec -i -t -u root -w /tmp"));
        assert!(line.contains("-e CONTAINER_UNSET_ME=back"));
        assert!(!line.contains("env -u"));
        assert!(spec.interactive);
    }

    #[tokio::test]
    async fn test_missing_container_is_exec_start_error() {
        let factory = ProcessInterfaceFactory::new(
            RunningInstance::default(),
            Arc::new(MockRunner::new()),
        );
        let err = factory
            .run(&argv(&["true"]), &ExecOptions::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ExecStart(_)));
    }

    #[tokio::test]
    async fn test_vanished_container_is_exec_start_error() {
        let runner = MockRunner::new();
        runner.respond(
            "docker exec",
            MockResponse::fail(1, "Error response from daemon: No such container: abc123"),
        );
        let factory =
            ProcessInterfaceFactory::new(RunningInstance::new(snapshot()), Arc::new(runner));
        let err = factory
            .run(&argv(&["true"]), &ExecOptions::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ExecStart(_)));
    }

    #[tokio::test]
    async fn test_command_exit_code_is_returned() {
        let runner = MockRunner::new();
        runner.respond("false", MockResponse::fail(1, ""));
        let factory =
            ProcessInterfaceFactory::new(RunningInstance::new(snapshot()), Arc::new(runner));
        let output = factory
            .run(&argv(&["false"]), &ExecOptions::default(), None)
            .await
            .unwrap();
        assert_eq!(output.exit_code, 1);
    }
}
