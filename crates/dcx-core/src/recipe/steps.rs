//! Execution of individual recipe tasks

use super::{DockerArg, ProbeStep, Task};
use crate::process::{ExecOptions, ProcessInterfaceFactory};
use crate::{CoreError, LogSink, Result, RunningInstance};
use dcx_provider::{ContainerId, ProcessOutput, ProcessRunner, ProcessSpec};
use indexmap::IndexMap;
use std::sync::Arc;

/// Shared inputs of every task in one recipe run
#[derive(Clone)]
pub(crate) struct TaskContext {
    pub runner: Arc<dyn ProcessRunner>,
    pub running: RunningInstance,
    pub log: LogSink,
}

fn check(label: &str, output: &ProcessOutput) -> Result<()> {
    if output.success() {
        Ok(())
    } else {
        Err(CoreError::CommandFailed {
            label: label.to_string(),
            exit_code: output.exit_code,
        })
    }
}

impl Task {
    pub(crate) async fn execute(&self, label: &str, ctx: &TaskContext) -> Result<()> {
        match self {
            Task::Host { spec, tag } => {
                let output = ctx.runner.run(spec, Some(ctx.log.tagged(tag))).await?;
                check(label, &output)
            }
            Task::Docker {
                program,
                args,
                tag,
                skip_without_container,
            } => {
                let container = ctx.running.container_id();
                let needs_container = args.contains(&DockerArg::ContainerId);
                let id = match (container, needs_container) {
                    (Some(id), _) => id.0,
                    (None, false) => String::new(),
                    (None, true) if *skip_without_container => {
                        ctx.log.log(&format!("[{}] No container found, nothing to do", tag));
                        return Ok(());
                    }
                    (None, true) => {
                        return Err(CoreError::ContainerNotFound(format!(
                            "{} needs a container",
                            label
                        )))
                    }
                };
                let spec = ProcessSpec::new(program).args(args.iter().map(|arg| match arg {
                    DockerArg::Literal(s) => s.clone(),
                    DockerArg::ContainerId => id.clone(),
                }));
                let output = ctx.runner.run(&spec, Some(ctx.log.tagged(tag))).await?;
                check(label, &output)
            }
            Task::EnsureContainer {
                docker_cli,
                label_filters,
                run_args,
            } => {
                let id = match find_container(ctx, docker_cli, label_filters).await? {
                    Some(id) => {
                        ctx.log.log(&format!("Starting existing container {}", id.short()));
                        let spec = ProcessSpec::new(docker_cli).args(["start", id.0.as_str()]);
                        let output = ctx.runner.run(&spec, Some(ctx.log.tagged("start"))).await?;
                        check(label, &output)?;
                        id
                    }
                    None => {
                        ctx.log.log("Creating container");
                        let spec = ProcessSpec::new(docker_cli)
                            .args(["run", "-d"])
                            .args(run_args.iter().cloned());
                        let output = ctx.runner.run(&spec, Some(ctx.log.tagged("run"))).await?;
                        check(label, &output)?;
                        output.first_line().map(ContainerId::new).ok_or_else(|| {
                            CoreError::ContainerNotFound("docker run printed no container id".into())
                        })?
                    }
                };
                publish_container(ctx, docker_cli, id);
                Ok(())
            }
            Task::FindContainer {
                docker_cli,
                label_filters,
                required,
            } => match find_container(ctx, docker_cli, label_filters).await? {
                Some(id) => {
                    publish_container(ctx, docker_cli, id);
                    Ok(())
                }
                None if *required => Err(CoreError::ContainerNotFound(format!(
                    "no container matches {}",
                    label_filters.join(" ")
                ))),
                None => Ok(()),
            },
            Task::ComposeContainer {
                program,
                base_args,
                service,
            } => {
                let spec = ProcessSpec::new(program)
                    .args(base_args.iter().cloned())
                    .args(["ps", "-q", service.as_str()]);
                let output = ctx.runner.run_checked(&spec, None).await?;
                let id = output
                    .first_line()
                    .map(ContainerId::new)
                    .ok_or_else(|| CoreError::ContainerNotFound(format!("compose service {}", service)))?;
                ctx.log.log(&format!("Service {} is container {}", service, id.short()));
                ctx.running.update(|s| s.container_id = Some(id));
                Ok(())
            }
            Task::WriteFile { path, contents } => {
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(path, contents).await?;
                tracing::debug!("Wrote {:?}", path);
                Ok(())
            }
            Task::Probe(step) => probe(step, ctx).await,
            Task::Exec { argv, label: tag } => {
                let factory = ProcessInterfaceFactory::new(ctx.running.clone(), ctx.runner.clone());
                let output = factory
                    .run(argv, &ExecOptions::default(), Some(ctx.log.tagged(tag)))
                    .await?;
                check(label, &output)
            }
            Task::Marker => Ok(()),
        }
    }
}

fn publish_container(ctx: &TaskContext, docker_cli: &str, id: ContainerId) {
    ctx.running.update(|s| {
        s.container_id = Some(id);
        s.docker_cli = docker_cli.to_string();
    });
}

/// `docker ps -a -q` filtered by label; the first match, if any
async fn find_container(
    ctx: &TaskContext,
    docker_cli: &str,
    label_filters: &[String],
) -> Result<Option<ContainerId>> {
    let spec = ProcessSpec::new(docker_cli)
        .args(["ps", "-a", "-q"])
        .args(label_filters.iter().cloned());
    let output = ctx.runner.run_checked(&spec, None).await?;
    Ok(output.first_line().map(ContainerId::new))
}

/// One `/etc/passwd` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PasswdEntry {
    pub name: String,
    pub uid: String,
    pub gid: String,
    pub home: String,
    pub shell: String,
}

pub(crate) fn parse_passwd(line: &str) -> Option<PasswdEntry> {
    let fields: Vec<&str> = line.trim().split(':').collect();
    if fields.len() < 7 || fields[0].is_empty() {
        return None;
    }
    Some(PasswdEntry {
        name: fields[0].to_string(),
        uid: fields[2].to_string(),
        gid: fields[3].to_string(),
        home: fields[5].to_string(),
        shell: fields[6].to_string(),
    })
}

fn is_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parse `env` output; lines that are not `NAME=value` continue the previous value
pub(crate) fn parse_env_lines(lines: &[String]) -> IndexMap<String, String> {
    let mut env: IndexMap<String, String> = IndexMap::new();
    let mut last: Option<String> = None;
    for line in lines {
        match line.split_once('=') {
            Some((name, value)) if is_env_name(name) => {
                env.insert(name.to_string(), value.to_string());
                last = Some(name.to_string());
            }
            _ => {
                if let Some(value) = last.as_ref().and_then(|k| env.get_mut(k)) {
                    value.push('\n');
                    value.push_str(line);
                }
            }
        }
    }
    env
}

const PASSWD_LOOKUP: &str =
    "getent passwd \"$(id -un)\" 2>/dev/null || grep \"^$(id -un):\" /etc/passwd";

async fn probe(step: &ProbeStep, ctx: &TaskContext) -> Result<()> {
    let id = ctx
        .running
        .container_id()
        .ok_or_else(|| CoreError::ContainerNotFound("no container to probe".to_string()))?;

    let exec = |argv: &[&str]| {
        let mut spec = ProcessSpec::new(&step.docker_cli).arg("exec");
        if let Some(ref user) = step.user {
            spec = spec.args(["-u", user.as_str()]);
        }
        spec.arg(id.0.as_str()).args(argv.iter().copied())
    };

    let passwd = ctx
        .runner
        .run(&exec(&["/bin/sh", "-c", PASSWD_LOOKUP]), None)
        .await?;
    let entry = if passwd.success() {
        passwd.first_line().and_then(parse_passwd)
    } else {
        None
    };
    if entry.is_none() {
        ctx.log.log("[probe] Could not look up the container user, using defaults");
    }

    let shell = entry
        .as_ref()
        .map(|e| e.shell.clone())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "/bin/sh".to_string());

    let plain = ctx.runner.run_checked(&exec(&["env"]), None).await?;
    let exec_env = parse_env_lines(&plain.stdout);

    let mut baked_env = None;
    if let Some(flags) = step.env_probe.shell_flags() {
        let output = ctx.runner.run(&exec(&[shell.as_str(), flags, "env"]), None).await?;
        if output.success() {
            baked_env = Some(parse_env_lines(&output.stdout));
        } else {
            ctx.log.log(&format!(
                "[probe] {} {} env exited with code {}, using the container environment",
                shell, flags, output.exit_code
            ));
        }
    }
    let baked_env = baked_env.unwrap_or_else(|| exec_env.clone());

    let user = step.user.clone().or_else(|| entry.as_ref().map(|e| e.name.clone()));
    tracing::debug!(user = ?user, vars = baked_env.len(), "Probed container");

    ctx.running.update(|s| {
        s.user = user;
        s.home = entry.as_ref().map(|e| e.home.clone());
        s.shell = Some(shell);
        s.baked_env = baked_env;
        s.exec_env = exec_env;
        s.container_env = step.container_env.clone();
        s.remote_env = step.remote_env.clone();
        s.forwarded_env = step.forwarded_env.clone();
        s.resolvers = step.resolvers.clone();
        s.workspace_folder = step.workspace_folder.clone();
        s.docker_cli = step.docker_cli.clone();
    });
    Ok(())
}
