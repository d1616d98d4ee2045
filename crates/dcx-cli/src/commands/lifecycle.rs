//! Lifecycle commands: read-configuration, up, exec, down

use super::{instance_config, load_config, WorkspaceArgs};
use anyhow::{bail, Context, Result};
use dcx_config::GlobalConfig;
use dcx_core::{CoreError, ExecOptions, Instance};
use dcx_provider::{LineCallback, OutputLine, OutputStream, ProcessRunner};
use serde_json::json;
use std::sync::Arc;

/// Options for `dcx up`
#[derive(Debug, Clone, Default)]
pub struct UpOptions {
    /// Overrides the configured docker CLI
    pub docker_path: Option<String>,
    /// Rebuild images before starting
    pub build: bool,
    /// Return once `waitFor` has run and cancel the hooks after it
    pub skip_post_ready: bool,
}

/// Parsed configuration, with local features applied, as JSON
pub fn read_configuration(args: &WorkspaceArgs, global: &GlobalConfig) -> Result<serde_json::Value> {
    let workspace = args.resolve()?;
    let ic = instance_config(&workspace, global);
    let config = load_config(&ic)?;
    Ok(json!({
        "configFilePath": workspace.config_file,
        "workspaceFolder": workspace.folder,
        "configuration": config,
    }))
}

/// Bring the devcontainer up; returns the result document printed on stdout
pub async fn up(
    runner: Arc<dyn ProcessRunner>,
    args: &WorkspaceArgs,
    global: &GlobalConfig,
    options: &UpOptions,
) -> Result<serde_json::Value> {
    let workspace = args.resolve()?;
    let mut ic = instance_config(&workspace, global).with_rebuild(options.build);
    if let Some(ref docker) = options.docker_path {
        ic = ic.with_docker_cli(docker);
    }
    let config = load_config(&ic)?;
    let remote_workspace = config.workspace_folder().to_string();

    let instance = Instance::with_runner(config, runner);
    instance.up(&ic).await?;

    if options.skip_post_ready {
        instance.cancel();
        match instance.wait().await {
            Ok(_) => {}
            Err(CoreError::Cancelled) => tracing::warn!("Skipped lifecycle hooks after waitFor"),
            Err(e) => return Err(e.into()),
        }
    } else {
        tracing::info!("Container ready, running remaining lifecycle hooks");
        instance.wait().await?;
    }

    let snapshot = instance.running().snapshot();
    Ok(json!({
        "outcome": "success",
        "containerId": snapshot.container_id.as_ref().map(|id| id.0.clone()),
        "remoteUser": snapshot.user,
        "remoteWorkspaceFolder": remote_workspace,
    }))
}

fn print_lines() -> LineCallback {
    Arc::new(|line: &OutputLine| match line.stream {
        OutputStream::Stdout => println!("{}", line.line),
        OutputStream::Stderr => eprintln!("{}", line.line),
    })
}

/// Run `cmd` in the workspace's running container; returns its exit code
pub async fn exec(
    runner: Arc<dyn ProcessRunner>,
    args: &WorkspaceArgs,
    global: &GlobalConfig,
    cmd: Vec<String>,
) -> Result<i32> {
    if cmd.is_empty() {
        bail!("No command specified");
    }
    let workspace = args.resolve()?;
    let ic = instance_config(&workspace, global);
    let config = load_config(&ic)?;

    let instance = Instance::with_runner(config, runner);
    instance
        .attach(&ic)
        .await
        .context("No running devcontainer for this workspace; run `dcx up` first")?;

    let is_tty = std::io::IsTerminal::is_terminal(&std::io::stdin());
    let options = ExecOptions {
        interactive: is_tty,
        tty: is_tty,
        ..Default::default()
    };
    let on_line = if is_tty { None } else { Some(print_lines()) };
    let output = instance
        .create_process_interface()
        .run(&cmd, &options, on_line)
        .await?;
    Ok(output.exit_code)
}

/// Stop the devcontainer; `force` removes it even when `shutdownAction` is none
pub async fn down(
    runner: Arc<dyn ProcessRunner>,
    args: &WorkspaceArgs,
    global: &GlobalConfig,
    force: bool,
) -> Result<()> {
    let workspace = args.resolve()?;
    let ic = instance_config(&workspace, global);
    let config = load_config(&ic)?;

    let instance = Instance::with_runner(config, runner);
    if force {
        instance.down_force(&ic).await?;
    } else {
        instance.down(&ic).await?;
    }
    Ok(())
}

/// The global configuration file path and its effective contents
pub fn show_config(global: &GlobalConfig) -> Result<String> {
    let path = GlobalConfig::config_path()?;
    let body = toml::to_string_pretty(global).context("Failed to serialize config")?;
    Ok(format!("# {}\n{}", path.display(), body))
}
