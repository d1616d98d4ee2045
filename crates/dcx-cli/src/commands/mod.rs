//! CLI command implementations

mod lifecycle;

use anyhow::{Context, Result};
use dcx_config::{apply_features, order_features, Config, Feature, GlobalConfig};
use dcx_core::{InstanceConfig, LogSink};
use std::path::PathBuf;

pub use lifecycle::*;

/// Where to find the workspace and its devcontainer.json
#[derive(Debug, Clone, Default, clap::Args)]
pub struct WorkspaceArgs {
    /// Workspace folder (defaults to the current directory)
    #[arg(long)]
    pub workspace_folder: Option<PathBuf>,

    /// Path to devcontainer.json (searched for in the workspace if not specified)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// A workspace folder and the devcontainer.json that belongs to it
#[derive(Debug, Clone)]
pub struct Workspace {
    pub folder: PathBuf,
    pub config_file: PathBuf,
}

impl WorkspaceArgs {
    pub fn for_folder(folder: impl Into<PathBuf>) -> Self {
        Self {
            workspace_folder: Some(folder.into()),
            config: None,
        }
    }

    pub fn resolve(&self) -> Result<Workspace> {
        let folder = match &self.workspace_folder {
            Some(folder) => folder.clone(),
            None => std::env::current_dir()?,
        };
        let folder = std::fs::canonicalize(&folder)
            .with_context(|| format!("Workspace folder {} does not exist", folder.display()))?;

        let config_file = match &self.config {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => std::env::current_dir()?.join(path),
            None => Config::find_in(&folder)
                .with_context(|| format!("No devcontainer.json found in {}", folder.display()))?,
        };
        Ok(Workspace {
            folder,
            config_file,
        })
    }
}

/// Instance settings for `workspace` from the global configuration
pub fn instance_config(workspace: &Workspace, global: &GlobalConfig) -> InstanceConfig {
    let mut ic = InstanceConfig::new(&workspace.folder, &workspace.config_file)
        .with_docker_cli(&global.defaults.docker_path)
        .with_compose_cli(global.defaults.compose_path.clone())
        .with_state_dir(global.state_dir())
        .with_log(LogSink::tracing_only());
    for key in ["TERM", "COLORTERM"] {
        if let Ok(value) = std::env::var(key) {
            ic = ic.forward_env(key, value);
        }
    }
    ic
}

/// Load devcontainer.json and merge the features stored next to it.
///
/// Only local features (`./name` or `../name`) are installed from disk;
/// other references are reported and skipped.
pub fn load_config(ic: &InstanceConfig) -> Result<Config> {
    let transform = ic.transform();
    let config = Config::load(&ic.config_file, &transform)
        .with_context(|| format!("Failed to load {}", ic.config_file.display()))?;

    let mut local = Vec::new();
    for reference in config.common.features.keys() {
        if reference.starts_with("./") || reference.starts_with("../") {
            let dir = ic.config_dir().join(reference);
            let feature = Feature::load_from_dir(&dir, &transform)
                .with_context(|| format!("Failed to load feature {}", reference))?;
            local.push((reference.clone(), feature));
        } else {
            tracing::warn!("Feature {} is not a local folder, skipping", reference);
        }
    }
    if local.is_empty() {
        return Ok(config);
    }

    let ordered = order_features(&local, &config.common.override_feature_install_order)?;
    let features: Vec<Feature> = ordered.into_iter().map(|(_, f)| f).collect();
    tracing::debug!("Applying {} local features", features.len());
    Ok(apply_features(&config, &features))
}
