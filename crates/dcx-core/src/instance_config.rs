//! Operational parameters for one `up`/`down` call

use crate::LogSink;
use dcx_config::{
    basename, devcontainer_id, local_resolvers, process_env, MountSpec, Resolvers, Transform,
};
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Label recording the host workspace folder on created containers
pub const LOCAL_FOLDER_LABEL: &str = "devcontainer.local_folder";
/// Label recording the devcontainer.json path on created containers
pub const CONFIG_FILE_LABEL: &str = "devcontainer.config_file";

/// Everything an up/down recipe needs besides the parsed config
#[derive(Debug, Clone)]
pub struct InstanceConfig {
    pub docker_cli: String,
    /// Standalone compose binary; `docker compose` is used when unset
    pub compose_cli: Option<String>,
    /// Workspace folder on the host
    pub workspace_folder: PathBuf,
    /// Path of the devcontainer.json in use
    pub config_file: PathBuf,
    /// Mounts added on top of those in the config
    pub mounts: Vec<MountSpec>,
    pub log: LogSink,
    /// Resolvers for host-side variables (`localEnv`, `localWorkspaceFolder`, ...)
    pub local_resolvers: Resolvers,
    /// Extra resolvers applied to remoteEnv values at attach time
    pub container_resolvers: Resolvers,
    /// Host variables to forward into exec'd processes
    pub forwarded_env: IndexMap<String, String>,
    /// Directory for generated files such as compose overrides
    pub state_dir: PathBuf,
    /// Labels that identify this devcontainer's container
    pub id_labels: BTreeMap<String, String>,
    /// Rebuild images (`docker compose up --build`)
    pub rebuild: bool,
}

impl InstanceConfig {
    /// Defaults for a workspace: docker on PATH, host env resolvers, and id
    /// labels derived from the workspace and config paths
    pub fn new(workspace_folder: impl Into<PathBuf>, config_file: impl Into<PathBuf>) -> Self {
        let workspace_folder = workspace_folder.into();
        let config_file = config_file.into();

        let mut id_labels = BTreeMap::new();
        id_labels.insert(
            LOCAL_FOLDER_LABEL.to_string(),
            workspace_folder.to_string_lossy().to_string(),
        );
        id_labels.insert(
            CONFIG_FILE_LABEL.to_string(),
            config_file.to_string_lossy().to_string(),
        );
        let id = devcontainer_id(&id_labels);

        Self {
            docker_cli: "docker".to_string(),
            compose_cli: None,
            local_resolvers: local_resolvers(&workspace_folder, &id, process_env()),
            workspace_folder,
            config_file,
            mounts: Vec::new(),
            log: LogSink::default(),
            container_resolvers: Resolvers::new(),
            forwarded_env: IndexMap::new(),
            state_dir: std::env::temp_dir().join("dcx"),
            id_labels,
            rebuild: false,
        }
    }

    pub fn with_docker_cli(mut self, docker_cli: impl Into<String>) -> Self {
        self.docker_cli = docker_cli.into();
        self
    }

    pub fn with_compose_cli(mut self, compose_cli: Option<String>) -> Self {
        self.compose_cli = compose_cli;
        self
    }

    pub fn with_log(mut self, log: LogSink) -> Self {
        self.log = log;
        self
    }

    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = dir.into();
        self
    }

    pub fn with_mount(mut self, mount: MountSpec) -> Self {
        self.mounts.push(mount);
        self
    }

    pub fn with_rebuild(mut self, rebuild: bool) -> Self {
        self.rebuild = rebuild;
        self
    }

    /// Forward a host variable into every exec'd process
    pub fn forward_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.forwarded_env.insert(key.into(), value.into());
        self
    }

    /// The transform devcontainer.json should be parsed with
    pub fn transform(&self) -> Transform {
        Transform::new(self.local_resolvers.clone())
    }

    pub fn devcontainer_id(&self) -> String {
        devcontainer_id(&self.id_labels)
    }

    /// Directory containing the config file; relative paths in it resolve here
    pub fn config_dir(&self) -> &Path {
        self.config_file.parent().unwrap_or(Path::new("."))
    }

    /// Program and leading arguments for compose commands
    pub fn compose_command(&self) -> (String, Vec<String>) {
        match &self.compose_cli {
            Some(cli) => (cli.clone(), Vec::new()),
            None => (self.docker_cli.clone(), vec!["compose".to_string()]),
        }
    }

    /// Compose project name: `<workspace basename>_devcontainer`, sanitized
    pub fn compose_project_name(&self) -> String {
        let base = basename(&self.workspace_folder.to_string_lossy());
        format!("{}_devcontainer", sanitize(&base))
    }

    /// Tag for images built from a Dockerfile
    pub fn image_tag(&self) -> String {
        let base = basename(&self.workspace_folder.to_string_lossy());
        let id = self.devcontainer_id();
        format!("dcx/{}-{}:latest", sanitize(&base), &id[..8])
    }

    /// `--filter label=k=v` arguments matching the id labels
    pub fn label_filters(&self) -> Vec<String> {
        self.id_labels
            .iter()
            .flat_map(|(k, v)| ["--filter".to_string(), format!("label={}={}", k, v)])
            .collect()
    }
}

/// Lowercase, with anything outside `[a-z0-9_-]` replaced by `_`
fn sanitize(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() {
        "workspace".to_string()
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> InstanceConfig {
        InstanceConfig::new("/home/me/My Project", "/home/me/My Project/.devcontainer/devcontainer.json")
    }

    #[test]
    fn test_defaults() {
        let ic = config();
        assert_eq!(ic.docker_cli, "docker");
        assert_eq!(ic.id_labels.len(), 2);
        assert_eq!(ic.id_labels[LOCAL_FOLDER_LABEL], "/home/me/My Project");
        assert_eq!(ic.config_dir(), Path::new("/home/me/My Project/.devcontainer"));
    }

    #[test]
    fn test_compose_command() {
        let ic = config();
        assert_eq!(ic.compose_command(), ("docker".to_string(), vec!["compose".to_string()]));
        let ic = ic.with_compose_cli(Some("docker-compose".to_string()));
        assert_eq!(ic.compose_command(), ("docker-compose".to_string(), Vec::new()));
    }

    #[test]
    fn test_names_are_sanitized() {
        let ic = config();
        assert_eq!(ic.compose_project_name(), "my_project_devcontainer");
        assert!(ic.image_tag().starts_with("dcx/my_project-"));
        assert!(ic.image_tag().ends_with(":latest"));
    }

    #[test]
    fn test_transform_resolves_local_variables() {
        let ic = config();
        let t = ic.transform();
        assert_eq!(t.apply("${localWorkspaceFolderBasename}"), "My Project");
        assert_eq!(t.apply("${devcontainerId}"), ic.devcontainer_id());
    }

    #[test]
    fn test_label_filters() {
        let ic = config();
        let filters = ic.label_filters();
        assert_eq!(filters.len(), 4);
        assert_eq!(filters[0], "--filter");
        assert!(filters[1].starts_with("label=devcontainer.config_file="));
    }
}
