//! devcontainer.json configuration model and parser
//!
//! Parsing is two-pass: `workspaceFolder` is read first with the caller's
//! transform, then every other string field is decoded with a transform that
//! also knows `${containerWorkspaceFolder}` and its basename.

use crate::decode::{self, Fields};
use crate::feature::FeatureHooks;
use crate::jsonc;
use crate::substitute::{container_workspace_resolvers, Transform};
use crate::{ConfigError, Result};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Container workspace folder used when `workspaceFolder` is absent
pub const DEFAULT_WORKSPACE_FOLDER: &str = "/devcontainer/workspace";

/// A parsed devcontainer.json
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub common: DevContainerCommon,
    pub container_config: Option<ContainerConfig>,
    /// Lifecycle commands contributed by applied features, in install order
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub feature_hooks: Vec<FeatureHooks>,
}

/// Properties shared by every container kind
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DevContainerCommon {
    #[serde(rename = "$schema")]
    pub schema: Option<String>,
    pub name: Option<String>,
    /// Feature reference to raw user options, in declaration order
    pub features: IndexMap<String, Value>,
    pub override_feature_install_order: Vec<String>,
    pub secrets: IndexMap<String, SecretMetadata>,
    pub forward_ports: Vec<ForwardPort>,
    pub ports_attributes: IndexMap<String, PortAttributes>,
    pub other_ports_attributes: Option<PortAttributes>,
    #[serde(rename = "updateRemoteUserUID")]
    pub update_remote_user_uid: Option<bool>,
    pub container_env: IndexMap<String, String>,
    pub container_user: Option<String>,
    pub mounts: Vec<MountSpec>,
    pub init: Option<bool>,
    pub privileged: Option<bool>,
    pub cap_add: Vec<String>,
    pub security_opt: Vec<String>,
    /// `None` values remove the variable from the remote environment
    pub remote_env: IndexMap<String, Option<String>>,
    pub remote_user: Option<String>,
    #[serde(flatten)]
    pub lifecycle: LifecycleCommands,
    pub wait_for: LifecycleHook,
    pub user_env_probe: UserEnvProbe,
    pub host_requirements: Option<HostRequirements>,
    pub customizations: Map<String, Value>,
}

/// The six lifecycle hooks, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LifecycleHook {
    InitializeCommand,
    OnCreateCommand,
    #[default]
    UpdateContentCommand,
    PostCreateCommand,
    PostStartCommand,
    PostAttachCommand,
}

impl LifecycleHook {
    pub const ALL: [LifecycleHook; 6] = [
        LifecycleHook::InitializeCommand,
        LifecycleHook::OnCreateCommand,
        LifecycleHook::UpdateContentCommand,
        LifecycleHook::PostCreateCommand,
        LifecycleHook::PostStartCommand,
        LifecycleHook::PostAttachCommand,
    ];

    /// The devcontainer.json key for this hook
    pub fn key(&self) -> &'static str {
        match self {
            Self::InitializeCommand => "initializeCommand",
            Self::OnCreateCommand => "onCreateCommand",
            Self::UpdateContentCommand => "updateContentCommand",
            Self::PostCreateCommand => "postCreateCommand",
            Self::PostStartCommand => "postStartCommand",
            Self::PostAttachCommand => "postAttachCommand",
        }
    }

    /// `initializeCommand` runs on the host, every other hook in the container
    pub fn runs_on_host(&self) -> bool {
        matches!(self, Self::InitializeCommand)
    }
}

impl std::fmt::Display for LifecycleHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

const LIFECYCLE_HOOKS: &[(&str, LifecycleHook)] = &[
    ("initializeCommand", LifecycleHook::InitializeCommand),
    ("onCreateCommand", LifecycleHook::OnCreateCommand),
    ("updateContentCommand", LifecycleHook::UpdateContentCommand),
    ("postCreateCommand", LifecycleHook::PostCreateCommand),
    ("postStartCommand", LifecycleHook::PostStartCommand),
    ("postAttachCommand", LifecycleHook::PostAttachCommand),
];

/// One optional command per lifecycle hook
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleCommands {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initialize_command: Option<Command>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_create_command: Option<Command>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_content_command: Option<Command>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_create_command: Option<Command>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_start_command: Option<Command>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_attach_command: Option<Command>,
}

impl LifecycleCommands {
    pub fn get(&self, hook: LifecycleHook) -> Option<&Command> {
        match hook {
            LifecycleHook::InitializeCommand => self.initialize_command.as_ref(),
            LifecycleHook::OnCreateCommand => self.on_create_command.as_ref(),
            LifecycleHook::UpdateContentCommand => self.update_content_command.as_ref(),
            LifecycleHook::PostCreateCommand => self.post_create_command.as_ref(),
            LifecycleHook::PostStartCommand => self.post_start_command.as_ref(),
            LifecycleHook::PostAttachCommand => self.post_attach_command.as_ref(),
        }
    }

    pub fn set(&mut self, hook: LifecycleHook, command: Option<Command>) {
        let slot = match hook {
            LifecycleHook::InitializeCommand => &mut self.initialize_command,
            LifecycleHook::OnCreateCommand => &mut self.on_create_command,
            LifecycleHook::UpdateContentCommand => &mut self.update_content_command,
            LifecycleHook::PostCreateCommand => &mut self.post_create_command,
            LifecycleHook::PostStartCommand => &mut self.post_start_command,
            LifecycleHook::PostAttachCommand => &mut self.post_attach_command,
        };
        *slot = command;
    }

    pub fn is_empty(&self) -> bool {
        LifecycleHook::ALL.iter().all(|h| self.get(*h).is_none())
    }

    /// Decode every hook key present in `fields`
    pub(crate) fn parse(fields: &Fields<'_>) -> Self {
        let mut commands = Self::default();
        for (key, hook) in LIFECYCLE_HOOKS {
            commands.set(*hook, fields.get(key, parse_command));
        }
        commands
    }
}

/// A lifecycle command
///
/// The three shapes execute differently and are kept distinct: a string runs
/// through a shell, a list is an argv run directly, and a map runs every entry
/// concurrently.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Command {
    Shell(String),
    Exec(Vec<String>),
    Parallel(IndexMap<String, CommandArgs>),
}

impl Command {
    /// 0 for a string, 1 for a list, 2 for a map
    pub fn variant_index(&self) -> usize {
        match self {
            Self::Shell(_) => 0,
            Self::Exec(_) => 1,
            Self::Parallel(_) => 2,
        }
    }
}

/// One entry of a parallel command map
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CommandArgs {
    Shell(String),
    Exec(Vec<String>),
}

impl CommandArgs {
    /// argv for this entry; shell strings run through `/bin/sh -c`
    pub fn argv(&self) -> Vec<String> {
        match self {
            Self::Shell(s) => shell_argv(s),
            Self::Exec(args) => args.clone(),
        }
    }
}

pub fn shell_argv(script: &str) -> Vec<String> {
    vec!["/bin/sh".to_string(), "-c".to_string(), script.to_string()]
}

/// Decode a lifecycle command from any of its three JSON shapes
pub fn parse_command(value: &Value, transform: &Transform) -> Option<Command> {
    match value {
        Value::String(_) => decode::string(value, transform).map(Command::Shell),
        Value::Array(_) => decode::string_list(value, transform).map(Command::Exec),
        Value::Object(map) => {
            let entries = map
                .iter()
                .filter_map(|(name, v)| parse_command_args(v, transform).map(|a| (name.clone(), a)))
                .collect();
            Some(Command::Parallel(entries))
        }
        _ => None,
    }
}

fn parse_command_args(value: &Value, transform: &Transform) -> Option<CommandArgs> {
    match value {
        Value::String(_) => decode::string(value, transform).map(CommandArgs::Shell),
        Value::Array(_) => decode::string_list(value, transform).map(CommandArgs::Exec),
        _ => None,
    }
}

/// Which shell the remote user's environment is probed with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UserEnvProbe {
    None,
    LoginShell,
    #[default]
    LoginInteractiveShell,
    InteractiveShell,
}

const USER_ENV_PROBES: &[(&str, UserEnvProbe)] = &[
    ("none", UserEnvProbe::None),
    ("loginShell", UserEnvProbe::LoginShell),
    ("loginInteractiveShell", UserEnvProbe::LoginInteractiveShell),
    ("interactiveShell", UserEnvProbe::InteractiveShell),
];

impl UserEnvProbe {
    /// Shell flags for the probe, or `None` when probing is disabled
    pub fn shell_flags(&self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::LoginShell => Some("-lc"),
            Self::LoginInteractiveShell => Some("-lic"),
            Self::InteractiveShell => Some("-ic"),
        }
    }
}

/// What to do with the container when the tool shuts down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ShutdownAction {
    None,
    StopContainer,
    StopCompose,
}

const SHUTDOWN_ACTIONS: &[(&str, ShutdownAction)] = &[
    ("none", ShutdownAction::None),
    ("stopContainer", ShutdownAction::StopContainer),
    ("stopCompose", ShutdownAction::StopCompose),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OnAutoForward {
    #[default]
    Notify,
    OpenBrowser,
    OpenBrowserOnce,
    OpenPreview,
    Silent,
    Ignore,
}

const ON_AUTO_FORWARD: &[(&str, OnAutoForward)] = &[
    ("notify", OnAutoForward::Notify),
    ("openBrowser", OnAutoForward::OpenBrowser),
    ("openBrowserOnce", OnAutoForward::OpenBrowserOnce),
    ("openPreview", OnAutoForward::OpenPreview),
    ("silent", OnAutoForward::Silent),
    ("ignore", OnAutoForward::Ignore),
];

/// Port attributes (`portsAttributes` values and `otherPortsAttributes`)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortAttributes {
    pub label: Option<String>,
    pub on_auto_forward: OnAutoForward,
    pub elevate_if_needed: Option<bool>,
    pub require_local_port: Option<bool>,
    pub protocol: Option<String>,
}

impl PortAttributes {
    fn parse(fields: &Fields<'_>) -> Self {
        Self {
            label: fields.string("label"),
            on_auto_forward: fields.enumeration("onAutoForward", ON_AUTO_FORWARD, OnAutoForward::Notify),
            elevate_if_needed: fields.bool("elevateIfNeeded"),
            require_local_port: fields.bool("requireLocalPort"),
            protocol: fields.string("protocol"),
        }
    }
}

/// A `forwardPorts` entry: a bare port or a `"host:port"` string
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ForwardPort {
    Port(u16),
    HostPort(String),
}

fn parse_forward_port(value: &Value, transform: &Transform) -> Option<ForwardPort> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()).map(ForwardPort::Port),
        Value::String(_) => decode::string(value, transform).map(ForwardPort::HostPort),
        _ => None,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretMetadata {
    pub description: Option<String>,
    pub documentation_url: Option<String>,
}

/// Minimum host resources
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostRequirements {
    pub cpus: Option<u64>,
    pub memory: Option<String>,
    pub storage: Option<String>,
    pub gpu: Option<GpuRequirement>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum GpuRequirement {
    Required(bool),
    Optional,
    Detailed {
        cores: Option<u64>,
        memory: Option<String>,
    },
}

impl HostRequirements {
    fn parse(fields: &Fields<'_>) -> Self {
        let gpu = match fields.raw("gpu") {
            Some(Value::Bool(b)) => Some(GpuRequirement::Required(*b)),
            Some(Value::String(s)) if s.eq_ignore_ascii_case("optional") => {
                Some(GpuRequirement::Optional)
            }
            Some(Value::Object(_)) => fields.object("gpu").map(|g| GpuRequirement::Detailed {
                cores: g.u64("cores"),
                memory: g.string("memory"),
            }),
            _ => None,
        };
        Self {
            cpus: fields.u64("cpus"),
            memory: fields.string("memory"),
            storage: fields.string("storage"),
            gpu,
        }
    }
}

/// A mount entry: structured, or a raw `--mount` string passed through
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MountSpec {
    Structured(Mount),
    Raw(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Mount {
    #[serde(rename = "type")]
    pub mount_type: MountType,
    pub source: Option<String>,
    pub target: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MountType {
    #[default]
    Bind,
    Volume,
}

const MOUNT_TYPES: &[(&str, MountType)] = &[("bind", MountType::Bind), ("volume", MountType::Volume)];

impl MountSpec {
    /// Render as a `docker run --mount` value
    pub fn to_mount_arg(&self) -> String {
        match self {
            Self::Raw(s) => s.clone(),
            Self::Structured(m) => {
                let kind = match m.mount_type {
                    MountType::Bind => "bind",
                    MountType::Volume => "volume",
                };
                match &m.source {
                    Some(source) => format!("type={},source={},target={}", kind, source, m.target),
                    None => format!("type={},target={}", kind, m.target),
                }
            }
        }
    }
}

/// Decode one mount. Strings pass through; objects must carry `target`.
///
/// Returns `Ok(None)` for values of any other shape.
pub fn parse_mount(value: &Value, transform: &Transform) -> Result<Option<MountSpec>> {
    match value {
        Value::String(_) => Ok(decode::string(value, transform).map(MountSpec::Raw)),
        Value::Object(map) => {
            let fields = Fields::new(map, transform);
            let target = fields.string("target").ok_or_else(|| {
                ConfigError::InvalidMountFormat(format!("mount is missing \"target\": {}", value))
            })?;
            Ok(Some(MountSpec::Structured(Mount {
                mount_type: fields.enumeration("type", MOUNT_TYPES, MountType::Bind),
                source: fields.string("source"),
                target,
            })))
        }
        _ => Ok(None),
    }
}

/// Decode a `mounts` array; mismatched shapes yield an empty list
pub(crate) fn parse_mounts(fields: &Fields<'_>, key: &str) -> Result<Vec<MountSpec>> {
    let Some(Value::Array(items)) = fields.raw(key) else {
        return Ok(Vec::new());
    };
    let mut mounts = Vec::with_capacity(items.len());
    for item in items {
        if let Some(mount) = parse_mount(item, fields.transform())? {
            mounts.push(mount);
        }
    }
    Ok(mounts)
}

/// Parse a raw mount string like `type=bind,source=/path,target=/path`
pub fn parse_mount_string(s: &str) -> Option<Mount> {
    let mut mount_type = MountType::Bind;
    let mut source = None;
    let mut target = None;

    for part in s.split(',') {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        match key.trim() {
            "type" => mount_type = decode::lookup_enum(value, MOUNT_TYPES).unwrap_or(MountType::Bind),
            "source" | "src" => source = Some(value.to_string()),
            "target" | "dst" | "destination" => target = Some(value.to_string()),
            _ => {}
        }
    }

    target.map(|target| Mount {
        mount_type,
        source,
        target,
    })
}

/// The container kind, one of three
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ContainerConfig {
    Dockerfile(DockerfileContainer),
    Image(ImageContainer),
    Compose(ComposeContainer),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Compose,
    Dockerfile,
    Image,
}

impl ContainerConfig {
    pub fn kind(&self) -> ContainerKind {
        match self {
            Self::Dockerfile(_) => ContainerKind::Dockerfile,
            Self::Image(_) => ContainerKind::Image,
            Self::Compose(_) => ContainerKind::Compose,
        }
    }

    pub fn workspace_folder(&self) -> &str {
        match self {
            Self::Dockerfile(d) => &d.base.workspace_folder,
            Self::Image(i) => &i.base.workspace_folder,
            Self::Compose(c) => &c.workspace_folder,
        }
    }

    pub fn shutdown_action(&self) -> ShutdownAction {
        match self {
            Self::Dockerfile(d) => d.base.shutdown_action,
            Self::Image(i) => i.base.shutdown_action,
            Self::Compose(c) => c.shutdown_action,
        }
    }

    /// Whether the container's command is replaced by a keep-alive loop
    pub fn override_command(&self) -> bool {
        match self {
            Self::Dockerfile(d) => d.base.override_command,
            Self::Image(i) => i.base.override_command,
            Self::Compose(c) => c.override_command,
        }
    }

    pub fn non_compose_base(&self) -> Option<&NonComposeBase> {
        match self {
            Self::Dockerfile(d) => Some(&d.base),
            Self::Image(i) => Some(&i.base),
            Self::Compose(_) => None,
        }
    }
}

/// Settings shared by the Dockerfile and Image kinds
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NonComposeBase {
    pub app_port: Vec<String>,
    pub run_args: Vec<String>,
    pub shutdown_action: ShutdownAction,
    pub override_command: bool,
    pub workspace_folder: String,
    pub workspace_mount: Option<String>,
}

impl NonComposeBase {
    fn parse(fields: &Fields<'_>, workspace_folder: &str) -> Self {
        let app_port = match fields.raw("appPort") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| decode::scalar_string(v, fields.transform()))
                .collect(),
            Some(v) => decode::scalar_string(v, fields.transform()).into_iter().collect(),
            None => Vec::new(),
        };
        Self {
            app_port,
            run_args: fields.string_list("runArgs"),
            shutdown_action: fields.enumeration(
                "shutdownAction",
                SHUTDOWN_ACTIONS,
                ShutdownAction::StopContainer,
            ),
            override_command: fields.bool("overrideCommand").unwrap_or(true),
            workspace_folder: workspace_folder.to_string(),
            workspace_mount: fields.string("workspaceMount"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerfileContainer {
    #[serde(flatten)]
    pub base: NonComposeBase,
    pub dockerfile: String,
    pub context: String,
    pub options: BuildOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildOptions {
    pub target: Option<String>,
    pub args: IndexMap<String, String>,
    pub cache_from: Vec<String>,
    /// Extra `docker build` CLI options
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageContainer {
    #[serde(flatten)]
    pub base: NonComposeBase,
    pub image: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposeContainer {
    pub docker_compose_file: Vec<String>,
    pub service: String,
    pub run_services: Vec<String>,
    pub workspace_folder: String,
    pub shutdown_action: ShutdownAction,
    pub override_command: bool,
}

type Detector = fn(&Fields<'_>) -> bool;

/// Container kinds in detection priority; the first match wins
const DETECTION_ORDER: &[(ContainerKind, Detector)] = &[
    (ContainerKind::Compose, is_compose),
    (ContainerKind::Dockerfile, is_dockerfile),
    (ContainerKind::Image, is_image),
];

fn is_compose(fields: &Fields<'_>) -> bool {
    !fields.string_or_list("dockerComposeFile").is_empty()
}

fn is_dockerfile(fields: &Fields<'_>) -> bool {
    dockerfile_path(fields).is_some()
}

fn is_image(fields: &Fields<'_>) -> bool {
    fields.string("image").is_some()
}

fn dockerfile_path(fields: &Fields<'_>) -> Option<String> {
    fields
        .object("build")
        .and_then(|b| b.string("dockerfile").or_else(|| b.string("dockerFile")))
        .or_else(|| fields.string("dockerFile"))
}

fn parse_container_config(fields: &Fields<'_>, workspace_folder: &str) -> Option<ContainerConfig> {
    let kind = DETECTION_ORDER
        .iter()
        .find(|(_, detect)| detect(fields))
        .map(|(kind, _)| *kind)?;

    let config = match kind {
        ContainerKind::Compose => ContainerConfig::Compose(ComposeContainer {
            docker_compose_file: fields.string_or_list("dockerComposeFile"),
            service: fields.string("service").unwrap_or_default(),
            run_services: fields.string_list("runServices"),
            workspace_folder: workspace_folder.to_string(),
            shutdown_action: fields.enumeration(
                "shutdownAction",
                SHUTDOWN_ACTIONS,
                ShutdownAction::StopCompose,
            ),
            override_command: fields.bool("overrideCommand").unwrap_or(false),
        }),
        ContainerKind::Dockerfile => {
            let build = fields.object("build");
            let options = build
                .map(|b| BuildOptions {
                    target: b.string("target"),
                    args: b.string_map("args"),
                    cache_from: b.string_or_list("cacheFrom"),
                    options: b.string_list("options"),
                })
                .unwrap_or_default();
            let context = build
                .and_then(|b| b.string("context"))
                .or_else(|| fields.string("context"))
                .unwrap_or_else(|| ".".to_string());
            ContainerConfig::Dockerfile(DockerfileContainer {
                base: NonComposeBase::parse(fields, workspace_folder),
                dockerfile: dockerfile_path(fields).unwrap_or_default(),
                context,
                options,
            })
        }
        ContainerKind::Image => ContainerConfig::Image(ImageContainer {
            base: NonComposeBase::parse(fields, workspace_folder),
            image: fields.string("image").unwrap_or_default(),
        }),
    };
    Some(config)
}

fn parse_common(fields: &Fields<'_>) -> Result<DevContainerCommon> {
    let features = fields
        .raw_object("features")
        .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default();

    let secrets = fields
        .entries("secrets")
        .filter_map(|(name, value)| {
            let obj = value.as_object()?;
            let f = Fields::new(obj, fields.transform());
            Some((
                name.clone(),
                SecretMetadata {
                    description: f.string("description"),
                    documentation_url: f.string("documentationUrl"),
                },
            ))
        })
        .collect();

    let forward_ports = match fields.raw("forwardPorts") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| parse_forward_port(v, fields.transform()))
            .collect(),
        _ => Vec::new(),
    };

    let ports_attributes = fields
        .entries("portsAttributes")
        .filter_map(|(port, value)| {
            let obj = value.as_object()?;
            Some((port.clone(), PortAttributes::parse(&Fields::new(obj, fields.transform()))))
        })
        .collect();

    Ok(DevContainerCommon {
        schema: fields.raw("$schema").and_then(Value::as_str).map(str::to_string),
        name: fields.string("name"),
        features,
        override_feature_install_order: fields.string_list("overrideFeatureInstallOrder"),
        secrets,
        forward_ports,
        ports_attributes,
        other_ports_attributes: fields.object("otherPortsAttributes").map(|f| PortAttributes::parse(&f)),
        update_remote_user_uid: fields.bool("updateRemoteUserUID"),
        container_env: fields.string_map("containerEnv"),
        container_user: fields.string("containerUser"),
        mounts: parse_mounts(fields, "mounts")?,
        init: fields.bool("init"),
        privileged: fields.bool("privileged"),
        cap_add: fields.string_list("capAdd"),
        security_opt: fields.string_list("securityOpt"),
        remote_env: fields.get("remoteEnv", decode::nullable_string_map).unwrap_or_default(),
        remote_user: fields.string("remoteUser"),
        lifecycle: LifecycleCommands::parse(fields),
        wait_for: fields.enumeration("waitFor", LIFECYCLE_HOOKS, LifecycleHook::UpdateContentCommand),
        user_env_probe: fields.enumeration(
            "userEnvProbe",
            USER_ENV_PROBES,
            UserEnvProbe::LoginInteractiveShell,
        ),
        host_requirements: fields.object("hostRequirements").map(|f| HostRequirements::parse(&f)),
        customizations: fields.raw_object("customizations").cloned().unwrap_or_default(),
    })
}

impl Config {
    /// Parse devcontainer.json bytes.
    ///
    /// `transform` is applied to `workspaceFolder`; every other string field
    /// additionally gets `${containerWorkspaceFolder}` and its basename.
    pub fn from_json(bytes: &[u8], transform: &Transform) -> Result<Self> {
        let root = jsonc::parse_object(bytes)?;

        let workspace_folder = Fields::new(&root, transform)
            .string("workspaceFolder")
            .unwrap_or_else(|| DEFAULT_WORKSPACE_FOLDER.to_string());
        let augmented = transform.then(container_workspace_resolvers(&workspace_folder));
        let fields = Fields::new(&root, &augmented);

        let common = parse_common(&fields)?;
        let container_config = parse_container_config(&fields, &workspace_folder);

        tracing::debug!(
            name = ?common.name,
            kind = ?container_config.as_ref().map(ContainerConfig::kind),
            "Parsed devcontainer configuration"
        );

        Ok(Self {
            common,
            container_config,
            feature_hooks: Vec::new(),
        })
    }

    /// Load and parse a devcontainer.json file
    pub fn load(path: &Path, transform: &Transform) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&bytes, transform)
    }

    /// Locate devcontainer.json under a workspace directory
    ///
    /// Searches, in order:
    /// 1. `.devcontainer/devcontainer.json`
    /// 2. `.devcontainer.json`
    /// 3. `.devcontainer/<folder>/devcontainer.json` (first found, by name)
    pub fn find_in(dir: &Path) -> Result<PathBuf> {
        let candidates = [
            dir.join(".devcontainer/devcontainer.json"),
            dir.join(".devcontainer.json"),
        ];
        if let Some(found) = candidates.iter().find(|p| p.is_file()) {
            return Ok(found.clone());
        }

        let devcontainer_dir = dir.join(".devcontainer");
        if let Ok(entries) = std::fs::read_dir(&devcontainer_dir) {
            let mut subdirs: Vec<PathBuf> = entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect();
            subdirs.sort();
            if let Some(found) = subdirs
                .into_iter()
                .map(|d| d.join("devcontainer.json"))
                .find(|p| p.is_file())
            {
                return Ok(found);
            }
        }

        Err(ConfigError::NotFound(devcontainer_dir))
    }

    /// Container workspace folder (default when no container kind is set)
    pub fn workspace_folder(&self) -> &str {
        self.container_config
            .as_ref()
            .map(ContainerConfig::workspace_folder)
            .unwrap_or(DEFAULT_WORKSPACE_FOLDER)
    }

    pub fn kind(&self) -> Option<ContainerKind> {
        self.container_config.as_ref().map(ContainerConfig::kind)
    }

    /// The user lifecycle commands and exec sessions run as
    pub fn remote_user(&self) -> Option<&str> {
        self.common
            .remote_user
            .as_deref()
            .or(self.common.container_user.as_deref())
    }

    /// Every command to run for `hook`: feature commands first, then the config's own
    pub fn hook_commands(&self, hook: LifecycleHook) -> Vec<(String, &Command)> {
        let mut commands: Vec<(String, &Command)> = self
            .feature_hooks
            .iter()
            .filter_map(|fh| fh.lifecycle.get(hook).map(|c| (fh.feature_id.clone(), c)))
            .collect();
        if let Some(cmd) = self.common.lifecycle.get(hook) {
            commands.push(("devcontainer.json".to_string(), cmd));
        }
        commands
    }
}
