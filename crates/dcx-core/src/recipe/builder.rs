//! Recipe construction for up, down and attach

use super::{generate_compose_override, NodeId, Phase, ProbeStep, Recipe, ServiceOverride, Task};
use super::{DockerArg, KEEP_ALIVE_SCRIPT};
use crate::{CoreError, InstanceConfig, Result};
use dcx_config::{
    Command, ComposeContainer, Config, ContainerConfig, DockerfileContainer, LifecycleHook,
    NonComposeBase, ShutdownAction,
};
use dcx_provider::ProcessSpec;

/// Build the recipe that brings the devcontainer up.
///
/// Shape: `[build] -> start -> probe -> hooks...`, with a `ready` marker
/// after the `waitFor` hook.
pub fn prepare_up_recipe(config: &Config, ic: &InstanceConfig) -> Result<Recipe> {
    let container = config
        .container_config
        .as_ref()
        .ok_or(CoreError::NoContainerKind)?;

    let mut recipe = Recipe::new();
    let started = match container {
        ContainerConfig::Dockerfile(dockerfile) => {
            let tag = ic.image_tag();
            let build = recipe.add(
                "build image",
                Phase::Build,
                build_task(dockerfile, &tag, ic),
                &[],
            );
            recipe.add(
                "start container",
                Phase::Start,
                ensure_container_task(config, &dockerfile.base, &tag, ic),
                &[build],
            )
        }
        ContainerConfig::Image(image) => recipe.add(
            "start container",
            Phase::Start,
            ensure_container_task(config, &image.base, &image.image, ic),
            &[],
        ),
        ContainerConfig::Compose(compose) => add_compose_up(&mut recipe, config, compose, ic),
    };

    let probe = recipe.add(
        "probe container",
        Phase::Probe,
        Task::Probe(probe_step(config, ic)),
        &[started],
    );
    add_hooks(&mut recipe, config, ic, probe);

    tracing::debug!("Prepared up recipe with {} nodes", recipe.len());
    Ok(recipe)
}

/// Build the recipe that stops the devcontainer.
///
/// With `force`, the container is removed without a graceful stop, even when
/// `shutdownAction` is `none`.
pub fn prepare_down_recipe(config: &Config, ic: &InstanceConfig, force: bool) -> Result<Recipe> {
    let container = config
        .container_config
        .as_ref()
        .ok_or(CoreError::NoContainerKind)?;

    let mut recipe = Recipe::new();
    let action = container.shutdown_action();
    if action == ShutdownAction::None && !force {
        ic.log.log("shutdownAction is none, leaving the container running");
        return Ok(recipe);
    }

    match container {
        ContainerConfig::Compose(compose) => {
            let (program, base_args) = compose_base_args(compose, ic, false);
            let mut args = base_args;
            if force {
                args.extend(["down", "--timeout", "0"].map(String::from));
            } else if action == ShutdownAction::StopContainer {
                args.extend(["stop".to_string(), compose.service.clone()]);
            } else {
                args.push("down".to_string());
            }
            recipe.add(
                "compose down",
                Phase::Stop,
                Task::Host {
                    spec: ProcessSpec::new(program).args(args).cwd(ic.config_dir()),
                    tag: "compose".to_string(),
                },
                &[],
            );
        }
        _ => {
            let find = recipe.add(
                "find container",
                Phase::Stop,
                Task::FindContainer {
                    docker_cli: ic.docker_cli.clone(),
                    label_filters: ic.label_filters(),
                    required: false,
                },
                &[],
            );
            let docker = |args: &[&str], tag: &str| Task::Docker {
                program: ic.docker_cli.clone(),
                args: args
                    .iter()
                    .map(|a| DockerArg::from(*a))
                    .chain(std::iter::once(DockerArg::ContainerId))
                    .collect(),
                tag: tag.to_string(),
                skip_without_container: true,
            };
            if force {
                recipe.add("remove container", Phase::Stop, docker(&["rm", "-f"], "rm"), &[find]);
            } else {
                let stop = recipe.add("stop container", Phase::Stop, docker(&["stop"], "stop"), &[find]);
                recipe.add("remove container", Phase::Stop, docker(&["rm"], "rm"), &[stop]);
            }
        }
    }
    Ok(recipe)
}

/// Build the recipe that finds an existing container and probes it
pub fn prepare_attach_recipe(config: &Config, ic: &InstanceConfig) -> Result<Recipe> {
    let container = config
        .container_config
        .as_ref()
        .ok_or(CoreError::NoContainerKind)?;

    let mut recipe = Recipe::new();
    let find = match container {
        ContainerConfig::Compose(compose) => {
            let (program, base_args) = compose_base_args(compose, ic, false);
            recipe.add(
                "find service container",
                Phase::Start,
                Task::ComposeContainer {
                    program,
                    base_args,
                    service: compose.service.clone(),
                },
                &[],
            )
        }
        _ => recipe.add(
            "find container",
            Phase::Start,
            Task::FindContainer {
                docker_cli: ic.docker_cli.clone(),
                label_filters: ic.label_filters(),
                required: true,
            },
            &[],
        ),
    };
    let probe = recipe.add(
        "probe container",
        Phase::Probe,
        Task::Probe(probe_step(config, ic)),
        &[find],
    );
    recipe.add("ready", Phase::Ready, Task::Marker, &[probe]);
    Ok(recipe)
}

fn build_task(dockerfile: &DockerfileContainer, tag: &str, ic: &InstanceConfig) -> Task {
    let config_dir = ic.config_dir();
    let mut args = vec![
        "build".to_string(),
        "-f".to_string(),
        config_dir.join(&dockerfile.dockerfile).to_string_lossy().to_string(),
        "-t".to_string(),
        tag.to_string(),
    ];
    let options = &dockerfile.options;
    if let Some(ref target) = options.target {
        args.extend(["--target".to_string(), target.clone()]);
    }
    for (key, value) in &options.args {
        args.extend(["--build-arg".to_string(), format!("{}={}", key, value)]);
    }
    for image in &options.cache_from {
        args.extend(["--cache-from".to_string(), image.clone()]);
    }
    args.extend(options.options.iter().cloned());
    args.push(config_dir.join(&dockerfile.context).to_string_lossy().to_string());

    Task::Host {
        spec: ProcessSpec::new(&ic.docker_cli)
            .args(args)
            .cwd(&ic.workspace_folder),
        tag: "build".to_string(),
    }
}

/// Arguments following `docker run -d`
fn run_args(config: &Config, base: &NonComposeBase, image: &str, ic: &InstanceConfig) -> Vec<String> {
    let common = &config.common;
    let mut args = Vec::new();
    let mut push = |flag: &str, value: String| {
        args.push(flag.to_string());
        args.push(value);
    };

    for (key, value) in &ic.id_labels {
        push("--label", format!("{}={}", key, value));
    }
    for (key, value) in &common.container_env {
        push("-e", format!("{}={}", key, value));
    }

    let workspace_mount = base
        .workspace_mount
        .clone()
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| {
            format!(
                "type=bind,source={},target={}",
                ic.workspace_folder.display(),
                base.workspace_folder
            )
        });
    push("--mount", workspace_mount);
    for mount in common.mounts.iter().chain(&ic.mounts) {
        push("--mount", mount.to_mount_arg());
    }

    for cap in &common.cap_add {
        push("--cap-add", cap.clone());
    }
    for opt in &common.security_opt {
        push("--security-opt", opt.clone());
    }
    for port in &base.app_port {
        push("-p", port.clone());
    }
    if let Some(ref user) = common.container_user {
        push("-u", user.clone());
    }

    if common.init.unwrap_or(false) {
        args.push("--init".to_string());
    }
    if common.privileged.unwrap_or(false) {
        args.push("--privileged".to_string());
    }
    args.extend(base.run_args.iter().cloned());

    if base.override_command {
        args.extend([
            "--entrypoint".to_string(),
            "/bin/sh".to_string(),
            image.to_string(),
            "-c".to_string(),
            KEEP_ALIVE_SCRIPT.to_string(),
        ]);
    } else {
        args.push(image.to_string());
    }
    args
}

fn ensure_container_task(
    config: &Config,
    base: &NonComposeBase,
    image: &str,
    ic: &InstanceConfig,
) -> Task {
    Task::EnsureContainer {
        docker_cli: ic.docker_cli.clone(),
        label_filters: ic.label_filters(),
        run_args: run_args(config, base, image, ic),
    }
}

/// Compose program and the arguments that select the project and its files
fn compose_base_args(
    compose: &ComposeContainer,
    ic: &InstanceConfig,
    with_override: bool,
) -> (String, Vec<String>) {
    let (program, mut args) = ic.compose_command();
    let project = ic.compose_project_name();
    args.extend(["-p".to_string(), project.clone()]);
    for file in &compose.docker_compose_file {
        args.push("-f".to_string());
        args.push(ic.config_dir().join(file).to_string_lossy().to_string());
    }
    if with_override {
        args.push("-f".to_string());
        args.push(override_path(ic).to_string_lossy().to_string());
    }
    (program, args)
}

fn override_path(ic: &InstanceConfig) -> std::path::PathBuf {
    ic.state_dir
        .join(format!("{}-override.yml", ic.compose_project_name()))
}

fn add_compose_up(
    recipe: &mut Recipe,
    config: &Config,
    compose: &ComposeContainer,
    ic: &InstanceConfig,
) -> NodeId {
    let common = &config.common;
    let props = ServiceOverride {
        environment: common.container_env.clone(),
        mounts: common.mounts.iter().chain(&ic.mounts).cloned().collect(),
        cap_add: common.cap_add.clone(),
        security_opt: common.security_opt.clone(),
        init: common.init.unwrap_or(false),
        privileged: common.privileged.unwrap_or(false),
        labels: ic.id_labels.clone(),
        keep_alive: compose.override_command,
    };
    let write = recipe.add(
        "write compose override",
        Phase::Start,
        Task::WriteFile {
            path: override_path(ic),
            contents: generate_compose_override(&compose.service, &props),
        },
        &[],
    );

    let (program, base_args) = compose_base_args(compose, ic, true);
    let mut up_args = base_args.clone();
    up_args.extend(["up".to_string(), "-d".to_string()]);
    if ic.rebuild {
        up_args.push("--build".to_string());
    }
    up_args.push(compose.service.clone());
    up_args.extend(compose.run_services.iter().cloned());

    let up = recipe.add(
        "compose up",
        Phase::Start,
        Task::Host {
            spec: ProcessSpec::new(&program).args(up_args).cwd(ic.config_dir()),
            tag: "compose".to_string(),
        },
        &[write],
    );
    recipe.add(
        "find service container",
        Phase::Start,
        Task::ComposeContainer {
            program,
            base_args,
            service: compose.service.clone(),
        },
        &[up],
    )
}

fn probe_step(config: &Config, ic: &InstanceConfig) -> ProbeStep {
    let common = &config.common;
    ProbeStep {
        docker_cli: ic.docker_cli.clone(),
        user: config.remote_user().map(str::to_string),
        env_probe: common.user_env_probe,
        container_env: common.container_env.clone(),
        remote_env: common.remote_env.clone(),
        forwarded_env: ic.forwarded_env.clone(),
        resolvers: ic.container_resolvers.clone(),
        workspace_folder: config.workspace_folder().to_string(),
    }
}

fn command_task(hook: LifecycleHook, argv: Vec<String>, tag: String, ic: &InstanceConfig) -> Task {
    if hook.runs_on_host() {
        let mut argv = argv.into_iter();
        let program = argv.next().unwrap_or_default();
        Task::Host {
            spec: ProcessSpec::new(program)
                .args(argv)
                .cwd(&ic.workspace_folder),
            tag,
        }
    } else {
        Task::Exec { argv, label: tag }
    }
}

/// Append the nodes for one hook command after `prev`; returns the new tail
fn add_command(
    recipe: &mut Recipe,
    hook: LifecycleHook,
    source: &str,
    command: &Command,
    ic: &InstanceConfig,
    prev: NodeId,
) -> NodeId {
    let label = format!("{} ({})", hook, source);
    let phase = Phase::Hook(hook);
    match command {
        Command::Shell(script) => {
            let argv = dcx_config::shell_argv(script);
            recipe.add(label, phase, command_task(hook, argv, hook.to_string(), ic), &[prev])
        }
        Command::Exec(argv) if argv.is_empty() => prev,
        Command::Exec(argv) => recipe.add(
            label,
            phase,
            command_task(hook, argv.clone(), hook.to_string(), ic),
            &[prev],
        ),
        Command::Parallel(entries) if entries.is_empty() => prev,
        Command::Parallel(entries) => {
            let branches: Vec<NodeId> = entries
                .iter()
                .filter(|(_, args)| !args.argv().is_empty())
                .map(|(name, args)| {
                    recipe.add(
                        format!("{} ({}: {})", hook, source, name),
                        phase,
                        command_task(hook, args.argv(), name.clone(), ic),
                        &[prev],
                    )
                })
                .collect();
            recipe.add(label, phase, Task::Marker, &branches)
        }
    }
}

fn add_hooks(recipe: &mut Recipe, config: &Config, ic: &InstanceConfig, after: NodeId) {
    let mut prev = after;
    for hook in LifecycleHook::ALL {
        for (source, command) in config.hook_commands(hook) {
            prev = add_command(recipe, hook, &source, command, ic, prev);
        }
        if hook == config.common.wait_for {
            prev = recipe.add("ready", Phase::Ready, Task::Marker, &[prev]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcx_config::{CommandArgs, FeatureHooks, LifecycleCommands, Transform};

    fn parse(json: &str) -> Config {
        Config::from_json(json.as_bytes(), &Transform::identity()).unwrap()
    }

    fn instance_config() -> InstanceConfig {
        InstanceConfig::new("/work/proj", "/work/proj/.devcontainer/devcontainer.json")
            .with_state_dir("/tmp/dcx-state")
    }

    fn host_line(task: &Task) -> String {
        match task {
            Task::Host { spec, .. } => spec.command_line(),
            other => panic!("expected host task, got {:?}", other),
        }
    }

    fn run_args_of(recipe: &Recipe) -> Vec<String> {
        match &recipe.find("start container").unwrap().task {
            Task::EnsureContainer { run_args, .. } => run_args.clone(),
            other => panic!("expected EnsureContainer, got {:?}", other),
        }
    }

    #[test]
    fn test_no_container_kind() {
        let config = parse(r#"{"name": "x"}"#);
        let err = prepare_up_recipe(&config, &instance_config()).unwrap_err();
        assert!(matches!(err, CoreError::NoContainerKind));
    }

    #[test]
    fn test_image_recipe_shape() {
        let config = parse(r#"{"image": "ubuntu:22.04"}"#);
        let recipe = prepare_up_recipe(&config, &instance_config()).unwrap();
        assert_eq!(
            recipe.labels(),
            vec!["start container", "probe container", "ready"]
        );
        let ready = recipe.ready_node().unwrap();
        assert!(recipe.depends_on(ready, 0));
    }

    #[test]
    fn test_image_run_args() {
        let config = parse(
            r#"{
                "image": "ubuntu",
                "containerEnv": {"A": "1"},
                "mounts": ["type=volume,source=cache,target=/cache"],
                "capAdd": ["SYS_PTRACE"],
                "init": true,
                "appPort": [3000],
                "runArgs": ["--network=host"]
            }"#,
        );
        let recipe = prepare_up_recipe(&config, &instance_config()).unwrap();
        let args = run_args_of(&recipe).join(" ");
        assert!(args.starts_with(
            "--label devcontainer.config_file=/work/proj/.devcontainer/devcontainer.json \
             --label devcontainer.local_folder=/work/proj -e A=1"
        ));
        assert!(args.contains("--mount type=bind,source=/work/proj,target=/devcontainer/workspace"));
        assert!(args.contains("--mount type=volume,source=cache,target=/cache"));
        assert!(args.contains("--cap-add SYS_PTRACE"));
        assert!(args.contains("-p 3000"));
        assert!(args.contains("--init"));
        assert!(args.contains("--network=host"));
        assert!(args.ends_with(&format!(
            "--entrypoint /bin/sh ubuntu -c {}",
            KEEP_ALIVE_SCRIPT
        )));
    }

    #[test]
    fn test_no_override_command_runs_image_default() {
        let config = parse(
            r#"{"image": "ubuntu", "overrideCommand": false, "workspaceMount": "type=volume,source=ws,target=/ws"}"#,
        );
        let recipe = prepare_up_recipe(&config, &instance_config()).unwrap();
        let args = run_args_of(&recipe);
        assert_eq!(args.last().map(String::as_str), Some("ubuntu"));
        assert!(!args.contains(&"--entrypoint".to_string()));
        assert!(args.contains(&"type=volume,source=ws,target=/ws".to_string()));
    }

    #[test]
    fn test_dockerfile_recipe() {
        let config = parse(
            r#"{"build": {"dockerfile": "Dockerfile", "context": "..", "target": "dev", "args": {"V": "1"}}}"#,
        );
        let ic = instance_config();
        let recipe = prepare_up_recipe(&config, &ic).unwrap();
        assert_eq!(recipe.labels()[..2], ["build image", "start container"]);

        let build = recipe.find("build image").unwrap();
        assert_eq!(build.phase, Phase::Build);
        assert_eq!(
            host_line(&build.task),
            format!(
                "docker build -f /work/proj/.devcontainer/Dockerfile -t {} --target dev \
                 --build-arg V=1 /work/proj/.devcontainer/..",
                ic.image_tag()
            )
        );
        let start = recipe.find("start container").unwrap();
        assert!(start.deps.contains(&build.id));
        assert!(run_args_of(&recipe).contains(&ic.image_tag()));
    }

    #[test]
    fn test_compose_recipe() {
        let config = parse(
            r#"{
                "dockerComposeFile": ["docker-compose.yml"],
                "service": "app",
                "runServices": ["db"],
                "capAdd": ["SYS_PTRACE"]
            }"#,
        );
        let ic = instance_config().with_rebuild(true);
        let recipe = prepare_up_recipe(&config, &ic).unwrap();
        assert_eq!(
            recipe.labels()[..3],
            ["write compose override", "compose up", "find service container"]
        );

        match &recipe.find("write compose override").unwrap().task {
            Task::WriteFile { path, contents } => {
                assert_eq!(
                    path,
                    &std::path::PathBuf::from("/tmp/dcx-state/proj_devcontainer-override.yml")
                );
                assert!(contents.contains("  \"app\":"));
                assert!(contents.contains("SYS_PTRACE"));
                assert!(contents.contains("devcontainer.local_folder"));
            }
            other => panic!("expected WriteFile, got {:?}", other),
        }

        let up = host_line(&recipe.find("compose up").unwrap().task);
        assert_eq!(
            up,
            "docker compose -p proj_devcontainer -f /work/proj/.devcontainer/docker-compose.yml \
             -f /tmp/dcx-state/proj_devcontainer-override.yml up -d --build app db"
        );
    }

    #[test]
    fn test_standalone_compose_cli() {
        let config = parse(r#"{"dockerComposeFile": "c.yml", "service": "app"}"#);
        let ic = instance_config().with_compose_cli(Some("docker-compose".to_string()));
        let recipe = prepare_up_recipe(&config, &ic).unwrap();
        let up = host_line(&recipe.find("compose up").unwrap().task);
        assert!(up.starts_with("docker-compose -p proj_devcontainer"));
        assert!(!up.contains("--build"));
    }

    #[test]
    fn test_hooks_are_strictly_ordered() {
        let config = parse(
            r#"{
                "image": "ubuntu",
                "postAttachCommand": "echo attach",
                "initializeCommand": "echo init",
                "postCreateCommand": ["make", "setup"],
                "onCreateCommand": "echo create"
            }"#,
        );
        let recipe = prepare_up_recipe(&config, &instance_config()).unwrap();
        assert_eq!(
            recipe.labels(),
            vec![
                "start container",
                "probe container",
                "initializeCommand (devcontainer.json)",
                "onCreateCommand (devcontainer.json)",
                "ready",
                "postCreateCommand (devcontainer.json)",
                "postAttachCommand (devcontainer.json)",
            ]
        );
        for window in recipe.nodes().windows(2) {
            assert_eq!(window[1].deps, vec![window[0].id]);
        }

        let init = recipe.find("initializeCommand (devcontainer.json)").unwrap();
        match &init.task {
            Task::Host { spec, .. } => {
                assert_eq!(spec.command_line(), "/bin/sh -c echo init");
                assert_eq!(spec.cwd, Some(std::path::PathBuf::from("/work/proj")));
            }
            other => panic!("expected host task, got {:?}", other),
        }
        match &recipe.find("postCreateCommand (devcontainer.json)").unwrap().task {
            Task::Exec { argv, .. } => assert_eq!(argv, &vec!["make", "setup"]),
            other => panic!("expected exec task, got {:?}", other),
        }
    }

    #[test]
    fn test_wait_for_moves_ready_marker() {
        let config = parse(
            r#"{
                "image": "ubuntu",
                "waitFor": "postStartCommand",
                "postCreateCommand": "a",
                "postStartCommand": "b",
                "postAttachCommand": "c"
            }"#,
        );
        let recipe = prepare_up_recipe(&config, &instance_config()).unwrap();
        let ready = recipe.ready_node().unwrap();
        let start = recipe.find("postStartCommand (devcontainer.json)").unwrap().id;
        let attach = recipe.find("postAttachCommand (devcontainer.json)").unwrap().id;
        assert!(recipe.depends_on(ready, start));
        assert!(recipe.depends_on(attach, ready));
    }

    #[test]
    fn test_parallel_hook_fans_out_and_in() {
        let config = parse(
            r#"{
                "image": "ubuntu",
                "postCreateCommand": {"server": "npm start", "db": ["mysql", "-u", "root"]},
                "postAttachCommand": "echo after"
            }"#,
        );
        let recipe = prepare_up_recipe(&config, &instance_config()).unwrap();
        let server = recipe
            .find("postCreateCommand (devcontainer.json: server)")
            .unwrap();
        let db = recipe.find("postCreateCommand (devcontainer.json: db)").unwrap();
        assert_eq!(server.deps, db.deps);
        assert!(!recipe.depends_on(server.id, db.id));
        assert!(!recipe.depends_on(db.id, server.id));

        let join = recipe.find("postCreateCommand (devcontainer.json)").unwrap();
        assert!(matches!(join.task, Task::Marker));
        assert_eq!(join.deps, vec![server.id, db.id]);

        let after = recipe.find("postAttachCommand (devcontainer.json)").unwrap();
        assert!(recipe.depends_on(after.id, join.id));
        match &db.task {
            Task::Exec { argv, label } => {
                assert_eq!(argv, &vec!["mysql", "-u", "root"]);
                assert_eq!(label, "db");
            }
            other => panic!("expected exec task, got {:?}", other),
        }
    }

    #[test]
    fn test_feature_hooks_run_before_config_hook() {
        let mut config = parse(r#"{"image": "ubuntu", "postCreateCommand": "own"}"#);
        let mut lifecycle = LifecycleCommands::default();
        lifecycle.set(
            LifecycleHook::PostCreateCommand,
            Some(Command::Parallel(
                [("x".to_string(), CommandArgs::Shell("feature".to_string()))]
                    .into_iter()
                    .collect(),
            )),
        );
        config.feature_hooks.push(FeatureHooks {
            feature_id: "ghcr.io/devcontainers/features/node".to_string(),
            lifecycle,
        });

        let recipe = prepare_up_recipe(&config, &instance_config()).unwrap();
        let feature = recipe
            .find("postCreateCommand (ghcr.io/devcontainers/features/node)")
            .unwrap()
            .id;
        let own = recipe.find("postCreateCommand (devcontainer.json)").unwrap().id;
        assert!(recipe.depends_on(own, feature));
    }

    #[test]
    fn test_down_recipes() {
        let ic = instance_config();

        let config = parse(r#"{"image": "ubuntu"}"#);
        let graceful = prepare_down_recipe(&config, &ic, false).unwrap();
        assert_eq!(
            graceful.labels(),
            vec!["find container", "stop container", "remove container"]
        );
        let forced = prepare_down_recipe(&config, &ic, true).unwrap();
        assert_eq!(forced.labels(), vec!["find container", "remove container"]);
        match &forced.find("remove container").unwrap().task {
            Task::Docker { args, .. } => {
                assert_eq!(args, &vec!["rm".into(), "-f".into(), DockerArg::ContainerId])
            }
            other => panic!("expected docker task, got {:?}", other),
        }

        let keep = parse(r#"{"image": "ubuntu", "shutdownAction": "none"}"#);
        assert!(prepare_down_recipe(&keep, &ic, false).unwrap().is_empty());
        assert_eq!(prepare_down_recipe(&keep, &ic, true).unwrap().len(), 2);
    }

    #[test]
    fn test_compose_down_recipes() {
        let ic = instance_config();
        let config = parse(r#"{"dockerComposeFile": "c.yml", "service": "app"}"#);

        let graceful = prepare_down_recipe(&config, &ic, false).unwrap();
        assert_eq!(
            host_line(&graceful.nodes()[0].task),
            "docker compose -p proj_devcontainer -f /work/proj/.devcontainer/c.yml down"
        );
        let forced = prepare_down_recipe(&config, &ic, true).unwrap();
        assert!(host_line(&forced.nodes()[0].task).ends_with("down --timeout 0"));
    }

    #[test]
    fn test_attach_recipe() {
        let config = parse(r#"{"image": "ubuntu"}"#);
        let recipe = prepare_attach_recipe(&config, &instance_config()).unwrap();
        assert_eq!(
            recipe.labels(),
            vec!["find container", "probe container", "ready"]
        );
        assert!(matches!(
            recipe.nodes()[0].task,
            Task::FindContainer { required: true, .. }
        ));
    }
}
