//! Compose override YAML generator
//!
//! Settings from devcontainer.json that compose files know nothing about
//! (containerEnv, mounts, capabilities, labels, the keep-alive command) go in
//! an override file passed as an extra `-f` to `docker compose`.

use dcx_config::{parse_mount_string, Mount, MountSpec, MountType};
use indexmap::IndexMap;
use std::collections::BTreeMap;

/// Entrypoint that keeps a container alive until it is stopped
pub const KEEP_ALIVE_SCRIPT: &str =
    "echo Container started; trap \"exit 0\" 15; while sleep 1 & wait $!; do :; done";

/// What goes into the override for one service
#[derive(Debug, Clone, Default)]
pub struct ServiceOverride {
    pub environment: IndexMap<String, String>,
    pub mounts: Vec<MountSpec>,
    pub cap_add: Vec<String>,
    pub security_opt: Vec<String>,
    pub init: bool,
    pub privileged: bool,
    pub labels: BTreeMap<String, String>,
    pub keep_alive: bool,
}

/// Double-quoted YAML scalar, with `$` doubled so compose does not interpolate it
fn quote(value: &str) -> String {
    let escaped = value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('$', "$$");
    format!("\"{}\"", escaped)
}

fn push_volume(yaml: &mut String, mount: &Mount) {
    let kind = match mount.mount_type {
        MountType::Bind => "bind",
        MountType::Volume => "volume",
    };
    yaml.push_str(&format!("      - type: {}\n", kind));
    if let Some(ref source) = mount.source {
        yaml.push_str(&format!("        source: {}\n", quote(source)));
    }
    yaml.push_str(&format!("        target: {}\n", quote(&mount.target)));
}

/// Generate the override YAML for `service_name`
pub fn generate_compose_override(service_name: &str, props: &ServiceOverride) -> String {
    let mut yaml = String::from("services:\n");
    yaml.push_str(&format!("  {}:\n", quote(service_name)));

    if props.keep_alive {
        yaml.push_str("    entrypoint: [\"/bin/sh\", \"-c\"]\n");
        yaml.push_str(&format!("    command: [{}]\n", quote(KEEP_ALIVE_SCRIPT)));
    }

    if !props.environment.is_empty() {
        yaml.push_str("    environment:\n");
        for (key, value) in &props.environment {
            yaml.push_str(&format!("      {}: {}\n", quote(key), quote(value)));
        }
    }

    if !props.labels.is_empty() {
        yaml.push_str("    labels:\n");
        for (key, value) in &props.labels {
            yaml.push_str(&format!("      {}: {}\n", quote(key), quote(value)));
        }
    }

    let mounts: Vec<Mount> = props
        .mounts
        .iter()
        .filter_map(|m| match m {
            MountSpec::Structured(mount) => Some(mount.clone()),
            MountSpec::Raw(raw) => {
                let parsed = parse_mount_string(raw);
                if parsed.is_none() {
                    tracing::warn!("Skipping mount without target in compose override: {}", raw);
                }
                parsed
            }
        })
        .collect();
    if !mounts.is_empty() {
        yaml.push_str("    volumes:\n");
        for mount in &mounts {
            push_volume(&mut yaml, mount);
        }
    }

    if !props.cap_add.is_empty() {
        yaml.push_str("    cap_add:\n");
        for cap in &props.cap_add {
            yaml.push_str(&format!("      - {}\n", cap));
        }
    }

    if !props.security_opt.is_empty() {
        yaml.push_str("    security_opt:\n");
        for opt in &props.security_opt {
            yaml.push_str(&format!("      - {}\n", opt));
        }
    }

    if props.init {
        yaml.push_str("    init: true\n");
    }

    if props.privileged {
        yaml.push_str("    privileged: true\n");
    }

    yaml
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_props_only_names_service() {
        let yaml = generate_compose_override("web", &ServiceOverride::default());
        assert_eq!(yaml, "services:\n  \"web\":\n");
    }

    #[test]
    fn test_cap_add_only() {
        let props = ServiceOverride {
            cap_add: vec!["SYS_PTRACE".to_string()],
            ..Default::default()
        };
        let yaml = generate_compose_override("app", &props);
        assert_eq!(
            yaml,
            "services:\n  \"app\":\n    cap_add:\n      - SYS_PTRACE\n"
        );
    }

    #[test]
    fn test_all_properties() {
        let mut props = ServiceOverride {
            cap_add: vec!["SYS_PTRACE".to_string(), "NET_ADMIN".to_string()],
            security_opt: vec!["seccomp=unconfined".to_string()],
            init: true,
            privileged: true,
            mounts: vec![
                MountSpec::Raw("type=volume,source=v,target=/data".to_string()),
                MountSpec::Structured(Mount {
                    mount_type: MountType::Bind,
                    source: None,
                    target: "/x".to_string(),
                }),
                MountSpec::Raw("source=/nowhere".to_string()),
            ],
            keep_alive: true,
            ..Default::default()
        };
        props.environment.insert("MSG".to_string(), "say \"hi\"".to_string());
        props
            .labels
            .insert("devcontainer.local_folder".to_string(), "/p".to_string());

        let yaml = generate_compose_override("my-service", &props);
        let expected = "\
services:
  \"my-service\":
    entrypoint: [\"/bin/sh\", \"-c\"]
    command: [\"echo Container started; trap \\\"exit 0\\\" 15; while sleep 1 & wait $$!; do :; done\"]
    environment:
      \"MSG\": \"say \\\"hi\\\"\"
    labels:
      \"devcontainer.local_folder\": \"/p\"
    volumes:
      - type: volume
        source: \"v\"
        target: \"/data\"
      - type: bind
        target: \"/x\"
    cap_add:
      - SYS_PTRACE
      - NET_ADMIN
    security_opt:
      - seccomp=unconfined
    init: true
    privileged: true
";
        assert_eq!(yaml, expected);
    }

    #[test]
    fn test_dollar_signs_are_escaped() {
        let mut props = ServiceOverride {
            keep_alive: true,
            ..Default::default()
        };
        props
            .environment
            .insert("PROMPT".to_string(), "$USER@${HOST}".to_string());

        let yaml = generate_compose_override("app", &props);
        assert!(yaml.contains("wait $$!; do :; done"));
        assert!(!yaml.contains("wait $!"));
        assert!(yaml.contains("\"PROMPT\": \"$$USER@$${HOST}\""));
        assert!(KEEP_ALIVE_SCRIPT.contains("wait $!"));
    }

    #[test]
    fn test_no_booleans_set() {
        let props = ServiceOverride {
            cap_add: vec!["SYS_PTRACE".to_string()],
            ..Default::default()
        };
        let yaml = generate_compose_override("app", &props);
        assert!(!yaml.contains("init"));
        assert!(!yaml.contains("privileged"));
        assert!(!yaml.contains("entrypoint"));
    }
}
