//! devcontainer-feature.json model and install ordering

use crate::decode::Fields;
use crate::devcontainer::{parse_mounts, LifecycleCommands, LifecycleHook, MountSpec};
use crate::jsonc;
use crate::substitute::Transform;
use crate::{ConfigError, Result};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Metadata file found at the root of every feature
pub const FEATURE_METADATA_FILE: &str = "devcontainer-feature.json";

/// A parsed devcontainer-feature.json
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    pub id: String,
    pub version: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "documentationURL")]
    pub documentation_url: Option<String>,
    #[serde(rename = "licenseURL")]
    pub license_url: Option<String>,
    pub keywords: Vec<String>,
    pub legacy_ids: Vec<String>,
    pub deprecated: Option<bool>,
    pub options: IndexMap<String, FeatureOption>,
    pub cap_add: Vec<String>,
    pub security_opt: Vec<String>,
    pub container_env: IndexMap<String, String>,
    pub customizations: Map<String, Value>,
    pub mounts: Vec<MountSpec>,
    pub init: Option<bool>,
    pub privileged: Option<bool>,
    pub entrypoint: Option<String>,
    #[serde(flatten)]
    pub lifecycle: LifecycleCommands,
    /// Feature reference to options for features that must be installed first
    pub depends_on: IndexMap<String, Value>,
    /// Soft ordering: install after these features when they are present
    pub installs_after: Vec<String>,
}

/// One entry of a feature's `options` schema
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureOption {
    #[serde(rename = "type")]
    pub option_type: Option<String>,
    pub default: Option<Value>,
    pub description: Option<String>,
    #[serde(rename = "enum")]
    pub allowed: Vec<String>,
    pub proposals: Vec<String>,
}

/// Lifecycle commands a feature contributes, tagged with the feature id
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureHooks {
    pub feature_id: String,
    #[serde(flatten)]
    pub lifecycle: LifecycleCommands,
}

impl Feature {
    /// Parse feature metadata; mismatched fields are ignored like in devcontainer.json
    pub fn from_json(bytes: &[u8], transform: &Transform) -> Result<Self> {
        let root = jsonc::parse_object(bytes)?;
        let fields = Fields::new(&root, transform);

        let options = fields
            .entries("options")
            .filter_map(|(name, value)| {
                let obj = value.as_object()?;
                let f = Fields::new(obj, transform);
                Some((
                    name.clone(),
                    FeatureOption {
                        option_type: f.string("type"),
                        default: f.raw("default").cloned(),
                        description: f.string("description"),
                        allowed: f.string_list("enum"),
                        proposals: f.string_list("proposals"),
                    },
                ))
            })
            .collect();

        let mut lifecycle = LifecycleCommands::parse(&fields);
        // features cannot run anything on the host
        lifecycle.set(LifecycleHook::InitializeCommand, None);

        Ok(Self {
            id: fields.string("id").unwrap_or_default(),
            version: fields.string("version"),
            name: fields.string("name"),
            description: fields.string("description"),
            documentation_url: fields.string("documentationURL"),
            license_url: fields.string("licenseURL"),
            keywords: fields.string_list("keywords"),
            legacy_ids: fields.string_list("legacyIds"),
            deprecated: fields.bool("deprecated"),
            options,
            cap_add: fields.string_list("capAdd"),
            security_opt: fields.string_list("securityOpt"),
            container_env: fields.string_map("containerEnv"),
            customizations: fields.raw_object("customizations").cloned().unwrap_or_default(),
            mounts: parse_mounts(&fields, "mounts")?,
            init: fields.bool("init"),
            privileged: fields.bool("privileged"),
            entrypoint: fields.string("entrypoint"),
            lifecycle,
            depends_on: fields
                .raw_object("dependsOn")
                .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .unwrap_or_default(),
            installs_after: fields.string_list("installsAfter"),
        })
    }

    /// Load `devcontainer-feature.json` from a feature directory
    pub fn load_from_dir(dir: &Path, transform: &Transform) -> Result<Self> {
        let path = dir.join(FEATURE_METADATA_FILE);
        let bytes = std::fs::read(&path).map_err(|e| ConfigError::ReadError {
            path: path.clone(),
            source: e,
        })?;
        Self::from_json(&bytes, transform)
    }

    /// Option values for an install: user values over schema defaults.
    ///
    /// A bare string in place of an options object sets the `version` option.
    pub fn resolve_options(&self, user: &Value) -> IndexMap<String, Value> {
        let mut resolved: IndexMap<String, Value> = self
            .options
            .iter()
            .filter_map(|(name, opt)| opt.default.clone().map(|d| (name.clone(), d)))
            .collect();

        match user {
            Value::Object(map) => {
                for (name, value) in map {
                    resolved.insert(name.clone(), value.clone());
                }
            }
            Value::String(version) => {
                resolved.insert("version".to_string(), Value::String(version.clone()));
            }
            _ => {}
        }
        resolved
    }

    /// The lifecycle commands this feature contributes, if any
    pub fn hooks(&self) -> Option<FeatureHooks> {
        if self.lifecycle.is_empty() {
            return None;
        }
        Some(FeatureHooks {
            feature_id: self.id.clone(),
            lifecycle: self.lifecycle.clone(),
        })
    }
}

/// Strip the version/tag suffix from a feature reference
///
/// `ghcr.io/devcontainers/features/node:1` and `.../node@sha256:..` both
/// become `ghcr.io/devcontainers/features/node`.
pub fn feature_base_ref(reference: &str) -> &str {
    let without_digest = reference.split('@').next().unwrap_or(reference);
    match without_digest.rfind(':') {
        Some(colon) if !without_digest[colon..].contains('/') => &without_digest[..colon],
        _ => without_digest,
    }
}

/// Short id of a feature reference (its last path segment)
pub fn feature_short_id(reference: &str) -> &str {
    let base = feature_base_ref(reference);
    base.rsplit('/').next().unwrap_or(base)
}

/// Order features for installation.
///
/// `features` pairs each reference (as written in devcontainer.json) with its
/// metadata, in declaration order. Hard edges come from `dependsOn`, soft
/// edges from `installsAfter` (ignored when the target is absent). References
/// listed in `override_order` are pinned first in that order, then everything
/// else follows in dependency order, ties broken by declaration order.
pub fn order_features(
    features: &[(String, Feature)],
    override_order: &[String],
) -> Result<Vec<(String, Feature)>> {
    let count = features.len();

    let mut index_by_key: HashMap<&str, usize> = HashMap::new();
    for (i, (reference, feature)) in features.iter().enumerate() {
        index_by_key.insert(feature_base_ref(reference), i);
        if !feature.id.is_empty() {
            index_by_key.entry(feature.id.as_str()).or_insert(i);
        }
    }
    let lookup = |r: &str| {
        index_by_key
            .get(feature_base_ref(r))
            .or_else(|| index_by_key.get(feature_short_id(r)))
            .copied()
    };

    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); count];
    let mut in_degree = vec![0usize; count];
    for (i, (_, feature)) in features.iter().enumerate() {
        let mut preds: HashSet<usize> = HashSet::new();
        for dep in feature.depends_on.keys() {
            match lookup(dep) {
                Some(j) => {
                    preds.insert(j);
                }
                None => tracing::warn!(
                    "Feature {} depends on {} which is not configured",
                    feature.id,
                    dep
                ),
            }
        }
        for after in &feature.installs_after {
            if let Some(j) = lookup(after) {
                preds.insert(j);
            }
        }
        preds.remove(&i);
        for j in preds {
            successors[j].push(i);
            in_degree[i] += 1;
        }
    }

    // among ready features, pinned ones go first in pinned order
    let pinned: Vec<usize> = override_order.iter().filter_map(|r| lookup(r)).collect();
    let priority = |i: usize| {
        pinned
            .iter()
            .position(|&p| p == i)
            .map(|pos| (0usize, pos))
            .unwrap_or((1, i))
    };

    let mut ready: Vec<usize> = (0..count).filter(|&i| in_degree[i] == 0).collect();
    let mut ordered = Vec::with_capacity(count);
    while !ready.is_empty() {
        ready.sort_by_key(|&i| priority(i));
        let next = ready.remove(0);
        ordered.push(next);
        for &succ in &successors[next] {
            in_degree[succ] -= 1;
            if in_degree[succ] == 0 {
                ready.push(succ);
            }
        }
    }

    if ordered.len() != count {
        let stuck: Vec<&str> = (0..count)
            .filter(|i| !ordered.contains(i))
            .map(|i| features[i].0.as_str())
            .collect();
        return Err(ConfigError::FeatureCycle(stuck.join(", ")));
    }

    Ok(ordered.into_iter().map(|i| features[i].clone()).collect())
}
