//! Merging feature metadata into a devcontainer configuration

use crate::devcontainer::Config;
use crate::feature::Feature;
use serde_json::{Map, Value};

/// Deep-merge two customization objects.
///
/// Objects merge key by key, arrays at the same key are concatenated
/// (left then right), and for anything else the right-hand value wins.
pub fn merge_customizations(left: &Value, right: &Value) -> Value {
    match (left, right) {
        (Value::Object(a), Value::Object(b)) => Value::Object(merge_maps(a, b)),
        (Value::Array(a), Value::Array(b)) => {
            Value::Array(a.iter().chain(b.iter()).cloned().collect())
        }
        (_, right) => right.clone(),
    }
}

fn merge_maps(left: &Map<String, Value>, right: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = left.clone();
    for (key, value) in right {
        let next = match merged.get(key) {
            Some(existing) => merge_customizations(existing, value),
            None => value.clone(),
        };
        merged.insert(key.clone(), next);
    }
    merged
}

fn union_into(target: &mut Vec<String>, extra: &[String]) {
    for item in extra {
        if !target.contains(item) {
            target.push(item.clone());
        }
    }
}

/// Apply installed features, in install order, to a copy of `config`.
///
/// The configuration's own values win over feature values wherever both set
/// the same key.
pub fn apply_features(config: &Config, features: &[Feature]) -> Config {
    let mut merged = config.clone();
    let common = &mut merged.common;

    let mut feature_env = indexmap::IndexMap::new();
    let mut feature_customizations = Value::Object(Map::new());
    let mut feature_mounts = Vec::new();

    for feature in features {
        union_into(&mut common.cap_add, &feature.cap_add);
        union_into(&mut common.security_opt, &feature.security_opt);

        if feature.init == Some(true) {
            common.init = Some(true);
        }
        if feature.privileged == Some(true) {
            common.privileged = Some(true);
        }

        for (key, value) in &feature.container_env {
            feature_env.insert(key.clone(), value.clone());
        }
        for mount in &feature.mounts {
            if !feature_mounts.contains(mount) && !common.mounts.contains(mount) {
                feature_mounts.push(mount.clone());
            }
        }
        feature_customizations = merge_customizations(
            &feature_customizations,
            &Value::Object(feature.customizations.clone()),
        );

        if let Some(hooks) = feature.hooks() {
            merged.feature_hooks.push(hooks);
        }
        tracing::debug!("Applied feature {}", feature.id);
    }

    for (key, value) in std::mem::take(&mut common.container_env) {
        feature_env.insert(key, value);
    }
    common.container_env = feature_env;

    feature_mounts.append(&mut common.mounts);
    common.mounts = feature_mounts;

    if let Value::Object(map) = merge_customizations(
        &feature_customizations,
        &Value::Object(std::mem::take(&mut common.customizations)),
    ) {
        common.customizations = map;
    }

    merged
}
