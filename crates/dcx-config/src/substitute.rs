//! Variable substitution for devcontainer.json values
//!
//! Tokens have the form `${name}` or `${name:arg1:arg2:...}`. Each `name` is
//! looked up in a [`Resolvers`] table; tokens without a resolver are left in
//! place so a later pass (or the user) can still see them.
//!
//! Supported families:
//! - `${localWorkspaceFolder}` / `${localWorkspaceFolderBasename}`: host workspace path
//! - `${containerWorkspaceFolder}` / `${containerWorkspaceFolderBasename}`: container path
//! - `${devcontainerId}`: stable id derived from the container's id labels
//! - `${localEnv:VAR[:default]}`: host environment variable
//! - `${containerEnv:VAR[:default]}`: container environment variable (attach time)
//!
//! Passes are composed into a [`Transform`], applied in order.

use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock};

/// A resolver receives the colon-separated arguments after the variable name
pub type ResolverFn = Arc<dyn Fn(&[&str]) -> String + Send + Sync>;

fn token_regex() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)((?::[^}]*)?)\}")
            .expect("variable token regex is valid")
    })
}

/// Table of named resolvers
#[derive(Clone, Default)]
pub struct Resolvers {
    map: HashMap<String, ResolverFn>,
}

impl Resolvers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resolver, replacing any previous one with the same name
    pub fn with<F>(mut self, name: impl Into<String>, resolver: F) -> Self
    where
        F: Fn(&[&str]) -> String + Send + Sync + 'static,
    {
        self.insert(name, resolver);
        self
    }

    /// Add a resolver that always yields `value`
    pub fn with_value(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        self.with(name, move |_: &[&str]| value.clone())
    }

    pub fn insert<F>(&mut self, name: impl Into<String>, resolver: F)
    where
        F: Fn(&[&str]) -> String + Send + Sync + 'static,
    {
        self.map.insert(name.into(), Arc::new(resolver));
    }

    /// Merge `other` into this table; `other` wins on name conflicts
    pub fn merge(mut self, other: Resolvers) -> Self {
        self.map.extend(other.map);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ResolverFn> {
        self.map.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Resolver names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.map.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for Resolvers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolvers")
            .field("names", &self.names())
            .finish()
    }
}

/// Substitute every `${name[:args]}` token that has a resolver.
///
/// Matches are collected against the original text and spliced in from the
/// highest offset down, so a replacement never shifts a pending match.
pub fn substitute(text: &str, resolvers: &Resolvers) -> String {
    if resolvers.is_empty() || !text.contains("${") {
        return text.to_string();
    }

    let mut replacements = Vec::new();
    for caps in token_regex().captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let name = &caps[1];
        let Some(resolver) = resolvers.get(name) else {
            continue;
        };
        let args: Vec<&str> = match caps.get(2).map(|m| m.as_str()) {
            Some(rest) if !rest.is_empty() => rest[1..].split(':').collect(),
            _ => Vec::new(),
        };
        replacements.push((whole.range(), resolver(&args)));
    }

    let mut result = text.to_string();
    for (range, value) in replacements.into_iter().rev() {
        result.replace_range(range, &value);
    }
    result
}

/// An ordered chain of substitution passes
#[derive(Clone, Default, Debug)]
pub struct Transform {
    passes: Vec<Resolvers>,
}

impl Transform {
    /// A transform that returns its input unchanged
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn new(pass: Resolvers) -> Self {
        Self { passes: vec![pass] }
    }

    /// A new transform that runs `self` first, then `pass`
    pub fn then(&self, pass: Resolvers) -> Self {
        let mut passes = self.passes.clone();
        passes.push(pass);
        Self { passes }
    }

    pub fn apply(&self, text: &str) -> String {
        self.passes
            .iter()
            .fold(text.to_string(), |acc, pass| substitute(&acc, pass))
    }

    pub fn passes(&self) -> &[Resolvers] {
        &self.passes
    }
}

/// Compose passes into a single transform, in order
pub fn compose(passes: impl IntoIterator<Item = Resolvers>) -> Transform {
    Transform {
        passes: passes.into_iter().collect(),
    }
}

/// Last path segment of `path`, or empty
pub fn basename(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// `${<family>:NAME[:default...]}` lookups against a fixed environment.
///
/// Every argument after `NAME` is rejoined with `:` to form the default, so a
/// default may itself contain colons.
pub fn env_resolvers(family: &str, env: HashMap<String, String>) -> Resolvers {
    Resolvers::new().with(family, move |args: &[&str]| {
        let Some((name, default)) = args.split_first() else {
            return String::new();
        };
        env.get(*name)
            .cloned()
            .unwrap_or_else(|| default.join(":"))
    })
}

/// `${localEnv:...}` against the given host environment
pub fn local_env_resolvers(env: HashMap<String, String>) -> Resolvers {
    env_resolvers("localEnv", env)
}

/// `${containerEnv:...}` against the given container environment
pub fn container_env_resolvers(env: HashMap<String, String>) -> Resolvers {
    env_resolvers("containerEnv", env)
}

/// Snapshot of the current process environment
pub fn process_env() -> HashMap<String, String> {
    std::env::vars().collect()
}

/// `${localWorkspaceFolder}` and `${localWorkspaceFolderBasename}`
pub fn local_workspace_resolvers(folder: &str) -> Resolvers {
    Resolvers::new()
        .with_value("localWorkspaceFolder", folder)
        .with_value("localWorkspaceFolderBasename", basename(folder))
}

/// `${containerWorkspaceFolder}` and `${containerWorkspaceFolderBasename}`
pub fn container_workspace_resolvers(folder: &str) -> Resolvers {
    Resolvers::new()
        .with_value("containerWorkspaceFolder", folder)
        .with_value("containerWorkspaceFolderBasename", basename(folder))
}

/// Host-side resolvers: workspace folder, devcontainerId and localEnv
pub fn local_resolvers(
    workspace_folder: &Path,
    devcontainer_id: &str,
    env: HashMap<String, String>,
) -> Resolvers {
    local_workspace_resolvers(&workspace_folder.to_string_lossy())
        .with_value("devcontainerId", devcontainer_id)
        .merge(local_env_resolvers(env))
}

/// Stable identifier for a devcontainer derived from its id labels.
///
/// Labels are hashed in key order, so the result does not depend on
/// insertion order.
pub fn devcontainer_id(id_labels: &BTreeMap<String, String>) -> String {
    let mut hasher = Sha256::new();
    for (key, value) in id_labels {
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b"\n");
    }
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex[..52].to_string()
}
