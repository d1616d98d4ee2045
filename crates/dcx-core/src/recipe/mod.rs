//! Recipes: the task graphs that bring a devcontainer up and down
//!
//! A [`Recipe`] is a DAG of [`RecipeNode`]s. Nodes are appended in an order
//! where every dependency precedes its dependents, so the graph is acyclic by
//! construction. Each node carries a [`Task`] with everything it needs to run;
//! the only runtime input is the shared [`RunningInstance`](crate::RunningInstance),
//! which earlier tasks fill in (container id, probed user and env).

mod builder;
mod compose_override;
mod runtime;
mod steps;

pub use builder::*;
pub use compose_override::*;
pub use runtime::*;

use dcx_config::{LifecycleHook, Resolvers, UserEnvProbe};
use dcx_provider::ProcessSpec;
use indexmap::IndexMap;
use std::path::PathBuf;

pub type NodeId = usize;

/// Coarse stage a node belongs to, used to drive the instance state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Build,
    Start,
    Probe,
    Hook(LifecycleHook),
    Ready,
    Stop,
}

/// An argument to a docker command; the container id is filled in at run time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DockerArg {
    Literal(String),
    ContainerId,
}

impl From<&str> for DockerArg {
    fn from(s: &str) -> Self {
        DockerArg::Literal(s.to_string())
    }
}

impl From<String> for DockerArg {
    fn from(s: String) -> Self {
        DockerArg::Literal(s)
    }
}

#[derive(Debug, Clone)]
pub enum Task {
    /// Host process; output is logged under `tag`
    Host { spec: ProcessSpec, tag: String },
    /// docker command that may refer to the current container
    Docker {
        program: String,
        args: Vec<DockerArg>,
        tag: String,
        /// Succeed without running when no container is known
        skip_without_container: bool,
    },
    /// Find a container by label, start it if found, otherwise `docker run`
    EnsureContainer {
        docker_cli: String,
        label_filters: Vec<String>,
        /// Arguments following `docker run -d`
        run_args: Vec<String>,
    },
    /// Find a container by label and record it without starting anything
    FindContainer {
        docker_cli: String,
        label_filters: Vec<String>,
        required: bool,
    },
    /// Look up the container of a compose service
    ComposeContainer {
        program: String,
        /// Compose arguments up to, not including, the subcommand
        base_args: Vec<String>,
        service: String,
    },
    /// Write a generated file
    WriteFile { path: PathBuf, contents: String },
    /// Determine the user and environment of the container
    Probe(ProbeStep),
    /// Run a command in the container
    Exec { argv: Vec<String>, label: String },
    /// Ordering point with no work (fan-in, readiness)
    Marker,
}

/// Inputs of the probe step
#[derive(Debug, Clone)]
pub struct ProbeStep {
    pub docker_cli: String,
    /// Configured remote user; the container default when `None`
    pub user: Option<String>,
    pub env_probe: UserEnvProbe,
    pub container_env: IndexMap<String, String>,
    pub remote_env: IndexMap<String, Option<String>>,
    pub forwarded_env: IndexMap<String, String>,
    /// Extra resolvers for remoteEnv values
    pub resolvers: Resolvers,
    pub workspace_folder: String,
}

#[derive(Debug, Clone)]
pub struct RecipeNode {
    pub id: NodeId,
    pub label: String,
    pub deps: Vec<NodeId>,
    pub phase: Phase,
    pub task: Task,
}

#[derive(Debug, Clone, Default)]
pub struct Recipe {
    nodes: Vec<RecipeNode>,
}

impl Recipe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node; `deps` must name nodes already in the recipe
    pub fn add(
        &mut self,
        label: impl Into<String>,
        phase: Phase,
        task: Task,
        deps: &[NodeId],
    ) -> NodeId {
        let id = self.nodes.len();
        debug_assert!(deps.iter().all(|d| *d < id));
        self.nodes.push(RecipeNode {
            id,
            label: label.into(),
            deps: deps.iter().copied().filter(|d| *d < id).collect(),
            phase,
            task,
        });
        id
    }

    pub fn nodes(&self) -> &[RecipeNode] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&RecipeNode> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.label.as_str()).collect()
    }

    pub fn find(&self, label: &str) -> Option<&RecipeNode> {
        self.nodes.iter().find(|n| n.label == label)
    }

    /// The node whose completion means the container is ready for attach
    pub fn ready_node(&self) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|n| n.phase == Phase::Ready)
            .map(|n| n.id)
    }

    /// Whether `later` transitively depends on `earlier`
    pub fn depends_on(&self, later: NodeId, earlier: NodeId) -> bool {
        let mut stack = vec![later];
        let mut seen = vec![false; self.nodes.len()];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(id) else { continue };
            for &dep in &node.deps {
                if dep == earlier {
                    return true;
                }
                if !seen[dep] {
                    seen[dep] = true;
                    stack.push(dep);
                }
            }
        }
        false
    }
}
