//! Shared handle to the running container

use dcx_config::Resolvers;
use dcx_provider::ContainerId;
use indexmap::IndexMap;
use std::sync::{Arc, RwLock};

/// Immutable view of a container as last probed
#[derive(Debug, Clone, Default)]
pub struct ContainerSnapshot {
    pub container_id: Option<ContainerId>,
    /// User lifecycle commands and exec sessions run as
    pub user: Option<String>,
    pub home: Option<String>,
    pub shell: Option<String>,
    /// Environment the container reports for `user` through `userEnvProbe`
    pub baked_env: IndexMap<String, String>,
    /// Environment a bare `docker exec` already starts with
    pub exec_env: IndexMap<String, String>,
    /// `containerEnv` from the config
    pub container_env: IndexMap<String, String>,
    /// Host variables forwarded into every process
    pub forwarded_env: IndexMap<String, String>,
    /// `remoteEnv` from the config; `None` unsets
    pub remote_env: IndexMap<String, Option<String>>,
    /// Extra resolvers for remoteEnv values
    pub resolvers: Resolvers,
    pub workspace_folder: String,
    pub docker_cli: String,
}

/// Reference-counted handle shared by the orchestrator and exec sessions.
///
/// Readers get an `Arc` to the current snapshot; updates build a new snapshot
/// and swap it in, so a reader never observes a half-written one.
#[derive(Debug, Clone, Default)]
pub struct RunningInstance {
    current: Arc<RwLock<Arc<ContainerSnapshot>>>,
}

impl RunningInstance {
    pub fn new(snapshot: ContainerSnapshot) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(snapshot))),
        }
    }

    pub fn snapshot(&self) -> Arc<ContainerSnapshot> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    pub fn publish(&self, snapshot: ContainerSnapshot) {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(snapshot);
    }

    /// Publish a modified copy of the current snapshot
    pub fn update(&self, modify: impl FnOnce(&mut ContainerSnapshot)) {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        let mut next = ContainerSnapshot::clone(&guard);
        modify(&mut next);
        *guard = Arc::new(next);
    }

    pub fn container_id(&self) -> Option<ContainerId> {
        self.snapshot().container_id.clone()
    }

    /// Forget the container (after it has been removed)
    pub fn clear(&self) {
        self.publish(ContainerSnapshot::default());
    }
}
