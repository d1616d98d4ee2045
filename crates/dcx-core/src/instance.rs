//! Lifecycle orchestrator for one devcontainer

use crate::process::ProcessInterfaceFactory;
use crate::recipe::{
    prepare_attach_recipe, prepare_down_recipe, prepare_up_recipe, EventCallback, NodeStatus,
    Phase, Recipe, RecipeEvent, RecipeReport, RecipeRuntime,
};
use crate::{CoreError, InstanceConfig, Result, RunningInstance};
use dcx_config::Config;
use dcx_provider::{ProcessRunner, TokioRunner};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

/// Where an instance is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    Created,
    Building,
    Starting,
    HookRunning,
    Ready,
    Stopping,
    Stopped,
    Failed,
}

impl std::fmt::Display for InstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Building => "building",
            Self::Starting => "starting",
            Self::HookRunning => "running hooks",
            Self::Ready => "ready",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl InstanceState {
    /// No up recipe is driving the instance forward from here
    fn is_settled(self) -> bool {
        matches!(self, Self::Ready | Self::Failed | Self::Stopping | Self::Stopped)
    }
}

/// State an up-recipe event moves the instance to, if any
fn state_for(event: &RecipeEvent) -> Option<InstanceState> {
    match (event.status, event.phase) {
        (NodeStatus::Started, Phase::Build) => Some(InstanceState::Building),
        (NodeStatus::Started, Phase::Start | Phase::Probe) => Some(InstanceState::Starting),
        (NodeStatus::Started, Phase::Hook(_)) => Some(InstanceState::HookRunning),
        (NodeStatus::Succeeded, Phase::Ready) => Some(InstanceState::Ready),
        _ => None,
    }
}

/// Move to `next` unless the instance is already ready; hooks after
/// `waitFor` keep running without leaving `Ready`
fn advance(state: &watch::Sender<InstanceState>, next: InstanceState) {
    state.send_if_modified(|current| {
        if *current == next || *current == InstanceState::Ready {
            return false;
        }
        tracing::info!("Instance {} -> {}", current, next);
        *current = next;
        true
    });
}

async fn join(handle: JoinHandle<Result<RecipeReport>>) -> Result<RecipeReport> {
    handle
        .await
        .map_err(|e| CoreError::TaskAborted(e.to_string()))?
}

/// One devcontainer and its lifecycle.
///
/// `up` resolves once the container is ready (the `waitFor` hook has run);
/// the remaining hooks keep running in the background until [`Instance::wait`].
pub struct Instance {
    config: Config,
    runner: Arc<dyn ProcessRunner>,
    running: RunningInstance,
    state: Arc<watch::Sender<InstanceState>>,
    cancel: watch::Sender<bool>,
    /// Recipe still running after `up` returned
    pending: Mutex<Option<JoinHandle<Result<RecipeReport>>>>,
}

impl Instance {
    pub fn new(config: Config) -> Self {
        Self::with_runner(config, Arc::new(TokioRunner::new()))
    }

    pub fn with_runner(config: Config, runner: Arc<dyn ProcessRunner>) -> Self {
        let (state, _) = watch::channel(InstanceState::Created);
        let (cancel, _) = watch::channel(false);
        Self {
            config,
            runner,
            running: RunningInstance::default(),
            state: Arc::new(state),
            cancel,
            pending: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> InstanceState {
        *self.state.borrow()
    }

    /// Watch state transitions
    pub fn subscribe(&self) -> watch::Receiver<InstanceState> {
        self.state.subscribe()
    }

    pub fn running(&self) -> &RunningInstance {
        &self.running
    }

    /// Factory for processes in this instance's container
    pub fn create_process_interface(&self) -> ProcessInterfaceFactory {
        ProcessInterfaceFactory::new(self.running.clone(), Arc::clone(&self.runner))
    }

    pub fn up_recipe(&self, ic: &InstanceConfig) -> Result<Recipe> {
        prepare_up_recipe(&self.config, ic)
    }

    pub fn down_recipe(&self, ic: &InstanceConfig, force: bool) -> Result<Recipe> {
        prepare_down_recipe(&self.config, ic, force)
    }

    fn runtime(&self, ic: &InstanceConfig) -> RecipeRuntime {
        RecipeRuntime::new(Arc::clone(&self.runner), self.running.clone(), ic.log.clone())
    }

    /// Bring the container up and return once it is ready
    pub async fn up(&self, ic: &InstanceConfig) -> Result<()> {
        let mut states = self.state.subscribe();
        {
            let mut pending = self.pending.lock().await;
            if pending.as_ref().is_some_and(|h| !h.is_finished()) {
                return Err(CoreError::InvalidState("up is already in progress".to_string()));
            }

            let recipe = Arc::new(self.up_recipe(ic)?);
            ic.log.log(&format!(
                "Starting {}",
                self.config.common.name.as_deref().unwrap_or("devcontainer")
            ));
            self.cancel.send_replace(false);
            self.state.send_replace(InstanceState::Starting);

            let events = Arc::clone(&self.state);
            let on_event: EventCallback = Arc::new(move |event: &RecipeEvent| {
                if let Some(next) = state_for(event) {
                    advance(&events, next);
                }
            });

            let runtime = self.runtime(ic);
            let cancel = self.cancel.subscribe();
            let state = Arc::clone(&self.state);
            *pending = Some(tokio::spawn(async move {
                let result = runtime.run(recipe, cancel, Some(on_event)).await;
                match &result {
                    Ok(_) => advance(&state, InstanceState::Ready),
                    // a cancel after `Ready` leaves the container usable
                    Err(CoreError::Cancelled) => advance(&state, InstanceState::Failed),
                    Err(_) => {
                        state.send_replace(InstanceState::Failed);
                    }
                }
                result
            }));
        }

        let reached = states
            .wait_for(|s| s.is_settled())
            .await
            .map(|s| *s)
            .unwrap_or(InstanceState::Failed);
        if reached == InstanceState::Ready {
            return Ok(());
        }

        // `down` may already have taken and joined the recipe
        let handle = self.pending.lock().await.take();
        match handle {
            Some(handle) => join(handle).await.map(|_| ()),
            None => Err(CoreError::Cancelled),
        }
    }

    /// Wait for the hooks still running after `up` and return the overall result
    pub async fn wait(&self) -> Result<RecipeReport> {
        let handle = self.pending.lock().await.take();
        match handle {
            Some(handle) => join(handle).await,
            None => Ok(RecipeReport::default()),
        }
    }

    /// Abandon the recipe started by `up`
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Stop the container according to `shutdownAction`
    pub async fn down(&self, ic: &InstanceConfig) -> Result<()> {
        self.stop(ic, false).await
    }

    /// Remove the container without a graceful stop
    pub async fn down_force(&self, ic: &InstanceConfig) -> Result<()> {
        self.stop(ic, true).await
    }

    async fn stop(&self, ic: &InstanceConfig, force: bool) -> Result<()> {
        let recipe = Arc::new(self.down_recipe(ic, force)?);

        let pending = self.pending.lock().await.take();
        if let Some(handle) = pending {
            if !handle.is_finished() {
                ic.log.log("Cancelling lifecycle commands still running");
                self.cancel.send_replace(true);
            }
            if let Err(e) = join(handle).await {
                tracing::debug!("Abandoned up recipe ended with: {}", e);
            }
        }

        self.state.send_replace(InstanceState::Stopping);
        self.cancel.send_replace(false);
        match self.runtime(ic).run(recipe, self.cancel.subscribe(), None).await {
            Ok(_) => {
                self.running.clear();
                self.state.send_replace(InstanceState::Stopped);
                Ok(())
            }
            Err(e) => {
                self.state.send_replace(InstanceState::Failed);
                Err(e)
            }
        }
    }

    /// Find the existing container and probe it without building or running hooks
    pub async fn attach(&self, ic: &InstanceConfig) -> Result<RunningInstance> {
        let recipe = Arc::new(prepare_attach_recipe(&self.config, ic)?);
        self.cancel.send_replace(false);
        self.runtime(ic)
            .run(recipe, self.cancel.subscribe(), None)
            .await?;
        self.state.send_replace(InstanceState::Ready);
        Ok(self.running.clone())
    }
}
