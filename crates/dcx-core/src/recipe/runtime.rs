//! Recipe scheduler
//!
//! Nodes start as soon as all their dependencies have succeeded, so
//! independent branches (parallel hook entries) run concurrently. The first
//! failure aborts everything still in flight.

use super::steps::TaskContext;
use super::{NodeId, Phase, Recipe};
use crate::{CoreError, LogSink, Result, RunningInstance};
use dcx_provider::ProcessRunner;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Started,
    Succeeded,
    Failed,
    Skipped,
}

/// Progress notification for one node
#[derive(Debug, Clone)]
pub struct RecipeEvent {
    pub node: NodeId,
    pub label: String,
    pub phase: Phase,
    pub status: NodeStatus,
}

pub type EventCallback = Arc<dyn Fn(&RecipeEvent) + Send + Sync>;

/// Outcome of a recipe that ran to completion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeReport {
    /// Nodes in completion order
    pub succeeded: Vec<NodeId>,
}

/// Executes recipes against one running instance
#[derive(Clone)]
pub struct RecipeRuntime {
    runner: Arc<dyn ProcessRunner>,
    running: RunningInstance,
    log: LogSink,
}

/// Resolves once `true` is sent; never resolves if the sender goes away first
async fn wait_cancelled(mut rx: watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl RecipeRuntime {
    pub fn new(runner: Arc<dyn ProcessRunner>, running: RunningInstance, log: LogSink) -> Self {
        Self {
            runner,
            running,
            log,
        }
    }

    fn emit(&self, on_event: &Option<EventCallback>, recipe: &Recipe, id: NodeId, status: NodeStatus) {
        let Some(node) = recipe.node(id) else { return };
        if status == NodeStatus::Started {
            tracing::debug!("Starting {}", node.label);
        }
        if let Some(callback) = on_event {
            callback(&RecipeEvent {
                node: id,
                label: node.label.clone(),
                phase: node.phase,
                status,
            });
        }
    }

    fn spawn_node(
        &self,
        join_set: &mut JoinSet<(NodeId, Result<()>)>,
        recipe: &Arc<Recipe>,
        id: NodeId,
        on_event: &Option<EventCallback>,
    ) {
        self.emit(on_event, recipe, id, NodeStatus::Started);
        let recipe = Arc::clone(recipe);
        let ctx = TaskContext {
            runner: Arc::clone(&self.runner),
            running: self.running.clone(),
            log: self.log.clone(),
        };
        join_set.spawn(async move {
            let result = match recipe.node(id) {
                Some(node) => node.task.execute(&node.label, &ctx).await,
                None => Ok(()),
            };
            (id, result)
        });
    }

    /// Abort in-flight nodes and report every unfinished node as skipped
    async fn abandon(
        &self,
        join_set: &mut JoinSet<(NodeId, Result<()>)>,
        recipe: &Recipe,
        done: &[bool],
        on_event: &Option<EventCallback>,
    ) {
        join_set.shutdown().await;
        for id in 0..recipe.len() {
            if !done[id] {
                self.emit(on_event, recipe, id, NodeStatus::Skipped);
            }
        }
    }

    /// Run `recipe` until every node has succeeded, one fails, or `cancel`
    /// becomes `true`
    pub async fn run(
        &self,
        recipe: Arc<Recipe>,
        cancel: watch::Receiver<bool>,
        on_event: Option<EventCallback>,
    ) -> Result<RecipeReport> {
        let count = recipe.len();
        let mut waiting_on: Vec<usize> = recipe.nodes().iter().map(|n| n.deps.len()).collect();
        let mut dependents: Vec<Vec<NodeId>> = vec![Vec::new(); count];
        for node in recipe.nodes() {
            for &dep in &node.deps {
                dependents[dep].push(node.id);
            }
        }

        let mut report = RecipeReport::default();
        let mut done = vec![false; count];
        let mut join_set = JoinSet::new();

        if *cancel.borrow() {
            self.abandon(&mut join_set, &recipe, &done, &on_event).await;
            return Err(CoreError::Cancelled);
        }

        for id in 0..count {
            if waiting_on[id] == 0 {
                self.spawn_node(&mut join_set, &recipe, id, &on_event);
            }
        }

        let cancelled = wait_cancelled(cancel);
        tokio::pin!(cancelled);

        while !join_set.is_empty() {
            tokio::select! {
                _ = &mut cancelled => {
                    self.log.log("Cancelled");
                    self.abandon(&mut join_set, &recipe, &done, &on_event).await;
                    return Err(CoreError::Cancelled);
                }
                joined = join_set.join_next() => {
                    let Some(joined) = joined else { break };
                    let (id, result) = match joined {
                        Ok(pair) => pair,
                        Err(e) => {
                            self.abandon(&mut join_set, &recipe, &done, &on_event).await;
                            return Err(CoreError::TaskAborted(e.to_string()));
                        }
                    };
                    done[id] = true;

                    if let Err(e) = result {
                        let label = recipe.node(id).map(|n| n.label.as_str()).unwrap_or("?");
                        self.log.log(&format!("[{}] failed: {}", label, e));
                        self.emit(&on_event, &recipe, id, NodeStatus::Failed);
                        self.abandon(&mut join_set, &recipe, &done, &on_event).await;
                        return Err(e);
                    }

                    self.emit(&on_event, &recipe, id, NodeStatus::Succeeded);
                    report.succeeded.push(id);
                    for &next in &dependents[id] {
                        waiting_on[next] -= 1;
                        if waiting_on[next] == 0 {
                            self.spawn_node(&mut join_set, &recipe, next, &on_event);
                        }
                    }
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::Task;
    use dcx_provider::test_support::{MockResponse, MockRunner};
    use dcx_provider::ProcessSpec;
    use std::sync::Mutex;
    use std::time::Duration;

    fn host(cmd: &str) -> Task {
        Task::Host {
            spec: ProcessSpec::new(cmd),
            tag: cmd.to_string(),
        }
    }

    fn runtime(runner: &MockRunner) -> RecipeRuntime {
        RecipeRuntime::new(
            Arc::new(runner.clone()),
            RunningInstance::default(),
            LogSink::default(),
        )
    }

    fn collect_events() -> (EventCallback, Arc<Mutex<Vec<(String, NodeStatus)>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let callback: EventCallback = Arc::new(move |e: &RecipeEvent| {
            sink.lock().unwrap().push((e.label.clone(), e.status));
        });
        (callback, events)
    }

    #[tokio::test]
    async fn test_chain_runs_in_order() {
        let runner = MockRunner::new();
        let mut recipe = Recipe::new();
        let a = recipe.add("a", Phase::Start, host("first"), &[]);
        let b = recipe.add("b", Phase::Probe, host("second"), &[a]);
        recipe.add("c", Phase::Ready, host("third"), &[b]);

        let (_tx, rx) = watch::channel(false);
        let report = runtime(&runner).run(Arc::new(recipe), rx, None).await.unwrap();

        assert_eq!(runner.command_lines(), vec!["first", "second", "third"]);
        assert_eq!(report.succeeded, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_fan_out_joins_before_dependent() {
        let runner = MockRunner::new();
        runner.respond("slow", MockResponse::ok().after(Duration::from_millis(30)));
        let mut recipe = Recipe::new();
        let root = recipe.add("root", Phase::Start, host("root"), &[]);
        let slow = recipe.add("slow", Phase::Start, host("slow"), &[root]);
        let fast = recipe.add("fast", Phase::Start, host("fast"), &[root]);
        recipe.add("join", Phase::Ready, host("join"), &[slow, fast]);

        let (_tx, rx) = watch::channel(false);
        runtime(&runner).run(Arc::new(recipe), rx, None).await.unwrap();

        let pos = |p: &str| runner.position(p).unwrap();
        assert_eq!(pos("root"), 0);
        assert!(pos("join") > pos("slow"));
        assert!(pos("join") > pos("fast"));
    }

    #[tokio::test]
    async fn test_failure_skips_dependents() {
        let runner = MockRunner::new();
        runner.respond("broken", MockResponse::fail(2, "boom"));
        let mut recipe = Recipe::new();
        let a = recipe.add("a", Phase::Build, host("broken"), &[]);
        recipe.add("b", Phase::Start, host("never"), &[a]);

        let (callback, events) = collect_events();
        let (_tx, rx) = watch::channel(false);
        let err = runtime(&runner)
            .run(Arc::new(recipe), rx, Some(callback))
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::CommandFailed { exit_code: 2, .. }));
        assert!(!runner.was_called("never"));
        let events = events.lock().unwrap();
        assert!(events.contains(&("a".to_string(), NodeStatus::Failed)));
        assert!(events.contains(&("b".to_string(), NodeStatus::Skipped)));
    }

    #[tokio::test]
    async fn test_cancel_aborts_running_node() {
        let runner = MockRunner::new();
        runner.respond("hang", MockResponse::hang());
        let mut recipe = Recipe::new();
        let a = recipe.add("a", Phase::Start, host("hang"), &[]);
        recipe.add("b", Phase::Ready, host("after"), &[a]);

        let (tx, rx) = watch::channel(false);
        let rt = runtime(&runner);
        let handle = tokio::spawn(async move { rt.run(Arc::new(recipe), rx, None).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(CoreError::Cancelled)));
        assert!(!runner.was_called("after"));
    }

    #[tokio::test]
    async fn test_already_cancelled_runs_nothing() {
        let runner = MockRunner::new();
        let mut recipe = Recipe::new();
        recipe.add("a", Phase::Start, host("a"), &[]);
        let (_tx, rx) = watch::channel(true);
        let result = runtime(&runner).run(Arc::new(recipe), rx, None).await;
        assert!(matches!(result, Err(CoreError::Cancelled)));
        assert!(runner.get_calls().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_cancel_sender_does_not_cancel() {
        let runner = MockRunner::new();
        let mut recipe = Recipe::new();
        recipe.add("a", Phase::Start, host("a"), &[]);
        let (tx, rx) = watch::channel(false);
        drop(tx);
        let report = runtime(&runner).run(Arc::new(recipe), rx, None).await.unwrap();
        assert_eq!(report.succeeded, vec![0]);
    }

    #[tokio::test]
    async fn test_empty_recipe() {
        let runner = MockRunner::new();
        let (_tx, rx) = watch::channel(false);
        let report = runtime(&runner).run(Arc::new(Recipe::new()), rx, None).await.unwrap();
        assert!(report.succeeded.is_empty());
    }
}
