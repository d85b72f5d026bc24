use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use taskweave_core::config::SchedulerConfig;
use taskweave_core::error::{Result, TaskweaveError};
use taskweave_core::event::EventBus;
use taskweave_core::traits::{RemoteCaller, TaskFn, WorkerPool};
use taskweave_core::types::{Attributes, NodeId, TaskInput, TaskStatus, WorkflowEvent};

use crate::choice::run_choice;
use crate::collect::{run_collect, CollectOutcome};
use crate::kind::TaskKind;
use crate::mapper;
use crate::pool::TokioWorkerPool;
use crate::registry::TaskRegistry;
use crate::start::start_runner;
use crate::workflow::Workflow;

/// Called with every task failure instead of logging it.
pub type FailureHandler = Arc<dyn Fn(NodeId, &TaskweaveError) + Send + Sync>;

/// Node attribute holding a remote task's procedure name.
pub const URI_KEY: &str = "uri";

type InFlight = FuturesUnordered<BoxFuture<'static, (NodeId, Result<Attributes>)>>;

/// Final state of a workflow run, by node.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub completed: Vec<NodeId>,
    pub failed: Vec<NodeId>,
    pub aborted: Vec<NodeId>,
    pub disabled: Vec<NodeId>,
    /// Nodes left waiting behind a failed or aborted upstream task.
    pub stalled: Vec<NodeId>,
    pub cancelled: bool,
}

impl RunSummary {
    fn from_workflow(workflow: &Workflow, cancelled: bool) -> Result<Self> {
        let mut summary = Self {
            cancelled,
            ..Self::default()
        };
        for id in workflow.graph().node_ids() {
            match workflow.status(id)? {
                TaskStatus::Completed => summary.completed.push(id),
                TaskStatus::Failed => summary.failed.push(id),
                TaskStatus::Aborted | TaskStatus::Deactivated => summary.aborted.push(id),
                TaskStatus::Disabled => summary.disabled.push(id),
                TaskStatus::Ready | TaskStatus::Submitted | TaskStatus::Running => summary.stalled.push(id),
            }
        }
        Ok(summary)
    }

    /// Every task finished without failure.
    pub fn succeeded(&self) -> bool {
        !self.cancelled && self.failed.is_empty() && self.aborted.is_empty() && self.stalled.is_empty()
    }
}

/// How a non-Collect node relates to its predecessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    /// Every predecessor settled and at least one completed.
    Open,
    /// Every predecessor was disabled.
    Disable,
    /// Some predecessor is still in progress.
    Wait,
    /// Some predecessor failed or was aborted.
    Blocked,
}

/// Per-run scheduling state.
struct RunState {
    rng: StdRng,
    started_tx: mpsc::UnboundedSender<NodeId>,
    in_flight: InFlight,
    waiting: HashMap<NodeId, usize>,
}

/// Requests cancellation of single tasks while a workflow runs.
///
/// Requests sent before a run starts are applied when it does. A cancelled
/// task that is already on the pool keeps running; its result is dropped.
#[derive(Debug, Clone)]
pub struct TaskCanceller {
    tx: mpsc::UnboundedSender<NodeId>,
}

impl TaskCanceller {
    /// Returns false once the runner is gone.
    pub fn cancel(&self, id: NodeId) -> bool {
        self.tx.send(id).is_ok()
    }
}

/// Drives a workflow to completion.
///
/// Each pass walks the ready tasks in id order and dispatches those whose
/// predecessors allow it. Pool and remote work is awaited concurrently;
/// blocking tasks, Choice, Mapper and Collect run inline on the loop, so
/// graph mutation only ever happens here.
pub struct WorkflowRunner {
    config: SchedulerConfig,
    registry: Arc<TaskRegistry>,
    pool: Arc<dyn WorkerPool>,
    remote: Option<Arc<dyn RemoteCaller>>,
    event_bus: Arc<EventBus>,
    cancel: CancellationToken,
    task_cancel_tx: mpsc::UnboundedSender<NodeId>,
    task_cancel_rx: Mutex<mpsc::UnboundedReceiver<NodeId>>,
    on_failure: Option<FailureHandler>,
}

impl WorkflowRunner {
    pub fn new(config: SchedulerConfig, registry: TaskRegistry) -> Self {
        let pool = Arc::new(TokioWorkerPool::new(config.worker_threads));
        let (task_cancel_tx, task_cancel_rx) = mpsc::unbounded_channel();
        Self {
            config,
            registry: Arc::new(registry),
            pool,
            remote: None,
            event_bus: Arc::new(EventBus::default()),
            cancel: CancellationToken::new(),
            task_cancel_tx,
            task_cancel_rx: Mutex::new(task_cancel_rx),
            on_failure: None,
        }
    }

    pub fn with_pool(mut self, pool: Arc<dyn WorkerPool>) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteCaller>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn with_failure_handler(mut self, handler: FailureHandler) -> Self {
        self.on_failure = Some(handler);
        self
    }

    /// Get a clone of the cancellation token for external use.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Handle for aborting individual tasks during a run.
    pub fn task_canceller(&self) -> TaskCanceller {
        TaskCanceller {
            tx: self.task_cancel_tx.clone(),
        }
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Run `workflow` until no task can make further progress.
    ///
    /// A runner drives one workflow at a time; a second concurrent call
    /// waits for the first to finish.
    pub async fn run(&self, workflow: &mut Workflow) -> Result<RunSummary> {
        let mut task_cancel_rx = self.task_cancel_rx.lock().await;
        let reset = workflow.reconcile()?;
        if !reset.is_empty() {
            info!(nodes = ?reset, "Reset tasks left in flight by a previous run");
        }

        let (started_tx, mut started_rx) = mpsc::unbounded_channel();
        let mut state = RunState {
            rng: match self.config.choice_seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            },
            started_tx,
            in_flight: FuturesUnordered::new(),
            waiting: HashMap::new(),
        };
        let mut cancelled = false;

        loop {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            while let Ok(id) = task_cancel_rx.try_recv() {
                self.abort_task(workflow, id)?;
            }
            if self.pass(workflow, &mut state)? {
                continue;
            }
            if state.in_flight.is_empty() {
                break;
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                Some(id) = task_cancel_rx.recv() => self.abort_task(workflow, id)?,
                Some(id) = started_rx.recv() => self.mark_running(workflow, id)?,
                Some((id, result)) = state.in_flight.next() => self.finish(workflow, id, result)?,
            }
        }

        if cancelled {
            let aborted = workflow.cancel_all()?;
            warn!(aborted = aborted.len(), in_flight = state.in_flight.len(), "Workflow run cancelled");
            for node_id in aborted {
                self.event_bus.publish(WorkflowEvent::TaskAborted { node_id });
            }
        }

        let summary = RunSummary::from_workflow(workflow, cancelled)?;
        info!(
            completed = summary.completed.len(),
            failed = summary.failed.len(),
            disabled = summary.disabled.len(),
            stalled = summary.stalled.len(),
            "Workflow run finished"
        );
        self.event_bus.publish(WorkflowEvent::RunComplete {
            completed: summary.completed.len(),
            failed: summary.failed.len(),
        });
        Ok(summary)
    }

    /// One sweep over the ready tasks. Returns whether anything changed.
    fn pass(&self, workflow: &mut Workflow, state: &mut RunState) -> Result<bool> {
        let mut progressed = false;

        for id in workflow.nodes_with_status(TaskStatus::Ready)? {
            // Earlier dispatches in this pass may have moved the node on.
            if workflow.status(id)? != TaskStatus::Ready {
                continue;
            }
            let kind = match workflow.kind(id) {
                Ok(kind) => kind,
                Err(e) => {
                    self.fail(workflow, id, e)?;
                    progressed = true;
                    continue;
                }
            };

            if kind == TaskKind::Collect {
                progressed |= self.collect(workflow, id, state)?;
                continue;
            }

            match self.gate(workflow, id)? {
                Gate::Open => {
                    self.dispatch(workflow, id, kind, state)?;
                    progressed = true;
                }
                Gate::Disable => {
                    workflow.set_status(id, TaskStatus::Disabled)?;
                    debug!(node_id = id, "All parent tasks disabled, disabling task");
                    self.event_bus.publish(WorkflowEvent::TaskDisabled { node_id: id });
                    progressed = true;
                }
                Gate::Wait | Gate::Blocked => {}
            }
        }

        Ok(progressed)
    }

    fn gate(&self, workflow: &Workflow, id: NodeId) -> Result<Gate> {
        let mut any_completed = false;
        let mut any_pending = false;
        let preds = workflow.graph().predecessors(id)?;
        if preds.is_empty() {
            return Ok(Gate::Open);
        }
        for pred in preds {
            match workflow.status(pred)? {
                s if s.is_failure() => return Ok(Gate::Blocked),
                TaskStatus::Completed => any_completed = true,
                TaskStatus::Disabled => {}
                _ => any_pending = true,
            }
        }
        Ok(match (any_pending, any_completed) {
            (true, _) => Gate::Wait,
            (false, true) => Gate::Open,
            (false, false) => Gate::Disable,
        })
    }

    fn dispatch(&self, workflow: &mut Workflow, id: NodeId, kind: TaskKind, state: &mut RunState) -> Result<()> {
        info!(node_id = id, task_type = %kind, "Dispatching task");
        self.event_bus.publish(WorkflowEvent::TaskDispatched {
            node_id: id,
            task_type: kind.to_string(),
        });

        match kind {
            TaskKind::Start => self.submit_local(workflow, id, start_runner(), state),
            TaskKind::Task => match self.registry.resolve_runner(id, workflow.graph().node(id)?) {
                Ok(runner) => self.submit_local(workflow, id, runner, state),
                Err(e) => self.fail(workflow, id, e),
            },
            TaskKind::BlockingTask => self.run_blocking(workflow, id),
            TaskKind::RemoteTask => self.submit_remote(workflow, id, state),
            TaskKind::Choice => {
                workflow.set_status(id, TaskStatus::Running)?;
                match run_choice(workflow, id, &mut state.rng) {
                    Ok(outcome) => {
                        for node_id in outcome.disabled {
                            self.event_bus.publish(WorkflowEvent::TaskDisabled { node_id });
                        }
                        self.event_bus.publish(WorkflowEvent::TaskCompleted { node_id: id });
                        Ok(())
                    }
                    Err(e) => self.fail(workflow, id, e),
                }
            }
            TaskKind::Mapper => {
                workflow.set_status(id, TaskStatus::Running)?;
                match mapper::expand(workflow, id, &self.config.mapper_arg) {
                    Ok(expansion) => {
                        self.event_bus.publish(WorkflowEvent::MapperExpanded {
                            node_id: id,
                            items: expansion.items,
                            clones: expansion.clones,
                        });
                        self.complete(workflow, id, None)
                    }
                    Err(e) => self.fail(workflow, id, e),
                }
            }
            TaskKind::Collect => self.collect(workflow, id, state).map(|_| ()),
        }
    }

    /// Hand a local task body to the worker pool.
    fn submit_local(&self, workflow: &mut Workflow, id: NodeId, runner: TaskFn, state: &mut RunState) -> Result<()> {
        let input = match workflow.task_input(id) {
            Ok(input) => input,
            Err(e) => return self.fail(workflow, id, e),
        };
        workflow.set_status(id, TaskStatus::Submitted)?;

        let started = state.started_tx.clone();
        let body: TaskFn = Arc::new(move |input: TaskInput| -> Result<Attributes> {
            let _ = started.send(input.node_id);
            runner(input)
        });
        let job = self.pool.submit(body, input);
        state.in_flight.push(Box::pin(async move { (id, job.await) }));
        Ok(())
    }

    /// Call a remote procedure without blocking the loop.
    fn submit_remote(&self, workflow: &mut Workflow, id: NodeId, state: &mut RunState) -> Result<()> {
        let uri = match workflow.graph().node_attr(id, URI_KEY)?.and_then(Value::as_str) {
            Some(uri) => uri.to_string(),
            None => return self.fail(workflow, id, TaskweaveError::execution(id, "remote task has no uri")),
        };
        let Some(remote) = self.remote.clone() else {
            return self.fail(workflow, id, TaskweaveError::execution(id, "no remote caller configured"));
        };
        let input = match workflow.task_input(id) {
            Ok(input) => input,
            Err(e) => return self.fail(workflow, id, e),
        };
        workflow.set_status(id, TaskStatus::Submitted)?;
        debug!(node_id = id, uri = %uri, "Calling remote task");

        let started = state.started_tx.clone();
        let call = remote.call(&uri, input);
        state.in_flight.push(Box::pin(async move {
            let _ = started.send(id);
            (id, call.await)
        }));
        Ok(())
    }

    /// Run a task body on the loop itself.
    fn run_blocking(&self, workflow: &mut Workflow, id: NodeId) -> Result<()> {
        let prepared = self
            .registry
            .resolve_runner(id, workflow.graph().node(id)?)
            .and_then(|runner| Ok((runner, workflow.task_input(id)?)));
        let (runner, input) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => return self.fail(workflow, id, e),
        };
        workflow.set_status(id, TaskStatus::Running)?;
        self.event_bus.publish(WorkflowEvent::TaskStarted { node_id: id });
        let result = runner(input);
        self.finish(workflow, id, result)
    }

    fn collect(&self, workflow: &mut Workflow, id: NodeId, state: &mut RunState) -> Result<bool> {
        let reducer = match self.registry.resolve_reducer(id, workflow.graph().node(id)?) {
            Ok(reducer) => reducer,
            Err(e) => {
                self.fail(workflow, id, e)?;
                return Ok(true);
            }
        };

        match run_collect(workflow, id, &reducer) {
            Ok(CollectOutcome::Pending { pending }) => {
                if state.waiting.insert(id, pending) != Some(pending) {
                    self.event_bus.publish(WorkflowEvent::CollectWaiting { node_id: id, pending });
                }
                Ok(false)
            }
            Ok(CollectOutcome::Completed { gathered }) => {
                state.waiting.remove(&id);
                info!(node_id = id, gathered, "Collect completed");
                self.event_bus.publish(WorkflowEvent::TaskCompleted { node_id: id });
                Ok(true)
            }
            Ok(CollectOutcome::Failed { failed }) => {
                state.waiting.remove(&id);
                let e = TaskweaveError::execution(id, format!("parent tasks failed: {:?}", failed));
                self.report_failure(id, &e);
                Ok(true)
            }
            Err(e) => {
                state.waiting.remove(&id);
                self.fail(workflow, id, e)?;
                Ok(true)
            }
        }
    }

    fn abort_task(&self, workflow: &mut Workflow, id: NodeId) -> Result<()> {
        match workflow.cancel(id) {
            Ok(true) => {
                self.event_bus.publish(WorkflowEvent::TaskAborted { node_id: id });
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(TaskweaveError::UnknownNode(_)) => {
                warn!(node_id = id, "Ignoring cancel request for unknown task");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn mark_running(&self, workflow: &mut Workflow, id: NodeId) -> Result<()> {
        if workflow.status(id)? == TaskStatus::Submitted {
            workflow.set_status(id, TaskStatus::Running)?;
            self.event_bus.publish(WorkflowEvent::TaskStarted { node_id: id });
        }
        Ok(())
    }

    /// Apply the result of a task body.
    fn finish(&self, workflow: &mut Workflow, id: NodeId, result: Result<Attributes>) -> Result<()> {
        let status = workflow.status(id)?;
        if !status.is_active() {
            debug!(node_id = id, %status, "Discarding result of task no longer active");
            return Ok(());
        }
        match result {
            Ok(output) => self.complete(workflow, id, Some(output)),
            Err(e) => self.fail(workflow, id, e),
        }
    }

    fn complete(&self, workflow: &mut Workflow, id: NodeId, output: Option<Attributes>) -> Result<()> {
        if let Some(output) = output {
            workflow.set_output(id, output)?;
        }
        workflow.set_status(id, TaskStatus::Completed)?;
        info!(node_id = id, "Task completed");
        self.event_bus.publish(WorkflowEvent::TaskCompleted { node_id: id });
        Ok(())
    }

    fn fail(&self, workflow: &mut Workflow, id: NodeId, error: TaskweaveError) -> Result<()> {
        workflow.set_status(id, TaskStatus::Failed)?;
        self.report_failure(id, &error);
        Ok(())
    }

    fn report_failure(&self, id: NodeId, error: &TaskweaveError) {
        self.event_bus.publish(WorkflowEvent::TaskFailed {
            node_id: id,
            error: error.to_string(),
        });
        match &self.on_failure {
            Some(handler) => handler(id, error),
            None => error!(node_id = id, error = %error, "Task failed"),
        }
    }
}
