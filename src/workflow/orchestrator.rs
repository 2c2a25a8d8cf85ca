//! Custom workflow orchestration.
//!
//! Walks a custom workflow's steps strictly in definition order:
//!
//! 1. Skip steps whose condition evaluates to false.
//! 2. Halt at checkpoints (spec-ing mode only) and save the session so it
//!    can be resumed.
//! 3. Resolve the step to a dispatch descriptor and hand it to the step
//!    executor, waiting for its report.
//! 4. Stop at the first failure.
//!
//! Every decision and transition is written to the session's audit logs.
//! A run whose audit log cannot be written does not continue.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::condition;
use super::context::ExecutionContext;
use super::dispatcher::{DispatchDescriptor, StepDispatcher};
use super::error::{Result, WorkflowError, EXIT_RUNTIME};
use super::executor::{DeferredExecutor, StepExecutor, StepReport};
use super::rigor::{validate_session_id, LogKind, RigorEnforcer};
use super::schema::{CustomWorkflowDefinition, WorkflowStepDefinition};
use super::session::{fingerprint, SessionState, SessionStore, SESSION_STATE_VERSION};
use super::store::WorkflowStore;
use super::tracker::TaskTracker;

/// Task status used when a workflow declares no output state.
const DEFAULT_TASK_STATUS: &str = "In Progress";

/// Final state of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    /// Condition was false; nothing dispatched.
    Skipped,
    /// Handed to the caller; outcome reported out of band.
    Dispatched,
    /// Executor reported success.
    Succeeded,
    /// Condition evaluation, resolution, or execution failed.
    Failed,
}

/// Outcome of attempting one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStepResult {
    /// Position of the step in the custom workflow
    pub index: usize,

    /// Built-in workflow the step invokes
    pub workflow_name: String,

    /// Final state
    pub state: StepState,

    /// Whether the step did not fail
    pub success: bool,

    /// Whether the step was skipped
    pub skipped: bool,

    /// Error message (if failed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// What was dispatched (if anything)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatch: Option<DispatchDescriptor>,
}

impl WorkflowStepResult {
    fn new(index: usize, step: &WorkflowStepDefinition, state: StepState) -> Self {
        Self {
            index,
            workflow_name: step.workflow_name.clone(),
            state,
            success: state != StepState::Failed,
            skipped: state == StepState::Skipped,
            error: None,
            dispatch: None,
        }
    }

    /// Whether the step was handed to an executor without failing.
    pub fn executed(&self) -> bool {
        matches!(self.state, StepState::Dispatched | StepState::Succeeded)
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    HaltedOnError,
    HaltedOnCheckpoint,
}

/// Where a run paused for approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointHalt {
    /// Index of the step awaiting approval
    pub step_index: usize,

    /// Built-in workflow of that step
    pub workflow_name: String,

    /// Approval prompt
    pub prompt: String,
}

/// Aggregate outcome of a custom workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomWorkflowResult {
    /// Custom workflow that ran
    pub workflow_name: String,

    /// Session of this run
    pub session_id: String,

    /// How the run ended
    pub status: RunStatus,

    /// Step results, in definition order
    pub steps: Vec<WorkflowStepResult>,

    /// True iff no step failed (provisional when halted at a checkpoint)
    pub success: bool,

    /// Steps dispatched or succeeded
    pub steps_executed: usize,

    /// Steps skipped by their condition
    pub steps_skipped: usize,

    /// Why the run halted early
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Error class of `error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,

    /// Checkpoint the run is waiting at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<CheckpointHalt>,
}

impl CustomWorkflowResult {
    fn new(
        workflow_name: &str,
        session_id: &str,
        status: RunStatus,
        steps: Vec<WorkflowStepResult>,
    ) -> Self {
        let steps_executed = steps.iter().filter(|s| s.executed()).count();
        let steps_skipped = steps.iter().filter(|s| s.skipped).count();
        let success = steps.iter().all(|s| s.success);
        Self {
            workflow_name: workflow_name.to_string(),
            session_id: session_id.to_string(),
            status,
            steps,
            success,
            steps_executed,
            steps_skipped,
            error: None,
            error_kind: None,
            checkpoint: None,
        }
    }

    /// Whether the run is waiting for approval.
    pub fn is_halted_at_checkpoint(&self) -> bool {
        self.status == RunStatus::HaltedOnCheckpoint
    }

    /// The step that failed, if any.
    pub fn failed_step(&self) -> Option<&WorkflowStepResult> {
        self.steps.iter().find(|s| s.state == StepState::Failed)
    }

    /// Process exit code: 0 for completed or checkpoint halts, 2 for failures.
    pub fn exit_code(&self) -> u8 {
        match self.status {
            RunStatus::Completed | RunStatus::HaltedOnCheckpoint => 0,
            RunStatus::HaltedOnError => EXIT_RUNTIME,
        }
    }
}

/// Where a pass over the steps starts.
struct RunStart<'r> {
    context: &'r ExecutionContext,
    task_id: Option<&'r str>,
    first_step: usize,
    approved_checkpoint: Option<usize>,
    prior: Vec<WorkflowStepResult>,
}

/// Coordinates one session's custom workflow runs.
pub struct Orchestrator<'a> {
    store: &'a WorkflowStore,
    dispatcher: StepDispatcher,
    enforcer: RigorEnforcer,
    sessions: SessionStore,
    session_id: String,
    executor: Box<dyn StepExecutor + 'a>,
    tracker: Option<Box<dyn TaskTracker + 'a>>,
}

impl<'a> Orchestrator<'a> {
    /// Create an orchestrator for one session, logging under `logs_root`.
    pub fn new(
        store: &'a WorkflowStore,
        logs_root: impl Into<PathBuf>,
        session_id: impl Into<String>,
    ) -> Result<Self> {
        let session_id = session_id.into();
        validate_session_id(&session_id)?;
        let logs_root = logs_root.into();

        Ok(Self {
            store,
            dispatcher: StepDispatcher::from_store(store),
            sessions: SessionStore::new(&logs_root),
            enforcer: RigorEnforcer::new(logs_root),
            session_id,
            executor: Box::new(DeferredExecutor),
            tracker: None,
        })
    }

    /// Report step outcomes through `executor` instead of deferring them.
    #[must_use]
    pub fn with_executor(mut self, executor: impl StepExecutor + 'a) -> Self {
        self.executor = Box::new(executor);
        self
    }

    /// Keep tasks in sync through `tracker`.
    #[must_use]
    pub fn with_tracker(mut self, tracker: impl TaskTracker + 'a) -> Self {
        self.tracker = Some(Box::new(tracker));
        self
    }

    /// Resolve steps through `dispatcher` instead of the store's table.
    #[must_use]
    pub fn with_dispatcher(mut self, dispatcher: StepDispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Session of this orchestrator.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Audit log writer of this session.
    pub fn enforcer(&self) -> &RigorEnforcer {
        &self.enforcer
    }

    /// Names of the available custom workflows.
    pub fn list_custom_workflows(&self) -> Vec<&str> {
        self.store.list_names()
    }

    /// Run a custom workflow from its first step.
    pub fn execute_custom_workflow(
        &self,
        workflow_name: &str,
        context: &ExecutionContext,
    ) -> Result<CustomWorkflowResult> {
        self.execute_for_task(workflow_name, context, None)
    }

    /// Run a custom workflow, keeping `task_id` in sync with its progress.
    pub fn execute_for_task(
        &self,
        workflow_name: &str,
        context: &ExecutionContext,
        task_id: Option<&str>,
    ) -> Result<CustomWorkflowResult> {
        let def = self.store.get(workflow_name)?;
        RigorEnforcer::validate_rigor(&def.name, &def.rigor)?;

        if self.sessions.exists(&self.session_id) || self.has_audit_records()? {
            return Err(WorkflowError::SessionInUse(self.session_id.clone()));
        }

        tracing::info!(
            workflow = def.name,
            session = self.session_id,
            mode = %def.mode,
            "Starting custom workflow"
        );
        self.enforcer.log_event(
            &self.session_id,
            "workflow_started",
            &format!("start custom workflow {}", def.name),
            json!({
                "workflow": def.name,
                "mode": def.mode.as_str(),
                "steps": def.step_count(),
                "context": context.to_json(),
                "task_id": task_id,
            }),
        )?;

        let start = RunStart {
            context,
            task_id,
            first_step: 0,
            approved_checkpoint: None,
            prior: Vec::new(),
        };
        self.run_steps(def, start)
    }

    /// Whether this session already owns an audit stream.
    fn has_audit_records(&self) -> Result<bool> {
        for kind in [LogKind::Decision, LogKind::Event] {
            if self.enforcer.log_path(kind, &self.session_id)?.exists() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Continue this session's run past the checkpoint it halted at.
    ///
    /// Steps processed before the halt are not dispatched again.
    pub fn resume(&self) -> Result<CustomWorkflowResult> {
        let state = self.sessions.load(&self.session_id)?;
        let def = self.store.get(&state.workflow_name)?;
        RigorEnforcer::validate_rigor(&def.name, &def.rigor)?;

        let mismatch = |reason: &str| WorkflowError::ResumeMismatch {
            session_id: self.session_id.clone(),
            reason: reason.to_string(),
        };
        if state.version != SESSION_STATE_VERSION {
            return Err(mismatch("session state was written by an incompatible version"));
        }
        if state.definition_fingerprint != fingerprint(def)? {
            return Err(mismatch("the custom workflow definition changed since the run halted"));
        }
        let step = def
            .steps
            .get(state.next_step)
            .ok_or_else(|| mismatch("the halted step no longer exists"))?;

        tracing::info!(
            workflow = def.name,
            session = self.session_id,
            step = state.next_step,
            "Resuming custom workflow"
        );
        self.enforcer.log_event(
            &self.session_id,
            "checkpoint_approved",
            &format!("checkpoint approved for step {}", step.workflow_name),
            json!({
                "workflow": def.name,
                "step": state.next_step,
                "step_workflow": step.workflow_name,
                "prompt": step.checkpoint,
            }),
        )?;
        self.enforcer.log_decision(
            &self.session_id,
            &format!("resume custom workflow {} at step {}", def.name, step.workflow_name),
            "checkpoint approved by caller",
            json!({ "step": state.next_step, "completed_steps": state.completed.len() }),
        )?;

        self.run_steps(
            def,
            RunStart {
                context: &state.context,
                task_id: state.task_id.as_deref(),
                first_step: state.next_step,
                approved_checkpoint: Some(state.next_step),
                prior: state.completed.clone(),
            },
        )
    }

    fn run_steps(
        &self,
        def: &CustomWorkflowDefinition,
        start: RunStart<'_>,
    ) -> Result<CustomWorkflowResult> {
        let RunStart { context, task_id, first_step, approved_checkpoint, prior } = start;
        let mut results = prior;

        for (index, step) in def.steps.iter().enumerate().skip(first_step) {
            if let Some(ref expression) = step.condition {
                match condition::evaluate(expression, context) {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::debug!(
                            step = step.workflow_name,
                            condition = expression,
                            "Skipping step (condition not met)"
                        );
                        self.enforcer.log_decision(
                            &self.session_id,
                            &format!("skip step {}", step.workflow_name),
                            expression,
                            json!({
                                "step": index,
                                "workflow": step.workflow_name,
                                "condition": expression,
                                "outcome": false,
                            }),
                        )?;
                        results.push(WorkflowStepResult::new(index, step, StepState::Skipped));
                        continue;
                    }
                    Err(e) => return self.halt_on_error(def, results, index, step, &e, None),
                }
            }

            if let Some(ref prompt) = step.checkpoint {
                if approved_checkpoint == Some(index) {
                    tracing::debug!(step = step.workflow_name, "Checkpoint already approved");
                } else if def.mode.honors_checkpoints() {
                    return self
                        .halt_on_checkpoint(def, results, index, step, prompt, context, task_id);
                } else {
                    self.enforcer.log_decision(
                        &self.session_id,
                        &format!("continue past checkpoint before step {}", step.workflow_name),
                        "vibing mode never blocks on checkpoints",
                        json!({ "step": index, "prompt": prompt, "mode": def.mode.as_str() }),
                    )?;
                }
            }

            let descriptor = match self.dispatcher.resolve(&step.workflow_name, context) {
                Ok(descriptor) => descriptor,
                Err(e) => return self.halt_on_error(def, results, index, step, &e, None),
            };

            self.enforcer.log_decision(
                &self.session_id,
                &format!("execute step {}", step.workflow_name),
                step.condition.as_deref().map_or("unconditional step", |_| "condition satisfied"),
                json!({
                    "step": index,
                    "workflow": step.workflow_name,
                    "command": descriptor.command,
                    "condition": step.condition,
                }),
            )?;
            self.enforcer.log_event(
                &self.session_id,
                "workflow_execute",
                "workflow execute",
                json!({
                    "step": index,
                    "workflow": step.workflow_name,
                    "command": descriptor.command,
                    "agents": descriptor.agents,
                }),
            )?;

            tracing::info!(
                step = step.workflow_name,
                command = descriptor.command,
                "Dispatching step"
            );
            let state = match self.executor.execute(&descriptor) {
                StepReport::Succeeded => StepState::Succeeded,
                StepReport::Deferred => StepState::Dispatched,
                StepReport::Failed(message) => {
                    let error = WorkflowError::DispatchFailure {
                        workflow: step.workflow_name.clone(),
                        message,
                    };
                    let dispatch = Some(descriptor);
                    return self.halt_on_error(def, results, index, step, &error, dispatch);
                }
            };

            self.enforcer.log_event(
                &self.session_id,
                "step_reported",
                &format!("step {} {}", step.workflow_name, state_label(state)),
                json!({
                    "step": index,
                    "workflow": step.workflow_name,
                    "state": state_label(state),
                }),
            )?;
            self.sync_task(task_id, &descriptor, state)?;

            let mut result = WorkflowStepResult::new(index, step, state);
            result.dispatch = Some(descriptor);
            results.push(result);
        }

        self.sessions.remove(&self.session_id)?;
        let result =
            CustomWorkflowResult::new(&def.name, &self.session_id, RunStatus::Completed, results);
        self.enforcer.log_event(
            &self.session_id,
            "workflow_completed",
            &format!("custom workflow {} completed", def.name),
            json!({
                "workflow": def.name,
                "steps_executed": result.steps_executed,
                "steps_skipped": result.steps_skipped,
            }),
        )?;
        tracing::info!(
            workflow = def.name,
            executed = result.steps_executed,
            skipped = result.steps_skipped,
            "Custom workflow completed"
        );
        Ok(result)
    }

    #[allow(clippy::too_many_arguments)]
    fn halt_on_checkpoint(
        &self,
        def: &CustomWorkflowDefinition,
        results: Vec<WorkflowStepResult>,
        index: usize,
        step: &WorkflowStepDefinition,
        prompt: &str,
        context: &ExecutionContext,
        task_id: Option<&str>,
    ) -> Result<CustomWorkflowResult> {
        self.enforcer.log_event(
            &self.session_id,
            "checkpoint_reached",
            "checkpoint reached",
            json!({
                "workflow": def.name,
                "step": index,
                "step_workflow": step.workflow_name,
                "prompt": prompt,
            }),
        )?;

        self.sessions.save(&SessionState {
            version: SESSION_STATE_VERSION,
            session_id: self.session_id.clone(),
            workflow_name: def.name.clone(),
            definition_fingerprint: fingerprint(def)?,
            next_step: index,
            context: context.clone(),
            task_id: task_id.map(String::from),
            completed: results.clone(),
            halted_at: chrono::Utc::now().to_rfc3339(),
        })?;

        let status = RunStatus::HaltedOnCheckpoint;
        let mut result = CustomWorkflowResult::new(&def.name, &self.session_id, status, results);
        result.checkpoint = Some(CheckpointHalt {
            step_index: index,
            workflow_name: step.workflow_name.clone(),
            prompt: prompt.to_string(),
        });

        self.log_halt(def, &result)?;
        tracing::info!(workflow = def.name, step = step.workflow_name, "Halted at checkpoint");
        Ok(result)
    }

    fn halt_on_error(
        &self,
        def: &CustomWorkflowDefinition,
        mut results: Vec<WorkflowStepResult>,
        index: usize,
        step: &WorkflowStepDefinition,
        error: &WorkflowError,
        dispatch: Option<DispatchDescriptor>,
    ) -> Result<CustomWorkflowResult> {
        tracing::warn!(
            workflow = def.name,
            step = step.workflow_name,
            error = %error,
            "Step failed"
        );
        self.enforcer.log_event(
            &self.session_id,
            "step_failed",
            &format!("step {} failed", step.workflow_name),
            json!({
                "step": index,
                "workflow": step.workflow_name,
                "error_kind": error.kind(),
                "error": error.to_string(),
            }),
        )?;

        let mut failed = WorkflowStepResult::new(index, step, StepState::Failed);
        failed.error = Some(error.to_string());
        failed.dispatch = dispatch;
        results.push(failed);

        self.sessions.remove(&self.session_id)?;

        let status = RunStatus::HaltedOnError;
        let mut result = CustomWorkflowResult::new(&def.name, &self.session_id, status, results);
        result.error = Some(format!("step {} ({}): {}", index + 1, step.workflow_name, error));
        result.error_kind = Some(error.kind().to_string());

        self.log_halt(def, &result)?;
        Ok(result)
    }

    fn log_halt(
        &self,
        def: &CustomWorkflowDefinition,
        result: &CustomWorkflowResult,
    ) -> Result<()> {
        let status = serde_json::to_value(result.status)?;
        self.enforcer.log_event(
            &self.session_id,
            "workflow_halted",
            &format!("custom workflow {} halted", def.name),
            json!({
                "workflow": def.name,
                "status": status,
                "steps_executed": result.steps_executed,
                "steps_skipped": result.steps_skipped,
                "error": result.error,
            }),
        )
    }

    /// Move the run's task forward. Tracker problems are logged, never fatal.
    fn sync_task(
        &self,
        task_id: Option<&str>,
        descriptor: &DispatchDescriptor,
        state: StepState,
    ) -> Result<()> {
        let Some(task_id) = task_id else {
            return self.enforcer.log_event(
                &self.session_id,
                "task_sync_skipped",
                "no task id for this run",
                json!({ "workflow": descriptor.workflow }),
            );
        };

        let status = descriptor.output_state.as_deref().unwrap_or(DEFAULT_TASK_STATUS);
        let details = |error: Option<String>| -> Value {
            json!({
                "task_id": task_id,
                "status": status,
                "workflow": descriptor.workflow,
                "error": error,
            })
        };

        let Some(ref tracker) = self.tracker else {
            tracing::warn!(task = task_id, "No task tracker configured");
            return self.enforcer.log_event(
                &self.session_id,
                "task_sync_failed",
                "no task tracker configured",
                details(Some("no task tracker configured".to_string())),
            );
        };

        let notes = format!(
            "flowspec: {} {} ({}), session {}",
            descriptor.workflow,
            state_label(state),
            descriptor.command,
            self.session_id
        );
        match tracker.update_task(task_id, status, &notes) {
            Ok(()) => self.enforcer.log_event(
                &self.session_id,
                "task_synced",
                &format!("task {task_id} moved to {status}"),
                details(None),
            ),
            Err(e) => {
                tracing::warn!(task = task_id, error = %e, "Task tracker update failed");
                self.enforcer.log_event(
                    &self.session_id,
                    "task_sync_failed",
                    &format!("task {task_id} update failed"),
                    details(Some(e.to_string())),
                )
            }
        }
    }
}

fn state_label(state: StepState) -> &'static str {
    match state {
        StepState::Skipped => "skipped",
        StepState::Dispatched => "dispatched",
        StepState::Succeeded => "succeeded",
        StepState::Failed => "failed",
    }
}
