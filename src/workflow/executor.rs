//! Step executors.
//!
//! The orchestrator hands each dispatch descriptor to a [`StepExecutor`] and
//! waits for its report before moving to the next step.

use std::collections::HashMap;

use crate::core::{render_template, ShellRunner};

use super::dispatcher::DispatchDescriptor;

/// Outcome reported back for a dispatched step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepReport {
    /// The step ran and succeeded.
    Succeeded,

    /// The step was handed off; the caller runs it out of band.
    Deferred,

    /// The step ran and failed.
    Failed(String),
}

/// Runs (or hands off) a dispatched step.
pub trait StepExecutor {
    /// Execute the step described by `descriptor` and report the outcome.
    fn execute(&self, descriptor: &DispatchDescriptor) -> StepReport;
}

/// Executor that only records the dispatch; the caller runs the descriptor.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeferredExecutor;

impl StepExecutor for DeferredExecutor {
    fn execute(&self, descriptor: &DispatchDescriptor) -> StepReport {
        tracing::debug!(workflow = descriptor.workflow, command = descriptor.command, "Deferring step to caller");
        StepReport::Deferred
    }
}

/// Executor that runs a shell command template per step.
///
/// Placeholders: `{{ command }}`, `{{ workflow }}`, `{{ agents }}`,
/// `{{ output_state }}`. The run context is exported as JSON in
/// `FLOWSPEC_CONTEXT`.
#[derive(Debug, Clone)]
pub struct ShellStepExecutor {
    template: String,
    runner: ShellRunner,
}

impl ShellStepExecutor {
    /// Create an executor for a command template.
    pub fn new(template: impl Into<String>) -> Self {
        Self { template: template.into(), runner: ShellRunner::new() }
    }

    /// Use a specific runner (working directory, environment).
    #[must_use]
    pub fn with_runner(mut self, runner: ShellRunner) -> Self {
        self.runner = runner;
        self
    }

    fn command_line(&self, descriptor: &DispatchDescriptor) -> String {
        let mut vars = HashMap::new();
        vars.insert("command", descriptor.command.clone());
        vars.insert("workflow", descriptor.workflow.clone());
        vars.insert("agents", descriptor.agents.join(","));
        vars.insert("output_state", descriptor.output_state.clone().unwrap_or_default());
        render_template(&self.template, &vars)
    }
}

impl StepExecutor for ShellStepExecutor {
    fn execute(&self, descriptor: &DispatchDescriptor) -> StepReport {
        let command = self.command_line(descriptor);
        let runner = self
            .runner
            .clone()
            .with_env("FLOWSPEC_WORKFLOW", descriptor.workflow.clone())
            .with_env("FLOWSPEC_COMMAND", descriptor.command.clone())
            .with_env("FLOWSPEC_CONTEXT", descriptor.context.to_json().to_string());

        tracing::info!(workflow = descriptor.workflow, command = command, "Executing step");

        match runner.run(&command) {
            Ok(result) if result.success() => StepReport::Succeeded,
            Ok(result) => StepReport::Failed(result.failure_message()),
            Err(e) => StepReport::Failed(format!("failed to spawn executor: {e}")),
        }
    }
}
