//! Task tracker integration.
//!
//! After each dispatched step the orchestrator moves the run's task to the
//! step's output state. The tracker itself (e.g. a backlog CLI) is external.

use std::collections::HashMap;

use thiserror::Error;

use crate::core::{render_template, ShellRunner};

/// Errors reported by a task tracker.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The tracker rejected the update.
    #[error("task tracker update failed: {0}")]
    UpdateFailed(String),

    /// The tracker could not be reached.
    #[error("task tracker unavailable: {0}")]
    Unavailable(String),
}

/// External task tracker.
pub trait TaskTracker {
    /// Move `task_id` to `status`, attaching `notes`.
    fn update_task(&self, task_id: &str, status: &str, notes: &str) -> Result<(), TrackerError>;
}

/// Tracker that runs a shell command template per update.
///
/// Placeholders: `{{ task_id }}`, `{{ status }}`, `{{ notes }}`, e.g.
/// `backlog task edit {{ task_id }} -s {{ status }} --notes {{ notes }}`.
#[derive(Debug, Clone)]
pub struct CommandTaskTracker {
    template: String,
    runner: ShellRunner,
}

impl CommandTaskTracker {
    /// Create a tracker for a command template.
    pub fn new(template: impl Into<String>) -> Self {
        Self { template: template.into(), runner: ShellRunner::new() }
    }

    /// Use a specific runner (working directory, environment).
    #[must_use]
    pub fn with_runner(mut self, runner: ShellRunner) -> Self {
        self.runner = runner;
        self
    }

    fn command_line(&self, task_id: &str, status: &str, notes: &str) -> String {
        let mut vars = HashMap::new();
        vars.insert("task_id", task_id.to_string());
        vars.insert("status", status.to_string());
        vars.insert("notes", notes.to_string());
        render_template(&self.template, &vars)
    }
}

impl TaskTracker for CommandTaskTracker {
    fn update_task(&self, task_id: &str, status: &str, notes: &str) -> Result<(), TrackerError> {
        let command = self.command_line(task_id, status, notes);
        let result = self.runner.run(&command).map_err(|e| TrackerError::Unavailable(e.to_string()))?;

        if result.success() {
            tracing::debug!(task = task_id, status = status, "Updated task");
            Ok(())
        } else {
            Err(TrackerError::UpdateFailed(result.failure_message()))
        }
    }
}
