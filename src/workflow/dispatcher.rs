//! Step dispatch.
//!
//! Maps a built-in workflow name to the descriptor a caller needs to run it.
//! Nothing is executed here.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::context::ExecutionContext;
use super::error::{Result, WorkflowError};
use super::schema::BuiltinWorkflow;
use super::store::WorkflowStore;

/// What the caller should invoke for one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchDescriptor {
    /// Built-in workflow name
    pub workflow: String,

    /// Command identifier understood by the calling environment
    pub command: String,

    /// Agents participating in the workflow
    pub agents: Vec<String>,

    /// Task state after the workflow succeeds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_state: Option<String>,

    /// Run context passed along to the invocation
    pub context: ExecutionContext,
}

/// Closed lookup table of built-in workflows.
#[derive(Debug, Clone, Default)]
pub struct StepDispatcher {
    table: BTreeMap<String, BuiltinWorkflow>,
}

impl StepDispatcher {
    /// Create a dispatcher over an explicit table.
    pub fn new(table: BTreeMap<String, BuiltinWorkflow>) -> Self {
        Self { table }
    }

    /// Create a dispatcher over a store's built-in workflows.
    pub fn from_store(store: &WorkflowStore) -> Self {
        Self::new(store.config().workflows.clone())
    }

    /// Names this dispatcher can resolve, in lexical order.
    pub fn known_names(&self) -> Vec<&str> {
        self.table.keys().map(String::as_str).collect()
    }

    /// Resolve a workflow name to its descriptor.
    pub fn resolve(&self, workflow_name: &str, context: &ExecutionContext) -> Result<DispatchDescriptor> {
        let workflow = self.table.get(workflow_name).ok_or_else(|| WorkflowError::UnknownWorkflow {
            name: workflow_name.to_string(),
            known: self.known_names().into_iter().map(String::from).collect(),
        })?;

        Ok(DispatchDescriptor {
            workflow: workflow_name.to_string(),
            command: workflow.command.clone(),
            agents: workflow.agents.clone(),
            output_state: workflow.output_state.clone(),
            context: context.clone(),
        })
    }
}
