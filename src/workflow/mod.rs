//! Custom workflow orchestration.
//!
//! A workflow definition file declares built-in workflows (slash commands
//! run by agents) and custom workflows that chain them:
//!
//! ```yaml
//! custom_workflows:
//!   quick_build:
//!     mode: vibing
//!     steps:
//!       - workflow: specify
//!       - workflow: research
//!         condition: "complexity >= 7"
//!       - workflow: implement
//!         checkpoint: "Review the plan?"
//!     rigor: { log_decisions: true, log_events: true, ... }
//! ```
//!
//! ## Components
//!
//! - [`WorkflowStore`] - Loads and validates definition files
//! - [`Condition`] - Step condition parser and evaluator
//! - [`RigorEnforcer`] - Rigor gate and append-only audit logs
//! - [`StepDispatcher`] - Maps step names to dispatch descriptors
//! - [`Orchestrator`] - Runs steps, halts at checkpoints, resumes sessions

mod condition;
mod context;
mod dispatcher;
mod error;
mod executor;
mod orchestrator;
mod rigor;
mod schema;
mod session;
mod store;
mod tracker;

pub use condition::{evaluate, Comparison, Condition, Literal};
pub use context::ExecutionContext;
pub use dispatcher::{DispatchDescriptor, StepDispatcher};
pub use error::{Result, WorkflowError, EXIT_RUNTIME, EXIT_VALIDATION};
pub use executor::{DeferredExecutor, ShellStepExecutor, StepExecutor, StepReport};
pub use orchestrator::{
    CheckpointHalt, CustomWorkflowResult, Orchestrator, RunStatus, StepState, WorkflowStepResult,
};
pub use rigor::{
    generate_session_id, validate_session_id, LogKind, LogRecord, RigorEnforcer,
    LOG_SCHEMA_VERSION,
};
pub use schema::{
    BuiltinWorkflow, CustomWorkflowDefinition, RigorFlags, WorkflowConfig, WorkflowMode,
    WorkflowStepDefinition,
};
pub use session::{fingerprint, SessionState, SessionStore, SESSION_STATE_VERSION};
pub use store::{SourceFormat, WorkflowStore};
pub use tracker::{CommandTaskTracker, TaskTracker, TrackerError};
