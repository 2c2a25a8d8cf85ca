//! # flowspec
//!
//! Workflow orchestrator for spec-driven development.
//!
//! flowspec chains built-in workflows (slash commands run by AI agents) into
//! named custom workflows, runs their steps in order, skips steps whose
//! conditions are false, pauses at approval checkpoints, and writes every
//! decision and event to an append-only audit log.
//!
//! ## Features
//!
//! - **Custom Workflows**: Ordered step sequences declared in YAML or JSON
//! - **Conditions**: `complexity >= 7` style guards evaluated per run
//! - **Checkpoints**: Spec-ing mode halts for approval and resumes later
//! - **Rigor**: Decision/event logging and task tracking cannot be disabled
//!
//! ## Quick Start
//!
//! ```bash
//! # Show the custom workflows of flowspec_workflow.yml
//! flowspec list
//!
//! # Run one
//! flowspec run quick_build -c complexity=8
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow common patterns that are intentional in this codebase
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::needless_lifetimes)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::redundant_closure_for_method_calls)]
#![allow(clippy::use_self)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::cast_precision_loss)]

pub mod core;
pub mod workflow;

// Re-export commonly used types
pub use core::Config;
pub use workflow::{
    CustomWorkflowResult, ExecutionContext, Orchestrator, WorkflowError, WorkflowStore,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "flowspec";
