//! Core functionality for flowspec.
//!
//! This module contains the application configuration and the shell
//! execution layer shared by the step executor and the task tracker.

mod config;
mod executor;

pub use config::{Config, ExecutorConfig, GeneralConfig, TrackerConfig, LOCAL_CONFIG_FILE};
pub use executor::{render_template, shell_quote, ExecutionResult, ShellRunner};
