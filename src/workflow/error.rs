//! Workflow orchestration error types.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for workflow operations.
pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Exit code for a definition that failed validation.
pub const EXIT_VALIDATION: u8 = 1;

/// Exit code for a run that failed while evaluating or dispatching a step.
pub const EXIT_RUNTIME: u8 = 2;

/// Errors that can occur while loading or running workflows.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The workflow definition failed structural validation.
    #[error("Schema error at {location}: {message}")]
    Schema { location: String, message: String },

    /// A custom workflow disables (or omits) a mandatory rigor flag.
    #[error("Rigor violation in custom workflow '{workflow}': {} must be true", flags.join(", "))]
    RigorViolation { workflow: String, flags: Vec<String> },

    /// A custom workflow name is not present in the definition.
    #[error("Custom workflow '{name}' not found (available: {})", available.join(", "))]
    NotFound { name: String, available: Vec<String> },

    /// A condition references a key missing from the run context.
    #[error("Condition '{expression}' references '{variable}', which is not set in the run context")]
    UnboundVariable { variable: String, expression: String },

    /// A condition expression could not be parsed.
    #[error("Invalid condition '{expression}': {reason}")]
    ConditionSyntax { expression: String, reason: String },

    /// A condition compares values of incompatible types.
    #[error("Condition '{expression}' cannot compare {left} with {right}")]
    TypeMismatch { expression: String, left: String, right: String },

    /// A step names a built-in workflow that is not defined.
    #[error("Unknown workflow '{name}' (known workflows: {})", known.join(", "))]
    UnknownWorkflow { name: String, known: Vec<String> },

    /// The step executor reported that a dispatched step failed.
    #[error("Workflow '{workflow}' failed: {message}")]
    DispatchFailure { workflow: String, message: String },

    /// A session id contains characters that are not allowed in log paths.
    #[error("Invalid session id '{0}': only letters, digits, '-' and '_' are allowed")]
    InvalidSessionId(String),

    /// No resumable state exists for the session.
    #[error("No halted run found for session '{0}'")]
    SessionNotFound(String),

    /// A fresh run was requested for a session that already ran or is halted.
    #[error("Session '{0}' already has a run; resume it if halted at a checkpoint, or use a new session id")]
    SessionInUse(String),

    /// The definition changed since the session halted.
    #[error("Cannot resume session '{session_id}': {reason}")]
    ResumeMismatch { session_id: String, reason: String },

    /// IO error.
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WorkflowError {
    /// Build a schema error for a dotted field location.
    pub fn schema(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Schema { location: location.into(), message: message.into() }
    }

    /// Wrap an IO error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    /// Short name of the error class, as shown to users.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Schema { .. } => "SchemaError",
            Self::RigorViolation { .. } => "RigorViolationError",
            Self::NotFound { .. } => "NotFoundError",
            Self::UnboundVariable { .. } => "UnboundVariableError",
            Self::ConditionSyntax { .. } => "ConditionSyntaxError",
            Self::TypeMismatch { .. } => "TypeMismatchError",
            Self::UnknownWorkflow { .. } => "UnknownWorkflowError",
            Self::DispatchFailure { .. } => "DispatchFailure",
            Self::InvalidSessionId(_) => "InvalidSessionId",
            Self::SessionNotFound(_) => "SessionNotFound",
            Self::SessionInUse(_) => "SessionInUse",
            Self::ResumeMismatch { .. } => "ResumeMismatch",
            Self::Io { .. } => "IoError",
            Self::Serialization(_) => "SerializationError",
        }
    }

    /// Whether this error stems from evaluating or dispatching a step.
    pub fn is_runtime(&self) -> bool {
        matches!(
            self,
            Self::UnboundVariable { .. }
                | Self::ConditionSyntax { .. }
                | Self::TypeMismatch { .. }
                | Self::UnknownWorkflow { .. }
                | Self::DispatchFailure { .. }
        )
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        if self.is_runtime() {
            EXIT_RUNTIME
        } else {
            EXIT_VALIDATION
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rigor_violation_names_flags() {
        let err = WorkflowError::RigorViolation {
            workflow: "quick".to_string(),
            flags: vec!["rigor.log_decisions".to_string(), "rigor.log_events".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("quick"));
        assert!(msg.contains("rigor.log_decisions, rigor.log_events"));
        assert_eq!(err.exit_code(), EXIT_VALIDATION);
    }

    #[test]
    fn test_runtime_errors_exit_two() {
        let err = WorkflowError::UnboundVariable {
            variable: "complexity".to_string(),
            expression: "complexity >= 7".to_string(),
        };
        assert!(err.is_runtime());
        assert_eq!(err.exit_code(), EXIT_RUNTIME);
        assert_eq!(err.kind(), "UnboundVariableError");
    }
}
