//! Workflow definition store.
//!
//! Parses a workflow definition file, validates it, and indexes custom
//! workflows by name. A store that exists is valid: every custom workflow
//! has all rigor flags enabled and only references known workflows.

use std::path::{Path, PathBuf};

use super::condition::Condition;
use super::error::{Result, WorkflowError};
use super::rigor::RigorEnforcer;
use super::schema::{BuiltinWorkflow, CustomWorkflowDefinition, WorkflowConfig};

/// Format of a definition source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Yaml,
    Json,
}

impl SourceFormat {
    /// Pick the format from a file extension (`.json` is JSON, anything else YAML).
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Yaml,
        }
    }
}

/// A loaded and validated workflow definition.
#[derive(Debug, Clone)]
pub struct WorkflowStore {
    config: WorkflowConfig,
    source: Option<PathBuf>,
}

impl WorkflowStore {
    /// Load and validate a definition file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| WorkflowError::io(path, e))?;
        let mut store = Self::load_str(&content, SourceFormat::from_path(path))?;
        store.source = Some(path.to_path_buf());
        tracing::debug!(path = ?path, workflows = store.config.custom_workflows.len(), "Loaded workflow definition");
        Ok(store)
    }

    /// Load and validate a definition from a string.
    pub fn load_str(content: &str, format: SourceFormat) -> Result<Self> {
        let config: WorkflowConfig = match format {
            SourceFormat::Yaml => serde_yaml::from_str(content).map_err(|e| {
                let location = e
                    .location()
                    .map(|l| format!("line {} column {}", l.line(), l.column()))
                    .unwrap_or_else(|| "document".to_string());
                WorkflowError::schema(location, e.to_string())
            })?,
            SourceFormat::Json => serde_json::from_str(content).map_err(|e| {
                WorkflowError::schema(format!("line {} column {}", e.line(), e.column()), e.to_string())
            })?,
        };
        Self::from_config(config)
    }

    /// Validate an already-parsed definition.
    pub fn from_config(mut config: WorkflowConfig) -> Result<Self> {
        for (name, def) in &mut config.custom_workflows {
            def.name.clone_from(name);
        }
        validate_config(&config)?;
        Ok(Self { config, source: None })
    }

    /// Custom workflow names in lexical order.
    pub fn list_names(&self) -> Vec<&str> {
        self.config.custom_workflows.keys().map(String::as_str).collect()
    }

    /// Look up a custom workflow.
    pub fn get(&self, name: &str) -> Result<&CustomWorkflowDefinition> {
        self.config.custom_workflows.get(name).ok_or_else(|| WorkflowError::NotFound {
            name: name.to_string(),
            available: self.list_names().into_iter().map(String::from).collect(),
        })
    }

    /// All custom workflows in lexical order.
    pub fn custom_workflows(&self) -> impl Iterator<Item = &CustomWorkflowDefinition> {
        self.config.custom_workflows.values()
    }

    /// Look up a built-in workflow.
    pub fn builtin(&self, name: &str) -> Option<&BuiltinWorkflow> {
        self.config.workflows.get(name)
    }

    /// The validated definition.
    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// File this store was loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}

fn validate_config(config: &WorkflowConfig) -> Result<()> {
    if config.version.trim().is_empty() {
        return Err(WorkflowError::schema("version", "must not be empty"));
    }

    for (name, workflow) in &config.workflows {
        if workflow.command.trim().is_empty() {
            return Err(WorkflowError::schema(
                format!("workflows.{name}.command"),
                "must not be empty",
            ));
        }

        if !config.states.is_empty() {
            let undeclared = workflow
                .input_states
                .iter()
                .map(|s| ("input_states", s))
                .chain(workflow.output_state.iter().map(|s| ("output_state", s)))
                .find(|(_, state)| !config.states.contains(state));
            if let Some((field, state)) = undeclared {
                return Err(WorkflowError::schema(
                    format!("workflows.{name}.{field}"),
                    format!("state '{state}' is not declared in states"),
                ));
            }
        }
    }

    for (name, def) in &config.custom_workflows {
        RigorEnforcer::validate_rigor(name, &def.rigor)?;
        validate_steps(config, name, def)?;
    }

    Ok(())
}

fn validate_steps(config: &WorkflowConfig, name: &str, def: &CustomWorkflowDefinition) -> Result<()> {
    if def.steps.is_empty() {
        return Err(WorkflowError::schema(
            format!("custom_workflows.{name}.steps"),
            "must contain at least one step",
        ));
    }

    for (i, step) in def.steps.iter().enumerate() {
        if !config.workflows.contains_key(&step.workflow_name) {
            let known: Vec<&str> = config.workflows.keys().map(String::as_str).collect();
            return Err(WorkflowError::schema(
                format!("custom_workflows.{name}.steps[{i}].workflow"),
                format!("unknown workflow '{}' (known: {})", step.workflow_name, known.join(", ")),
            ));
        }

        if let Some(ref condition) = step.condition {
            Condition::parse(condition).map_err(|e| {
                WorkflowError::schema(format!("custom_workflows.{name}.steps[{i}].condition"), e.to_string())
            })?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::schema::WorkflowMode;

    const BASE: &str = r#"
version: "1.0"
states: [To Do, Specified, Planned]
workflows:
  specify:
    command: /flow:specify
    output_state: Specified
  plan:
    command: /flow:plan
    output_state: Planned
"#;

    const RIGOR: &str = r"
    rigor:
      log_decisions: true
      log_events: true
      backlog_integration: true
      memory_tracking: true
      follow_constitution: true
";

    fn definition(custom: &str) -> String {
        format!("{BASE}custom_workflows:\n{custom}")
    }

    #[test]
    fn test_load_valid_definition() {
        let yaml = definition(&format!(
            "  zeta:\n    mode: vibing\n    steps:\n      - workflow: plan\n{RIGOR}  alpha:\n    mode: spec-ing\n    steps:\n      - workflow: specify\n{RIGOR}"
        ));

        let store = WorkflowStore::load_str(&yaml, SourceFormat::Yaml).unwrap();

        assert_eq!(store.list_names(), vec!["alpha", "zeta"]);
        let alpha = store.get("alpha").unwrap();
        assert_eq!(alpha.name, "alpha");
        assert_eq!(alpha.mode, WorkflowMode::SpecIng);
        assert_eq!(store.builtin("plan").unwrap().command, "/flow:plan");
    }

    #[test]
    fn test_get_unknown_lists_available() {
        let yaml = definition(&format!("  alpha:\n    mode: vibing\n    steps:\n      - workflow: plan\n{RIGOR}"));
        let store = WorkflowStore::load_str(&yaml, SourceFormat::Yaml).unwrap();

        match store.get("missing") {
            Err(WorkflowError::NotFound { name, available }) => {
                assert_eq!(name, "missing");
                assert_eq!(available, vec!["alpha"]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_disabled_rigor_flag_rejected() {
        let rigor = RIGOR.replace("log_decisions: true", "log_decisions: false");
        let yaml = definition(&format!("  alpha:\n    mode: vibing\n    steps:\n      - workflow: plan\n{rigor}"));

        let err = WorkflowStore::load_str(&yaml, SourceFormat::Yaml).unwrap_err();
        assert!(matches!(err, WorkflowError::RigorViolation { .. }));
        assert!(err.to_string().contains("log_decisions"));
    }

    #[test]
    fn test_missing_rigor_block_rejected() {
        let yaml = definition("  alpha:\n    mode: vibing\n    steps:\n      - workflow: plan\n");
        let err = WorkflowStore::load_str(&yaml, SourceFormat::Yaml).unwrap_err();
        match err {
            WorkflowError::RigorViolation { flags, .. } => assert_eq!(flags.len(), 5),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_workflow_reference_rejected() {
        let yaml = definition(&format!("  alpha:\n    mode: vibing\n    steps:\n      - workflow: bogus\n{RIGOR}"));

        match WorkflowStore::load_str(&yaml, SourceFormat::Yaml).unwrap_err() {
            WorkflowError::Schema { location, message } => {
                assert_eq!(location, "custom_workflows.alpha.steps[0].workflow");
                assert!(message.contains("bogus"));
                assert!(message.contains("plan, specify"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_mode_rejected() {
        let yaml = definition(&format!("  alpha:\n    mode: turbo\n    steps:\n      - workflow: plan\n{RIGOR}"));
        assert!(matches!(
            WorkflowStore::load_str(&yaml, SourceFormat::Yaml),
            Err(WorkflowError::Schema { .. })
        ));
    }

    #[test]
    fn test_malformed_condition_rejected_at_load() {
        let yaml = definition(&format!(
            "  alpha:\n    mode: vibing\n    steps:\n      - workflow: plan\n        condition: \"complexity >=\"\n{RIGOR}"
        ));

        match WorkflowStore::load_str(&yaml, SourceFormat::Yaml).unwrap_err() {
            WorkflowError::Schema { location, .. } => {
                assert_eq!(location, "custom_workflows.alpha.steps[0].condition");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_empty_steps_rejected() {
        let yaml = definition(&format!("  alpha:\n    mode: vibing\n    steps: []\n{RIGOR}"));
        assert!(matches!(
            WorkflowStore::load_str(&yaml, SourceFormat::Yaml),
            Err(WorkflowError::Schema { .. })
        ));
    }

    #[test]
    fn test_undeclared_state_rejected() {
        let yaml = BASE.replace("output_state: Planned", "output_state: Shipped");
        match WorkflowStore::load_str(&yaml, SourceFormat::Yaml).unwrap_err() {
            WorkflowError::Schema { location, .. } => assert_eq!(location, "workflows.plan.output_state"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_load_json_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("workflow.json");
        std::fs::write(
            &path,
            r#"{
                "version": "1.0",
                "workflows": {"plan": {"command": "/flow:plan"}},
                "custom_workflows": {
                    "solo": {
                        "mode": "vibing",
                        "steps": [{"workflow": "plan"}],
                        "rigor": {
                            "log_decisions": true, "log_events": true,
                            "backlog_integration": true, "memory_tracking": true,
                            "follow_constitution": true
                        }
                    }
                }
            }"#,
        )
        .unwrap();

        let store = WorkflowStore::load(&path).unwrap();
        assert_eq!(store.list_names(), vec!["solo"]);
        assert_eq!(store.source(), Some(path.as_path()));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = WorkflowStore::load(Path::new("/definitely/not/here.yml")).unwrap_err();
        assert!(matches!(err, WorkflowError::Io { .. }));
    }
}
