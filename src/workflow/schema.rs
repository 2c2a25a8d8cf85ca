//! Workflow definition schema.
//!
//! Defines the YAML/JSON structure of a workflow definition file:
//! built-in workflows, informational task states, and user-defined
//! custom sequences.

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};

/// A complete workflow definition document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Version of the definition format
    pub version: String,

    /// Task states, in order (consumed by the task tracker)
    #[serde(default)]
    pub states: Vec<String>,

    /// Built-in workflows keyed by name
    #[serde(default, deserialize_with = "unique_map")]
    pub workflows: BTreeMap<String, BuiltinWorkflow>,

    /// User-defined sequences keyed by name
    #[serde(default, deserialize_with = "unique_map")]
    pub custom_workflows: BTreeMap<String, CustomWorkflowDefinition>,
}

/// A built-in workflow and the external command that runs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuiltinWorkflow {
    /// Command identifier understood by the calling environment (e.g. "/flow:specify")
    pub command: String,

    /// Agents participating in this workflow
    #[serde(default)]
    pub agents: Vec<String>,

    /// Description of this workflow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Task states this workflow accepts
    #[serde(default)]
    pub input_states: Vec<String>,

    /// Task state after this workflow succeeds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_state: Option<String>,
}

/// A user-defined named sequence of workflow steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CustomWorkflowDefinition {
    /// Key of this workflow in `custom_workflows` (filled in at load time)
    #[serde(skip)]
    pub name: String,

    /// Human-readable name
    #[serde(rename = "name", alias = "display_name", default)]
    pub display_name: Option<String>,

    /// Description of what this sequence does
    #[serde(default)]
    pub description: Option<String>,

    /// Execution mode
    pub mode: WorkflowMode,

    /// Steps, in execution order
    pub steps: Vec<WorkflowStepDefinition>,

    /// Mandatory audit flags
    #[serde(default)]
    pub rigor: RigorFlags,
}

/// One step of a custom workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowStepDefinition {
    /// Built-in workflow this step invokes
    #[serde(rename = "workflow", alias = "workflow_name")]
    pub workflow_name: String,

    /// Condition for running this step (e.g., "complexity >= 7")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    /// Approval prompt shown before this step runs (spec-ing mode only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<String>,
}

/// How a custom workflow treats checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowMode {
    /// Fully autonomous; never blocks on a checkpoint.
    #[serde(rename = "vibing")]
    Vibing,

    /// Pauses at checkpoints for explicit approval.
    #[serde(rename = "spec-ing")]
    SpecIng,
}

impl WorkflowMode {
    /// Whether checkpoints halt the run in this mode.
    pub fn honors_checkpoints(self) -> bool {
        matches!(self, Self::SpecIng)
    }

    /// The name used in definition files.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vibing => "vibing",
            Self::SpecIng => "spec-ing",
        }
    }
}

impl fmt::Display for WorkflowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The five audit flags every custom workflow must enable.
///
/// A flag that is absent counts as disabled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RigorFlags {
    /// Record a decision log entry for every orchestration decision
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_decisions: Option<bool>,

    /// Record an event log entry for every transition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_events: Option<bool>,

    /// Keep the external task tracker in sync
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backlog_integration: Option<bool>,

    /// Persist run state so halted sessions can resume
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_tracking: Option<bool>,

    /// Follow the project constitution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_constitution: Option<bool>,
}

impl RigorFlags {
    /// Flag names, in definition order.
    pub const NAMES: [&'static str; 5] =
        ["log_decisions", "log_events", "backlog_integration", "memory_tracking", "follow_constitution"];

    /// Flags with every audit switch enabled.
    pub fn enforced() -> Self {
        Self {
            log_decisions: Some(true),
            log_events: Some(true),
            backlog_integration: Some(true),
            memory_tracking: Some(true),
            follow_constitution: Some(true),
        }
    }

    /// Each flag paired with its value.
    pub fn entries(&self) -> [(&'static str, Option<bool>); 5] {
        [
            (Self::NAMES[0], self.log_decisions),
            (Self::NAMES[1], self.log_events),
            (Self::NAMES[2], self.backlog_integration),
            (Self::NAMES[3], self.memory_tracking),
            (Self::NAMES[4], self.follow_constitution),
        ]
    }

    /// Names of flags that are not explicitly `true`.
    pub fn disabled(&self) -> Vec<&'static str> {
        self.entries().into_iter().filter(|(_, v)| *v != Some(true)).map(|(n, _)| n).collect()
    }
}

impl CustomWorkflowDefinition {
    /// Get the number of steps.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Display name, falling back to the key.
    pub fn title(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }
}

/// Deserialize a mapping, rejecting duplicate keys.
fn unique_map<'de, D, V>(deserializer: D) -> Result<BTreeMap<String, V>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    struct UniqueMapVisitor<V>(PhantomData<V>);

    impl<'de, V: Deserialize<'de>> Visitor<'de> for UniqueMapVisitor<V> {
        type Value = BTreeMap<String, V>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a mapping with unique names")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
            let mut map = BTreeMap::new();
            while let Some(key) = access.next_key::<String>()? {
                if map.contains_key(&key) {
                    return Err(de::Error::custom(format!("duplicate name '{key}'")));
                }
                let value = access.next_value()?;
                map.insert(key, value);
            }
            Ok(map)
        }
    }

    deserializer.deserialize_map(UniqueMapVisitor(PhantomData))
}
