//! Run-time execution context.
//!
//! Key/value pairs supplied by the caller for one orchestrator run and
//! consumed by step conditions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key/value mapping supplied for a single run (e.g. `{"complexity": 8}`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionContext {
    values: BTreeMap<String, Value>,
}

impl ExecutionContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Builder-style variant of [`ExecutionContext::set`].
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Get a value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Whether the context has no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over keys and values in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Parse `key=value` assignments.
    ///
    /// Values become numbers when they parse as one, then booleans,
    /// otherwise strings.
    pub fn from_assignments<S: AsRef<str>>(assignments: &[S]) -> anyhow::Result<Self> {
        let mut ctx = Self::new();
        for assignment in assignments {
            let assignment = assignment.as_ref();
            let (key, value) = assignment
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("Expected key=value, got '{assignment}'"))?;
            let key = key.trim();
            if key.is_empty() {
                anyhow::bail!("Empty key in context assignment '{assignment}'");
            }
            ctx.set(key, parse_scalar(value.trim()));
        }
        Ok(ctx)
    }

    /// Render as a JSON object, for log payloads.
    pub fn to_json(&self) -> Value {
        Value::Object(self.values.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

fn parse_scalar(raw: &str) -> Value {
    if let Ok(n) = raw.parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(f) = raw.parse::<f64>() {
        if f.is_finite() {
            return Value::from(f);
        }
    }
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_assignments_infers_types() {
        let ctx =
            ExecutionContext::from_assignments(&["complexity=8", "ratio=0.5", "fast=true", "env=prod"])
                .unwrap();

        assert_eq!(ctx.get("complexity"), Some(&Value::from(8)));
        assert_eq!(ctx.get("ratio"), Some(&Value::from(0.5)));
        assert_eq!(ctx.get("fast"), Some(&Value::Bool(true)));
        assert_eq!(ctx.get("env"), Some(&Value::from("prod")));
    }

    #[test]
    fn test_from_assignments_rejects_missing_equals() {
        assert!(ExecutionContext::from_assignments(&["complexity"]).is_err());
        assert!(ExecutionContext::from_assignments(&["=5"]).is_err());
    }

    #[test]
    fn test_value_may_contain_equals() {
        let ctx = ExecutionContext::from_assignments(&["expr=a=b"]).unwrap();
        assert_eq!(ctx.get("expr"), Some(&Value::from("a=b")));
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let ctx = ExecutionContext::new().with("complexity", 5);
        assert_eq!(serde_json::to_string(&ctx).unwrap(), r#"{"complexity":5}"#);
        assert_eq!(ctx.to_json(), serde_json::json!({"complexity": 5}));
    }
}
