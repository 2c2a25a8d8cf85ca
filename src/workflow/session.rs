//! Resumable session state.
//!
//! When a run halts at a checkpoint, its position is saved to
//! `<logs-root>/sessions/session-<id>.json` so a later invocation can
//! continue without re-dispatching completed steps.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::context::ExecutionContext;
use super::error::{Result, WorkflowError};
use super::orchestrator::WorkflowStepResult;
use super::rigor::validate_session_id;
use super::schema::CustomWorkflowDefinition;

/// Version of the session state format.
pub const SESSION_STATE_VERSION: u32 = 1;

/// Saved position of a run halted at a checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// State format version
    pub version: u32,

    /// Session being resumed
    pub session_id: String,

    /// Custom workflow being run
    pub workflow_name: String,

    /// Fingerprint of the custom workflow definition at halt time
    pub definition_fingerprint: String,

    /// Index of the step waiting for approval
    pub next_step: usize,

    /// Original run context
    pub context: ExecutionContext,

    /// Task kept in sync with this run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,

    /// Results of the steps processed before the halt
    pub completed: Vec<WorkflowStepResult>,

    /// RFC 3339 UTC timestamp of the halt
    pub halted_at: String,
}

/// Directory of resumable session states.
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    /// Create a store under `logs_root`.
    pub fn new(logs_root: &Path) -> Self {
        Self { root: logs_root.join("sessions") }
    }

    /// Path of a session's state file.
    pub fn path(&self, session_id: &str) -> Result<PathBuf> {
        validate_session_id(session_id)?;
        Ok(self.root.join(format!("session-{session_id}.json")))
    }

    /// Whether a halted run exists for the session.
    pub fn exists(&self, session_id: &str) -> bool {
        self.path(session_id).map(|p| p.exists()).unwrap_or(false)
    }

    /// Save state, replacing any previous state for the session.
    pub fn save(&self, state: &SessionState) -> Result<()> {
        let path = self.path(&state.session_id)?;
        fs::create_dir_all(&self.root).map_err(|e| WorkflowError::io(&self.root, e))?;

        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(state)?;
        let mut file = File::create(&tmp).map_err(|e| WorkflowError::io(&tmp, e))?;
        file.write_all(&content).map_err(|e| WorkflowError::io(&tmp, e))?;
        file.sync_all().map_err(|e| WorkflowError::io(&tmp, e))?;
        drop(file);
        fs::rename(&tmp, &path).map_err(|e| WorkflowError::io(&path, e))?;

        tracing::debug!(
            session = state.session_id,
            next_step = state.next_step,
            "Saved session state"
        );
        Ok(())
    }

    /// Load the state of a halted session.
    pub fn load(&self, session_id: &str) -> Result<SessionState> {
        let path = self.path(session_id)?;
        if !path.exists() {
            return Err(WorkflowError::SessionNotFound(session_id.to_string()));
        }
        let content = fs::read_to_string(&path).map_err(|e| WorkflowError::io(&path, e))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Forget a session's state. Missing state is not an error.
    pub fn remove(&self, session_id: &str) -> Result<()> {
        let path = self.path(session_id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(WorkflowError::io(&path, e)),
        }
    }
}

/// SHA-256 fingerprint of a custom workflow definition.
pub fn fingerprint(definition: &CustomWorkflowDefinition) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(definition.name.as_bytes());
    hasher.update(serde_json::to_vec(definition)?);
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::schema::{RigorFlags, WorkflowMode, WorkflowStepDefinition};
    use tempfile::TempDir;

    fn definition() -> CustomWorkflowDefinition {
        CustomWorkflowDefinition {
            name: "review".to_string(),
            display_name: None,
            description: None,
            mode: WorkflowMode::SpecIng,
            steps: vec![WorkflowStepDefinition {
                workflow_name: "specify".to_string(),
                condition: None,
                checkpoint: Some("Approve?".to_string()),
            }],
            rigor: RigorFlags::enforced(),
        }
    }

    fn state(session_id: &str) -> SessionState {
        SessionState {
            version: SESSION_STATE_VERSION,
            session_id: session_id.to_string(),
            workflow_name: "review".to_string(),
            definition_fingerprint: fingerprint(&definition()).unwrap(),
            next_step: 1,
            context: ExecutionContext::new().with("complexity", 3),
            task_id: Some("task-1".to_string()),
            completed: Vec::new(),
            halted_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    #[test]
    fn test_save_load_remove() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());

        assert!(!store.exists("abc"));
        store.save(&state("abc")).unwrap();
        assert!(store.exists("abc"));
        assert!(dir.path().join("sessions").join("session-abc.json").exists());

        let loaded = store.load("abc").unwrap();
        assert_eq!(loaded, state_with_time(&loaded));

        store.remove("abc").unwrap();
        assert!(!store.exists("abc"));
        store.remove("abc").unwrap();
    }

    fn state_with_time(loaded: &SessionState) -> SessionState {
        SessionState { halted_at: loaded.halted_at.clone(), ..state("abc") }
    }

    #[test]
    fn test_save_replaces_previous_state() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());

        store.save(&state("abc")).unwrap();
        store.save(&SessionState { next_step: 3, ..state("abc") }).unwrap();

        assert_eq!(store.load("abc").unwrap().next_step, 3);
        let files: Vec<_> = fs::read_dir(dir.path().join("sessions"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(files, vec!["session-abc.json"]);
    }

    #[test]
    fn test_load_missing_session() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());
        assert!(matches!(store.load("nope"), Err(WorkflowError::SessionNotFound(_))));
    }

    #[test]
    fn test_fingerprint_tracks_changes() {
        let original = fingerprint(&definition()).unwrap();
        assert_eq!(original, fingerprint(&definition()).unwrap());
        assert_eq!(original.len(), 64);

        let mut changed = definition();
        changed.steps[0].checkpoint = None;
        assert_ne!(original, fingerprint(&changed).unwrap());

        let mut renamed = definition();
        renamed.name = "other".to_string();
        assert_ne!(original, fingerprint(&renamed).unwrap());
    }
}
