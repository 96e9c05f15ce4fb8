//! Signal files under `.nwave/des/` that carry DES task context from the
//! pre-tool-use hook to the subagent-stop hook.

use crate::clock::audit_timestamp;
use crate::error::Result;
use crate::io;
use crate::paths;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSignal {
    #[serde(default)]
    pub step_id: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_correlation_id: Option<String>,
}

impl TaskSignal {
    pub fn new(project_id: &str, step_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            step_id: step_id.to_string(),
            project_id: project_id.to_string(),
            created_at: audit_timestamp(now),
            task_correlation_id: Some(uuid::Uuid::new_v4().to_string()),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.project_id.is_empty() && !self.step_id.is_empty()
    }
}

/// Write the namespaced signal and the legacy singleton.
pub fn create(root: &Path, signal: &TaskSignal) -> Result<()> {
    io::ensure_dir(&paths::des_dir(root))?;
    let body = serde_json::to_string(signal)?;
    io::atomic_write(
        &paths::signal_path(root, &signal.project_id, &signal.step_id),
        body.as_bytes(),
    )?;
    io::atomic_write(&paths::legacy_signal_path(root), body.as_bytes())
}

/// Prefer the namespaced signal for `project_id`/`step_id`, falling back to
/// the legacy singleton. Unreadable signals count as absent.
pub fn read(root: &Path, project_id: &str, step_id: &str) -> Option<TaskSignal> {
    let mut candidates = Vec::with_capacity(2);
    if !project_id.is_empty() && !step_id.is_empty() {
        candidates.push(paths::signal_path(root, project_id, step_id));
    }
    candidates.push(paths::legacy_signal_path(root));
    let path = candidates.into_iter().find(|p| p.exists())?;
    let text = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&text).ok()
}

/// Remove the namespaced and legacy signals. Both are attempted; the first
/// failure is returned.
pub fn remove(root: &Path, project_id: &str, step_id: &str) -> Result<()> {
    let namespaced = if !project_id.is_empty() && !step_id.is_empty() {
        io::remove_if_exists(&paths::signal_path(root, project_id, step_id)).map(|_| ())
    } else {
        Ok(())
    };
    let legacy = io::remove_if_exists(&paths::legacy_signal_path(root)).map(|_| ());
    namespaced.and(legacy)
}

pub fn des_task_active(root: &Path) -> bool {
    paths::legacy_signal_path(root).exists()
}

pub fn deliver_session_active(root: &Path) -> bool {
    paths::deliver_session_path(root).exists()
}
