use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Project-level constants
// ---------------------------------------------------------------------------

pub const NWAVE_DIR: &str = ".nwave";
pub const DES_DIR: &str = ".nwave/des";
pub const DES_LOGS_DIR: &str = ".nwave/des/logs";
pub const DES_CONFIG_FILE: &str = ".nwave/des-config.json";
pub const SCHEMA_OVERRIDE_FILE: &str = ".nwave/step-tdd-cycle-schema.json";

pub const DELIVER_SESSION_FILE: &str = "deliver-session.json";
pub const TASK_ACTIVE_FILE: &str = "des-task-active";

pub const FEATURE_DOCS_DIR: &str = "docs/feature";
pub const EXECUTION_LOG_FILE: &str = "execution-log.yaml";
pub const ROADMAP_FILE: &str = "roadmap.yaml";

pub const GITHUB_HOOKS_DIR: &str = ".github/hooks";
pub const GITHUB_PROMPTS_DIR: &str = ".github/prompts";

// ---------------------------------------------------------------------------
// User-level constants (relative to $HOME)
// ---------------------------------------------------------------------------

pub const COPILOT_AGENTS_DIR: &str = ".copilot/agents";
pub const COPILOT_SKILLS_DIR: &str = ".copilot/skills";
pub const CLAUDE_AUDIT_LOGS_DIR: &str = ".claude/des/logs";

// ---------------------------------------------------------------------------
// Framework source layout
// ---------------------------------------------------------------------------

pub const FRAMEWORK_DIR: &str = "nWave";
pub const FRAMEWORK_AGENTS_DIR: &str = "nWave/agents";
pub const FRAMEWORK_SKILLS_DIR: &str = "nWave/skills";
pub const FRAMEWORK_TASKS_DIR: &str = "nWave/tasks/nw";
pub const ROADMAP_SCHEMA_FILE: &str = "nWave/templates/roadmap-schema.yaml";

/// Prefix shared by every file or directory the installer owns.
pub const NW_PREFIX: &str = "nw-";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn des_dir(root: &Path) -> PathBuf {
    root.join(DES_DIR)
}

pub fn des_config_path(root: &Path) -> PathBuf {
    root.join(DES_CONFIG_FILE)
}

pub fn schema_override_path(root: &Path) -> PathBuf {
    root.join(SCHEMA_OVERRIDE_FILE)
}

pub fn deliver_session_path(root: &Path) -> PathBuf {
    des_dir(root).join(DELIVER_SESSION_FILE)
}

pub fn legacy_signal_path(root: &Path) -> PathBuf {
    des_dir(root).join(TASK_ACTIVE_FILE)
}

/// Namespaced signal for one project/step pair. Slashes are flattened so the
/// name stays a single path component.
pub fn signal_path(root: &Path, project_id: &str, step_id: &str) -> PathBuf {
    let safe = format!("{project_id}--{step_id}").replace('/', "_");
    des_dir(root).join(format!("{TASK_ACTIVE_FILE}-{safe}"))
}

pub fn feature_dir(root: &Path, project_id: &str) -> PathBuf {
    root.join(FEATURE_DOCS_DIR).join(project_id)
}

pub fn execution_log_path(root: &Path, project_id: &str) -> PathBuf {
    feature_dir(root, project_id).join(EXECUTION_LOG_FILE)
}

pub fn github_hooks_dir(root: &Path) -> PathBuf {
    root.join(GITHUB_HOOKS_DIR)
}

pub fn github_prompts_dir(root: &Path) -> PathBuf {
    root.join(GITHUB_PROMPTS_DIR)
}
