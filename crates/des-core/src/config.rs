use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const AUDIT_LOGGING_ENV: &str = "DES_AUDIT_LOGGING_ENABLED";

/// Project settings read from `.nwave/des-config.json`.
///
/// The file is optional and never created automatically. A missing or
/// unreadable file yields the defaults (audit logging on).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesConfig {
    #[serde(default = "default_true")]
    pub audit_logging_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_log_dir: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

impl Default for DesConfig {
    fn default() -> Self {
        Self {
            audit_logging_enabled: true,
            audit_log_dir: None,
        }
    }
}

impl DesConfig {
    pub fn load(root: &Path) -> Self {
        Self::load_from(&paths::des_config_path(root))
    }

    pub fn load_from(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default()
    }

    /// `DES_AUDIT_LOGGING_ENABLED` wins over the file when set.
    pub fn audit_enabled(&self) -> bool {
        match std::env::var(AUDIT_LOGGING_ENV) {
            Ok(v) => matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
            Err(_) => self.audit_logging_enabled,
        }
    }
}
