//! TDD cycle schema: which phases a step must record and how they may be skipped.
//!
//! The compiled-in defaults describe schema v4.0. A project may override them
//! with `.nwave/step-tdd-cycle-schema.json` or `DES_TDD_SCHEMA_PATH`.

use crate::error::{DesError, Result};
use crate::paths;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const SCHEMA_PATH_ENV: &str = "DES_TDD_SCHEMA_PATH";

pub const DEFAULT_PHASES: &[&str] = &["PREPARE", "RED_ACCEPTANCE", "RED_UNIT", "GREEN", "COMMIT"];
pub const DEFAULT_STATUSES: &[&str] = &["NOT_EXECUTED", "IN_PROGRESS", "EXECUTED", "SKIPPED"];
pub const DEFAULT_SKIP_PREFIXES: &[&str] = &[
    "NOT_APPLICABLE",
    "BLOCKED_BY_DEPENDENCY",
    "APPROVED_SKIP",
    "CHECKPOINT_PENDING",
];
pub const DEFAULT_BLOCKING_PREFIXES: &[&str] = &["DEFERRED"];
pub const DEFAULT_TERMINAL_PHASES: &[&str] = &["COMMIT"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TddSchema {
    pub schema_version: String,
    pub tdd_phases: Vec<String>,
    pub valid_statuses: Vec<String>,
    pub valid_skip_prefixes: Vec<String>,
    pub blocking_skip_prefixes: Vec<String>,
    pub terminal_phases: Vec<String>,
}

/// Classification of a SKIPPED phase's data field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipPrefix {
    /// Skip reason that still allows the step to be committed.
    Valid,
    /// Recognized prefix that blocks commit (e.g. DEFERRED).
    Blocking,
    Invalid,
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for TddSchema {
    fn default() -> Self {
        Self {
            schema_version: "4.0".to_string(),
            tdd_phases: owned(DEFAULT_PHASES),
            valid_statuses: owned(DEFAULT_STATUSES),
            valid_skip_prefixes: owned(DEFAULT_SKIP_PREFIXES),
            blocking_skip_prefixes: owned(DEFAULT_BLOCKING_PREFIXES),
            terminal_phases: owned(DEFAULT_TERMINAL_PHASES),
        }
    }
}

// ---------------------------------------------------------------------------
// On-disk JSON layout
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct RawSchema {
    schema_version: Option<String>,
    #[serde(default)]
    tdd_cycle: RawTddCycle,
    #[serde(default)]
    phase_validation_rules: RawRules,
}

#[derive(Debug, Default, Deserialize)]
struct RawTddCycle {
    #[serde(default)]
    phase_execution_log: Vec<RawPhase>,
}

#[derive(Debug, Deserialize)]
struct RawPhase {
    phase_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawRules {
    #[serde(default)]
    valid_statuses: Vec<String>,
    #[serde(default)]
    skip_validation: RawSkipValidation,
    #[serde(default)]
    terminal_phases: RawTerminal,
}

#[derive(Debug, Default, Deserialize)]
struct RawSkipValidation {
    #[serde(default)]
    valid_prefixes: BTreeMap<String, RawPrefix>,
}

#[derive(Debug, Deserialize)]
struct RawPrefix {
    #[serde(default)]
    allows_commit: bool,
}

#[derive(Debug, Default, Deserialize)]
struct RawTerminal {
    #[serde(default)]
    phases: Vec<String>,
}

impl TddSchema {
    /// Parse the schema JSON layout. Sections that are absent keep their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let raw: RawSchema = serde_json::from_str(text)?;
        let mut schema = Self::default();

        if let Some(v) = raw.schema_version {
            schema.schema_version = v;
        }
        let phases: Vec<String> = raw
            .tdd_cycle
            .phase_execution_log
            .into_iter()
            .filter_map(|p| p.phase_name)
            .collect();
        if !phases.is_empty() {
            schema.tdd_phases = phases;
        }
        let rules = raw.phase_validation_rules;
        if !rules.valid_statuses.is_empty() {
            schema.valid_statuses = rules.valid_statuses;
        }
        if !rules.skip_validation.valid_prefixes.is_empty() {
            let (allow, block): (Vec<_>, Vec<_>) = rules
                .skip_validation
                .valid_prefixes
                .into_iter()
                .partition(|(_, cfg)| cfg.allows_commit);
            schema.valid_skip_prefixes = allow.into_iter().map(|(k, _)| k).collect();
            schema.blocking_skip_prefixes = block.into_iter().map(|(k, _)| k).collect();
        }
        if !rules.terminal_phases.phases.is_empty() {
            schema.terminal_phases = rules.terminal_phases.phases;
        }

        if let Some(unknown) = schema
            .terminal_phases
            .iter()
            .find(|t| !schema.tdd_phases.contains(t))
        {
            return Err(DesError::InvalidSchema(format!(
                "terminal phase '{unknown}' is not a TDD phase"
            )));
        }
        Ok(schema)
    }

    /// Resolve the schema for a project: env override, project override, defaults.
    pub fn load(root: &Path) -> Result<Self> {
        match Self::override_path(root) {
            Some(path) => {
                let text = std::fs::read_to_string(&path)?;
                Self::from_json(&text)
            }
            None => Ok(Self::default()),
        }
    }

    fn override_path(root: &Path) -> Option<PathBuf> {
        if let Ok(p) = std::env::var(SCHEMA_PATH_ENV) {
            if !p.is_empty() {
                return Some(PathBuf::from(p));
            }
        }
        let project = paths::schema_override_path(root);
        project.exists().then_some(project)
    }

    pub fn is_valid_phase(&self, phase: &str) -> bool {
        self.tdd_phases.iter().any(|p| p == phase)
    }

    pub fn is_terminal(&self, phase: &str) -> bool {
        self.terminal_phases.iter().any(|p| p == phase)
    }

    pub fn total_phases(&self) -> usize {
        self.tdd_phases.len()
    }

    pub fn skip_prefix_kind(&self, data: &str) -> SkipPrefix {
        if self
            .valid_skip_prefixes
            .iter()
            .any(|p| data.starts_with(p.as_str()))
        {
            SkipPrefix::Valid
        } else if self
            .blocking_skip_prefixes
            .iter()
            .any(|p| data.starts_with(p.as_str()))
        {
            SkipPrefix::Blocking
        } else {
            SkipPrefix::Invalid
        }
    }
}
