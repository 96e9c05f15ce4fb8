//! Phase events as recorded in `execution-log.yaml`.
//!
//! Two encodings coexist in the wild:
//!
//! - v2 pipe strings: `"01-01|PREPARE|EXECUTED|PASS|2026-02-02T10:00:00Z"`,
//!   optionally followed by `|turns|tokens`.
//! - v3 mappings: `{sid: "01-01", p: PREPARE, s: EXECUTED, d: PASS, t: "..."}`
//!   with optional `tu` / `tk`.

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::fmt;

const MINIMUM_FIELDS: usize = 5;
const STATS_FIELDS: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseEvent {
    #[serde(rename = "sid")]
    pub step_id: String,
    #[serde(rename = "p")]
    pub phase_name: String,
    #[serde(rename = "s")]
    pub status: String,
    #[serde(rename = "d")]
    pub outcome: String,
    #[serde(rename = "t")]
    pub timestamp: String,
    #[serde(rename = "tu", default, skip_serializing_if = "Option::is_none")]
    pub turns_used: Option<u64>,
    #[serde(rename = "tk", default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
}

impl PhaseEvent {
    pub fn new(
        step_id: impl Into<String>,
        phase_name: impl Into<String>,
        status: impl Into<String>,
        outcome: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            step_id: step_id.into(),
            phase_name: phase_name.into(),
            status: status.into(),
            outcome: outcome.into(),
            timestamp: timestamp.into(),
            turns_used: None,
            tokens_used: None,
        }
    }

    /// Attach execution stats. Both values are required; a half-specified
    /// pair is dropped.
    pub fn with_stats(mut self, turns: Option<u64>, tokens: Option<u64>) -> Self {
        if let (Some(tu), Some(tk)) = (turns, tokens) {
            self.turns_used = Some(tu);
            self.tokens_used = Some(tk);
        }
        self
    }

    /// Parse a v2 pipe-delimited event.
    pub fn parse_pipe(line: &str) -> Option<Self> {
        let parts: Vec<&str> = line.split('|').collect();
        if parts.len() < MINIMUM_FIELDS {
            return None;
        }
        let mut event = Self::new(parts[0], parts[1], parts[2], parts[3], parts[4]);
        if parts.len() >= STATS_FIELDS {
            if let (Ok(tu), Ok(tk)) = (parts[5].parse(), parts[6].parse()) {
                event.turns_used = Some(tu);
                event.tokens_used = Some(tk);
            }
        }
        Some(event)
    }

    /// Parse a v3 mapping event. All of `sid`, `p`, `s`, `d`, `t` must be present.
    pub fn parse_mapping(value: &Value) -> Option<Self> {
        let map = value.as_mapping()?;
        let field = |key: &str| map.get(key).and_then(scalar_string);
        let stat = |key: &str| map.get(key).and_then(Value::as_u64);
        Some(Self {
            step_id: field("sid")?,
            phase_name: field("p")?,
            status: field("s")?,
            outcome: field("d")?,
            timestamp: field("t")?,
            turns_used: stat("tu"),
            tokens_used: stat("tk"),
        })
    }

    /// Parse either encoding.
    pub fn parse_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Self::parse_pipe(s),
            Value::Mapping(_) => Self::parse_mapping(value),
            _ => None,
        }
    }
}

/// YAML scalars other than strings (e.g. an unquoted `PASS` is already a
/// string, but `d: 3` is not) still read as text.
fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

impl fmt::Display for PhaseEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sid={} p={} s={} d={} t={}",
            self.step_id, self.phase_name, self.status, self.outcome, self.timestamp
        )?;
        if let (Some(tu), Some(tk)) = (self.turns_used, self.tokens_used) {
            write!(f, " tu={tu} tk={tk}")?;
        }
        Ok(())
    }
}
