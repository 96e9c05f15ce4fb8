//! Reading and writing `docs/feature/<project>/execution-log.yaml`.

use crate::error::{DesError, Result};
use crate::io;
use crate::phase_event::PhaseEvent;
use serde_yaml::{Mapping, Value};
use std::collections::HashMap;
use std::path::Path;

pub const SCHEMA_VERSION: &str = "3.0";

/// The raw YAML document. Unknown top-level keys are preserved on rewrite.
#[derive(Debug, Clone)]
pub struct ExecutionLog {
    doc: Mapping,
}

impl ExecutionLog {
    pub fn load(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DesError::LogNotFound(path.display().to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self { doc: Mapping::new() });
        }
        let value: Value =
            serde_yaml::from_str(text).map_err(|e| DesError::LogCorrupted(e.to_string()))?;
        match value {
            Value::Mapping(doc) => Ok(Self { doc }),
            Value::Null => Ok(Self { doc: Mapping::new() }),
            other => Err(DesError::LogCorrupted(format!(
                "execution log must be a YAML mapping, got {}",
                value_kind(&other)
            ))),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_yaml::to_string(&self.doc)?;
        io::atomic_write(path, text.as_bytes())
    }

    pub fn project_id(&self) -> Option<String> {
        self.doc.get("project_id").and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }

    pub fn raw_events(&self) -> &[Value] {
        self.doc
            .get("events")
            .and_then(Value::as_sequence)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every parseable event, paired with its index in the raw sequence.
    pub fn indexed_events(&self) -> Vec<(usize, PhaseEvent)> {
        self.raw_events()
            .iter()
            .enumerate()
            .filter_map(|(i, v)| PhaseEvent::parse_value(v).map(|ev| (i, ev)))
            .collect()
    }

    pub fn all_events(&self) -> Vec<PhaseEvent> {
        self.indexed_events().into_iter().map(|(_, ev)| ev).collect()
    }

    pub fn step_events(&self, step_id: &str) -> Vec<PhaseEvent> {
        self.all_events()
            .into_iter()
            .filter(|ev| ev.step_id == step_id)
            .collect()
    }

    /// Phases recorded per step, in first-seen order.
    pub fn phases_by_step(&self) -> HashMap<String, Vec<String>> {
        let mut out: HashMap<String, Vec<String>> = HashMap::new();
        for ev in self.all_events() {
            let phases = out.entry(ev.step_id).or_default();
            if !phases.contains(&ev.phase_name) {
                phases.push(ev.phase_name);
            }
        }
        out
    }

    /// Append a v3 entry and stamp the document with the current schema version.
    pub fn push(&mut self, event: &PhaseEvent) -> Result<()> {
        let value = serde_yaml::to_value(event)?;
        match self.doc.get_mut("events").and_then(Value::as_sequence_mut) {
            Some(seq) => seq.push(value),
            None => {
                self.doc
                    .insert(Value::from("events"), Value::Sequence(vec![value]));
            }
        }
        self.doc
            .insert(Value::from("schema_version"), Value::from(SCHEMA_VERSION));
        Ok(())
    }

    /// Replace the timestamp of the event at `index`. Pipe strings have the
    /// old timestamp substituted in place; mappings get a new `t`. Returns
    /// false when the entry no longer carries `old`.
    pub fn replace_timestamp(&mut self, index: usize, old: &str, new: &str) -> bool {
        let Some(entry) = self
            .doc
            .get_mut("events")
            .and_then(Value::as_sequence_mut)
            .and_then(|seq| seq.get_mut(index))
        else {
            return false;
        };
        match entry {
            Value::String(s) if s.contains(old) => {
                *s = s.replace(old, new);
                true
            }
            Value::Mapping(m) if m.get("t").and_then(Value::as_str) == Some(old) => {
                m.insert(Value::from("t"), Value::from(new));
                true
            }
            _ => false,
        }
    }
}

fn value_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "list",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

pub fn read_project_id(path: &Path) -> Result<Option<String>> {
    Ok(ExecutionLog::load(path)?.project_id())
}

pub fn read_all_events(path: &Path) -> Result<Vec<PhaseEvent>> {
    Ok(ExecutionLog::load(path)?.all_events())
}

pub fn read_step_events(path: &Path, step_id: &str) -> Result<Vec<PhaseEvent>> {
    Ok(ExecutionLog::load(path)?.step_events(step_id))
}

/// Append one event to an existing log file. The file must already exist.
pub fn append_event(path: &Path, event: &PhaseEvent) -> Result<()> {
    let mut log = ExecutionLog::load(path)?;
    log.push(event)?;
    log.save(path)
}
