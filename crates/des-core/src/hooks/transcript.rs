//! Recover DES context from a subagent's JSONL transcript.

use crate::error::Result;
use crate::markers::{mentions_des, DesMarkers};
use serde_json::Value;
use std::io::{BufRead, BufReader};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesContext {
    pub project_id: String,
    pub step_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptScan {
    /// No transcript file at the given path.
    Missing,
    Found(DesContext),
    /// The first DES message lacks a project or step id.
    Incomplete,
    /// No message mentions DES-VALIDATION.
    NoMarkers,
}

/// Message text is either a plain string or a list of `{type: "text", text}` blocks.
fn message_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(blocks) => blocks
            .iter()
            .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

/// Scan the transcript for the first message carrying DES markers. Lines that
/// are not JSON are skipped.
pub fn scan(path: &Path) -> Result<TranscriptScan> {
    if !path.exists() {
        return Ok(TranscriptScan::Missing);
    }
    let reader = BufReader::new(std::fs::File::open(path)?);
    for line in reader.lines() {
        let line = line?;
        let Ok(entry) = serde_json::from_str::<Value>(line.trim()) else {
            continue;
        };
        let Some(content) = entry.get("message").and_then(|m| m.get("content")) else {
            continue;
        };
        let text = message_text(content);
        if !mentions_des(&text) {
            continue;
        }
        let markers = DesMarkers::parse(&text);
        return Ok(match (markers.is_des_task, markers.project_id, markers.step_id) {
            (true, Some(project_id), Some(step_id)) => {
                TranscriptScan::Found(DesContext { project_id, step_id })
            }
            _ => TranscriptScan::Incomplete,
        });
    }
    Ok(TranscriptScan::NoMarkers)
}
