//! DES HTML comment markers embedded in Task prompts:
//!
//! ```text
//! <!-- DES-VALIDATION : required -->
//! <!-- DES-MODE : orchestrator -->
//! <!-- DES-PROJECT-ID : my-project -->
//! <!-- DES-STEP-ID : 01-01 -->
//! ```

use regex::Regex;
use std::sync::OnceLock;

/// Bare token that marks a prompt as DES-related, with or without the full comment.
pub const DES_VALIDATION_TOKEN: &str = "DES-VALIDATION";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesMarkers {
    pub is_des_task: bool,
    pub is_orchestrator_mode: bool,
    pub project_id: Option<String>,
    pub step_id: Option<String>,
}

fn validation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<!--\s*DES-VALIDATION\s*:\s*required\s*-->").unwrap())
}

fn mode_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<!--\s*DES-MODE\s*:\s*orchestrator\s*-->").unwrap())
}

fn project_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<!--\s*DES-PROJECT-ID\s*:\s*(\S+)\s*-->").unwrap())
}

fn step_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<!--\s*DES-STEP-ID\s*:\s*(\S+)\s*-->").unwrap())
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

impl DesMarkers {
    pub fn parse(prompt: &str) -> Self {
        Self {
            is_des_task: validation_re().is_match(prompt),
            is_orchestrator_mode: mode_re().is_match(prompt),
            project_id: capture(project_re(), prompt),
            step_id: capture(step_re(), prompt),
        }
    }
}

/// Cheap check used by the adapters before any parsing.
pub fn mentions_des(prompt: &str) -> bool {
    prompt.contains(DES_VALIDATION_TOKEN)
}
