//! Host-facing hook adapters and the services behind them.
//!
//! Each protocol adapter reads the host's JSON from stdin, runs the
//! matching service, and answers with a [`HookResponse`]. The CLI only
//! forwards stdin, prints the response and exits with its code.
//!
//! | action          | service                  | Claude Code | Copilot |
//! |-----------------|--------------------------|-------------|---------|
//! | `pre-tool-use`  | [`PreToolUseService`]    | yes         | yes     |
//! | `subagent-stop` | [`SubagentStopService`]  | yes         | yes     |
//! | `post-tool-use` | [`PostToolUseService`]   | yes         | yes     |
//! | `pre-write`     | session guard policy     | yes         | no      |

pub mod claude;
pub mod copilot;
pub mod decision;
pub mod post_tool_use;
pub mod pre_tool_use;
pub mod runtime;
pub mod signal;
pub mod subagent_stop;
pub mod transcript;

pub use decision::HookDecision;
pub use post_tool_use::{ContextKind, PostToolUseService};
pub use pre_tool_use::{PreToolUseInput, PreToolUseService};
pub use runtime::{HookResponse, HookRuntime};
pub use signal::TaskSignal;
pub use subagent_stop::{SubagentStopContext, SubagentStopService};

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Claude,
    Copilot,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Protocol::Claude => "claude",
            Protocol::Copilot => "copilot",
        })
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "claude" => Ok(Protocol::Claude),
            "copilot" => Ok(Protocol::Copilot),
            other => Err(format!("unknown hook protocol '{other}': expected claude or copilot")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookAction {
    PreToolUse,
    SubagentStop,
    PostToolUse,
    PreWrite,
}

impl HookAction {
    /// Action names accepted by `protocol`. Claude Code also answers to the
    /// `pre-task` and `pre-edit` aliases.
    pub fn parse(protocol: Protocol, name: &str) -> Option<Self> {
        match (protocol, name) {
            (_, "pre-tool-use") => Some(HookAction::PreToolUse),
            (_, "subagent-stop") => Some(HookAction::SubagentStop),
            (_, "post-tool-use") => Some(HookAction::PostToolUse),
            (Protocol::Claude, "pre-task") => Some(HookAction::PreToolUse),
            (Protocol::Claude, "pre-write" | "pre-edit") => Some(HookAction::PreWrite),
            _ => None,
        }
    }
}

/// Answer one hook invocation. `raw` is the complete stdin payload.
pub fn dispatch(protocol: Protocol, action: &str, rt: &HookRuntime, raw: &str) -> HookResponse {
    let Some(parsed) = HookAction::parse(protocol, action) else {
        return match protocol {
            Protocol::Claude => claude::unknown_action(action),
            Protocol::Copilot => copilot::unknown_action(action),
        };
    };
    match (protocol, parsed) {
        (Protocol::Claude, HookAction::PreToolUse) => claude::pre_tool_use(rt, raw),
        (Protocol::Claude, HookAction::SubagentStop) => claude::subagent_stop(rt, raw),
        (Protocol::Claude, HookAction::PostToolUse) => claude::post_tool_use(rt, raw),
        (Protocol::Claude, HookAction::PreWrite) => claude::pre_write(rt, raw),
        (Protocol::Copilot, HookAction::PreToolUse) => copilot::pre_tool_use(rt, raw),
        (Protocol::Copilot, HookAction::SubagentStop) => copilot::subagent_stop(rt, raw),
        (Protocol::Copilot, HookAction::PostToolUse) => copilot::post_tool_use(rt, raw),
        (Protocol::Copilot, HookAction::PreWrite) => copilot::unknown_action(action),
    }
}

// ---------------------------------------------------------------------------
// Shared fixtures for hook tests
// ---------------------------------------------------------------------------
