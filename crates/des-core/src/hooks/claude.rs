//! Claude Code hook protocol: snake_case JSON on stdin, `{"decision": ..}` on
//! stdout. Exit 0 allows, 2 blocks, 1 is a fail-closed error.

use super::decision::{numbered, reason_with_recovery, HookDecision};
use super::post_tool_use::PostToolUseService;
use super::pre_tool_use::{PreToolUseInput, PreToolUseService};
use super::runtime::{empty_object, field, str_at, summary, u64_at, HookResponse, HookRuntime, Stdin};
use super::signal;
use super::subagent_stop::{SubagentStopContext, SubagentStopService};
use super::transcript::{self, TranscriptScan};
use crate::audit::events;
use crate::error::Result;
use crate::markers::mentions_des;
use crate::paths;
use crate::policy;
use crate::prompt::TemplateValidator;
use crate::schema::TddSchema;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

fn allow() -> HookResponse {
    HookResponse::json(json!({"decision": "allow"}), 0)
}

fn error(reason: impl Into<String>) -> HookResponse {
    HookResponse::json(json!({"status": "error", "reason": reason.into()}), 1)
}

pub fn unknown_action(name: &str) -> HookResponse {
    error(format!("Unknown command: {name}"))
}

// ---------------------------------------------------------------------------
// pre-tool-use
// ---------------------------------------------------------------------------

pub fn pre_tool_use(rt: &HookRuntime, raw: &str) -> HookResponse {
    rt.guarded(
        "pre_tool_use",
        |hook_id, trace| {
            let input = match rt.read_stdin("pre_tool_use", raw, "error") {
                Stdin::Empty => return Ok(allow()),
                Stdin::Invalid(detail) => return Ok(error(detail)),
                Stdin::Json(v) => v,
            };
            let tool_input = field(&input, "tool_input");
            let prompt = str_at(&tool_input, "prompt");
            let max_turns = tool_input.get("max_turns").filter(|v| !v.is_null());
            rt.log_invoked(
                "pre_tool_use",
                hook_id,
                summary(&[
                    ("subagent_type", field(&tool_input, "subagent_type")),
                    ("has_max_turns", Value::from(max_turns.is_some())),
                ]),
            );

            let schema = TddSchema::load(&rt.root)?;
            let service = PreToolUseService::new(
                TemplateValidator::new(schema),
                rt.audit.as_ref(),
                rt.clock.as_ref(),
            );
            let decision = service.validate(
                &PreToolUseInput {
                    prompt,
                    max_turns,
                    subagent_type: tool_input.get("subagent_type").and_then(Value::as_str),
                },
                Some(hook_id),
            );
            Ok(match decision {
                HookDecision::Allow => {
                    if mentions_des(prompt) {
                        trace.task_correlation_id = rt.start_des_task(prompt);
                    }
                    allow()
                }
                HookDecision::Block {
                    reason,
                    recovery_suggestions,
                } => HookResponse::json(
                    json!({
                        "decision": "block",
                        "reason": reason_with_recovery(&reason, &recovery_suggestions),
                    }),
                    2,
                ),
            })
        },
        |e| error(format!("Unexpected error: {e}")),
    )
}

// ---------------------------------------------------------------------------
// subagent-stop
// ---------------------------------------------------------------------------

/// Where the stop hook found its DES context.
enum Resolved {
    Des {
        log_path: PathBuf,
        project_id: String,
        step_id: String,
    },
    /// Not a DES subagent, or a malformed direct request.
    Passthrough(HookResponse),
}

/// Direct fields (`executionLogPath`, `projectId`, `stepId`) win over the
/// agent transcript.
fn resolve_context(rt: &HookRuntime, input: &Value) -> Resolved {
    let log_path = str_at(input, "executionLogPath");
    let project_id = str_at(input, "projectId");
    let step_id = str_at(input, "stepId");

    if !log_path.is_empty() || !project_id.is_empty() || !step_id.is_empty() {
        if log_path.is_empty() || project_id.is_empty() || step_id.is_empty() {
            return Resolved::Passthrough(error(
                "Missing required fields: executionLogPath, projectId, and stepId are all required",
            ));
        }
        if !Path::new(log_path).is_absolute() {
            return Resolved::Passthrough(error(format!(
                "executionLogPath must be absolute (got: {log_path})"
            )));
        }
        return Resolved::Des {
            log_path: PathBuf::from(log_path),
            project_id: project_id.to_string(),
            step_id: step_id.to_string(),
        };
    }

    let transcript_path = str_at(input, "agent_transcript_path");
    if transcript_path.is_empty() {
        return Resolved::Passthrough(allow());
    }
    let transcript_event = |event_type: &str| {
        rt.event(event_type)
            .with("transcript_path", transcript_path)
    };
    match transcript::scan(Path::new(transcript_path)) {
        Ok(TranscriptScan::Found(ctx)) => Resolved::Des {
            log_path: paths::execution_log_path(&project_dir(rt, input), &ctx.project_id),
            project_id: ctx.project_id,
            step_id: ctx.step_id,
        },
        Ok(TranscriptScan::NoMarkers) => {
            rt.emit(transcript_event(events::HOOK_TRANSCRIPT_NO_MARKERS));
            Resolved::Passthrough(allow())
        }
        Ok(TranscriptScan::Missing | TranscriptScan::Incomplete) => Resolved::Passthrough(allow()),
        Err(e) => {
            rt.emit(transcript_event(events::HOOK_TRANSCRIPT_ERROR).with("error", e.to_string()));
            Resolved::Passthrough(allow())
        }
    }
}

/// The host's `cwd`, or the hook root when the host sent none.
pub(crate) fn project_dir(rt: &HookRuntime, input: &Value) -> PathBuf {
    match str_at(input, "cwd") {
        "" => rt.root.clone(),
        dir => PathBuf::from(dir),
    }
}

fn block_notification(
    project_id: &str,
    step_id: &str,
    log_path: &Path,
    reason: &str,
    recovery: &[String],
) -> String {
    format!(
        "STOP HOOK VALIDATION FAILED

Step: {project_id}/{step_id}
Execution Log: {}
Status: FAILED
Error: {reason}

RECOVERY REQUIRED:
{}

The step validation failed. You MUST fix these issues before proceeding.

IMPORTANT: Only the executing agent may write to execution-log.yaml.
The orchestrator must RE-DISPATCH the agent to execute missing phases.
Never write log entries for phases that were not actually executed.",
        log_path.display(),
        numbered(recovery),
    )
}

pub fn subagent_stop(rt: &HookRuntime, raw: &str) -> HookResponse {
    rt.guarded(
        "subagent_stop",
        |hook_id, trace| {
            let input = match rt.read_stdin("subagent_stop", raw, "error") {
                Stdin::Empty => return Ok(allow()),
                Stdin::Invalid(detail) => return Ok(error(detail)),
                Stdin::Json(v) => v,
            };
            trace.turns_used = u64_at(&input, "num_turns");
            trace.tokens_used = u64_at(&input, "total_tokens");
            let has_transcript = input
                .get("agent_transcript_path")
                .is_some_and(|v| !v.is_null());
            rt.log_invoked(
                "subagent_stop",
                hook_id,
                summary(&[
                    ("agent_type", field(&input, "agent_type")),
                    ("agent_id", field(&input, "agent_id")),
                    ("has_transcript", Value::from(has_transcript)),
                ]),
            );

            let (log_path, project_id, step_id) = match resolve_context(rt, &input) {
                Resolved::Des {
                    log_path,
                    project_id,
                    step_id,
                } => (log_path, project_id, step_id),
                Resolved::Passthrough(response) => {
                    rt.log_invoked(
                        "subagent_stop_passthrough",
                        hook_id,
                        summary(&[
                            ("reason", Value::from("non_des_or_error")),
                            ("agent_type", field(&input, "agent_type")),
                            ("agent_id", field(&input, "agent_id")),
                            ("has_transcript", Value::from(has_transcript)),
                            ("transcript_path", field(&input, "agent_transcript_path")),
                            ("exit_code", Value::from(response.exit_code)),
                        ]),
                    );
                    return Ok(response);
                }
            };

            let signal = signal::read(&rt.root, &project_id, &step_id);
            if let Some(s) = &signal {
                trace.task_correlation_id = s.task_correlation_id.clone();
            }
            rt.end_des_task("subagent_stop", hook_id, &project_id, &step_id);

            let cwd = str_at(&input, "cwd");
            let ctx = SubagentStopContext {
                execution_log_path: log_path,
                project_id,
                step_id,
                stop_hook_active: input
                    .get("stop_hook_active")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                cwd: (!cwd.is_empty()).then(|| PathBuf::from(cwd)),
                task_start_time: signal.map(|s| s.created_at).filter(|s| !s.is_empty()),
                turns_used: trace.turns_used,
                tokens_used: trace.tokens_used,
            };
            Ok(validate_stop(rt, &ctx, hook_id)?.map_or_else(allow, |(reason, recovery)| {
                // Exit 0 so the host reads the JSON; a non-zero exit drops stdout.
                HookResponse::json(
                    json!({
                        "decision": "block",
                        "reason": block_notification(
                            &ctx.project_id,
                            &ctx.step_id,
                            &ctx.execution_log_path,
                            &reason,
                            &recovery,
                        ),
                    }),
                    0,
                )
            }))
        },
        |e| HookResponse::stderr(format!("SubagentStop hook error: {e}"), 1),
    )
}

/// Run the stop service. `None` means allow.
pub(crate) fn validate_stop(
    rt: &HookRuntime,
    ctx: &SubagentStopContext,
    hook_id: &str,
) -> Result<Option<(String, Vec<String>)>> {
    let schema = TddSchema::load(&rt.root)?;
    let service = SubagentStopService::new(&schema, rt.audit.as_ref(), rt.clock.as_ref(), rt.scope.as_ref())
        .with_commit_verifier(rt.commits.as_ref());
    Ok(match service.validate(ctx, Some(hook_id)) {
        HookDecision::Allow => None,
        HookDecision::Block {
            reason,
            recovery_suggestions,
        } => Some((reason, recovery_suggestions)),
    })
}

// ---------------------------------------------------------------------------
// post-tool-use
// ---------------------------------------------------------------------------

/// Shared by both protocols: inject orchestrator context after a Task returns.
pub(crate) fn inject_context(rt: &HookRuntime, hook_id: &str, prompt: &str) -> HookResponse {
    let is_des_task = mentions_des(prompt);
    let service = PostToolUseService::new(rt.audit_reader.as_ref());
    match service.additional_context(is_des_task) {
        Some((kind, text)) => {
            rt.emit(
                rt.event(events::HOOK_POST_TOOL_USE_INJECTED)
                    .hook(Some(hook_id))
                    .with("is_des_task", is_des_task)
                    .with("context_type", kind.as_str()),
            );
            HookResponse::json(json!({"additionalContext": text}), 0)
        }
        None => {
            let reason = if is_des_task {
                "no_completion_status"
            } else {
                "non_des_task"
            };
            rt.emit(
                rt.event(events::HOOK_POST_TOOL_USE_PASSTHROUGH)
                    .hook(Some(hook_id))
                    .with("is_des_task", is_des_task)
                    .with("reason", reason),
            );
            HookResponse::json(empty_object(), 0)
        }
    }
}

pub fn post_tool_use(rt: &HookRuntime, raw: &str) -> HookResponse {
    rt.guarded(
        "post_tool_use",
        |hook_id, _| {
            let input = match rt.read_stdin("post_tool_use", raw, "allow") {
                Stdin::Empty | Stdin::Invalid(_) => return Ok(HookResponse::json(empty_object(), 0)),
                Stdin::Json(v) => v,
            };
            rt.log_invoked(
                "post_tool_use",
                hook_id,
                summary(&[("tool_name", field(&input, "tool_name"))]),
            );
            let tool_input = field(&input, "tool_input");
            Ok(inject_context(rt, hook_id, str_at(&tool_input, "prompt")))
        },
        |_| HookResponse::json(empty_object(), 0),
    )
}

// ---------------------------------------------------------------------------
// pre-write
// ---------------------------------------------------------------------------

pub fn pre_write(rt: &HookRuntime, raw: &str) -> HookResponse {
    rt.guarded(
        "pre_write",
        |hook_id, _| {
            let input = match rt.read_stdin("pre_write", raw, "allow") {
                Stdin::Empty | Stdin::Invalid(_) => return Ok(allow()),
                Stdin::Json(v) => v,
            };
            let tool_input = field(&input, "tool_input");
            let file_path = str_at(&tool_input, "file_path");
            let session_active = signal::deliver_session_active(&rt.root);
            let des_task_active = signal::des_task_active(&rt.root);
            rt.log_invoked(
                "pre_write",
                hook_id,
                summary(&[
                    ("file_path", Value::from(file_path)),
                    ("session_active", Value::from(session_active)),
                    ("des_task_active", Value::from(des_task_active)),
                ]),
            );

            match policy::check_session_guard(file_path, session_active, des_task_active) {
                Some(violation) => {
                    rt.emit(
                        rt.event(events::HOOK_PRE_WRITE_BLOCKED)
                            .hook(Some(hook_id))
                            .with("file_path", file_path)
                            .with("reason", violation.reason.as_str()),
                    );
                    Ok(HookResponse::json(
                        json!({"decision": "block", "reason": violation.reason}),
                        2,
                    ))
                }
                None => {
                    let reason = if session_active {
                        "policy_allowed"
                    } else {
                        "no_session"
                    };
                    rt.emit(
                        rt.event(events::HOOK_PRE_WRITE_ALLOWED)
                            .hook(Some(hook_id))
                            .with("file_path", file_path)
                            .with("reason", reason),
                    );
                    Ok(allow())
                }
            }
        },
        |_| allow(),
    )
}
