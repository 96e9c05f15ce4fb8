//! GitHub Copilot CLI hook protocol.
//!
//! camelCase input (`toolName`, `toolArgs`, `agentId`, `stopHookActive`) and
//! `{"permissionDecision": "approve" | "deny"}` output. Copilot only reads
//! stdout on exit 0, so every answer exits 0 and adapter errors approve.
//! The subagent-stop payload carries no transcript; DES context comes from
//! the signal written by pre-tool-use.

use super::claude::{inject_context, project_dir, validate_stop};
use super::decision::{numbered, reason_with_recovery, HookDecision};
use super::pre_tool_use::{PreToolUseInput, PreToolUseService};
use super::runtime::{empty_object, field, str_at, summary, HookResponse, HookRuntime, Stdin};
use super::signal;
use super::subagent_stop::SubagentStopContext;
use crate::markers::mentions_des;
use crate::paths;
use crate::prompt::TemplateValidator;
use crate::schema::TddSchema;
use serde_json::{json, Value};
use std::path::Path;

fn approve() -> HookResponse {
    HookResponse::json(json!({"permissionDecision": "approve"}), 0)
}

fn deny(reason: impl Into<String>) -> HookResponse {
    HookResponse::json(
        json!({"permissionDecision": "deny", "permissionDecisionReason": reason.into()}),
        0,
    )
}

pub fn unknown_action(name: &str) -> HookResponse {
    HookResponse::stderr(format!("Unknown command: {name}"), 1)
}

pub fn pre_tool_use(rt: &HookRuntime, raw: &str) -> HookResponse {
    rt.guarded(
        "pre_tool_use",
        |hook_id, trace| {
            let input = match rt.read_stdin("pre_tool_use", raw, "allow") {
                Stdin::Empty | Stdin::Invalid(_) => return Ok(approve()),
                Stdin::Json(v) => v,
            };
            let tool_args = field(&input, "toolArgs");
            let prompt = str_at(&tool_args, "prompt");
            let max_turns = tool_args.get("max_turns").filter(|v| !v.is_null());
            rt.log_invoked(
                "pre_tool_use",
                hook_id,
                summary(&[
                    ("tool_name", field(&input, "toolName")),
                    ("has_max_turns", Value::from(max_turns.is_some())),
                ]),
            );

            let service = PreToolUseService::new(
                TemplateValidator::new(TddSchema::load(&rt.root)?),
                rt.audit.as_ref(),
                rt.clock.as_ref(),
            );
            let decision = service.validate(
                &PreToolUseInput {
                    prompt,
                    max_turns,
                    subagent_type: tool_args.get("subagent_type").and_then(Value::as_str),
                },
                Some(hook_id),
            );
            Ok(match decision {
                HookDecision::Allow => {
                    if mentions_des(prompt) {
                        trace.task_correlation_id = rt.start_des_task(prompt);
                    }
                    approve()
                }
                HookDecision::Block {
                    reason,
                    recovery_suggestions,
                } => deny(reason_with_recovery(&reason, &recovery_suggestions)),
            })
        },
        |_| approve(),
    )
}

fn block_notification(project_id: &str, step_id: &str, log_path: &Path, reason: &str, recovery: &[String]) -> String {
    format!(
        "STOP HOOK VALIDATION FAILED

Step: {project_id}/{step_id}
Execution Log: {}
Error: {reason}

RECOVERY REQUIRED:
{}

Re-dispatch the agent to complete the missing TDD phases.",
        log_path.display(),
        numbered(recovery),
    )
}

pub fn subagent_stop(rt: &HookRuntime, raw: &str) -> HookResponse {
    rt.guarded(
        "subagent_stop",
        |hook_id, trace| {
            let input = match rt.read_stdin("subagent_stop", raw, "allow") {
                Stdin::Empty | Stdin::Invalid(_) => return Ok(approve()),
                Stdin::Json(v) => v,
            };
            rt.log_invoked(
                "subagent_stop",
                hook_id,
                summary(&[("agent_id", field(&input, "agentId"))]),
            );

            let Some(signal) = signal::read(&rt.root, "", "") else {
                return Ok(approve());
            };
            if !signal.is_complete() {
                rt.end_des_task("subagent_stop", hook_id, "", "");
                return Ok(approve());
            }
            trace.task_correlation_id = signal.task_correlation_id.clone();

            let cwd = project_dir(rt, &input);
            rt.end_des_task("subagent_stop", hook_id, &signal.project_id, &signal.step_id);

            let ctx = SubagentStopContext {
                execution_log_path: paths::execution_log_path(&cwd, &signal.project_id),
                stop_hook_active: input
                    .get("stopHookActive")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                cwd: Some(cwd),
                task_start_time: Some(signal.created_at).filter(|s| !s.is_empty()),
                project_id: signal.project_id,
                step_id: signal.step_id,
                turns_used: None,
                tokens_used: None,
            };
            Ok(match validate_stop(rt, &ctx, hook_id)? {
                None => approve(),
                Some((reason, recovery)) => deny(block_notification(
                    &ctx.project_id,
                    &ctx.step_id,
                    &ctx.execution_log_path,
                    &reason,
                    &recovery,
                )),
            })
        },
        |_| approve(),
    )
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
                summary(&[("tool_name", field(&input, "toolName"))]),
            );
            let tool_args = field(&input, "toolArgs");
            Ok(inject_context(rt, hook_id, str_at(&tool_args, "prompt")))
        },
        |_| HookResponse::json(empty_object(), 0),
    )
}
