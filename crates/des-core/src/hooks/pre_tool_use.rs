use super::decision::HookDecision;
use crate::audit::{events, AuditEvent, AuditLogWriter};
use crate::clock::{audit_timestamp, Clock};
use crate::markers::DesMarkers;
use crate::policy::{self, Violation};
use crate::prompt::TemplateValidator;
use serde_json::Value;

/// Task tool arguments relevant to validation.
#[derive(Debug, Clone, Copy)]
pub struct PreToolUseInput<'a> {
    pub prompt: &'a str,
    /// Raw JSON so malformed values can be reported verbatim.
    pub max_turns: Option<&'a Value>,
    pub subagent_type: Option<&'a str>,
}

/// Gate for Task invocations: turn budget, DES markers, then prompt shape.
pub struct PreToolUseService<'a> {
    validator: TemplateValidator,
    audit: &'a dyn AuditLogWriter,
    clock: &'a dyn Clock,
}

impl<'a> PreToolUseService<'a> {
    pub fn new(validator: TemplateValidator, audit: &'a dyn AuditLogWriter, clock: &'a dyn Clock) -> Self {
        Self {
            validator,
            audit,
            clock,
        }
    }

    pub fn validate(&self, input: &PreToolUseInput<'_>, hook_id: Option<&str>) -> HookDecision {
        if let Some(v) = policy::check_max_turns(input.max_turns) {
            return self.blocked(v, hook_id);
        }
        if let Some(v) = policy::check_des_enforcement(input.prompt) {
            return self.blocked(v, hook_id);
        }

        let markers = DesMarkers::parse(input.prompt);
        if !markers.is_des_task {
            return self.allowed("non_des_task", hook_id);
        }
        if let Some(v) = policy::check_marker_completeness(&markers) {
            return self.blocked(v, hook_id);
        }
        if markers.is_orchestrator_mode {
            return self.allowed("orchestrator_mode", hook_id);
        }

        let result = self.validator.validate_prompt(input.prompt);
        if result.task_invocation_allowed {
            self.allowed("des_validated", hook_id)
        } else {
            self.blocked(
                Violation {
                    reason: result.errors.join("; "),
                    recovery_suggestions: Vec::new(),
                },
                hook_id,
            )
        }
    }

    fn allowed(&self, context: &str, hook_id: Option<&str>) -> HookDecision {
        let event = AuditEvent::new(
            events::HOOK_PRE_TOOL_USE_ALLOWED,
            audit_timestamp(self.clock.now_utc()),
        )
        .hook(hook_id)
        .with("context", context);
        let _ = self.audit.log_event(&event);
        HookDecision::Allow
    }

    fn blocked(&self, violation: Violation, hook_id: Option<&str>) -> HookDecision {
        let event = AuditEvent::new(
            events::HOOK_PRE_TOOL_USE_BLOCKED,
            audit_timestamp(self.clock.now_utc()),
        )
        .hook(hook_id)
        .with("reason", violation.reason.as_str());
        let _ = self.audit.log_event(&event);
        HookDecision::block(violation.reason, violation.recovery_suggestions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::memory::MemoryAuditLog;
    use crate::clock::FixedClock;
    use crate::hooks::testing::{des_prompt, now};
    use crate::schema::TddSchema;
    use serde_json::json;

    fn run(prompt: &str, max_turns: Option<Value>) -> (HookDecision, MemoryAuditLog) {
        let log = MemoryAuditLog::default();
        let clock = FixedClock(now());
        let service = PreToolUseService::new(TemplateValidator::new(TddSchema::default()), &log, &clock);
        let input = PreToolUseInput {
            prompt,
            max_turns: max_turns.as_ref(),
            subagent_type: Some("software-crafter"),
        };
        let decision = service.validate(&input, Some("hook-1"));
        (decision, log)
    }

    fn context(log: &MemoryAuditLog) -> String {
        log.find(events::HOOK_PRE_TOOL_USE_ALLOWED).unwrap().data["context"]
            .as_str()
            .unwrap()
            .to_string()
    }

    #[test]
    fn missing_max_turns_blocks_first() {
        let (decision, log) = run(&des_prompt("p", "01-01"), None);
        match decision {
            HookDecision::Block { reason, .. } => assert!(reason.starts_with("MISSING_MAX_TURNS")),
            other => panic!("unexpected {other:?}"),
        }
        let ev = log.find(events::HOOK_PRE_TOOL_USE_BLOCKED).unwrap();
        assert_eq!(ev.hook_id.as_deref(), Some("hook-1"));
    }

    #[test]
    fn ad_hoc_task_is_allowed() {
        let (decision, log) = run("Summarize the README", Some(json!(20)));
        assert!(decision.is_allow());
        assert_eq!(context(&log), "non_des_task");
    }

    #[test]
    fn step_work_without_markers_is_blocked() {
        let (decision, _) = run("Implement step 01-02 of the roadmap", Some(json!(30)));
        match decision {
            HookDecision::Block {
                reason,
                recovery_suggestions,
            } => {
                assert!(reason.starts_with("DES_MARKERS_MISSING"));
                assert_eq!(recovery_suggestions.len(), 6);
            }
            other => panic!("unexpected {other:?}"),
        }
        let (decision, _) = run("Release notes for 2026-02-09", Some(json!(30)));
        assert!(decision.is_allow());
    }

    #[test]
    fn incomplete_markers_are_blocked() {
        let prompt = "<!-- DES-VALIDATION : required -->\n<!-- DES-STEP-ID : 01-01 -->";
        let (decision, _) = run(prompt, Some(json!(30)));
        assert_eq!(
            decision,
            HookDecision::Block {
                reason: "DES_MARKERS_INCOMPLETE: DES-PROJECT-ID missing".to_string(),
                recovery_suggestions: policy::check_marker_completeness(&DesMarkers::parse(prompt))
                    .unwrap()
                    .recovery_suggestions,
            }
        );
    }

    #[test]
    fn orchestrator_mode_skips_template_checks() {
        let prompt = "<!-- DES-VALIDATION : required -->\n<!-- DES-MODE : orchestrator -->\n\
<!-- DES-PROJECT-ID : p -->";
        let (decision, log) = run(prompt, Some(json!(30)));
        assert!(decision.is_allow());
        assert_eq!(context(&log), "orchestrator_mode");
    }

    #[test]
    fn full_prompt_is_validated() {
        let (decision, log) = run(&des_prompt("p", "01-01"), Some(json!(30)));
        assert!(decision.is_allow());
        assert_eq!(context(&log), "des_validated");

        let broken = des_prompt("p", "01-01").replace("# BOUNDARY_RULES\n", "");
        let (decision, _) = run(&broken, Some(json!(30)));
        match decision {
            HookDecision::Block { reason, .. } => {
                assert_eq!(reason, "MISSING: Mandatory section 'BOUNDARY_RULES' not found")
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
