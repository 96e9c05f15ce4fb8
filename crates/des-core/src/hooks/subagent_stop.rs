use super::decision::HookDecision;
use crate::audit::{events, AuditEvent, AuditLogWriter};
use crate::clock::{audit_timestamp, log_timestamp, parse_timestamp, Clock};
use crate::completion::StepCompletionValidator;
use crate::error::DesError;
use crate::execution_log::ExecutionLog;
use crate::git::{CommitCheck, CommitVerifier, ScopeChecker};
use crate::integrity::{self, LogIntegrityValidator};
use crate::schema::TddSchema;
use std::collections::HashSet;
use std::path::PathBuf;

/// Files a step may touch. Everything, until roadmaps carry per-step scope.
const ALLOWED_SCOPE: &[&str] = &["**/*"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubagentStopContext {
    pub execution_log_path: PathBuf,
    pub project_id: String,
    pub step_id: String,
    /// True when the stop hook already fired once for this subagent.
    pub stop_hook_active: bool,
    /// Working directory for commit verification; `None` skips it.
    pub cwd: Option<PathBuf>,
    /// `created_at` of the task signal.
    pub task_start_time: Option<String>,
    pub turns_used: Option<u64>,
    pub tokens_used: Option<u64>,
}

/// Decides whether a finished subagent really completed its step.
pub struct SubagentStopService<'a> {
    schema: &'a TddSchema,
    audit: &'a dyn AuditLogWriter,
    clock: &'a dyn Clock,
    scope: &'a dyn ScopeChecker,
    commits: Option<&'a dyn CommitVerifier>,
}

impl<'a> SubagentStopService<'a> {
    pub fn new(
        schema: &'a TddSchema,
        audit: &'a dyn AuditLogWriter,
        clock: &'a dyn Clock,
        scope: &'a dyn ScopeChecker,
    ) -> Self {
        Self {
            schema,
            audit,
            clock,
            scope,
            commits: None,
        }
    }

    pub fn with_commit_verifier(mut self, verifier: &'a dyn CommitVerifier) -> Self {
        self.commits = Some(verifier);
        self
    }

    pub fn validate(&self, ctx: &SubagentStopContext, hook_id: Option<&str>) -> HookDecision {
        let mut log = match ExecutionLog::load(&ctx.execution_log_path) {
            Ok(log) => log,
            Err(e @ DesError::LogNotFound(_)) => {
                return HookDecision::block(
                    e.to_string(),
                    strings(&["Create execution-log.yaml file", "Run orchestrator to initialize log"]),
                )
            }
            Err(e @ DesError::LogCorrupted(_)) => {
                return HookDecision::block(
                    e.to_string(),
                    strings(&["Fix YAML syntax errors in execution-log.yaml"]),
                )
            }
            Err(e) => {
                return HookDecision::block(
                    format!("Failed to read step events: {e}"),
                    strings(&["Check execution-log.yaml file integrity"]),
                )
            }
        };

        let found = log.project_id().unwrap_or_default();
        if found != ctx.project_id {
            return HookDecision::block(
                format!(
                    "Project ID mismatch: expected '{}', found '{found}'",
                    ctx.project_id
                ),
                vec![
                    format!("Verify you're working on project '{}'", ctx.project_id),
                    "Check DES-PROJECT-ID marker in prompt".to_string(),
                ],
            );
        }

        // Runs on every attempt, including the second one.
        self.check_and_correct_integrity(ctx, &mut log, hook_id);

        let completion =
            StepCompletionValidator::new(self.schema).validate(&log.step_events(&ctx.step_id));
        if !completion.is_valid() {
            let reason = if completion.error_messages.is_empty() {
                "Validation failed".to_string()
            } else {
                completion.error_messages.join("; ")
            };
            let mut event = self
                .event(events::HOOK_SUBAGENT_STOP_FAILED, ctx, hook_id)
                .with("validation_errors", completion.error_messages.clone());
            if ctx.stop_hook_active {
                // Allow the second attempt so the subagent cannot loop forever.
                event = event.with("allowed_despite_failure", true);
                self.emit(with_stats(event, ctx));
                return HookDecision::Allow;
            }
            self.emit(with_stats(event, ctx));
            return HookDecision::block(reason, completion.recovery_suggestions);
        }

        if let (Some(cwd), Some(verifier)) = (ctx.cwd.as_deref(), self.commits) {
            match verifier.verify_commit(&ctx.step_id, cwd) {
                CommitCheck::NotVerified(reason) => {
                    self.emit(
                        self.event(events::COMMIT_NOT_VERIFIED, ctx, hook_id)
                            .with("error_reason", reason.as_str()),
                    );
                    return HookDecision::block(
                        format!("COMMIT_NOT_VERIFIED: {reason}"),
                        vec![
                            format!("Create a git commit with trailer 'Step-ID: {}'", ctx.step_id),
                            "Ensure the COMMIT phase actually runs git commit".to_string(),
                            "Check that git is available and you're in a git repository".to_string(),
                        ],
                    );
                }
                CommitCheck::Verified(info) => {
                    let event = self
                        .event(events::COMMIT_VERIFIED, ctx, hook_id)
                        .with("commit_hash", info.hash)
                        .with_opt("commit_date", info.date)
                        .with_opt("commit_subject", info.subject);
                    self.emit(with_stats(event, ctx));
                }
            }
        }

        self.check_scope(ctx, hook_id);

        self.emit(with_stats(
            self.event(events::HOOK_SUBAGENT_STOP_PASSED, ctx, hook_id),
            ctx,
        ));
        HookDecision::Allow
    }

    /// Rewrite fabricated timestamps with interpolated real ones and report
    /// everything else as warnings. Never blocks.
    fn check_and_correct_integrity(
        &self,
        ctx: &SubagentStopContext,
        log: &mut ExecutionLog,
        hook_id: Option<&str>,
    ) {
        let now = self.clock.now_utc();
        let start = ctx.task_start_time.as_deref().and_then(parse_timestamp);
        let result = LogIntegrityValidator::new(self.schema, now).validate(
            &ctx.step_id,
            &log.indexed_events(),
            start,
        );

        let replacements =
            integrity::interpolate(start.unwrap_or(now), now, result.correctable.len());
        let mut corrected = HashSet::new();
        for (entry, at) in result.correctable.iter().zip(replacements) {
            let new_ts = log_timestamp(at);
            if !log.replace_timestamp(entry.index, &entry.original_timestamp, &new_ts) {
                continue;
            }
            corrected.insert(entry.index);
            self.emit(
                self.event(events::LOG_INTEGRITY_CORRECTED, ctx, hook_id)
                    .with("phase", entry.phase_name.as_str())
                    .with("original_timestamp", entry.original_timestamp.as_str())
                    .with("corrected_timestamp", new_ts)
                    .with("reason", entry.reason.as_str()),
            );
        }
        if !corrected.is_empty() {
            // Best effort: validation continues on the corrected copy either way.
            let _ = log.save(&ctx.execution_log_path);
        }

        let uncorrected = result
            .correctable
            .iter()
            .filter(|e| !corrected.contains(&e.index))
            .map(|e| e.warning());
        for warning in result.warnings.iter().cloned().chain(uncorrected) {
            self.emit(
                self.event(events::LOG_INTEGRITY_WARNING, ctx, hook_id)
                    .with("warning", warning),
            );
        }
    }

    /// Warning only. `execution_log_path` is `<root>/docs/feature/<project>/execution-log.yaml`.
    fn check_scope(&self, ctx: &SubagentStopContext, hook_id: Option<&str>) {
        let Some(root) = ctx.execution_log_path.ancestors().nth(4) else {
            return;
        };
        let result = self.scope.check_scope(root, ALLOWED_SCOPE);
        for file in result.out_of_scope {
            self.emit(
                self.event(events::SCOPE_VIOLATION, ctx, hook_id)
                    .with("out_of_scope_file", file),
            );
        }
    }

    fn event(&self, event_type: &str, ctx: &SubagentStopContext, hook_id: Option<&str>) -> AuditEvent {
        AuditEvent::new(event_type, audit_timestamp(self.clock.now_utc()))
            .feature(ctx.project_id.as_str())
            .step(ctx.step_id.as_str())
            .hook(hook_id)
    }

    fn emit(&self, event: AuditEvent) {
        let _ = self.audit.log_event(&event);
    }
}

fn with_stats(event: AuditEvent, ctx: &SubagentStopContext) -> AuditEvent {
    event
        .with_opt("turns_used", ctx.turns_used)
        .with_opt("tokens_used", ctx.tokens_used)
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::memory::MemoryAuditLog;
    use crate::clock::FixedClock;
    use crate::git::{CommitInfo, ScopeCheck};
    use crate::hooks::testing::{now, write_log};
    use std::cell::RefCell;
    use std::path::Path;
    use tempfile::TempDir;

    struct StubCommits(Option<&'static str>);

    impl CommitVerifier for StubCommits {
        fn verify_commit(&self, _step_id: &str, _cwd: &Path) -> CommitCheck {
            match self.0 {
                Some(hash) => CommitCheck::Verified(CommitInfo {
                    hash: hash.to_string(),
                    date: Some("2026-02-02 10:30:00 +0000".to_string()),
                    subject: Some("feat: step".to_string()),
                }),
                None => CommitCheck::NotVerified("No commit found with Step-ID: 01-01".to_string()),
            }
        }
    }

    #[derive(Default)]
    struct StubScope {
        seen_root: RefCell<Option<PathBuf>>,
        out_of_scope: Vec<String>,
    }

    impl ScopeChecker for StubScope {
        fn check_scope(&self, project_root: &Path, _allowed: &[&str]) -> ScopeCheck {
            *self.seen_root.borrow_mut() = Some(project_root.to_path_buf());
            ScopeCheck {
                out_of_scope: self.out_of_scope.clone(),
                skipped: None,
            }
        }
    }

    const FULL: &[&str] = &[
        "01-01|PREPARE|EXECUTED|PASS|2026-02-02T11:10:00Z",
        "01-01|RED_ACCEPTANCE|EXECUTED|PASS|2026-02-02T11:20:00Z",
        "01-01|RED_UNIT|EXECUTED|PASS|2026-02-02T11:30:00Z",
        "01-01|GREEN|EXECUTED|PASS|2026-02-02T11:40:00Z",
        "01-01|COMMIT|EXECUTED|PASS|2026-02-02T11:50:00Z",
    ];

    struct Fixture {
        dir: TempDir,
        log: MemoryAuditLog,
        scope: StubScope,
        schema: TddSchema,
        clock: FixedClock,
    }

    impl Fixture {
        fn new(events: &[&str]) -> Self {
            let dir = TempDir::new().unwrap();
            write_log(dir.path(), "auth", events);
            Self {
                dir,
                log: MemoryAuditLog::default(),
                scope: StubScope::default(),
                schema: TddSchema::default(),
                clock: FixedClock(now()),
            }
        }

        fn ctx(&self) -> SubagentStopContext {
            SubagentStopContext {
                execution_log_path: crate::paths::execution_log_path(self.dir.path(), "auth"),
                project_id: "auth".to_string(),
                step_id: "01-01".to_string(),
                task_start_time: Some("2026-02-02T11:00:00.000000+00:00".to_string()),
                turns_used: Some(12),
                ..Default::default()
            }
        }

        fn service(&self) -> SubagentStopService<'_> {
            SubagentStopService::new(&self.schema, &self.log, &self.clock, &self.scope)
        }
    }

    #[test]
    fn complete_step_passes_and_checks_scope_at_root() {
        let f = Fixture::new(FULL);
        assert_eq!(f.service().validate(&f.ctx(), Some("h")), HookDecision::Allow);
        let passed = f.log.find(events::HOOK_SUBAGENT_STOP_PASSED).unwrap();
        assert_eq!(passed.data["turns_used"], 12);
        assert!(!passed.data.contains_key("tokens_used"));
        assert_eq!(passed.hook_id.as_deref(), Some("h"));
        assert_eq!(f.scope.seen_root.borrow().as_deref(), Some(f.dir.path()));
    }

    #[test]
    fn missing_log_blocks() {
        let f = Fixture::new(FULL);
        let mut ctx = f.ctx();
        ctx.project_id = "other".into();
        ctx.execution_log_path = f.dir.path().join("docs/feature/other/execution-log.yaml");
        match f.service().validate(&ctx, None) {
            HookDecision::Block {
                reason,
                recovery_suggestions,
            } => {
                assert!(reason.starts_with("Execution log not found: "));
                assert_eq!(recovery_suggestions.len(), 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn corrupted_log_blocks() {
        let f = Fixture::new(FULL);
        std::fs::write(&f.ctx().execution_log_path, "events: [unclosed").unwrap();
        match f.service().validate(&f.ctx(), None) {
            HookDecision::Block { reason, .. } => {
                assert!(reason.starts_with("Invalid YAML in execution log: "))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn project_mismatch_blocks() {
        let f = Fixture::new(FULL);
        let mut ctx = f.ctx();
        ctx.project_id = "billing".into();
        match f.service().validate(&ctx, None) {
            HookDecision::Block { reason, .. } => {
                assert_eq!(reason, "Project ID mismatch: expected 'billing', found 'auth'")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn incomplete_step_blocks_then_allows_on_retry() {
        let f = Fixture::new(&FULL[..3]);
        let ctx = f.ctx();
        match f.service().validate(&ctx, None) {
            HookDecision::Block { reason, .. } => assert_eq!(reason, "Missing phases: GREEN, COMMIT"),
            other => panic!("unexpected {other:?}"),
        }
        let failed = f.log.find(events::HOOK_SUBAGENT_STOP_FAILED).unwrap();
        assert!(!failed.data.contains_key("allowed_despite_failure"));

        let retry = SubagentStopContext {
            stop_hook_active: true,
            ..ctx
        };
        assert!(f.service().validate(&retry, None).is_allow());
        let failed = f.log.find(events::HOOK_SUBAGENT_STOP_FAILED).unwrap();
        assert_eq!(failed.data["allowed_despite_failure"], true);
        assert!(f.log.find(events::HOOK_SUBAGENT_STOP_PASSED).is_none());
    }

    #[test]
    fn commit_verification() {
        let f = Fixture::new(FULL);
        let mut ctx = f.ctx();
        ctx.cwd = Some(f.dir.path().to_path_buf());

        let missing = StubCommits(None);
        match f.service().with_commit_verifier(&missing).validate(&ctx, None) {
            HookDecision::Block { reason, .. } => {
                assert_eq!(reason, "COMMIT_NOT_VERIFIED: No commit found with Step-ID: 01-01")
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(f.log.find(events::COMMIT_NOT_VERIFIED).is_some());

        let found = StubCommits(Some("abc123"));
        assert!(f.service().with_commit_verifier(&found).validate(&ctx, None).is_allow());
        let verified = f.log.find(events::COMMIT_VERIFIED).unwrap();
        assert_eq!(verified.data["commit_hash"], "abc123");
        assert_eq!(verified.data["commit_subject"], "feat: step");
    }

    #[test]
    fn scope_violations_are_logged_not_blocking() {
        let mut f = Fixture::new(FULL);
        f.scope.out_of_scope = vec!["secrets.env".to_string()];
        assert!(f.service().validate(&f.ctx(), None).is_allow());
        let ev = f.log.find(events::SCOPE_VIOLATION).unwrap();
        assert_eq!(ev.data["out_of_scope_file"], "secrets.env");
    }

    #[test]
    fn fabricated_timestamps_are_rewritten() {
        let mut lines = FULL.to_vec();
        lines[0] = "01-01|PREPARE|EXECUTED|PASS|2026-02-02T09:00:00Z";
        lines[4] = "01-01|COMMIT|EXECUTED|PASS|2030-01-01T00:00:00Z";
        let f = Fixture::new(&lines);
        assert!(f.service().validate(&f.ctx(), None).is_allow());

        let text = std::fs::read_to_string(f.ctx().execution_log_path).unwrap();
        assert!(!text.contains("2026-02-02T09:00:00Z"));
        assert!(!text.contains("2030-01-01T00:00:00Z"));
        // Two corrections between 11:00 and 12:00 land at 11:20 and 11:40.
        assert!(text.contains("01-01|PREPARE|EXECUTED|PASS|2026-02-02T11:20:00Z"));
        assert!(text.contains("01-01|COMMIT|EXECUTED|PASS|2026-02-02T11:40:00Z"));

        let names = f.log.names();
        assert_eq!(
            names.iter().filter(|n| *n == events::LOG_INTEGRITY_CORRECTED).count(),
            2
        );
        assert!(!names.iter().any(|n| n == events::LOG_INTEGRITY_WARNING));
    }

    #[test]
    fn integrity_warnings_are_logged() {
        let mut lines = FULL.to_vec();
        lines.push("01-01|REFACTOR_L1|EXECUTED|PASS|2026-02-02T11:55:00Z");
        let f = Fixture::new(&lines);
        assert!(f.service().validate(&f.ctx(), None).is_allow());
        let ev = f.log.find(events::LOG_INTEGRITY_WARNING).unwrap();
        assert!(ev.data["warning"]
            .as_str()
            .unwrap()
            .starts_with("Unrecognized phase name 'REFACTOR_L1'"));
    }
}
