/// Outcome of a hook validation, shared by every service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookDecision {
    Allow,
    Block {
        reason: String,
        recovery_suggestions: Vec<String>,
    },
}

impl HookDecision {
    pub fn block(reason: impl Into<String>, recovery_suggestions: Vec<String>) -> Self {
        HookDecision::Block {
            reason: reason.into(),
            recovery_suggestions,
        }
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, HookDecision::Allow)
    }

    /// 0 to allow, 2 to block.
    pub fn exit_code(&self) -> i32 {
        match self {
            HookDecision::Allow => 0,
            HookDecision::Block { .. } => 2,
        }
    }
}

/// `"  1. first\n  2. second"`.
pub fn numbered(steps: &[String]) -> String {
    steps
        .iter()
        .enumerate()
        .map(|(i, s)| format!("  {}. {s}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Block reason followed by a numbered recovery list, if any.
pub fn reason_with_recovery(reason: &str, recovery: &[String]) -> String {
    if recovery.is_empty() {
        reason.to_string()
    } else {
        format!("{reason}\n\nRecovery:\n{}", numbered(recovery))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes() {
        assert_eq!(HookDecision::Allow.exit_code(), 0);
        assert_eq!(HookDecision::block("no", vec![]).exit_code(), 2);
    }

    #[test]
    fn recovery_is_numbered() {
        let text = reason_with_recovery("bad", &["fix a".into(), "fix b".into()]);
        assert_eq!(text, "bad\n\nRecovery:\n  1. fix a\n  2. fix b");
        assert_eq!(reason_with_recovery("bad", &[]), "bad");
    }
}
