//! Git-backed checks run when a step finishes: did the COMMIT phase really
//! commit, and which files did the step touch.

use crate::error::{DesError, Result};
use globset::{Glob, GlobSetBuilder};
use std::path::{Path, PathBuf};
use std::process::Command;

fn git_bin() -> Result<PathBuf> {
    which::which("git").map_err(|_| DesError::GitNotInstalled)
}

/// Run git in `cwd` and return trimmed stdout.
fn run_git(cwd: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new(git_bin()?)
        .args(args)
        .current_dir(cwd)
        .output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DesError::GitFailed(stderr.trim().to_string()));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

// ---------------------------------------------------------------------------
// Commit verification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub hash: String,
    pub date: Option<String>,
    pub subject: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitCheck {
    Verified(CommitInfo),
    NotVerified(String),
}

pub trait CommitVerifier {
    /// Look for a commit whose message carries a `Step-ID: {step_id}` trailer.
    fn verify_commit(&self, step_id: &str, cwd: &Path) -> CommitCheck;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GitCommitVerifier;

impl CommitVerifier for GitCommitVerifier {
    fn verify_commit(&self, step_id: &str, cwd: &Path) -> CommitCheck {
        let grep = format!("--grep=Step-ID: {step_id}");
        match run_git(cwd, &["log", "--format=%H|%ai|%s", &grep, "-1"]) {
            Ok(out) if out.is_empty() => {
                CommitCheck::NotVerified(format!("No commit found with Step-ID: {step_id}"))
            }
            Ok(out) => CommitCheck::Verified(parse_log_line(&out)),
            Err(e @ DesError::GitFailed(_)) => CommitCheck::NotVerified(e.to_string()),
            Err(e) => CommitCheck::NotVerified(format!("Git verification error: {e}")),
        }
    }
}

fn parse_log_line(line: &str) -> CommitInfo {
    let mut parts = line.splitn(3, '|');
    CommitInfo {
        hash: parts.next().unwrap_or_default().to_string(),
        date: parts.next().map(str::to_string),
        subject: parts.next().map(str::to_string),
    }
}

// ---------------------------------------------------------------------------
// Scope checking
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeCheck {
    pub out_of_scope: Vec<String>,
    /// Set when git could not be queried; the check is then a no-op.
    pub skipped: Option<String>,
}

pub trait ScopeChecker {
    fn check_scope(&self, project_root: &Path, allowed: &[&str]) -> ScopeCheck;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GitScopeChecker;

impl ScopeChecker for GitScopeChecker {
    fn check_scope(&self, project_root: &Path, allowed: &[&str]) -> ScopeCheck {
        let modified = match run_git(project_root, &["diff", "--name-only", "HEAD"]) {
            Ok(out) => out,
            Err(DesError::GitNotInstalled) => {
                return ScopeCheck {
                    skipped: Some("Git executable not found".to_string()),
                    ..Default::default()
                }
            }
            Err(_) => {
                return ScopeCheck {
                    skipped: Some("Git command unavailable in environment".to_string()),
                    ..Default::default()
                }
            }
        };
        let files: Vec<&str> = modified.lines().filter(|l| !l.trim().is_empty()).collect();
        match out_of_scope(&files, allowed) {
            Ok(out_of_scope) => ScopeCheck {
                out_of_scope,
                skipped: None,
            },
            Err(e) => ScopeCheck {
                skipped: Some(format!("Invalid scope pattern: {e}")),
                ..Default::default()
            },
        }
    }
}

/// Files matching none of the `allowed` glob patterns.
pub fn out_of_scope(files: &[&str], allowed: &[&str]) -> std::result::Result<Vec<String>, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    for pattern in allowed {
        builder.add(Glob::new(pattern)?);
    }
    let set = builder.build()?;
    Ok(files
        .iter()
        .filter(|f| !set.is_match(f))
        .map(|f| f.to_string())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(["-c", "user.name=Test", "-c", "user.email=test@example.com"])
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap()
            .status;
        assert!(status.success(), "git {args:?} failed");
    }

    fn repo() -> Option<TempDir> {
        which::which("git").ok()?;
        let dir = TempDir::new().unwrap();
        git(dir.path(), &["init", "-q"]);
        std::fs::write(dir.path().join("README.md"), "x\n").unwrap();
        git(dir.path(), &["add", "."]);
        git(dir.path(), &["commit", "-q", "-m", "initial"]);
        Some(dir)
    }

    #[test]
    fn parse_log_line_splits_subject_once() {
        let info = parse_log_line("abc123|2026-02-02 10:00:00 +0000|feat: a|b");
        assert_eq!(info.hash, "abc123");
        assert_eq!(info.subject.as_deref(), Some("feat: a|b"));
    }

    #[test]
    fn scope_patterns() {
        let files = ["src/lib.rs", "README.md", "docs/a.md"];
        assert!(out_of_scope(&files, &["**/*"]).unwrap().is_empty());
        assert_eq!(
            out_of_scope(&files, &["src/**", "docs/**"]).unwrap(),
            vec!["README.md"]
        );
    }

    #[test]
    fn commit_with_step_trailer_is_found() {
        let Some(dir) = repo() else { return };
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        git(dir.path(), &["add", "."]);
        git(
            dir.path(),
            &["commit", "-q", "-m", "feat: step one", "-m", "Step-ID: 01-01"],
        );
        match GitCommitVerifier.verify_commit("01-01", dir.path()) {
            CommitCheck::Verified(info) => {
                assert_eq!(info.subject.as_deref(), Some("feat: step one"));
                assert_eq!(info.hash.len(), 40);
            }
            other => panic!("expected verified, got {other:?}"),
        }
        assert_eq!(
            GitCommitVerifier.verify_commit("01-02", dir.path()),
            CommitCheck::NotVerified("No commit found with Step-ID: 01-02".to_string())
        );
    }

    #[test]
    fn outside_a_repository_is_not_verified() {
        if which::which("git").is_err() {
            return;
        }
        let dir = TempDir::new().unwrap();
        match GitCommitVerifier.verify_commit("01-01", dir.path()) {
            CommitCheck::NotVerified(reason) => assert!(reason.starts_with("git command failed")),
            other => panic!("expected failure, got {other:?}"),
        }
        let scope = GitScopeChecker.check_scope(dir.path(), &["**/*"]);
        assert!(scope.skipped.is_some());
    }

    #[test]
    fn modified_files_are_checked_against_patterns() {
        let Some(dir) = repo() else { return };
        std::fs::write(dir.path().join("README.md"), "changed\n").unwrap();
        let scope = GitScopeChecker.check_scope(dir.path(), &["src/**"]);
        assert_eq!(scope.out_of_scope, vec!["README.md"]);
        assert!(GitScopeChecker.check_scope(dir.path(), &["**/*"]).out_of_scope.is_empty());
    }
}
