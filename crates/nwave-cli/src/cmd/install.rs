use super::Exit;
use crate::output::print_json;
use anyhow::Context;
use des_core::install::{
    self as installer, FrameworkSource, InitContext, InstallContext, Operation, PluginResult,
    DEFAULT_HOOK_PROGRAM,
};
use serde_json::json;
use std::path::{Path, PathBuf};

fn cwd() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

fn locate(source: Option<&Path>) -> anyhow::Result<FrameworkSource> {
    FrameworkSource::locate(source, &cwd()).context("cannot locate the nWave framework source")
}

/// Removal does not need the framework, so a missing one is not an error.
fn locate_optional() -> Option<FrameworkSource> {
    FrameworkSource::locate(None, &cwd()).ok()
}

/// The executable hooks should call back into; falls back to the PATH name.
fn hook_program(explicit: Option<String>) -> String {
    explicit.unwrap_or_else(|| {
        std::env::current_exe()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| DEFAULT_HOOK_PROGRAM.to_string())
    })
}

fn header(command: &str, dry_run: bool, detail: &str) {
    let prefix = if dry_run { "[DRY RUN] " } else { "" };
    println!("\n{prefix}nwave-copilot {command}{detail}\n");
}

/// Print plugin results and the closing line. Any failure exits 1.
fn report(results: &[PluginResult], json: bool, done: &str, failed: &str) -> anyhow::Result<bool> {
    let ok = results.iter().all(|r| r.success);
    if json {
        let rows: Vec<_> = results
            .iter()
            .map(|r| {
                json!({
                    "plugin": r.plugin_name,
                    "success": r.success,
                    "message": r.message,
                    "errors": r.errors,
                    "files": r.installed_files,
                })
            })
            .collect();
        print_json(&json!({ "success": ok, "plugins": rows }))?;
    } else {
        for r in results {
            if r.success {
                println!("  {r}");
            } else {
                eprintln!("  {r}");
            }
        }
        if ok {
            println!("\n{done}");
        } else {
            println!("\n{failed}");
        }
    }
    if !ok {
        return Err(Exit(1).into());
    }
    Ok(!json)
}

// ---------------------------------------------------------------------------
// install / uninstall
// ---------------------------------------------------------------------------

pub fn install(source: Option<&Path>, dry_run: bool, json: bool) -> anyhow::Result<()> {
    let framework = locate(source)?;
    let ctx = InstallContext::for_home(Some(framework), dry_run)?;
    if !json {
        header("install", dry_run, &format!(" v{}", env!("CARGO_PKG_VERSION")));
    }
    let results = installer::run_plugins(installer::user_plugins(), &ctx, Operation::Install);
    tracing::debug!(plugins = results.len(), dry_run, "install finished");
    if report(&results, json, "Installation complete!", "Installation completed with errors.")? {
        println!("\nTo enable DES hooks and prompt files in a project:");
        println!("  cd <your-project> && nwave-copilot init\n");
    }
    Ok(())
}

pub fn uninstall(dry_run: bool, json: bool) -> anyhow::Result<()> {
    let ctx = InstallContext::for_home(locate_optional(), dry_run)?;
    if !json {
        header("uninstall", dry_run, "");
    }
    let results = installer::run_plugins(installer::user_plugins(), &ctx, Operation::Uninstall);
    report(&results, json, "Uninstall complete.", "Uninstall completed with errors.")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// init / deinit
// ---------------------------------------------------------------------------

pub fn init(
    root: &Path,
    source: Option<&Path>,
    program: Option<String>,
    dry_run: bool,
    json: bool,
) -> anyhow::Result<()> {
    let ctx = InitContext {
        project_root: root.to_path_buf(),
        source: Some(locate(source)?),
        hook_program: hook_program(program),
        dry_run,
    };
    if !json {
        header("init", dry_run, &format!(" in {}", root.display()));
    }
    let results = installer::run_plugins(installer::project_plugins(), &ctx, Operation::Install);
    if report(&results, json, "Project init complete!", "Init completed with errors.")? {
        println!("\nTip: commit .github/hooks/ and .github/prompts/ so your team gets DES enforcement.\n");
    }
    Ok(())
}

pub fn deinit(root: &Path, dry_run: bool, json: bool) -> anyhow::Result<()> {
    let ctx = InitContext {
        project_root: root.to_path_buf(),
        source: locate_optional(),
        hook_program: DEFAULT_HOOK_PROGRAM.to_string(),
        dry_run,
    };
    if !json {
        header("deinit", dry_run, &format!(" in {}", root.display()));
    }
    let results = installer::run_plugins(installer::project_plugins(), &ctx, Operation::Uninstall);
    report(&results, json, "Deinit complete.", "Deinit completed with errors.")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// status
// ---------------------------------------------------------------------------

/// Verify both the personal install and the project init. Reports every
/// component and exits 1 if any is missing.
pub fn status(root: &Path, json: bool) -> anyhow::Result<()> {
    let user = InstallContext::for_home(None, true)?;
    let project = InitContext {
        project_root: root.to_path_buf(),
        source: None,
        hook_program: DEFAULT_HOOK_PROGRAM.to_string(),
        dry_run: true,
    };
    let mut results = installer::run_plugins(installer::user_plugins(), &user, Operation::Verify);
    results.extend(installer::run_plugins(
        installer::project_plugins(),
        &project,
        Operation::Verify,
    ));
    if !json {
        header("status", false, &format!(" in {}", root.display()));
    }
    report(
        &results,
        json,
        "All nWave components are installed.",
        "Some nWave components are missing.",
    )?;
    Ok(())
}
