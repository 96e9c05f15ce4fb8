//! Copilot installer: converts the nWave framework into Copilot agents,
//! skills, prompt files and hook configs.
//!
//! User-level plugins run for `install`/`uninstall` and write under
//! `~/.copilot/`. Project-level plugins run for `init`/`deinit` and write
//! under `.github/`.

pub mod build;
pub mod convert;
pub mod framework;
pub mod plugins;

pub use build::{build_plugin, BuildReport};
pub use framework::{FrameworkSource, FRAMEWORK_ENV};
pub use plugins::{AgentsPlugin, HooksPlugin, PromptsPlugin, SkillsPlugin};

use crate::error::{DesError, Result};
use crate::paths::{COPILOT_AGENTS_DIR, COPILOT_SKILLS_DIR};
use std::fmt;
use std::path::PathBuf;

/// Default program name written into hook commands.
pub const DEFAULT_HOOK_PROGRAM: &str = "nwave-copilot";

// ---------------------------------------------------------------------------
// Contexts
// ---------------------------------------------------------------------------

/// Personal install targets (`install` / `uninstall`).
#[derive(Debug, Clone)]
pub struct InstallContext {
    pub agents_dir: PathBuf,
    pub skills_dir: PathBuf,
    /// Only installing needs the framework; removal works without it.
    pub source: Option<FrameworkSource>,
    pub dry_run: bool,
}

impl InstallContext {
    /// Targets under the user's home directory.
    pub fn for_home(source: Option<FrameworkSource>, dry_run: bool) -> Result<Self> {
        let home = home::home_dir().ok_or(DesError::HomeNotFound)?;
        Ok(InstallContext {
            agents_dir: home.join(COPILOT_AGENTS_DIR),
            skills_dir: home.join(COPILOT_SKILLS_DIR),
            source,
            dry_run,
        })
    }

    pub fn framework(&self) -> Result<&FrameworkSource> {
        require(self.source.as_ref())
    }
}

/// Project targets (`init` / `deinit`).
#[derive(Debug, Clone)]
pub struct InitContext {
    pub project_root: PathBuf,
    pub source: Option<FrameworkSource>,
    /// Program invoked by the generated hook configs.
    pub hook_program: String,
    pub dry_run: bool,
}

impl InitContext {
    pub fn framework(&self) -> Result<&FrameworkSource> {
        require(self.source.as_ref())
    }
}

fn require(source: Option<&FrameworkSource>) -> Result<&FrameworkSource> {
    source.ok_or_else(|| {
        DesError::FrameworkNotFound(format!(
            "pass --source or set {FRAMEWORK_ENV} to the directory containing nWave/"
        ))
    })
}

// ---------------------------------------------------------------------------
// Plugin contract
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginResult {
    pub success: bool,
    pub plugin_name: String,
    pub message: String,
    pub errors: Vec<String>,
    pub installed_files: Vec<PathBuf>,
}

impl PluginResult {
    pub fn ok(plugin_name: &str, message: impl Into<String>) -> Self {
        PluginResult {
            success: true,
            plugin_name: plugin_name.to_string(),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn failed(plugin_name: &str, message: impl Into<String>, errors: Vec<String>) -> Self {
        PluginResult {
            success: false,
            plugin_name: plugin_name.to_string(),
            message: message.into(),
            errors,
            installed_files: Vec::new(),
        }
    }

    pub fn with_files(mut self, files: Vec<PathBuf>) -> Self {
        self.installed_files = files;
        self
    }
}

impl fmt::Display for PluginResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.success { '✓' } else { '✗' };
        write!(f, "{mark} {}: {}", self.plugin_name, self.message)
    }
}

/// One installable component. `C` is the context it installs into.
pub trait Plugin<C> {
    fn name(&self) -> &'static str;
    fn priority(&self) -> u32;
    fn install(&self, ctx: &C) -> Result<PluginResult>;
    fn uninstall(&self, ctx: &C) -> Result<PluginResult>;
    fn verify(&self, ctx: &C) -> Result<PluginResult>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Install,
    Uninstall,
    Verify,
}

impl Operation {
    fn label(self) -> &'static str {
        match self {
            Operation::Install => "install",
            Operation::Uninstall => "uninstall",
            Operation::Verify => "verify",
        }
    }
}

pub fn user_plugins() -> Vec<Box<dyn Plugin<InstallContext>>> {
    vec![Box::new(AgentsPlugin), Box::new(SkillsPlugin)]
}

pub fn project_plugins() -> Vec<Box<dyn Plugin<InitContext>>> {
    vec![Box::new(HooksPlugin), Box::new(PromptsPlugin)]
}

/// Run `op` on every plugin in priority order. A plugin error becomes a
/// failed result; the remaining plugins still run.
pub fn run_plugins<C>(
    mut plugins: Vec<Box<dyn Plugin<C>>>,
    ctx: &C,
    op: Operation,
) -> Vec<PluginResult> {
    plugins.sort_by_key(|p| p.priority());
    plugins
        .iter()
        .map(|plugin| {
            let outcome = match op {
                Operation::Install => plugin.install(ctx),
                Operation::Uninstall => plugin.uninstall(ctx),
                Operation::Verify => plugin.verify(ctx),
            };
            outcome.unwrap_or_else(|e| {
                PluginResult::failed(
                    plugin.name(),
                    format!("{} {} failed: {e}", plugin.name(), op.label()),
                    vec![e.to_string()],
                )
            })
        })
        .collect()
}
