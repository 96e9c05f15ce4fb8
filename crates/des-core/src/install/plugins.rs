use super::convert::{convert_agent, convert_prompt_content, prompt_filename, skill_dir_name};
use super::{InitContext, InstallContext, Plugin, PluginResult};
use crate::error::Result;
use crate::io::{atomic_write, ensure_dir, list_prefixed};
use crate::paths::{github_hooks_dir, github_prompts_dir, NW_PREFIX};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

const AGENT_SUFFIX: &str = ".agent.md";
const PROMPT_SUFFIX: &str = ".prompt.md";
const SKILL_FILE: &str = "SKILL.md";

/// Files in `dir` named `nw-*<suffix>`.
fn owned_files(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>> {
    Ok(list_prefixed(dir, NW_PREFIX)?
        .into_iter()
        .filter(|p| p.is_file() && p.to_string_lossy().ends_with(suffix))
        .collect())
}

/// `*.md` files directly inside `dir`, sorted. A missing directory is empty.
fn markdown_files(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    Ok(list_prefixed(dir, prefix)?
        .into_iter()
        .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == "md"))
        .collect())
}

// ---------------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------------

/// `nWave/agents/nw-*.md` converted into `~/.copilot/agents/nw-*.agent.md`.
pub struct AgentsPlugin;

impl Plugin<InstallContext> for AgentsPlugin {
    fn name(&self) -> &'static str {
        "agents"
    }

    fn priority(&self) -> u32 {
        10
    }

    fn install(&self, ctx: &InstallContext) -> Result<PluginResult> {
        let source_dir = ctx.framework()?.agents_dir();
        if !source_dir.is_dir() {
            return Ok(PluginResult::ok(
                self.name(),
                "No agents directory found, skipping",
            ));
        }
        let sources = markdown_files(&source_dir, NW_PREFIX)?;

        if !ctx.dry_run {
            // User agents without the nw- prefix are left alone.
            for stale in owned_files(&ctx.agents_dir, AGENT_SUFFIX)? {
                std::fs::remove_file(stale)?;
            }
            ensure_dir(&ctx.agents_dir)?;
        }

        let mut installed = Vec::with_capacity(sources.len());
        for source in &sources {
            let converted = convert_agent(source)?;
            let target = ctx.agents_dir.join(&converted.target_filename);
            if !ctx.dry_run {
                atomic_write(&target, converted.content.as_bytes())?;
            }
            installed.push(target);
        }

        Ok(PluginResult::ok(
            self.name(),
            format!("Agents installed ({} files)", installed.len()),
        )
        .with_files(installed))
    }

    fn uninstall(&self, ctx: &InstallContext) -> Result<PluginResult> {
        let owned = owned_files(&ctx.agents_dir, AGENT_SUFFIX)?;
        if !ctx.dry_run {
            for file in &owned {
                std::fs::remove_file(file)?;
            }
        }
        Ok(PluginResult::ok(
            self.name(),
            format!("Removed {} agent files", owned.len()),
        ))
    }

    fn verify(&self, ctx: &InstallContext) -> Result<PluginResult> {
        let owned = owned_files(&ctx.agents_dir, AGENT_SUFFIX)?;
        if owned.is_empty() {
            return Ok(PluginResult::failed(
                self.name(),
                "No nw-*.agent.md files found in agents directory",
                vec!["No agent files installed".to_string()],
            ));
        }
        Ok(PluginResult::ok(
            self.name(),
            format!("Verified {} agent files", owned.len()),
        ))
    }
}

// ---------------------------------------------------------------------------
// Skills
// ---------------------------------------------------------------------------

/// `nWave/skills/<agent>/<skill>.md` copied to `~/.copilot/skills/<name>/SKILL.md`.
pub struct SkillsPlugin;

impl SkillsPlugin {
    /// `(agent folder, skill file)` pairs in name order.
    fn source_skills(root: &Path) -> Result<Vec<(String, PathBuf)>> {
        let mut out = Vec::new();
        for agent_dir in list_prefixed(root, "")? {
            if !agent_dir.is_dir() {
                continue;
            }
            let agent = agent_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            for skill in markdown_files(&agent_dir, "")? {
                out.push((agent.clone(), skill));
            }
        }
        Ok(out)
    }

    fn owned_dirs(skills_dir: &Path) -> Result<Vec<PathBuf>> {
        Ok(list_prefixed(skills_dir, NW_PREFIX)?
            .into_iter()
            .filter(|p| p.is_dir())
            .collect())
    }
}

impl Plugin<InstallContext> for SkillsPlugin {
    fn name(&self) -> &'static str {
        "skills"
    }

    fn priority(&self) -> u32 {
        20
    }

    fn install(&self, ctx: &InstallContext) -> Result<PluginResult> {
        let skills = Self::source_skills(&ctx.framework()?.skills_dir())?;
        if skills.is_empty() {
            return Ok(PluginResult::ok(
                self.name(),
                "No skills directory found, skipping",
            ));
        }

        if !ctx.dry_run {
            for stale in Self::owned_dirs(&ctx.skills_dir)? {
                std::fs::remove_dir_all(stale)?;
            }
            ensure_dir(&ctx.skills_dir)?;
        }

        let mut installed = Vec::with_capacity(skills.len());
        for (agent, skill) in &skills {
            let target = ctx
                .skills_dir
                .join(skill_dir_name(agent, skill))
                .join(SKILL_FILE);
            if !ctx.dry_run {
                let content = std::fs::read(skill)?;
                atomic_write(&target, &content)?;
            }
            installed.push(target);
        }

        Ok(PluginResult::ok(
            self.name(),
            format!("Skills installed ({} files)", installed.len()),
        )
        .with_files(installed))
    }

    fn uninstall(&self, ctx: &InstallContext) -> Result<PluginResult> {
        let owned = Self::owned_dirs(&ctx.skills_dir)?;
        if !ctx.dry_run {
            for dir in &owned {
                std::fs::remove_dir_all(dir)?;
            }
        }
        Ok(PluginResult::ok(
            self.name(),
            format!("Removed {} skill directories", owned.len()),
        ))
    }

    fn verify(&self, ctx: &InstallContext) -> Result<PluginResult> {
        let count = Self::owned_dirs(&ctx.skills_dir)?
            .iter()
            .filter(|d| d.join(SKILL_FILE).is_file())
            .count();
        if count == 0 {
            return Ok(PluginResult::failed(
                self.name(),
                "No nw-*/SKILL.md files found in skills directory",
                vec!["No skill files installed".to_string()],
            ));
        }
        Ok(PluginResult::ok(
            self.name(),
            format!("Verified {count} skill directories"),
        ))
    }
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

/// Copilot hook configs in `.github/hooks/` that route agent dispatches and
/// subagent stops through `hook --protocol copilot`.
pub struct HooksPlugin;

impl HooksPlugin {
    /// `(file name, config)` for each generated hook file.
    pub fn configs(program: &str) -> Vec<(&'static str, Value)> {
        let command = |action: &str| format!("{program} hook --protocol copilot {action}");
        vec![
            (
                "nw-pre-tool-use.json",
                json!({
                    "version": 1,
                    "hooks": {
                        "preToolUse": [{
                            "command": command("pre-tool-use"),
                            "matcher": { "toolName": "agent" },
                        }]
                    }
                }),
            ),
            (
                "nw-post-tool-use.json",
                json!({
                    "version": 1,
                    "hooks": {
                        "postToolUse": [{
                            "command": command("post-tool-use"),
                            "matcher": { "toolName": "agent" },
                        }]
                    }
                }),
            ),
            (
                "nw-subagent-stop.json",
                json!({
                    "version": 1,
                    "hooks": {
                        "subagentStop": [{ "command": command("subagent-stop") }]
                    }
                }),
            ),
        ]
    }
}

impl Plugin<InitContext> for HooksPlugin {
    fn name(&self) -> &'static str {
        "hooks"
    }

    fn priority(&self) -> u32 {
        5
    }

    fn install(&self, ctx: &InitContext) -> Result<PluginResult> {
        let hooks_dir = github_hooks_dir(&ctx.project_root);
        let mut installed = Vec::new();
        for (filename, config) in Self::configs(&ctx.hook_program) {
            let target = hooks_dir.join(filename);
            if !ctx.dry_run {
                let mut body = serde_json::to_string_pretty(&config)?;
                body.push('\n');
                atomic_write(&target, body.as_bytes())?;
            }
            installed.push(target);
        }
        Ok(PluginResult::ok(
            self.name(),
            format!("Hook configs written ({} files)", installed.len()),
        )
        .with_files(installed))
    }

    fn uninstall(&self, ctx: &InitContext) -> Result<PluginResult> {
        let owned = owned_files(&github_hooks_dir(&ctx.project_root), ".json")?;
        if !ctx.dry_run {
            for file in &owned {
                std::fs::remove_file(file)?;
            }
        }
        Ok(PluginResult::ok(
            self.name(),
            format!("Removed {} hook config files", owned.len()),
        ))
    }

    fn verify(&self, ctx: &InitContext) -> Result<PluginResult> {
        let owned = owned_files(&github_hooks_dir(&ctx.project_root), ".json")?;
        if owned.is_empty() {
            return Ok(PluginResult::failed(
                self.name(),
                "No nw-*.json hook files found in .github/hooks/",
                vec!["No hook configs installed".to_string()],
            ));
        }
        Ok(PluginResult::ok(
            self.name(),
            format!("Verified {} hook config files", owned.len()),
        ))
    }
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

/// `nWave/tasks/nw/<cmd>.md` rewritten as `.github/prompts/nw-<cmd>.prompt.md`.
pub struct PromptsPlugin;

impl Plugin<InitContext> for PromptsPlugin {
    fn name(&self) -> &'static str {
        "prompts"
    }

    fn priority(&self) -> u32 {
        10
    }

    fn install(&self, ctx: &InitContext) -> Result<PluginResult> {
        let tasks_dir = ctx.framework()?.tasks_dir();
        if !tasks_dir.is_dir() {
            return Ok(PluginResult::ok(
                self.name(),
                "No tasks directory found, skipping",
            ));
        }
        let prompts_dir = github_prompts_dir(&ctx.project_root);
        let mut installed = Vec::new();
        for source in markdown_files(&tasks_dir, "")? {
            let target = prompts_dir.join(prompt_filename(&source));
            if !ctx.dry_run {
                let content = std::fs::read_to_string(&source)?;
                let converted = convert_prompt_content(&source, &content)?;
                atomic_write(&target, converted.as_bytes())?;
            }
            installed.push(target);
        }
        Ok(PluginResult::ok(
            self.name(),
            format!("Prompt files written ({} files)", installed.len()),
        )
        .with_files(installed))
    }

    fn uninstall(&self, ctx: &InitContext) -> Result<PluginResult> {
        let owned = owned_files(&github_prompts_dir(&ctx.project_root), PROMPT_SUFFIX)?;
        if !ctx.dry_run {
            for file in &owned {
                std::fs::remove_file(file)?;
            }
        }
        Ok(PluginResult::ok(
            self.name(),
            format!("Removed {} prompt files", owned.len()),
        ))
    }

    fn verify(&self, ctx: &InitContext) -> Result<PluginResult> {
        let owned = owned_files(&github_prompts_dir(&ctx.project_root), PROMPT_SUFFIX)?;
        if owned.is_empty() {
            return Ok(PluginResult::failed(
                self.name(),
                "No nw-*.prompt.md files found",
                vec!["No prompt files installed".to_string()],
            ));
        }
        Ok(PluginResult::ok(
            self.name(),
            format!("Verified {} prompt files", owned.len()),
        ))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::install::FrameworkSource;
    use tempfile::TempDir;

    fn install_ctx(dir: &TempDir, dry_run: bool) -> InstallContext {
        InstallContext {
            agents_dir: dir.path().join("home/.copilot/agents"),
            skills_dir: dir.path().join("home/.copilot/skills"),
            source: Some(fixtures::framework(&dir.path().join("src"))),
            dry_run,
        }
    }

    fn init_ctx(dir: &TempDir, dry_run: bool) -> InitContext {
        InitContext {
            project_root: dir.path().join("project"),
            source: Some(fixtures::framework(&dir.path().join("src"))),
            hook_program: "/usr/local/bin/nwave-copilot".to_string(),
            dry_run,
        }
    }

    #[test]
    fn agents_install_replaces_only_owned_files() {
        let dir = TempDir::new().unwrap();
        let ctx = install_ctx(&dir, false);
        std::fs::create_dir_all(&ctx.agents_dir).unwrap();
        std::fs::write(ctx.agents_dir.join("nw-retired.agent.md"), "old").unwrap();
        std::fs::write(ctx.agents_dir.join("mine.agent.md"), "user").unwrap();

        let result = AgentsPlugin.install(&ctx).unwrap();
        assert!(result.success);
        assert_eq!(result.message, "Agents installed (2 files)");
        assert!(!ctx.agents_dir.join("nw-retired.agent.md").exists());
        assert!(ctx.agents_dir.join("mine.agent.md").exists());
        let crafter =
            std::fs::read_to_string(ctx.agents_dir.join("nw-software-crafter.agent.md")).unwrap();
        assert!(crafter.contains("tools:\n  - read\n  - execute\n"));

        let removed = AgentsPlugin.uninstall(&ctx).unwrap();
        assert_eq!(removed.message, "Removed 2 agent files");
        assert!(ctx.agents_dir.join("mine.agent.md").exists());
    }

    #[test]
    fn dry_run_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let ctx = install_ctx(&dir, true);
        let agents = AgentsPlugin.install(&ctx).unwrap();
        let skills = SkillsPlugin.install(&ctx).unwrap();
        assert_eq!(agents.installed_files.len(), 2);
        assert_eq!(skills.installed_files.len(), 3);
        assert!(!ctx.agents_dir.exists());
        assert!(!ctx.skills_dir.exists());
    }

    #[test]
    fn skills_install_uses_flat_names() {
        let dir = TempDir::new().unwrap();
        let ctx = install_ctx(&dir, false);
        let result = SkillsPlugin.install(&ctx).unwrap();
        assert_eq!(result.message, "Skills installed (3 files)");
        for name in [
            "nw-tdd-methodology",
            "nw-software-crafter-review-dimensions",
            "nw-solution-architect-review-dimensions",
        ] {
            assert!(ctx.skills_dir.join(name).join("SKILL.md").is_file(), "{name}");
        }
        assert!(SkillsPlugin.verify(&ctx).unwrap().success);
        let removed = SkillsPlugin.uninstall(&ctx).unwrap();
        assert_eq!(removed.message, "Removed 3 skill directories");
        assert!(!SkillsPlugin.verify(&ctx).unwrap().success);
    }

    #[test]
    fn missing_agents_dir_is_skipped() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("empty/nWave")).unwrap();
        let ctx = InstallContext {
            agents_dir: dir.path().join("agents"),
            skills_dir: dir.path().join("skills"),
            source: Some(FrameworkSource::at(&dir.path().join("empty")).unwrap()),
            dry_run: false,
        };
        let result = AgentsPlugin.install(&ctx).unwrap();
        assert_eq!(result.message, "No agents directory found, skipping");
        let result = SkillsPlugin.install(&ctx).unwrap();
        assert_eq!(result.message, "No skills directory found, skipping");
    }

    #[test]
    fn hooks_write_copilot_configs() {
        let dir = TempDir::new().unwrap();
        let ctx = init_ctx(&dir, false);
        let result = HooksPlugin.install(&ctx).unwrap();
        assert_eq!(result.message, "Hook configs written (3 files)");

        let raw = std::fs::read_to_string(
            ctx.project_root.join(".github/hooks/nw-pre-tool-use.json"),
        )
        .unwrap();
        assert!(raw.ends_with("}\n"));
        let config: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(config["version"], 1);
        assert_eq!(
            config["hooks"]["preToolUse"][0]["command"],
            "/usr/local/bin/nwave-copilot hook --protocol copilot pre-tool-use"
        );
        assert_eq!(config["hooks"]["preToolUse"][0]["matcher"]["toolName"], "agent");

        let stop: Value = serde_json::from_str(
            &std::fs::read_to_string(ctx.project_root.join(".github/hooks/nw-subagent-stop.json"))
                .unwrap(),
        )
        .unwrap();
        assert!(stop["hooks"]["subagentStop"][0].get("matcher").is_none());

        std::fs::write(ctx.project_root.join(".github/hooks/team.json"), "{}").unwrap();
        let removed = HooksPlugin.uninstall(&ctx).unwrap();
        assert_eq!(removed.message, "Removed 3 hook config files");
        assert!(ctx.project_root.join(".github/hooks/team.json").exists());
    }

    #[test]
    fn prompts_are_prefixed_and_stripped() {
        let dir = TempDir::new().unwrap();
        let ctx = init_ctx(&dir, false);
        let result = PromptsPlugin.install(&ctx).unwrap();
        assert_eq!(result.message, "Prompt files written (2 files)");
        let discover = std::fs::read_to_string(
            ctx.project_root.join(".github/prompts/nw-discover.prompt.md"),
        )
        .unwrap();
        assert_eq!(discover, "---\ndescription: Run discovery\n---\n# Discover\n");
        assert!(PromptsPlugin.verify(&ctx).unwrap().success);
        assert_eq!(
            PromptsPlugin.uninstall(&ctx).unwrap().message,
            "Removed 2 prompt files"
        );
    }

    #[test]
    fn removal_works_without_framework() {
        let dir = TempDir::new().unwrap();
        let ctx = InstallContext {
            agents_dir: dir.path().join("agents"),
            skills_dir: dir.path().join("skills"),
            source: None,
            dry_run: false,
        };
        assert!(AgentsPlugin.install(&ctx).is_err());
        assert_eq!(
            AgentsPlugin.uninstall(&ctx).unwrap().message,
            "Removed 0 agent files"
        );
    }

    #[test]
    fn verify_reports_missing_hooks() {
        let dir = TempDir::new().unwrap();
        let ctx = init_ctx(&dir, false);
        let result = HooksPlugin.verify(&ctx).unwrap();
        assert!(!result.success);
        assert_eq!(result.errors, vec!["No hook configs installed".to_string()]);
    }
}
