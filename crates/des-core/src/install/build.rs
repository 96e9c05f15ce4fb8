use super::convert::{convert_agent, skill_dir_name};
use super::FrameworkSource;
use crate::error::Result;
use crate::io::{atomic_write, ensure_dir, list_prefixed};
use crate::paths::NW_PREFIX;
use serde_json::json;
use std::path::{Path, PathBuf};

pub const DEFAULT_OUTPUT_DIR: &str = "packages/nwave-plugin";

const HOOK_EVENTS: &[(&str, &str)] = &[
    ("preToolUse", "pre-tool-use"),
    ("postToolUse", "post-tool-use"),
    ("subagentStop", "subagent-stop"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub output: PathBuf,
    pub agents: usize,
    pub skills: usize,
}

fn sorted_md(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    Ok(list_prefixed(dir, prefix)?
        .into_iter()
        .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == "md"))
        .collect())
}

fn fresh_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        std::fs::remove_dir_all(dir)?;
    }
    ensure_dir(dir)
}

/// `hooks.json` for the plugin bundle. Each event invokes `program` through
/// both bash and PowerShell.
pub fn hooks_manifest(program: &str) -> serde_json::Value {
    let mut hooks = serde_json::Map::new();
    for (event, action) in HOOK_EVENTS {
        let args = format!("hook --protocol copilot {action}");
        hooks.insert(
            (*event).to_string(),
            json!([{
                "type": "command",
                "bash": format!("{program} {args}"),
                "powershell": format!("& '{program}' {args}"),
            }]),
        );
    }
    json!({ "version": 1, "hooks": hooks })
}

pub fn plugin_manifest(agents: usize, skills: usize) -> serde_json::Value {
    json!({
        "name": "nwave",
        "description": format!(
            "nWave: A six-wave AI-assisted software development methodology. \
             {agents} specialist agents, {skills} skills, and DES enforcement hooks for TDD discipline."
        ),
        "version": env!("CARGO_PKG_VERSION"),
        "author": { "name": "nWave contributors" },
        "license": "MIT",
        "homepage": "https://github.com/nwave-dev/nwave",
        "keywords": ["nwave", "tdd", "agile", "methodology", "software-development"],
        "agents": "agents/",
        "skills": "skills/",
        "hooks": "hooks.json",
    })
}

fn write_json(path: &Path, value: &serde_json::Value) -> Result<()> {
    let mut body = serde_json::to_string_pretty(value)?;
    body.push('\n');
    atomic_write(path, body.as_bytes())
}

/// Build a Copilot CLI plugin directory at `output`.
///
/// `agents/` and `skills/` are recreated from scratch on every build;
/// `hooks.json` and `plugin.json` are overwritten.
pub fn build_plugin(framework: &FrameworkSource, output: &Path, program: &str) -> Result<BuildReport> {
    let agents_out = output.join("agents");
    let skills_out = output.join("skills");
    fresh_dir(&agents_out)?;
    fresh_dir(&skills_out)?;

    let agent_sources = sorted_md(&framework.agents_dir(), NW_PREFIX)?;
    for source in &agent_sources {
        let converted = convert_agent(source)?;
        atomic_write(
            &agents_out.join(&converted.target_filename),
            converted.content.as_bytes(),
        )?;
    }

    let mut skills = 0;
    for agent_dir in list_prefixed(&framework.skills_dir(), "")? {
        if !agent_dir.is_dir() {
            continue;
        }
        let agent = agent_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        for skill in sorted_md(&agent_dir, "")? {
            let target = skills_out.join(skill_dir_name(&agent, &skill)).join("SKILL.md");
            atomic_write(&target, &std::fs::read(&skill)?)?;
            skills += 1;
        }
    }

    write_json(&output.join("hooks.json"), &hooks_manifest(program))?;
    write_json(
        &output.join("plugin.json"),
        &plugin_manifest(agent_sources.len(), skills),
    )?;

    Ok(BuildReport {
        output: output.to_path_buf(),
        agents: agent_sources.len(),
        skills,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::install::plugins::fixtures;
    use tempfile::TempDir;

    #[test]
    fn builds_complete_plugin_tree() {
        let dir = TempDir::new().unwrap();
        let framework = fixtures::framework(&dir.path().join("src"));
        let out = dir.path().join("plugin");
        std::fs::create_dir_all(out.join("agents")).unwrap();
        std::fs::write(out.join("agents/leftover.agent.md"), "x").unwrap();

        let report = build_plugin(&framework, &out, "nwave-copilot").unwrap();
        assert_eq!(report.agents, 2);
        assert_eq!(report.skills, 3);
        assert!(!out.join("agents/leftover.agent.md").exists());
        assert!(out.join("agents/nw-solution-architect.agent.md").is_file());
        assert!(out.join("skills/nw-tdd-methodology/SKILL.md").is_file());

        let plugin: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(out.join("plugin.json")).unwrap()).unwrap();
        assert_eq!(plugin["name"], "nwave");
        assert_eq!(plugin["hooks"], "hooks.json");
        assert_eq!(plugin["author"]["name"], "nWave contributors");

        let hooks: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(out.join("hooks.json")).unwrap()).unwrap();
        let stop = &hooks["hooks"]["subagentStop"][0];
        assert_eq!(stop["type"], "command");
        assert_eq!(stop["bash"], "nwave-copilot hook --protocol copilot subagent-stop");
        assert_eq!(
            stop["powershell"],
            "& 'nwave-copilot' hook --protocol copilot subagent-stop"
        );
    }
}
