//! Claude Code assets rewritten into their Copilot equivalents.

use crate::error::{DesError, Result};
use crate::paths::NW_PREFIX;
use regex::Regex;
use serde_yaml::{Mapping, Value};
use std::path::Path;
use std::sync::OnceLock;

static FRONTMATTER: OnceLock<Regex> = OnceLock::new();
static ASK_USER: OnceLock<Regex> = OnceLock::new();

fn frontmatter_re() -> &'static Regex {
    FRONTMATTER.get_or_init(|| Regex::new(r"(?s)\A---\r?\n(.*?)\r?\n---\r?\n?").unwrap())
}

fn ask_user_re() -> &'static Regex {
    ASK_USER.get_or_init(|| Regex::new(r"\bAskUserQuestion\b").unwrap())
}

/// Skill file stems that exist under several agent folders with different
/// content. They keep the agent folder in their directory name.
pub const CONFLICTING_SKILL_NAMES: &[&str] =
    &["critique-dimensions", "review-criteria", "review-dimensions"];

/// Claude Code tool name to Copilot alias. `None` drops the tool.
pub fn copilot_tool(claude_tool: &str) -> Option<&'static str> {
    match claude_tool {
        "Read" => Some("read"),
        "Write" | "Edit" => Some("edit"),
        "Bash" => Some("execute"),
        "Glob" | "Grep" | "WebSearch" => Some("search"),
        "Task" => Some("agent"),
        "WebFetch" => Some("fetch"),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedAgent {
    pub target_filename: String,
    pub content: String,
}

// ---------------------------------------------------------------------------
// Frontmatter
// ---------------------------------------------------------------------------

/// Split a markdown document into its frontmatter mapping and body.
///
/// Documents without a frontmatter block, or with YAML that does not parse,
/// yield an empty mapping. Frontmatter that parses to something other than a
/// mapping is rejected.
fn split_frontmatter<'a>(source: &Path, content: &'a str) -> Result<Option<(Mapping, &'a str)>> {
    let Some(caps) = frontmatter_re().captures(content) else {
        return Ok(None);
    };
    let whole = caps.get(0).map(|m| m.end()).unwrap_or(0);
    let raw = caps.get(1).map(|m| m.as_str()).unwrap_or("");
    let mapping = match serde_yaml::from_str::<Value>(raw) {
        Ok(Value::Mapping(m)) => m,
        Ok(Value::Null) | Err(_) => Mapping::new(),
        Ok(_) => {
            return Err(DesError::InvalidAgent {
                path: source.display().to_string(),
                reason: "frontmatter is not a mapping".to_string(),
            })
        }
    };
    Ok(Some((mapping, &content[whole..])))
}

fn field_str(fm: &Mapping, key: &str) -> Option<String> {
    match fm.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => serde_yaml::to_string(other)
            .ok()
            .map(|s| s.trim_end().to_string()),
    }
}

/// Render a string as a YAML scalar, quoting only when YAML needs it.
fn yaml_scalar(value: &str) -> Result<String> {
    let rendered = serde_yaml::to_string(&Value::String(value.to_string()))?;
    Ok(rendered.trim_end_matches('\n').to_string())
}

fn parse_tools(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Sequence(items)) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.trim().to_string()),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) => s
            .trim()
            .trim_matches(|c| c == '[' || c == ']')
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn map_tools(tools: &[String]) -> Vec<&'static str> {
    let mut out: Vec<&'static str> = Vec::new();
    for alias in tools.iter().filter_map(|t| copilot_tool(t)) {
        if !out.contains(&alias) {
            out.push(alias);
        }
    }
    out
}

fn rewrite_agent_body(body: &str) -> String {
    let body = ask_user_re().replace_all(body, "conversational questioning");
    body.replace(
        "Co-Authored-By: Claude (Anthropic)",
        "Co-Authored-By: Copilot (GitHub)",
    )
    .replace(
        "Co-authored-by: Claude (Anthropic)",
        "Co-authored-by: Copilot (GitHub)",
    )
}

// ---------------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------------

/// Convert agent markdown in Claude Code format into a Copilot `.agent.md`.
///
/// Only `name`, `description` and `tools` survive; `model`, `maxTurns` and
/// `skills` have no Copilot counterpart.
pub fn convert_agent_content(source: &Path, content: &str) -> Result<ConvertedAgent> {
    let stem = file_stem(source);
    let (fm, body) = split_frontmatter(source, content)?.unwrap_or((Mapping::new(), content));

    let name = field_str(&fm, "name").unwrap_or_else(|| stem.clone());
    let description = field_str(&fm, "description").unwrap_or_default();
    let tools = map_tools(&parse_tools(fm.get("tools")));

    let mut lines = vec!["---".to_string(), format!("name: {name}")];
    if !description.is_empty() {
        lines.push(format!("description: {}", yaml_scalar(&description)?));
    }
    if !tools.is_empty() {
        lines.push("tools:".to_string());
        lines.extend(tools.iter().map(|t| format!("  - {t}")));
    }
    lines.push("---".to_string());
    lines.push(String::new());

    Ok(ConvertedAgent {
        target_filename: format!("{stem}.agent.md"),
        content: lines.join("\n") + &rewrite_agent_body(body),
    })
}

pub fn convert_agent(source: &Path) -> Result<ConvertedAgent> {
    let content = std::fs::read_to_string(source)?;
    convert_agent_content(source, &content)
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

/// Turn a slash-command file into a Copilot prompt file. Only `description`
/// is kept in the frontmatter; documents without frontmatter pass through.
pub fn convert_prompt_content(source: &Path, content: &str) -> Result<String> {
    let Some((fm, body)) = split_frontmatter(source, content)? else {
        return Ok(content.to_string());
    };
    let mut lines = vec!["---".to_string()];
    if let Some(description) = field_str(&fm, "description") {
        lines.push(format!("description: {}", yaml_scalar(&description)?));
    }
    lines.push("---".to_string());
    lines.push(String::new());
    Ok(lines.join("\n") + body)
}

/// `discover.md` becomes `nw-discover.prompt.md`.
pub fn prompt_filename(source: &Path) -> String {
    format!("{NW_PREFIX}{}.prompt.md", file_stem(source))
}

// ---------------------------------------------------------------------------
// Skills
// ---------------------------------------------------------------------------

/// Copilot skills share one flat namespace, so every skill gets the `nw-`
/// prefix and colliding stems also get their agent folder.
pub fn skill_dir_name(agent_folder: &str, skill: &Path) -> String {
    let stem = file_stem(skill);
    if CONFLICTING_SKILL_NAMES.contains(&stem.as_str()) {
        format!("{NW_PREFIX}{agent_folder}-{stem}")
    } else {
        format!("{NW_PREFIX}{stem}")
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CRAFTER: &str = "---\n\
name: nw-software-crafter\n\
description: Implements features through Outside-In TDD\n\
model: inherit\n\
maxTurns: 50\n\
tools: Read, Write, Edit, Bash, Glob, Grep, Task, AskUserQuestion\n\
skills:\n  - tdd-methodology\n\
---\n\
\n\
# Crafter\n\
Use AskUserQuestion when blocked.\n\
Co-Authored-By: Claude (Anthropic)\n";

    #[test]
    fn agent_frontmatter_is_converted() {
        let out = convert_agent_content(Path::new("nw-software-crafter.md"), CRAFTER).unwrap();
        assert_eq!(out.target_filename, "nw-software-crafter.agent.md");
        assert!(out.content.starts_with(
            "---\nname: nw-software-crafter\n\
description: Implements features through Outside-In TDD\n\
tools:\n  - read\n  - edit\n  - execute\n  - search\n  - agent\n---\n"
        ));
        assert!(!out.content.contains("model:"));
        assert!(!out.content.contains("maxTurns"));
        assert!(!out.content.contains("tdd-methodology"));
    }

    #[test]
    fn agent_body_is_rewritten() {
        let out = convert_agent_content(Path::new("nw-software-crafter.md"), CRAFTER).unwrap();
        assert!(out.content.contains("Use conversational questioning when blocked."));
        assert!(out.content.contains("Co-Authored-By: Copilot (GitHub)"));
        assert!(!out.content.contains("AskUserQuestion"));
    }

    #[test]
    fn tools_accept_yaml_lists_and_brackets() {
        let list: Value = serde_yaml::from_str("[Read, WebFetch, WebSearch, Grep]").unwrap();
        assert_eq!(
            map_tools(&parse_tools(Some(&list))),
            vec!["read", "fetch", "search"]
        );
        let bracketed = Value::String("[Bash, Task]".into());
        assert_eq!(map_tools(&parse_tools(Some(&bracketed))), vec!["execute", "agent"]);
    }

    #[test]
    fn agent_without_frontmatter_uses_stem() {
        let out = convert_agent_content(Path::new("nw-plain.md"), "# Plain agent\n").unwrap();
        assert_eq!(out.content, "---\nname: nw-plain\n---\n# Plain agent\n");
    }

    #[test]
    fn description_needing_quotes_is_quoted() {
        let content = "---\nname: a\ndescription: 'Use when: reviewing'\n---\nbody";
        let out = convert_agent_content(Path::new("a.md"), content).unwrap();
        let fm_line = out
            .content
            .lines()
            .find(|l| l.starts_with("description:"))
            .unwrap();
        let parsed: Mapping = serde_yaml::from_str(fm_line).unwrap();
        assert_eq!(
            parsed.get("description").and_then(Value::as_str),
            Some("Use when: reviewing")
        );
    }

    #[test]
    fn non_mapping_frontmatter_is_rejected() {
        let err = convert_agent_content(Path::new("bad.md"), "---\n- a\n- b\n---\nbody").unwrap_err();
        assert!(matches!(err, DesError::InvalidAgent { .. }));
    }

    #[test]
    fn prompt_keeps_only_description() {
        let content = "---\ndescription: Run discovery\nargument-hint: '[topic]'\n---\n# Discover\n";
        let out = convert_prompt_content(Path::new("discover.md"), content).unwrap();
        assert_eq!(out, "---\ndescription: Run discovery\n---\n# Discover\n");
        assert_eq!(prompt_filename(Path::new("nWave/tasks/nw/discover.md")), "nw-discover.prompt.md");
    }

    #[test]
    fn prompt_without_frontmatter_passes_through() {
        let out = convert_prompt_content(Path::new("x.md"), "# Just text\n").unwrap();
        assert_eq!(out, "# Just text\n");
    }

    #[test]
    fn conflicting_skills_are_qualified() {
        assert_eq!(
            skill_dir_name("software-crafter", Path::new("tdd-methodology.md")),
            "nw-tdd-methodology"
        );
        assert_eq!(
            skill_dir_name("software-crafter", Path::new("review-dimensions.md")),
            "nw-software-crafter-review-dimensions"
        );
    }
}
