use crate::output::print_json;
use anyhow::Context;
use des_core::install::{build, build_plugin, FrameworkSource};
use serde_json::json;
use std::path::{Path, PathBuf};

pub fn run(
    output: Option<PathBuf>,
    source: Option<&Path>,
    program: &str,
    json: bool,
) -> anyhow::Result<()> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let framework = FrameworkSource::locate(source, &cwd)
        .context("cannot locate the nWave framework source")?;
    let output = output.unwrap_or_else(|| framework.root().join(build::DEFAULT_OUTPUT_DIR));

    if !json {
        println!("\nBuilding nWave Copilot plugin -> {}\n", output.display());
    }
    let report = build_plugin(&framework, &output, program)
        .with_context(|| format!("failed to build plugin in {}", output.display()))?;

    if json {
        return print_json(&json!({
            "output": report.output,
            "agents": report.agents,
            "skills": report.skills,
        }));
    }
    println!("  {} agents written", report.agents);
    println!("  {} skills written", report.skills);
    println!("  hooks.json written");
    println!("  plugin.json written");
    println!("\nPlugin built successfully!");
    println!("\nTo install the plugin:");
    println!("  copilot plugin install {}\n", report.output.display());
    Ok(())
}
