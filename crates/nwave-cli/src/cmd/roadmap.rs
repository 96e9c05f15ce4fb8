use super::Exit;
use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use des_core::io::atomic_write;
use des_core::roadmap::{self, RoadmapSchema, RoadmapValidator, SkeletonRequest, Violation};
use des_core::DesError;
use serde_json::json;
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum RoadmapSubcommand {
    /// Write a roadmap skeleton with TODO placeholders
    Init {
        #[arg(long)]
        project_id: String,
        /// One-line goal recorded in the roadmap header
        #[arg(long, default_value = "")]
        goal: String,
        /// Number of phases
        #[arg(long, default_value_t = 1)]
        phases: usize,
        /// Steps per phase, e.g. "01:3,02:2"
        #[arg(long)]
        steps: Option<String>,
        /// Write to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Validate a roadmap file against the roadmap schema
    Validate { path: PathBuf },
}

pub fn run(root: &Path, subcmd: RoadmapSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        RoadmapSubcommand::Init {
            project_id,
            goal,
            phases,
            steps,
            output,
        } => init(&project_id, &goal, phases, steps.as_deref(), output.as_deref()),
        RoadmapSubcommand::Validate { path } => validate(root, &path, json),
    }
}

fn init(
    project_id: &str,
    goal: &str,
    phases: usize,
    steps: Option<&str>,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let steps = match steps.map(roadmap::parse_steps_spec).transpose() {
        Ok(s) => s.unwrap_or_default(),
        Err(e) => {
            eprintln!("Error: {e}");
            return Err(Exit(2).into());
        }
    };
    let request = SkeletonRequest {
        project_id,
        goal,
        phases,
        steps: &steps,
    };
    let yaml = serde_yaml::to_string(&roadmap::skeleton(&request, chrono::Utc::now()))?;

    match output {
        Some(path) => {
            atomic_write(path, yaml.as_bytes())
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Roadmap skeleton written to {}", path.display());
        }
        None => print!("{yaml}"),
    }
    Ok(())
}

fn violation_json(v: &Violation) -> serde_json::Value {
    json!({ "rule": v.rule.as_str(), "path": v.path, "message": v.message })
}

fn validate(root: &Path, path: &Path, json: bool) -> anyhow::Result<()> {
    let document = match roadmap::load(path) {
        Ok(d) => d,
        Err(DesError::RoadmapNotFound(p)) => {
            eprintln!("Error: file not found: {p}");
            return Err(Exit(2).into());
        }
        Err(e) => {
            eprintln!("Error: {e}");
            return Err(Exit(2).into());
        }
    };
    let schema = RoadmapSchema::load(root).context("failed to load roadmap schema")?;
    let result = RoadmapValidator::new(&schema)?.validate(&document);
    let errors: Vec<&Violation> = result.errors().collect();
    let warnings: Vec<&Violation> = result.warnings().collect();

    if json {
        print_json(&json!({
            "valid": result.is_valid(),
            "phases_found": result.phases_found,
            "steps_found": result.steps_found,
            "errors": errors.iter().map(|v| violation_json(v)).collect::<Vec<_>>(),
            "warnings": warnings.iter().map(|v| violation_json(v)).collect::<Vec<_>>(),
        }))?;
    } else if result.is_valid() {
        println!(
            "VALID: {} phases, {} steps",
            result.phases_found, result.steps_found
        );
        for w in &warnings {
            println!("  WARNING {w}");
        }
    } else {
        println!(
            "INVALID: {} error(s), {} warning(s)",
            errors.len(),
            warnings.len()
        );
        for e in &errors {
            println!("  ERROR {e}");
        }
        for w in &warnings {
            println!("  WARNING {w}");
        }
    }

    if !result.is_valid() {
        return Err(Exit(1).into());
    }
    Ok(())
}
