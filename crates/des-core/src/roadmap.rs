//! `roadmap.yaml`: structural validation and skeleton generation.
//!
//! A roadmap lists phases (`NN`) holding steps (`NN-NN`). Validation reports
//! errors, which make the roadmap invalid, and warnings, which are advisory.
//! Free-text fields still starting with `TODO` are skeleton placeholders and
//! are not checked.

use crate::error::{DesError, Result};
use crate::paths;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

const DEFAULT_AGENTS: &[&str] = &[
    "software-crafter",
    "functional-software-crafter",
    "acceptance-designer",
    "solution-architect",
    "platform-architect",
    "data-engineer",
    "researcher",
    "troubleshooter",
    "documentarist",
    "product-owner",
    "product-discoverer",
    "agent-builder",
];

/// Validation limits. The compiled-in values apply unless the framework ships
/// `nWave/templates/roadmap-schema.yaml`.
#[derive(Debug, Clone, PartialEq)]
pub struct RoadmapSchema {
    pub required_roadmap_fields: Vec<String>,
    pub required_phase_fields: Vec<String>,
    pub required_step_fields: Vec<String>,
    pub phase_id_pattern: String,
    pub step_id_pattern: String,
    pub max_criteria_words: usize,
    pub max_criteria_per_step: usize,
    pub max_step_name_words: usize,
    pub max_description_words: usize,
    /// Empty disables the agent check.
    pub valid_agents: Vec<String>,
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for RoadmapSchema {
    fn default() -> Self {
        Self {
            required_roadmap_fields: owned(&["project_id", "created_at", "total_steps", "phases"]),
            required_phase_fields: owned(&["id", "name", "steps"]),
            required_step_fields: owned(&["id", "name", "criteria"]),
            phase_id_pattern: r"^\d{2}$".to_string(),
            step_id_pattern: r"^\d{2}-\d{2}$".to_string(),
            max_criteria_words: 30,
            max_criteria_per_step: 5,
            max_step_name_words: 10,
            max_description_words: 50,
            valid_agents: owned(DEFAULT_AGENTS),
        }
    }
}

#[derive(Deserialize, Default)]
struct RawRequired {
    #[serde(default)]
    roadmap: Vec<String>,
    #[serde(default)]
    phase: Vec<String>,
    #[serde(default)]
    step: Vec<String>,
}

#[derive(Deserialize, Default)]
struct RawPatterns {
    phase_id: Option<String>,
    step_id: Option<String>,
}

#[derive(Deserialize, Default)]
struct RawConstraints {
    max_criteria_words: Option<usize>,
    max_criteria_per_step: Option<usize>,
    max_step_name_words: Option<usize>,
    max_description_words: Option<usize>,
}

#[derive(Deserialize)]
struct RawSchema {
    #[serde(default)]
    required_fields: RawRequired,
    #[serde(default)]
    id_patterns: RawPatterns,
    #[serde(default)]
    constraints: RawConstraints,
    #[serde(default)]
    valid_agents: Option<Vec<String>>,
}

impl RoadmapSchema {
    /// Parse the schema YAML. Absent sections keep their defaults.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let raw: RawSchema = serde_yaml::from_str(text)?;
        let mut schema = Self::default();
        let required = raw.required_fields;
        if !required.roadmap.is_empty() {
            schema.required_roadmap_fields = required.roadmap;
        }
        if !required.phase.is_empty() {
            schema.required_phase_fields = required.phase;
        }
        if !required.step.is_empty() {
            schema.required_step_fields = required.step;
        }
        if let Some(p) = raw.id_patterns.phase_id {
            schema.phase_id_pattern = p;
        }
        if let Some(p) = raw.id_patterns.step_id {
            schema.step_id_pattern = p;
        }
        let c = raw.constraints;
        schema.max_criteria_words = c.max_criteria_words.unwrap_or(schema.max_criteria_words);
        schema.max_criteria_per_step = c.max_criteria_per_step.unwrap_or(schema.max_criteria_per_step);
        schema.max_step_name_words = c.max_step_name_words.unwrap_or(schema.max_step_name_words);
        schema.max_description_words = c.max_description_words.unwrap_or(schema.max_description_words);
        if let Some(agents) = raw.valid_agents {
            schema.valid_agents = agents;
        }
        Ok(schema)
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(paths::ROADMAP_SCHEMA_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::from_yaml(&std::fs::read_to_string(path)?)
    }
}

// ---------------------------------------------------------------------------
// Violations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    MissingRequiredField,
    InvalidPhaseId,
    InvalidStepId,
    StepPhaseMismatch,
    DuplicateStepId,
    InvalidDepReference,
    TotalStepsMismatch,
    PhasesCountMismatch,
    DescriptionTooLong,
    StepNameTooLong,
    TooManyCriteria,
    CriteriaTooLong,
    UnknownAgent,
    MissingImplementationScope,
    MissingSourceDirectories,
}

impl Rule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rule::MissingRequiredField => "MISSING_REQUIRED_FIELD",
            Rule::InvalidPhaseId => "INVALID_PHASE_ID",
            Rule::InvalidStepId => "INVALID_STEP_ID",
            Rule::StepPhaseMismatch => "STEP_PHASE_MISMATCH",
            Rule::DuplicateStepId => "DUPLICATE_STEP_ID",
            Rule::InvalidDepReference => "INVALID_DEP_REFERENCE",
            Rule::TotalStepsMismatch => "TOTAL_STEPS_MISMATCH",
            Rule::PhasesCountMismatch => "PHASES_COUNT_MISMATCH",
            Rule::DescriptionTooLong => "DESCRIPTION_TOO_LONG",
            Rule::StepNameTooLong => "STEP_NAME_TOO_LONG",
            Rule::TooManyCriteria => "TOO_MANY_CRITERIA",
            Rule::CriteriaTooLong => "CRITERIA_TOO_LONG",
            Rule::UnknownAgent => "UNKNOWN_AGENT",
            Rule::MissingImplementationScope => "MISSING_IMPLEMENTATION_SCOPE",
            Rule::MissingSourceDirectories => "MISSING_SOURCE_DIRECTORIES",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Rule::DescriptionTooLong
            | Rule::StepNameTooLong
            | Rule::TooManyCriteria
            | Rule::CriteriaTooLong
            | Rule::UnknownAgent
            | Rule::MissingImplementationScope
            | Rule::MissingSourceDirectories => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Location such as `phases[0].steps[1].id`.
    pub path: String,
    pub rule: Rule,
    pub message: String,
}

impl Violation {
    fn new(path: impl Into<String>, rule: Rule, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            rule,
            message: message.into(),
        }
    }

    pub fn severity(&self) -> Severity {
        self.rule.severity()
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.rule, self.path, self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoadmapValidation {
    pub violations: Vec<Violation>,
    pub phases_found: usize,
    pub steps_found: usize,
}

impl RoadmapValidation {
    pub fn is_valid(&self) -> bool {
        self.errors().next().is_none()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Violation> {
        self.violations
            .iter()
            .filter(|v| v.severity() == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Violation> {
        self.violations
            .iter()
            .filter(|v| v.severity() == Severity::Warning)
    }
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

/// Scalar as text; ids are sometimes written unquoted.
fn text(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn is_placeholder(s: &str) -> bool {
    s.starts_with("TODO")
}

fn word_count(s: &str) -> usize {
    s.split_whitespace().count()
}

fn seq(v: Option<&Value>) -> &[Value] {
    v.and_then(Value::as_sequence).map(Vec::as_slice).unwrap_or(&[])
}

fn as_int(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub struct RoadmapValidator<'a> {
    schema: &'a RoadmapSchema,
    phase_id_re: Regex,
    step_id_re: Regex,
}

impl<'a> RoadmapValidator<'a> {
    pub fn new(schema: &'a RoadmapSchema) -> Result<Self> {
        Ok(Self {
            schema,
            phase_id_re: Regex::new(&schema.phase_id_pattern)?,
            step_id_re: Regex::new(&schema.step_id_pattern)?,
        })
    }

    pub fn validate(&self, roadmap: &Mapping) -> RoadmapValidation {
        let mut out = RoadmapValidation::default();
        let empty = Mapping::new();
        let meta = roadmap
            .get("roadmap")
            .and_then(Value::as_mapping)
            .unwrap_or(&empty);
        let phases = seq(roadmap.get("phases"));

        for field in &self.schema.required_roadmap_fields {
            if field == "phases" {
                if phases.is_empty() {
                    out.violations.push(Violation::new(
                        "phases",
                        Rule::MissingRequiredField,
                        "Required field 'phases' is missing or empty",
                    ));
                }
            } else if !meta.contains_key(field.as_str()) {
                out.violations.push(Violation::new(
                    format!("roadmap.{field}"),
                    Rule::MissingRequiredField,
                    format!("Required field 'roadmap.{field}' is missing"),
                ));
            }
        }

        out.phases_found = phases.len();
        let mut seen: HashMap<String, String> = HashMap::new();
        for (pi, phase) in phases.iter().enumerate() {
            self.check_phase(pi, phase, &mut seen, &mut out);
        }

        let known: HashSet<&str> = seen.keys().map(String::as_str).collect();
        for (pi, phase) in phases.iter().enumerate() {
            for (si, step) in seq(phase.get("steps")).iter().enumerate() {
                for dep in seq(step.get("deps")) {
                    let Some(dep) = text(Some(dep)) else { continue };
                    if !known.contains(dep.as_str()) {
                        out.violations.push(Violation::new(
                            format!("phases[{pi}].steps[{si}].deps"),
                            Rule::InvalidDepReference,
                            format!("Dependency '{dep}' does not reference an existing step ID"),
                        ));
                    }
                }
            }
        }

        if let Some(declared) = meta.get("total_steps") {
            if as_int(declared) != Some(out.steps_found as i64) {
                out.violations.push(Violation::new(
                    "roadmap.total_steps",
                    Rule::TotalStepsMismatch,
                    format!(
                        "Declared total_steps={} but found {} steps",
                        display(declared),
                        out.steps_found
                    ),
                ));
            }
        }
        if let Some(declared) = meta.get("phases") {
            if as_int(declared) != Some(out.phases_found as i64) {
                out.violations.push(Violation::new(
                    "roadmap.phases",
                    Rule::PhasesCountMismatch,
                    format!(
                        "Declared phases={} but found {} phases",
                        display(declared),
                        out.phases_found
                    ),
                ));
            }
        }

        match roadmap.get("implementation_scope") {
            None => out.violations.push(Violation::new(
                "implementation_scope",
                Rule::MissingImplementationScope,
                "Missing 'implementation_scope' section with source_directories",
            )),
            Some(scope) if scope.get("source_directories").is_none() => {
                out.violations.push(Violation::new(
                    "implementation_scope.source_directories",
                    Rule::MissingSourceDirectories,
                    "Missing 'source_directories' in implementation_scope",
                ))
            }
            Some(_) => {}
        }
        out
    }

    fn check_phase(
        &self,
        pi: usize,
        phase: &Value,
        seen: &mut HashMap<String, String>,
        out: &mut RoadmapValidation,
    ) {
        let phase_path = format!("phases[{pi}]");
        for field in &self.schema.required_phase_fields {
            if phase.get(field.as_str()).is_none() {
                out.violations.push(Violation::new(
                    format!("{phase_path}.{field}"),
                    Rule::MissingRequiredField,
                    format!("Required field '{field}' missing in {phase_path}"),
                ));
            }
        }

        let phase_id = text(phase.get("id"));
        if let Some(id) = &phase_id {
            if !self.phase_id_re.is_match(id) {
                out.violations.push(Violation::new(
                    format!("{phase_path}.id"),
                    Rule::InvalidPhaseId,
                    format!(
                        "Phase ID '{id}' does not match pattern {}",
                        self.schema.phase_id_pattern
                    ),
                ));
            }
        }

        if let Some(description) = text(phase.get("description")) {
            let words = word_count(&description);
            if !is_placeholder(&description) && words > self.schema.max_description_words {
                out.violations.push(Violation::new(
                    format!("{phase_path}.description"),
                    Rule::DescriptionTooLong,
                    format!(
                        "Description has {words} words (max {})",
                        self.schema.max_description_words
                    ),
                ));
            }
        }

        let default_agent = text(phase.get("default_agent"));
        for (si, step) in seq(phase.get("steps")).iter().enumerate() {
            out.steps_found += 1;
            let step_path = format!("{phase_path}.steps[{si}]");
            self.check_step(&step_path, step, phase_id.as_deref(), default_agent.as_deref(), seen, out);
        }
    }

    fn check_step(
        &self,
        step_path: &str,
        step: &Value,
        phase_id: Option<&str>,
        default_agent: Option<&str>,
        seen: &mut HashMap<String, String>,
        out: &mut RoadmapValidation,
    ) {
        for field in &self.schema.required_step_fields {
            if step.get(field.as_str()).is_none() {
                out.violations.push(Violation::new(
                    format!("{step_path}.{field}"),
                    Rule::MissingRequiredField,
                    format!("Required field '{field}' missing in {step_path}"),
                ));
            }
        }

        if let Some(id) = text(step.get("id")) {
            if !self.step_id_re.is_match(&id) {
                out.violations.push(Violation::new(
                    format!("{step_path}.id"),
                    Rule::InvalidStepId,
                    format!(
                        "Step ID '{id}' does not match pattern {}",
                        self.schema.step_id_pattern
                    ),
                ));
            } else if let Some(phase_id) = phase_id {
                let prefix = id.split('-').next().unwrap_or_default();
                if prefix != phase_id {
                    out.violations.push(Violation::new(
                        format!("{step_path}.id"),
                        Rule::StepPhaseMismatch,
                        format!(
                            "Step ID '{id}' prefix '{prefix}' does not match phase ID '{phase_id}'"
                        ),
                    ));
                }
            }
            match seen.get(&id) {
                Some(first) => out.violations.push(Violation::new(
                    format!("{step_path}.id"),
                    Rule::DuplicateStepId,
                    format!("Step ID '{id}' already defined at {first}"),
                )),
                None => {
                    seen.insert(id, step_path.to_string());
                }
            }
        }

        if let Some(name) = text(step.get("name")) {
            let words = word_count(&name);
            if !is_placeholder(&name) && words > self.schema.max_step_name_words {
                out.violations.push(Violation::new(
                    format!("{step_path}.name"),
                    Rule::StepNameTooLong,
                    format!(
                        "Step name has {words} words (max {})",
                        self.schema.max_step_name_words
                    ),
                ));
            }
        }

        if let Some(criteria) = text(step.get("criteria")).filter(|c| !is_placeholder(c)) {
            let items: Vec<&str> = criteria
                .split(';')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .collect();
            if items.len() > self.schema.max_criteria_per_step {
                out.violations.push(Violation::new(
                    format!("{step_path}.criteria"),
                    Rule::TooManyCriteria,
                    format!(
                        "Step has {} criteria (max {})",
                        items.len(),
                        self.schema.max_criteria_per_step
                    ),
                ));
            }
            for (ci, item) in items.iter().enumerate() {
                let words = word_count(item);
                if words > self.schema.max_criteria_words {
                    out.violations.push(Violation::new(
                        format!("{step_path}.criteria[{ci}]"),
                        Rule::CriteriaTooLong,
                        format!(
                            "Criterion has {words} words (max {})",
                            self.schema.max_criteria_words
                        ),
                    ));
                }
            }
        }

        let agent = text(step.get("agent")).or_else(|| default_agent.map(str::to_string));
        if let Some(agent) = agent {
            if !self.schema.valid_agents.is_empty() && !self.schema.valid_agents.contains(&agent) {
                out.violations.push(Violation::new(
                    format!("{step_path}.agent"),
                    Rule::UnknownAgent,
                    format!("Agent '{agent}' not in valid agents list"),
                ));
            }
        }
    }
}

fn display(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Read a roadmap document. The top level must be a mapping.
pub fn load(path: &Path) -> Result<Mapping> {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(DesError::RoadmapNotFound(path.display().to_string()))
        }
        Err(e) => return Err(e.into()),
    };
    let value: Value =
        serde_yaml::from_str(&text).map_err(|e| DesError::InvalidRoadmap(format!("invalid YAML: {e}")))?;
    match value {
        Value::Mapping(m) => Ok(m),
        _ => Err(DesError::InvalidRoadmap(
            "roadmap must be a YAML mapping".to_string(),
        )),
    }
}

/// Step ids in document order. Accepts a flat top-level `steps` list or
/// steps nested under `phases`, keyed by `id` or `step_id`.
pub fn step_ids(roadmap: &Mapping) -> Vec<String> {
    let step_id = |s: &Value| text(s.get("id")).or_else(|| text(s.get("step_id")));
    if let Some(steps) = roadmap.get("steps") {
        return seq(Some(steps)).iter().filter_map(step_id).collect();
    }
    seq(roadmap.get("phases"))
        .iter()
        .flat_map(|p| seq(p.get("steps")))
        .filter_map(step_id)
        .collect()
}

// ---------------------------------------------------------------------------
// Skeleton
// ---------------------------------------------------------------------------

/// Parse `"01:3,02:2"` into `(phase_id, step_count)` pairs.
pub fn parse_steps_spec(spec: &str) -> Result<Vec<(String, usize)>> {
    let invalid = || DesError::InvalidStepsSpec(spec.to_string());
    spec.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (phase, count) = pair.split_once(':').ok_or_else(invalid)?;
            let count = count.trim().parse::<usize>().map_err(|_| invalid())?;
            Ok((phase.trim().to_string(), count))
        })
        .collect()
}

pub struct SkeletonRequest<'a> {
    pub project_id: &'a str,
    pub goal: &'a str,
    pub phases: usize,
    pub steps: &'a [(String, usize)],
}

fn map(pairs: Vec<(&str, Value)>) -> Value {
    Value::Mapping(
        pairs
            .into_iter()
            .map(|(k, v)| (Value::from(k), v))
            .collect(),
    )
}

fn strings(items: &[&str]) -> Value {
    Value::Sequence(items.iter().map(|s| Value::from(*s)).collect())
}

/// Build a roadmap skeleton with TODO placeholders. A phase missing from
/// `steps` gets one step. When `phases` is left at 1, a steps spec naming
/// several phases sets the phase count instead.
pub fn skeleton(req: &SkeletonRequest<'_>, now: DateTime<Utc>) -> Value {
    let counts: HashMap<&str, usize> = req.steps.iter().map(|(p, n)| (p.as_str(), *n)).collect();
    let num_phases = if req.phases == 1 && req.steps.len() > 1 {
        req.steps.len()
    } else {
        req.phases
    };

    let mut total_steps = 0usize;
    let phases: Vec<Value> = (1..=num_phases)
        .map(|pi| {
            let phase_id = format!("{pi:02}");
            let count = counts.get(phase_id.as_str()).copied().unwrap_or(1);
            let steps: Vec<Value> = (1..=count)
                .map(|si| {
                    map(vec![
                        ("id", Value::from(format!("{phase_id}-{si:02}"))),
                        ("name", Value::from("TODO: step name")),
                        ("criteria", Value::from("TODO: acceptance criteria")),
                    ])
                })
                .collect();
            total_steps += steps.len();
            map(vec![
                ("id", Value::from(phase_id)),
                ("name", Value::from("TODO: phase name")),
                ("steps", Value::Sequence(steps)),
            ])
        })
        .collect();

    let mut meta = vec![("project_id", Value::from(req.project_id))];
    if !req.goal.is_empty() {
        meta.push(("goal", Value::from(req.goal)));
    }
    meta.extend([
        ("created_at", Value::from(crate::clock::log_timestamp(now))),
        ("total_steps", Value::from(total_steps as u64)),
        ("phases", Value::from(num_phases as u64)),
    ]);

    map(vec![
        ("roadmap", map(meta)),
        ("phases", Value::Sequence(phases)),
        (
            "implementation_scope",
            map(vec![
                ("source_directories", strings(&["src/TODO/"])),
                ("test_directories", strings(&["tests/TODO/"])),
                ("excluded_patterns", strings(&["__init__.py", "__pycache__/**"])),
            ]),
        ),
        (
            "validation",
            map(vec![
                ("status", Value::from("pending")),
                ("reviewer", Value::from("TODO")),
                ("approved_at", Value::from("TODO")),
            ]),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn parse(yaml: &str) -> Mapping {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn rules(v: &RoadmapValidation) -> Vec<&'static str> {
        v.violations.iter().map(|v| v.rule.as_str()).collect()
    }

    fn validate(yaml: &str) -> RoadmapValidation {
        let schema = RoadmapSchema::default();
        RoadmapValidator::new(&schema).unwrap().validate(&parse(yaml))
    }

    const VALID: &str = r#"
roadmap:
  project_id: auth
  created_at: "2026-02-02T10:00:00Z"
  total_steps: 3
  phases: 2
phases:
  - id: "01"
    name: Foundation
    steps:
      - {id: "01-01", name: Token model, criteria: "tokens expire; tokens refresh", agent: software-crafter}
      - {id: "01-02", name: Token store, criteria: persisted, deps: ["01-01"]}
  - id: "02"
    name: API
    steps:
      - {id: "02-01", name: Login endpoint, criteria: returns token, deps: ["01-02"]}
implementation_scope:
  source_directories: [src/auth/]
"#;

    #[test]
    fn well_formed_roadmap_is_valid() {
        let v = validate(VALID);
        assert!(v.is_valid(), "{:?}", v.violations);
        assert!(v.violations.is_empty());
        assert_eq!((v.phases_found, v.steps_found), (2, 3));
    }

    #[test]
    fn structural_errors() {
        let v = validate(
            r#"
roadmap: {project_id: auth, total_steps: 9, phases: 1}
phases:
  - id: "1"
    name: Bad
    steps:
      - {id: "01-01", name: a, criteria: x}
      - {id: "01-01", name: b, criteria: y, deps: ["07-07"]}
      - {id: "02-01", name: c, criteria: z}
      - {id: "3-1", name: d, criteria: w}
implementation_scope: {}
"#,
        );
        assert!(!v.is_valid());
        assert_eq!(
            rules(&v),
            vec![
                "MISSING_REQUIRED_FIELD",
                "INVALID_PHASE_ID",
                "STEP_PHASE_MISMATCH",
                "STEP_PHASE_MISMATCH",
                "DUPLICATE_STEP_ID",
                "STEP_PHASE_MISMATCH",
                "INVALID_STEP_ID",
                "INVALID_DEP_REFERENCE",
                "TOTAL_STEPS_MISMATCH",
                "MISSING_SOURCE_DIRECTORIES",
            ]
        );
        assert_eq!(v.violations[0].path, "roadmap.created_at");
        assert_eq!(
            v.violations[4].message,
            "Step ID '01-01' already defined at phases[0].steps[0]"
        );
    }

    #[test]
    fn warnings_keep_roadmap_valid() {
        let long = vec!["word"; 12].join(" ");
        let criterion = vec!["w"; 31].join(" ");
        let yaml = format!(
            r#"
roadmap: {{project_id: a, created_at: x, total_steps: 1, phases: 1}}
phases:
  - id: "01"
    name: P
    default_agent: wizard
    steps:
      - id: "01-01"
        name: {long}
        criteria: "a; b; c; d; e; f; {criterion}"
"#
        );
        let v = validate(&yaml);
        assert!(v.is_valid());
        assert_eq!(
            rules(&v),
            vec![
                "STEP_NAME_TOO_LONG",
                "TOO_MANY_CRITERIA",
                "CRITERIA_TOO_LONG",
                "UNKNOWN_AGENT",
                "MISSING_IMPLEMENTATION_SCOPE",
            ]
        );
        assert_eq!(v.warnings().count(), 5);
    }

    #[test]
    fn placeholders_are_not_measured() {
        let req = SkeletonRequest {
            project_id: "auth",
            goal: "",
            phases: 1,
            steps: &[("01".to_string(), 2)],
        };
        let now = Utc.with_ymd_and_hms(2026, 2, 2, 12, 0, 0).unwrap();
        let doc = skeleton(&req, now);
        let v = validate(&serde_yaml::to_string(&doc).unwrap());
        assert!(v.is_valid(), "{:?}", v.violations);
        assert_eq!(v.steps_found, 2);
        assert!(v.violations.is_empty());
    }

    #[test]
    fn skeleton_infers_phases_from_spec() {
        let steps = parse_steps_spec("01:3, 02:2").unwrap();
        let req = SkeletonRequest {
            project_id: "auth",
            goal: "Ship login",
            phases: 1,
            steps: &steps,
        };
        let doc = skeleton(&req, Utc.with_ymd_and_hms(2026, 2, 2, 12, 0, 0).unwrap());
        let meta = doc.get("roadmap").unwrap();
        assert_eq!(meta.get("total_steps").and_then(Value::as_u64), Some(5));
        assert_eq!(meta.get("phases").and_then(Value::as_u64), Some(2));
        assert_eq!(meta.get("goal").and_then(Value::as_str), Some("Ship login"));
        let ids = step_ids(doc.as_mapping().unwrap());
        assert_eq!(ids, vec!["01-01", "01-02", "01-03", "02-01", "02-02"]);
    }

    #[test]
    fn explicit_phase_count_wins_over_steps_spec() {
        let steps = parse_steps_spec("01:2,02:1").unwrap();
        let req = SkeletonRequest {
            project_id: "auth",
            goal: "",
            phases: 3,
            steps: &steps,
        };
        let doc = skeleton(&req, Utc.with_ymd_and_hms(2026, 2, 2, 12, 0, 0).unwrap());
        let meta = doc.get("roadmap").unwrap();
        assert_eq!(meta.get("phases").and_then(Value::as_u64), Some(3));
        // 01 and 02 from the spec, 03 defaults to a single step.
        assert_eq!(meta.get("total_steps").and_then(Value::as_u64), Some(4));
        let excluded = doc
            .get("implementation_scope")
            .and_then(|s| s.get("excluded_patterns"))
            .and_then(Value::as_sequence)
            .unwrap();
        assert_eq!(excluded, &vec![Value::from("__init__.py"), Value::from("__pycache__/**")]);
    }

    #[test]
    fn steps_spec_rejects_garbage() {
        assert!(matches!(parse_steps_spec("01-3"), Err(DesError::InvalidStepsSpec(_))));
        assert!(matches!(parse_steps_spec("01:x"), Err(DesError::InvalidStepsSpec(_))));
    }

    #[test]
    fn flat_step_lists() {
        let ids = step_ids(&parse("steps: [{id: '01-01'}, {step_id: '01-02'}, {name: x}]"));
        assert_eq!(ids, vec!["01-01", "01-02"]);
    }

    #[test]
    fn schema_override_merges_with_defaults() {
        let s = RoadmapSchema::from_yaml(
            "constraints: {max_step_name_words: 3}\nvalid_agents: []\n",
        )
        .unwrap();
        assert_eq!(s.max_step_name_words, 3);
        assert_eq!(s.max_criteria_words, 30);
        assert!(s.valid_agents.is_empty());
        assert_eq!(s.step_id_pattern, r"^\d{2}-\d{2}$");
    }

    #[test]
    fn load_reports_missing_and_non_mapping() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("roadmap.yaml");
        assert!(matches!(load(&path), Err(DesError::RoadmapNotFound(_))));
        std::fs::write(&path, "- a\n- b\n").unwrap();
        assert!(matches!(load(&path), Err(DesError::InvalidRoadmap(_))));
    }
}
