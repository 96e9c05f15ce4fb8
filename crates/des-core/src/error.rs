use thiserror::Error;

#[derive(Debug, Error)]
pub enum DesError {
    #[error("Execution log not found: {0}")]
    LogNotFound(String),

    #[error("Invalid YAML in execution log: {0}")]
    LogCorrupted(String),

    #[error("unknown phase '{phase}': valid phases are {valid}")]
    UnknownPhase { phase: String, valid: String },

    #[error("invalid status '{0}': must be EXECUTED or SKIPPED")]
    InvalidStatus(String),

    #[error("invalid skip reason '{0}': SKIPPED data must start with a known skip prefix")]
    InvalidSkipReason(String),

    #[error("invalid TDD schema: {0}")]
    InvalidSchema(String),

    #[error("invalid steps spec '{0}': expected comma-separated 'PP:N' entries such as '01:3,02:2'")]
    InvalidStepsSpec(String),

    #[error("roadmap not found: {0}")]
    RoadmapNotFound(String),

    #[error("invalid roadmap: {0}")]
    InvalidRoadmap(String),

    #[error("nWave framework source not found: {0}")]
    FrameworkNotFound(String),

    #[error("invalid agent definition {path}: {reason}")]
    InvalidAgent { path: String, reason: String },

    #[error("git not found on PATH")]
    GitNotInstalled,

    #[error("git command failed: {0}")]
    GitFailed(String),

    #[error("home directory not found: set HOME environment variable")]
    HomeNotFound,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Regex(#[from] regex::Error),
}

pub type Result<T> = std::result::Result<T, DesError>;

impl DesError {
    /// Stable variant name, recorded as `error_type` in hook error audits.
    pub fn kind(&self) -> &'static str {
        match self {
            DesError::LogNotFound(_) => "LogNotFound",
            DesError::LogCorrupted(_) => "LogCorrupted",
            DesError::UnknownPhase { .. } => "UnknownPhase",
            DesError::InvalidStatus(_) => "InvalidStatus",
            DesError::InvalidSkipReason(_) => "InvalidSkipReason",
            DesError::InvalidSchema(_) => "InvalidSchema",
            DesError::InvalidStepsSpec(_) => "InvalidStepsSpec",
            DesError::RoadmapNotFound(_) => "RoadmapNotFound",
            DesError::InvalidRoadmap(_) => "InvalidRoadmap",
            DesError::FrameworkNotFound(_) => "FrameworkNotFound",
            DesError::InvalidAgent { .. } => "InvalidAgent",
            DesError::GitNotInstalled => "GitNotInstalled",
            DesError::GitFailed(_) => "GitFailed",
            DesError::HomeNotFound => "HomeNotFound",
            DesError::Io(_) => "Io",
            DesError::Yaml(_) => "Yaml",
            DesError::Json(_) => "Json",
            DesError::Regex(_) => "Regex",
        }
    }
}
