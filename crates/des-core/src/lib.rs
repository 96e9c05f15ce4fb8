pub mod audit;
pub mod clock;
pub mod completion;
pub mod config;
pub mod deliver;
pub mod error;
pub mod execution_log;
pub mod git;
pub mod hooks;
pub mod install;
pub mod integrity;
pub mod io;
pub mod log_phase;
pub mod markers;
pub mod paths;
pub mod phase_event;
pub mod policy;
pub mod prompt;
pub mod roadmap;
pub mod schema;

pub use error::{DesError, Result};
