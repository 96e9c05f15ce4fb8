pub mod build_plugin;
pub mod hook;
pub mod install;
pub mod log_phase;
pub mod roadmap;
pub mod verify_deliver;
pub mod version;

use std::fmt;

/// Non-zero exit for a command that has already printed its outcome.
/// `main` exits with the code without adding an error line.
#[derive(Debug)]
pub struct Exit(pub i32);

impl fmt::Display for Exit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exit code {}", self.0)
    }
}

impl std::error::Error for Exit {}
