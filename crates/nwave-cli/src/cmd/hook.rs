use super::Exit;
use des_core::hooks::{self, HookRuntime, Protocol};
use std::io::Read;
use std::path::Path;

/// Forward stdin to the protocol adapter, then relay its answer. Hosts read
/// the exit code, so an unreadable stdin is answered like an empty one.
pub fn run(root: &Path, protocol: Protocol, action: &str) -> anyhow::Result<()> {
    let mut raw = String::new();
    if let Err(e) = std::io::stdin().read_to_string(&mut raw) {
        tracing::warn!(error = %e, "failed to read hook input from stdin");
        raw.clear();
    }

    let rt = HookRuntime::new(root);
    let response = hooks::dispatch(protocol, action, &rt, &raw);
    tracing::debug!(%protocol, action, exit_code = response.exit_code, "hook answered");

    if let Some(out) = &response.stdout {
        println!("{out}");
    }
    if let Some(err) = &response.stderr {
        eprintln!("{err}");
    }
    if response.exit_code != 0 {
        return Err(Exit(response.exit_code).into());
    }
    Ok(())
}
