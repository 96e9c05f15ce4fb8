use std::path::{Path, PathBuf};

/// Resolve the project root that holds `.nwave/`.
///
/// Priority:
/// 1. `--root` flag / `NWAVE_ROOT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `.nwave/`
/// 3. Walk upward from `cwd` looking for `.git/`
/// 4. Fall back to `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_root(&cwd)
}

fn find_root(cwd: &Path) -> PathBuf {
    for marker in [des_core::paths::NWAVE_DIR, ".git"] {
        if let Some(dir) = cwd.ancestors().find(|d| d.join(marker).is_dir()) {
            return dir.to_path_buf();
        }
    }
    cwd.to_path_buf()
}
