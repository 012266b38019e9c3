//! Canonical locations under the project's `data/` directory.

use std::path::{Path, PathBuf};

/// Returns the workspace root directory, resolved at compile time from
/// `CARGO_MANIFEST_DIR`.
#[must_use]
pub fn project_root() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest
        .ancestors()
        .nth(2)
        .unwrap_or(manifest)
        .to_path_buf()
}

/// Returns the `data/` directory path.
#[must_use]
pub fn data_dir() -> PathBuf {
    project_root().join("data")
}

/// Returns the `data/submissions/` directory holding run ledgers.
#[must_use]
pub fn submissions_dir() -> PathBuf {
    data_dir().join("submissions")
}

/// Returns the ledger path for `run_tag` inside `dir`.
#[must_use]
pub fn ledger_path(dir: &Path, run_tag: &str) -> PathBuf {
    dir.join(format!("{run_tag}.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_lives_under_submissions() {
        assert!(submissions_dir().ends_with("data/submissions"));
        assert_eq!(
            ledger_path(Path::new("/tmp/ledgers"), "20230321"),
            PathBuf::from("/tmp/ledgers/20230321.json")
        );
    }
}
