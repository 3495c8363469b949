//! Canonical file paths for the data directory.
//!
//! Paths are relative to the workspace root's `data/` directory unless
//! overridden with `ARMORY_DB_PATH`.

use std::path::{Path, PathBuf};

/// Environment variable overriding the store location.
pub const DB_PATH_ENV: &str = "ARMORY_DB_PATH";

/// Returns the workspace root directory.
///
/// Resolved at compile time from `CARGO_MANIFEST_DIR`.
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

/// Returns the store path: `ARMORY_DB_PATH` if set, otherwise
/// `data/armory.duckdb`.
#[must_use]
pub fn db_path() -> PathBuf {
    std::env::var_os(DB_PATH_ENV)
        .filter(|v| !v.is_empty())
        .map_or_else(|| data_dir().join("armory.duckdb"), PathBuf::from)
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
