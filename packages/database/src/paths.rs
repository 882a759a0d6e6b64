//! Canonical file paths for the `DuckDB` data directory.
//!
//! Paths are relative to the project root's `data/` directory unless
//! `ZONE_SAFETY_DATA_DIR` points elsewhere.

use std::path::{Path, PathBuf};

/// Overrides the `data/` directory.
pub const DATA_DIR_ENV: &str = "ZONE_SAFETY_DATA_DIR";

/// Returns the workspace root directory.
///
/// Resolved at compile time from `CARGO_MANIFEST_DIR`. Falls back to the
/// current directory for builds outside the workspace layout.
#[must_use]
pub fn project_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// Returns the data directory: `$ZONE_SAFETY_DATA_DIR` if set, else
/// `<project root>/data`.
#[must_use]
pub fn data_dir() -> PathBuf {
    std::env::var_os(DATA_DIR_ENV)
        .filter(|dir| !dir.is_empty())
        .map_or_else(|| project_root().join("data"), PathBuf::from)
}

/// Returns the path of the engine's `DuckDB` file.
#[must_use]
pub fn default_db_path() -> PathBuf {
    data_dir().join("zone_safety.duckdb")
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
