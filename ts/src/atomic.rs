//! Atomic file writes: write to a sibling temp file, fsync, then rename.
//!
//! Every durable JSON/markdown artifact in the workspace (projects.json,
//! task files, plan files, planning-context.json) goes through this so a
//! crash mid-write never leaves a torn file for the next reader.

use eyre::{Context, Result};
use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

/// Write `contents` to `path` atomically.
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let tmp_path = path.with_extension(format!(
        "{}.tmp",
        path.extension().and_then(|e| e.to_str()).unwrap_or("tmp")
    ));
    {
        let mut f = File::create(&tmp_path).with_context(|| format!("creating {}", tmp_path.display()))?;
        f.write_all(contents)?;
        f.sync_all()?;
    }
    fs::rename(&tmp_path, path).with_context(|| format!("renaming into {}", path.display()))?;
    Ok(())
}

/// Serialize `value` as pretty, deterministically-ordered JSON and write it
/// atomically.
pub fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("serializing JSON")?;
    atomic_write(path, json.as_bytes())
}
