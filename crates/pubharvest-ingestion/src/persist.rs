//! Atomic file writes.

use std::io::Write;
use std::path::Path;

use pubharvest_common::{HarvestError, Result};
use tempfile::NamedTempFile;

/// Write `bytes` to a temp file beside `path`, then rename over `path`.
/// On failure the temp file is removed and `path` is left untouched.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| HarvestError::persistence(dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| HarvestError::persistence(dir, e))?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| HarvestError::persistence(path, e))?;
    tmp.persist(path)
        .map_err(|e| HarvestError::persistence(path, e.error))?;
    Ok(())
}
