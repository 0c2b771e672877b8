use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Sibling temp path used while replacing `path` (`shop_stock.json` -> `shop_stock.json.tmp`).
pub fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Replace `path` with `bytes` so readers see either the old or the new file, never a mix.
///
/// The bytes go to a temp file in the same directory first; the rename over
/// the target only happens once they are fully written and synced. On any
/// failure the temp file is removed and the existing target is left alone.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("create dir {}", parent.display()))?;
    }
    let tmp = temp_path_for(path);

    if let Err(e) = write_synced(&tmp, bytes) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }

    if let Err(first) = fs::rename(&tmp, path) {
        // Some platforms refuse to rename over an existing file.
        if path.exists() && fs::remove_file(path).is_ok() && fs::rename(&tmp, path).is_ok() {
            return Ok(());
        }
        let _ = fs::remove_file(&tmp);
        return Err(first).with_context(|| format!("replace {}", path.display()));
    }
    Ok(())
}

fn write_synced(tmp: &Path, bytes: &[u8]) -> Result<()> {
    let mut f = fs::File::create(tmp).with_context(|| format!("create temp file {}", tmp.display()))?;
    f.write_all(bytes).with_context(|| format!("write temp file {}", tmp.display()))?;
    f.sync_all().with_context(|| format!("sync temp file {}", tmp.display()))?;
    Ok(())
}
