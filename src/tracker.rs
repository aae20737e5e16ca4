use crate::util::{remove_with_backoff, replace_file_atomic_backoff, suffixed};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Durable read-position record: which file is being consumed and the byte
/// offset of the last committed mark. Survives process restart; a fresh
/// tracker starts at offset 0.
///
/// On-disk format: a single `target\toffset` line, rewritten atomically on
/// every mark so a crash can never leave a torn offset behind.
pub struct PositionTracker {
    meta_path: PathBuf,
    target: PathBuf,
    offset: u64,
}

impl PositionTracker {
    /// Open the tracker for `target`. A persisted record for the same target
    /// resumes at its stored offset; a record for a different target is stale
    /// and gets discarded.
    pub fn open(meta_path: &Path, target: &Path) -> Result<Self> {
        let mut offset = 0u64;
        match Self::load(meta_path) {
            Some((stored_target, stored_offset)) if stored_target == target => {
                offset = stored_offset;
            }
            Some((stored_target, _)) => {
                warn!(
                    "stale position record for {} found, discarding (now reading {})",
                    stored_target.display(),
                    target.display()
                );
                remove_with_backoff(meta_path, 16, 50)?;
            }
            None => {}
        }
        Ok(Self { meta_path: meta_path.to_path_buf(), target: target.to_path_buf(), offset })
    }

    fn load(meta_path: &Path) -> Option<(PathBuf, u64)> {
        let contents = fs::read_to_string(meta_path).ok()?;
        let line = contents.lines().next()?;
        let (target, offset) = line.rsplit_once('\t')?;
        let offset: u64 = offset.trim().parse().ok()?;
        Some((PathBuf::from(target), offset))
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Last durably committed offset.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Commit `offset` to durable storage.
    pub fn mark(&mut self, offset: u64) -> Result<()> {
        let tmp = suffixed(&self.meta_path, ".tmp");
        let line = format!("{}\t{}\n", self.target.display(), offset);
        fs::write(&tmp, line).with_context(|| format!("write {}", tmp.display()))?;
        replace_file_atomic_backoff(&tmp, &self.meta_path)?;
        self.offset = offset;
        Ok(())
    }

    /// Delete the durable record (file retirement or stale cleanup).
    pub fn remove(&self) -> Result<()> {
        remove_with_backoff(&self.meta_path, 16, 50)
    }
}

/// Drop a leftover zero-length meta file; it carries no usable position.
pub fn discard_empty_meta(meta_path: &Path) -> Result<()> {
    if let Ok(meta) = fs::metadata(meta_path) {
        if meta.len() == 0 {
            remove_with_backoff(meta_path, 16, 50)?;
        }
    }
    Ok(())
}
