use crate::config::SerializerKind;
use crate::record::Record;
use crate::serializer::RecordSerializer;
use crate::util::{append_with_backoff, rename_with_backoff, suffixed};
use anyhow::{Context, Result};
use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Suffix of a bucket file while it is being written.
pub const IN_USE_SUFFIX: &str = ".tmp";
/// Suffix chain appended when the requested final path already exists.
pub const REDO_SUFFIX: &str = ".redo";
/// Suffix of a finalized-but-incomplete bucket (source file changed mid-send).
pub const INCOMPLETE_SUFFIX: &str = ".uncompleted";

/// One logical output file accumulating records for a destination key.
/// Writes go to a temp path in append mode; `rename_bucket` promotes the temp
/// file to its final name (or an `.uncompleted` variant) exactly once.
pub struct BucketWriter {
    final_path: PathBuf,
    tmp_path: PathBuf,
    serializer: Option<Box<dyn RecordSerializer>>,
}

impl BucketWriter {
    /// Open a bucket for `requested`. If a file already exists at that exact
    /// final path it is considered finalized elsewhere, so the redo suffix is
    /// appended and the walk repeats until an unused final name is found. The
    /// temp file is opened in append mode, never truncated.
    pub fn open(requested: &Path, kind: SerializerKind) -> Result<Self> {
        let mut final_path = requested.to_path_buf();
        while final_path.exists() {
            final_path = suffixed(&final_path, REDO_SUFFIX);
        }
        let tmp_path = suffixed(&final_path, IN_USE_SUFFIX);
        if let Some(parent) = tmp_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create bucket dir {}", parent.display()))?;
        }
        let file = append_with_backoff(&tmp_path, 16, 50)
            .with_context(|| format!("open bucket {}", tmp_path.display()))?;
        info!("open bucket file {}", tmp_path.display());
        let serializer = kind.build(Box::new(BufWriter::new(file)));
        Ok(Self { final_path, tmp_path, serializer: Some(serializer) })
    }

    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    pub fn tmp_path(&self) -> &Path {
        &self.tmp_path
    }

    /// Serialize one record to the buffered stream. No implicit flush.
    pub fn append(&mut self, record: &Record) -> Result<()> {
        match self.serializer.as_mut() {
            Some(serializer) => {
                serializer.write(record).with_context(|| {
                    format!("append to bucket {}", self.tmp_path.display())
                })?;
                Ok(())
            }
            None => anyhow::bail!("append to closed bucket {}", self.tmp_path.display()),
        }
    }

    /// Complete serializer framing, then flush the stream buffer, in that
    /// order. Called once per batch before a transaction commits.
    pub fn flush(&mut self) -> Result<()> {
        if let Some(serializer) = self.serializer.as_mut() {
            serializer
                .flush()
                .with_context(|| format!("flush bucket {}", self.tmp_path.display()))?;
        }
        Ok(())
    }

    /// Flush and release the file handle, leaving the temp file in place.
    /// Safe to call multiple times.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut serializer) = self.serializer.take() {
            serializer
                .flush()
                .with_context(|| format!("close bucket {}", self.tmp_path.display()))?;
        }
        Ok(())
    }

    /// Promote the temp file: to the final path on success, to the final path
    /// plus the incomplete suffix otherwise (partial data is kept for manual
    /// inspection, never discarded). A missing temp file means a concurrent
    /// eviction or an earlier call already handled it; that is a no-op.
    /// Rename failures are logged, not raised.
    pub fn rename_bucket(&mut self, success: bool) {
        let dest = if success {
            self.final_path.clone()
        } else {
            suffixed(&self.final_path, INCOMPLETE_SUFFIX)
        };
        if !self.tmp_path.exists() {
            debug!("bucket temp {} already gone, nothing to rename", self.tmp_path.display());
            return;
        }
        match rename_with_backoff(&self.tmp_path, &dest, 16, 50) {
            Ok(()) => info!("renamed {} to {}", self.tmp_path.display(), dest.display()),
            Err(e) => error!(
                "renaming {} to {} failed: {e:#}",
                self.tmp_path.display(),
                dest.display()
            ),
        }
    }
}
