//! The spool reader: opens one candidate file at a time, yields batches under
//! an at-least-once commit protocol, and retires files through an integrity
//! check into the completion journal.

use crate::config::{DeletePolicy, ReaderOptions};
use crate::deserializer::{RecordDeserializer, SpoolFormat};
use crate::journal::CompletionJournal;
use crate::record::{file_done_record, Record};
use crate::selector::{CandidateFile, FileSelector};
use crate::tracker::discard_empty_meta;
use crate::util::remove_with_backoff;
use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::SystemTime;
use tracing::{debug, error, info, warn};

const META_FILE_NAME: &str = ".spoolrelay-main.meta";
const JOURNAL_FILE_NAME: &str = ".done-files.meta";

struct OpenFile {
    candidate: CandidateFile,
    deserializer: Box<dyn RecordDeserializer>,
}

/// Reliable spool-directory reader.
///
/// States: idle (no open file), open-committed (file open, no outstanding
/// batch), open-uncommitted (a batch was delivered but not yet committed).
/// At most one batch is outstanding at a time; a new read while uncommitted
/// resets the position-tracked source to its last mark and re-delivers.
pub struct SpoolFileReader {
    options: ReaderOptions,
    selector: FileSelector,
    journal: CompletionJournal,
    format: Box<dyn SpoolFormat>,
    meta_path: PathBuf,
    current: Option<OpenFile>,
    committed: bool,
}

impl SpoolFileReader {
    /// Fails fast if the spool directory is missing or the tracker directory
    /// cannot be created.
    pub fn new(options: ReaderOptions, format: Box<dyn SpoolFormat>) -> Result<Self> {
        let tracker_dir = options.resolved_tracker_dir();
        fs::create_dir_all(&tracker_dir)
            .with_context(|| format!("create tracker dir {}", tracker_dir.display()))?;

        let meta_path = tracker_dir.join(META_FILE_NAME);
        discard_empty_meta(&meta_path)?;

        let journal = CompletionJournal::load(&tracker_dir.join(JOURNAL_FILE_NAME))?;
        let selector = FileSelector::new(
            &options.spool_directory,
            &options.match_pattern,
            &options.ignore_pattern,
            options.consume_order,
        )?;

        debug!(
            "spool reader initialized: directory={}, tracker={}, order={:?}",
            options.spool_directory.display(),
            tracker_dir.display(),
            options.consume_order
        );

        Ok(Self { options, selector, journal, format, meta_path, current: None, committed: true })
    }

    /// Read up to `max` records. Returns an empty list only when there is no
    /// candidate file at all; end of the current file yields the single
    /// synthetic file-done record instead. Never blocks on absent data.
    pub fn read_batch(&mut self, max: usize) -> Result<Vec<Record>> {
        if !self.committed {
            let open = self.current.as_mut().ok_or_else(|| {
                anyhow::anyhow!("a file must stay open while a commit is outstanding")
            })?;
            info!("last read was never committed, resetting to mark");
            open.deserializer.reset()?;
        } else if self.current.is_none() {
            self.current = self.next_file()?;
            if self.current.is_none() {
                return Ok(Vec::new());
            }
        }

        let open = self.current.as_mut().expect("file is open at this point");
        let mut records = open.deserializer.read_batch(max)?;

        if records.is_empty() {
            // End of file: retire it and hand the completion signal downstream.
            let open = self.current.take().expect("file is open at this point");
            let done = self.retire(open)?;
            self.committed = true;
            return Ok(vec![done]);
        }

        if self.options.annotate_file_name {
            let open = self.current.as_ref().expect("file is open at this point");
            let path = open.candidate.path.to_string_lossy().into_owned();
            for record in &mut records {
                record.set_header(self.options.file_path_key.as_str(), path.clone());
            }
        }
        if self.options.annotate_base_name {
            let open = self.current.as_ref().expect("file is open at this point");
            let base = open.candidate.base_name();
            for record in &mut records {
                record.set_header(self.options.base_name_key.as_str(), base.clone());
            }
        }

        self.committed = false;
        Ok(records)
    }

    /// Durably mark the position of the last delivered batch.
    pub fn commit(&mut self) -> Result<()> {
        if !self.committed {
            if let Some(open) = self.current.as_mut() {
                open.deserializer.mark()?;
                self.committed = true;
            }
        }
        Ok(())
    }

    /// Stop mid-file without retiring: no journal write, no delete. The
    /// durable mark stays put, so a later reader resumes from the last commit.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut open) = self.current.take() {
            open.deserializer.close()?;
        }
        Ok(())
    }

    pub fn journal(&self) -> &CompletionJournal {
        &self.journal
    }

    fn next_file(&mut self) -> Result<Option<OpenFile>> {
        let Some(candidate) = self.selector.select_next(self.journal.names()) else {
            return Ok(None);
        };
        info!("opening file for consuming: {}", candidate.path.display());

        let deserializer = match self.format.open(&candidate.path, &self.meta_path) {
            Ok(d) => d,
            Err(e) => {
                // A raced deletion between scan and open is "no candidate",
                // not an error; the next poll re-scans.
                if let Some(io_err) = e.downcast_ref::<io::Error>() {
                    if io_err.kind() == io::ErrorKind::NotFound {
                        warn!("could not find file {}: {e}", candidate.path.display());
                        return Ok(None);
                    }
                }
                error!("opening file {}: {e:#}", candidate.path.display());
                return Ok(None);
            }
        };

        // Refresh the snapshot now that the file is actually open; this is
        // what retirement compares against.
        let meta = fs::metadata(&candidate.path)
            .with_context(|| format!("stat {}", candidate.path.display()))?;
        let candidate = CandidateFile {
            path: candidate.path,
            size: meta.len(),
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        };

        Ok(Some(OpenFile { candidate, deserializer }))
    }

    /// Close the current file, verify the spooling assumptions held, and
    /// either journal it (and optionally delete it) or flag it for re-reading.
    /// Returns the synthetic end-of-file record.
    fn retire(&mut self, open: OpenFile) -> Result<Record> {
        let OpenFile { candidate, mut deserializer } = open;
        deserializer.close()?;
        drop(deserializer); // release the handle before any delete

        let mut changed = false;
        match fs::metadata(&candidate.path) {
            Ok(meta) => {
                let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                if modified != candidate.modified {
                    changed = true;
                    error!(
                        "file has been modified since being read: {} (open-time mtime {:?}, now {:?})",
                        candidate.path.display(),
                        candidate.modified,
                        modified
                    );
                }
                if meta.len() != candidate.size {
                    changed = true;
                    error!(
                        "file has changed size since being read: {} (open-time size {}, now {})",
                        candidate.path.display(),
                        candidate.size,
                        meta.len()
                    );
                }
            }
            Err(e) => {
                changed = true;
                error!("file vanished before retirement: {}: {e}", candidate.path.display());
            }
        }

        // The position record is spent either way.
        remove_with_backoff(&self.meta_path, 16, 50)?;

        let base_name = candidate.base_name();
        if !changed {
            info!("file {} fully consumed, recording in journal", base_name);
            self.journal.record(&base_name)?;
            if self.options.delete_policy == DeletePolicy::Immediate {
                self.delete_spooled(&candidate)?;
            }
        } else {
            warn!(
                "not journaling {}; it will be collected again next time if it still exists",
                base_name
            );
        }

        Ok(file_done_record(
            &self.options.file_done_key,
            !changed,
            &self.options.file_path_key,
            &candidate.path.to_string_lossy(),
            &self.options.base_name_key,
            &base_name,
        ))
    }

    fn delete_spooled(&self, candidate: &CandidateFile) -> Result<()> {
        info!("deleting consumed file {}", candidate.path.display());
        if !candidate.path.exists() {
            warn!("unable to delete nonexistent file: {}", candidate.path.display());
            return Ok(());
        }
        remove_with_backoff(&candidate.path, 16, 50)
    }
}
