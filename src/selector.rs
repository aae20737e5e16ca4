use crate::config::ConsumeOrder;
use anyhow::{Context, Result};
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

/// Immutable snapshot of a spooled file taken when it is selected, used later
/// to detect concurrent mutation at retirement time.
#[derive(Clone, Debug)]
pub struct CandidateFile {
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
}

impl CandidateFile {
    pub fn base_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Scans the spool directory and yields the next file to consume, honoring
/// the configured order. OLDEST/YOUNGEST re-scan on every call since the
/// decision depends on live mtimes; RANDOM caches one filtered listing and
/// walks it in encounter order until exhausted.
pub struct FileSelector {
    directory: PathBuf,
    match_pattern: Regex,
    ignore_pattern: Regex,
    order: ConsumeOrder,
    cached: Vec<CandidateFile>, // RANDOM only, consumed back to front
}

impl FileSelector {
    pub fn new(
        directory: &Path,
        match_pattern: &str,
        ignore_pattern: &str,
        order: ConsumeOrder,
    ) -> Result<Self> {
        anyhow::ensure!(
            directory.is_dir(),
            "spool path is not a directory: {}",
            directory.display()
        );
        Ok(Self {
            directory: directory.to_path_buf(),
            match_pattern: Regex::new(match_pattern)
                .with_context(|| format!("invalid match pattern: {match_pattern}"))?,
            ignore_pattern: Regex::new(ignore_pattern)
                .with_context(|| format!("invalid ignore pattern: {ignore_pattern}"))?,
            order,
            cached: Vec::new(),
        })
    }

    /// Next candidate, or None if nothing in the directory currently
    /// qualifies. `done` is the completion journal's name set.
    pub fn select_next(&mut self, done: &HashSet<String, ahash::RandomState>) -> Option<CandidateFile> {
        match self.order {
            ConsumeOrder::Random => {
                if self.cached.is_empty() {
                    let mut listing = self.scan(done);
                    // Stored reversed so pop() preserves encounter order.
                    listing.reverse();
                    self.cached = listing;
                }
                self.cached.pop()
            }
            ConsumeOrder::Oldest => self
                .scan(done)
                .into_iter()
                .min_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path))),
            ConsumeOrder::Youngest => self.scan(done).into_iter().min_by(|a, b| {
                b.modified.cmp(&a.modified).then_with(|| a.path.cmp(&b.path))
            }),
        }
    }

    /// One filtered directory listing: no subdirectories, no hidden files, no
    /// journaled names, names must satisfy the match pattern and must not
    /// satisfy the ignore pattern.
    fn scan(&self, done: &HashSet<String, ahash::RandomState>) -> Vec<CandidateFile> {
        let mut out = Vec::new();
        for entry in WalkDir::new(&self.directory).min_depth(1).max_depth(1) {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            if entry.file_type().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if name.starts_with('.')
                || done.contains(name.as_ref())
                || self.ignore_pattern.is_match(&name)
                || !self.match_pattern.is_match(&name)
            {
                continue;
            }
            let meta = match entry.metadata() {
                Ok(m) => m,
                Err(_) => continue, // raced deletion, drop the candidate
            };
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            out.push(CandidateFile {
                path: entry.path().to_path_buf(),
                size: meta.len(),
                modified,
            });
        }
        out
    }
}
