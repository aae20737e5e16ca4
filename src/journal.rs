use crate::util::{append_with_backoff, open_with_backoff};
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::warn;

/// Append-only record of fully-consumed file names. One `timestamp\tname`
/// line per retirement; loaded once at startup, appended to afterwards, never
/// rewritten. A name is in the journal exactly when the file was fully and
/// cleanly consumed.
pub struct CompletionJournal {
    path: PathBuf,
    names: HashSet<String, ahash::RandomState>,
}

impl CompletionJournal {
    pub fn load(path: &Path) -> Result<Self> {
        let mut names = HashSet::with_hasher(ahash::RandomState::new());
        if path.exists() {
            let file = open_with_backoff(path, 16, 50)
                .with_context(|| format!("open journal {}", path.display()))?;
            for line in BufReader::new(file).lines() {
                let line = line?;
                if let Some((_, name)) = line.split_once('\t') {
                    let name = name.trim();
                    if !name.is_empty() {
                        names.insert(name.to_string());
                    }
                }
            }
        } else {
            warn!("completion journal does not exist yet: {}", path.display());
        }
        Ok(Self { path: path.to_path_buf(), names })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn names(&self) -> &HashSet<String, ahash::RandomState> {
        &self.names
    }

    /// Retire `name`: append one journal line and mirror it in memory.
    pub fn record(&mut self, name: &str) -> Result<()> {
        let stamp = OffsetDateTime::now_utc()
            .format(format_description!(
                "[year]-[month]-[day] [hour]:[minute]:[second]"
            ))
            .context("format journal timestamp")?;
        let mut file = append_with_backoff(&self.path, 16, 50)
            .with_context(|| format!("append journal {}", self.path.display()))?;
        writeln!(file, "{stamp}\t{name}")?;
        self.names.insert(name.to_string());
        Ok(())
    }
}
