use crate::config::{DecodeErrorPolicy, InputCharset};
use crate::record::Record;
use crate::tracker::PositionTracker;
use crate::util::open_with_backoff;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;
use tracing::warn;

/// A resumable, position-tracked record source over one spooled file.
/// `read_batch` never blocks waiting for data: end of file is an empty list.
pub trait RecordDeserializer {
    /// Read up to `max` records from the current position.
    fn read_batch(&mut self, max: usize) -> Result<Vec<Record>>;
    /// Commit the current position to durable storage.
    fn mark(&mut self) -> Result<()>;
    /// Discard progress since the last mark; the next read re-delivers.
    fn reset(&mut self) -> Result<()>;
    /// Release the underlying file handle. The durable mark stays put.
    fn close(&mut self) -> Result<()>;
}

/// Opens a deserializer for a candidate file. The reader state machine only
/// sees this seam, so tests can substitute in-memory fakes.
pub trait SpoolFormat {
    fn open(&self, file: &Path, meta_path: &Path) -> Result<Box<dyn RecordDeserializer>>;
}

/// Newline-delimited text records, one `Record` per line.
#[derive(Clone, Debug)]
pub struct LineFormat {
    pub charset: InputCharset,
    pub decode_error_policy: DecodeErrorPolicy,
    pub max_line_bytes: usize,
}

impl SpoolFormat for LineFormat {
    fn open(&self, file: &Path, meta_path: &Path) -> Result<Box<dyn RecordDeserializer>> {
        let tracker = PositionTracker::open(meta_path, file)?;
        // Propagate the raw io::Error so a raced deletion stays recognizable.
        let handle = open_with_backoff(file, 16, 50)?;
        let mut reader = BufReader::new(handle);
        let start = tracker.offset();
        if start > 0 {
            reader.seek(SeekFrom::Start(start)).with_context(|| {
                format!("seek {} to committed offset {}", file.display(), start)
            })?;
        }
        Ok(Box::new(LineDeserializer {
            reader,
            tracker,
            pos: start,
            marked: start,
            charset: self.charset,
            decode_error_policy: self.decode_error_policy,
            max_line_bytes: self.max_line_bytes,
            buf: Vec::new(),
        }))
    }
}

pub struct LineDeserializer {
    reader: BufReader<File>,
    tracker: PositionTracker,
    pos: u64,    // byte offset of the next unread line
    marked: u64, // last durably committed offset
    charset: InputCharset,
    decode_error_policy: DecodeErrorPolicy,
    max_line_bytes: usize,
    buf: Vec<u8>,
}

impl LineDeserializer {
    /// Read one raw line (without its terminator) into `self.buf`.
    /// Returns false at end of file.
    fn next_line(&mut self) -> Result<bool> {
        self.buf.clear();
        let n = self
            .reader
            .read_until(b'\n', &mut self.buf)
            .with_context(|| format!("read {}", self.tracker.target().display()))?;
        if n == 0 {
            return Ok(false);
        }
        self.pos += n as u64;
        if self.buf.ends_with(b"\n") {
            self.buf.pop();
            if self.buf.ends_with(b"\r") {
                self.buf.pop();
            }
        }
        if self.buf.len() > self.max_line_bytes {
            warn!(
                "line at offset {} in {} exceeds {} bytes, truncating",
                self.pos - n as u64,
                self.tracker.target().display(),
                self.max_line_bytes
            );
            self.buf.truncate(self.max_line_bytes);
        }
        Ok(true)
    }

    fn decode(&self) -> Result<Vec<u8>> {
        match self.charset {
            InputCharset::Utf8 => match self.decode_error_policy {
                DecodeErrorPolicy::Fail => match std::str::from_utf8(&self.buf) {
                    Ok(_) => Ok(self.buf.clone()),
                    Err(e) => Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("invalid UTF-8 in {}: {}", self.tracker.target().display(), e),
                    )
                    .into()),
                },
                DecodeErrorPolicy::Replace => {
                    Ok(String::from_utf8_lossy(&self.buf).into_owned().into_bytes())
                }
                DecodeErrorPolicy::Ignore => {
                    let cleaned: String = String::from_utf8_lossy(&self.buf)
                        .chars()
                        .filter(|c| *c != char::REPLACEMENT_CHARACTER)
                        .collect();
                    Ok(cleaned.into_bytes())
                }
            },
            // Every Latin-1 byte maps to exactly one scalar value.
            InputCharset::Latin1 => {
                let s: String = self.buf.iter().map(|&b| b as char).collect();
                Ok(s.into_bytes())
            }
        }
    }
}

impl RecordDeserializer for LineDeserializer {
    fn read_batch(&mut self, max: usize) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        while records.len() < max {
            if !self.next_line()? {
                break;
            }
            records.push(Record::new(self.decode()?));
        }
        Ok(records)
    }

    fn mark(&mut self) -> Result<()> {
        self.tracker.mark(self.pos)?;
        self.marked = self.pos;
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.reader
            .seek(SeekFrom::Start(self.marked))
            .with_context(|| format!("reset {} to offset {}", self.tracker.target().display(), self.marked))?;
        self.pos = self.marked;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        // Dropping the BufReader releases the handle; nothing buffered to
        // write. Kept as an explicit call so callers control the timing.
        Ok(())
    }
}
