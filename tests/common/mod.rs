#![allow(dead_code)]

use spoolrelay::{LineFormat, ReaderOptions, Record, SpoolFileReader};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Write a plain-text spool file with one line per entry.
pub fn write_lines(path: &Path, lines: &[&str]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut f = File::create(path).unwrap();
    for l in lines {
        writeln!(f, "{}", l).unwrap();
    }
}

/// Append lines to an existing file (mutates size and mtime).
pub fn append_lines(path: &Path, lines: &[&str]) {
    let mut f = OpenOptions::new().append(true).open(path).unwrap();
    for l in lines {
        writeln!(f, "{}", l).unwrap();
    }
}

/// Pin a file's mtime to a fixed offset from the epoch so ordering tests are
/// independent of creation order and clock resolution.
pub fn set_mtime_epoch_secs(path: &Path, secs: u64) {
    let f = OpenOptions::new().write(true).open(path).unwrap();
    f.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs)).unwrap();
}

/// Reader options rooted at `spool` with an absolute tracker dir alongside.
pub fn reader_options(spool: &Path) -> ReaderOptions {
    ReaderOptions::default()
        .with_spool_directory(spool)
        .with_tracker_dir(spool.join(".tracker"))
}

pub fn line_format(options: &ReaderOptions) -> LineFormat {
    LineFormat {
        charset: options.input_charset,
        decode_error_policy: options.decode_error_policy,
        max_line_bytes: options.max_line_bytes,
    }
}

pub fn make_reader(options: ReaderOptions) -> SpoolFileReader {
    let format = line_format(&options);
    SpoolFileReader::new(options, Box::new(format)).unwrap()
}

/// Record bodies as strings, for compact assertions.
pub fn bodies(records: &[Record]) -> Vec<String> {
    records.iter().map(|r| String::from_utf8_lossy(r.body()).into_owned()).collect()
}

pub fn read_file(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}

pub fn spool_dir() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let spool = dir.path().join("spool");
    fs::create_dir_all(&spool).unwrap();
    (dir, spool)
}
