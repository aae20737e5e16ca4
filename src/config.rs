use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

// Default header keys shared by the reader and the sink.
pub const DEFAULT_FILE_PATH_KEY: &str = "file";
pub const DEFAULT_BASENAME_KEY: &str = "basename";
pub const DEFAULT_FILE_DONE_KEY: &str = "fileDone";
pub const DEFAULT_HOST_KEY: &str = "hostname";

/// Order in which spooled files are consumed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsumeOrder {
    /// Smallest last-modified timestamp first (default).
    Oldest,
    /// Largest last-modified timestamp first.
    Youngest,
    /// Encounter order over a cached directory listing; mtimes ignored.
    Random,
}

/// What to do with a source file once it is fully and cleanly consumed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeletePolicy {
    Never,
    Immediate,
}

/// Reaction to undecodable bytes in the input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeErrorPolicy {
    /// Surface an error to the caller.
    Fail,
    /// Substitute U+FFFD for invalid sequences.
    Replace,
    /// Drop invalid sequences silently.
    Ignore,
}

/// Character set of the spooled input files.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputCharset {
    Utf8,
    Latin1,
}

impl FromStr for InputCharset {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(InputCharset::Utf8),
            "latin-1" | "latin1" | "iso-8859-1" => Ok(InputCharset::Latin1),
            other => Err(format!("unsupported input charset: {other}")),
        }
    }
}

/// Output record framing used by the bucketed writer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SerializerKind {
    /// Raw record body plus a trailing newline (byte-identical round trip).
    Text,
    /// One JSON object per line carrying headers and body.
    Jsonl,
}

/// Options for the spool-directory reader with sensible defaults and builder
/// chaining. Relative tracker dirs resolve under the spool directory.
#[derive(Clone, Debug)]
pub struct ReaderOptions {
    pub spool_directory: PathBuf,
    pub completed_suffix: String,
    pub match_pattern: String,  // regex a candidate name must satisfy
    pub ignore_pattern: String, // regex that disqualifies a candidate name
    pub tracker_dir: PathBuf,
    pub annotate_file_name: bool,
    pub file_path_key: String,
    pub annotate_base_name: bool,
    pub base_name_key: String,
    pub file_done_key: String,
    pub input_charset: InputCharset,
    pub decode_error_policy: DecodeErrorPolicy,
    pub max_line_bytes: usize, // longer lines are truncated with a warning
    pub consume_order: ConsumeOrder,
    pub delete_policy: DeletePolicy,
    pub batch_size: usize,
    pub max_backoff: Duration, // cap for the channel-full backoff sleep
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            spool_directory: PathBuf::from("./spool"),
            completed_suffix: ".COMPLETED".to_string(),
            match_pattern: "^.*$".to_string(), // match all
            ignore_pattern: "^$".to_string(),  // no effect
            tracker_dir: PathBuf::from(".spoolrelay"),
            annotate_file_name: true,
            file_path_key: DEFAULT_FILE_PATH_KEY.to_string(),
            annotate_base_name: true,
            base_name_key: DEFAULT_BASENAME_KEY.to_string(),
            file_done_key: DEFAULT_FILE_DONE_KEY.to_string(),
            input_charset: InputCharset::Utf8,
            decode_error_policy: DecodeErrorPolicy::Fail,
            max_line_bytes: 2048,
            consume_order: ConsumeOrder::Oldest,
            delete_policy: DeletePolicy::Never,
            batch_size: 100,
            max_backoff: Duration::from_millis(4000),
        }
    }
}

impl ReaderOptions {
    pub fn with_spool_directory(mut self, dir: impl AsRef<Path>) -> Self {
        self.spool_directory = dir.as_ref().to_path_buf();
        self
    }
    pub fn with_completed_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.completed_suffix = suffix.into();
        self
    }
    pub fn with_match_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.match_pattern = pattern.into();
        self
    }
    pub fn with_ignore_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.ignore_pattern = pattern.into();
        self
    }
    pub fn with_tracker_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.tracker_dir = dir.as_ref().to_path_buf();
        self
    }
    pub fn with_annotate_file_name(mut self, yes: bool) -> Self {
        self.annotate_file_name = yes;
        self
    }
    pub fn with_file_path_key(mut self, key: impl Into<String>) -> Self {
        self.file_path_key = key.into();
        self
    }
    pub fn with_annotate_base_name(mut self, yes: bool) -> Self {
        self.annotate_base_name = yes;
        self
    }
    pub fn with_base_name_key(mut self, key: impl Into<String>) -> Self {
        self.base_name_key = key.into();
        self
    }
    pub fn with_file_done_key(mut self, key: impl Into<String>) -> Self {
        self.file_done_key = key.into();
        self
    }
    pub fn with_input_charset(mut self, charset: InputCharset) -> Self {
        self.input_charset = charset;
        self
    }
    pub fn with_decode_error_policy(mut self, policy: DecodeErrorPolicy) -> Self {
        self.decode_error_policy = policy;
        self
    }
    pub fn with_max_line_bytes(mut self, bytes: usize) -> Self {
        self.max_line_bytes = bytes.max(1);
        self
    }
    pub fn with_consume_order(mut self, order: ConsumeOrder) -> Self {
        self.consume_order = order;
        self
    }
    pub fn with_delete_policy(mut self, policy: DeletePolicy) -> Self {
        self.delete_policy = policy;
        self
    }
    pub fn with_batch_size(mut self, n: usize) -> Self {
        self.batch_size = n.max(1);
        self
    }
    pub fn with_max_backoff(mut self, cap: Duration) -> Self {
        self.max_backoff = cap;
        self
    }

    /// Tracker directory with relative paths resolved under the spool dir.
    pub fn resolved_tracker_dir(&self) -> PathBuf {
        if self.tracker_dir.is_absolute() {
            self.tracker_dir.clone()
        } else {
            self.spool_directory.join(&self.tracker_dir)
        }
    }
}

/// Options for the bucketed file sink.
#[derive(Clone, Debug)]
pub struct SinkOptions {
    pub directory: PathBuf,
    pub serializer: SerializerKind,
    pub max_open_files: usize,
    /// Zero disables time-based rolling.
    pub roll_interval: Duration,
    pub txn_batch_max: usize,
    pub host_key: String,
    pub file_done_key: String,
    pub base_name_key: String,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./out"),
            serializer: SerializerKind::Text,
            max_open_files: 30,
            roll_interval: Duration::ZERO,
            txn_batch_max: 100,
            host_key: DEFAULT_HOST_KEY.to_string(),
            file_done_key: DEFAULT_FILE_DONE_KEY.to_string(),
            base_name_key: DEFAULT_BASENAME_KEY.to_string(),
        }
    }
}

impl SinkOptions {
    pub fn with_directory(mut self, dir: impl AsRef<Path>) -> Self {
        self.directory = dir.as_ref().to_path_buf();
        self
    }
    pub fn with_serializer(mut self, kind: SerializerKind) -> Self {
        self.serializer = kind;
        self
    }
    pub fn with_max_open_files(mut self, n: usize) -> Self {
        self.max_open_files = n.max(1);
        self
    }
    pub fn with_roll_interval(mut self, interval: Duration) -> Self {
        self.roll_interval = interval;
        self
    }
    pub fn with_txn_batch_max(mut self, n: usize) -> Self {
        self.txn_batch_max = n.max(1);
        self
    }
    pub fn with_host_key(mut self, key: impl Into<String>) -> Self {
        self.host_key = key.into();
        self
    }
    pub fn with_file_done_key(mut self, key: impl Into<String>) -> Self {
        self.file_done_key = key.into();
        self
    }
    pub fn with_base_name_key(mut self, key: impl Into<String>) -> Self {
        self.base_name_key = key.into();
        self
    }
}

/// Options for the byte-rate limiter.
#[derive(Clone, Debug)]
pub struct RateLimitOptions {
    /// Byte threshold admitted per window, in KiB.
    pub limit_rate_kb: u64,
    /// Fixed per-record framing overhead added to each record's size.
    pub header_overhead: u64,
    /// Accounting window; the long-run rate is threshold/window.
    pub window: Duration,
}

impl Default for RateLimitOptions {
    fn default() -> Self {
        Self { limit_rate_kb: 500, header_overhead: 16, window: Duration::from_secs(1) }
    }
}

impl RateLimitOptions {
    pub fn with_limit_rate_kb(mut self, kb: u64) -> Self {
        self.limit_rate_kb = kb.max(1);
        self
    }
    pub fn with_header_overhead(mut self, bytes: u64) -> Self {
        self.header_overhead = bytes;
        self
    }
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }
}
