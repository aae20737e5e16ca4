mod config;
mod record;
mod util;

mod channel;
mod deserializer;
mod tracker;

mod journal;
mod reader;
mod selector;
mod source;

mod bucket;
mod cache;
mod serializer;
mod sink;

mod limiter;

pub use crate::config::{
    ConsumeOrder, DecodeErrorPolicy, DeletePolicy, InputCharset, RateLimitOptions, ReaderOptions,
    SerializerKind, SinkOptions, DEFAULT_BASENAME_KEY, DEFAULT_FILE_DONE_KEY,
    DEFAULT_FILE_PATH_KEY, DEFAULT_HOST_KEY,
};
pub use crate::record::{file_done_record, Record};

// Reader side: selection, journaling, the reliable reader, the polling worker.
pub use crate::journal::CompletionJournal;
pub use crate::reader::SpoolFileReader;
pub use crate::selector::{CandidateFile, FileSelector};
pub use crate::source::SpoolSourceRunner;

// Sink side: bucketed writer, bounded handle cache, the driving loop.
pub use crate::bucket::{BucketWriter, INCOMPLETE_SUFFIX, IN_USE_SUFFIX, REDO_SUFFIX};
pub use crate::cache::HandleCache;
pub use crate::serializer::RecordSerializer;
pub use crate::sink::{SpoolFileSink, Status};

// External collaborator seams and their in-memory/concrete implementations.
pub use crate::channel::{ChannelError, ChannelTransaction, MemoryChannel, RecordChannel};
pub use crate::deserializer::{LineFormat, RecordDeserializer, SpoolFormat};
pub use crate::tracker::PositionTracker;

pub use crate::limiter::RateLimiter;

// Expose tracing setup and robust file ops for binaries.
pub use crate::util::{
    append_with_backoff, init_tracing_once, open_with_backoff, remove_with_backoff,
    replace_file_atomic_backoff,
};
