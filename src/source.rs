use crate::channel::{ChannelError, RecordChannel};
use crate::limiter::RateLimiter;
use crate::reader::SpoolFileReader;
use anyhow::Result;
use std::thread::sleep;
use std::time::Duration;
use tracing::{debug, warn};

const BACKOFF_BASE: Duration = Duration::from_millis(250);

/// Polling worker that drains the spool reader into a transactional channel.
/// A transiently full channel is retried with exponential backoff (doubling
/// from 250 ms up to the configured cap, reset on the next success); the
/// reader's commit only happens after the channel accepted the batch, so an
/// undelivered batch is redelivered via the reset semantics.
pub struct SpoolSourceRunner<C: RecordChannel> {
    reader: SpoolFileReader,
    channel: C,
    limiter: Option<RateLimiter>,
    batch_size: usize,
    max_backoff: Duration,
    static_headers: Vec<(String, String)>,
}

impl<C: RecordChannel> SpoolSourceRunner<C> {
    pub fn new(reader: SpoolFileReader, channel: C, batch_size: usize, max_backoff: Duration) -> Self {
        Self {
            reader,
            channel,
            limiter: None,
            batch_size: batch_size.max(1),
            max_backoff,
            static_headers: Vec::new(),
        }
    }

    /// Pace delivery through a byte-rate limiter.
    pub fn with_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Stamp every delivered record with a fixed header, e.g. the producing
    /// host's name for the sink's routing key.
    pub fn with_static_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.static_headers.push((key.into(), value.into()));
        self
    }

    pub fn reader(&self) -> &SpoolFileReader {
        &self.reader
    }

    /// One drain pass: read, deliver, commit, repeat until the spool has no
    /// more candidates. Returns the number of records delivered. The caller
    /// owns the polling cadence between passes.
    pub fn drain(&mut self) -> Result<u64> {
        let mut delivered = 0u64;
        loop {
            let mut batch = self.reader.read_batch(self.batch_size)?;
            if batch.is_empty() {
                debug!("spool directory drained, {} records delivered", delivered);
                return Ok(delivered);
            }

            for (key, value) in &self.static_headers {
                for record in &mut batch {
                    record.set_header(key.clone(), value.clone());
                }
            }
            if let Some(limiter) = self.limiter.as_mut() {
                for record in &batch {
                    limiter.admit(record);
                }
            }

            let mut backoff = BACKOFF_BASE;
            loop {
                match self.channel.put_batch(&batch) {
                    Ok(()) => break,
                    Err(ChannelError::Full) => {
                        warn!(
                            "channel is full, cannot write data now; retrying in {:?}",
                            backoff
                        );
                        sleep(backoff);
                        backoff = (backoff * 2).min(self.max_backoff);
                    }
                    Err(e @ ChannelError::Closed) => return Err(e.into()),
                }
            }

            self.reader.commit()?;
            delivered += batch.len() as u64;
        }
    }

    /// Stop mid-file safely; any uncommitted batch is redelivered on restart.
    pub fn close(&mut self) -> Result<()> {
        self.reader.close()
    }
}
