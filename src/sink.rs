use crate::bucket::BucketWriter;
use crate::cache::HandleCache;
use crate::channel::{ChannelTransaction, RecordChannel};
use crate::config::SinkOptions;
use anyhow::Result;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Outcome of one sink transaction, signalling the caller's pacing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// Work was done; call again immediately.
    Ready,
    /// Nothing (or an error) happened; back off before the next call.
    Backoff,
}

/// Sink-side driving loop: pulls batches from the transactional channel,
/// routes each record to its destination bucket (host header + base name
/// under the output directory), and finalizes a bucket when the reader's
/// file-done signal arrives. One instance is single-threaded; the handle
/// cache it owns bounds open output files.
pub struct SpoolFileSink<C: RecordChannel> {
    channel: C,
    options: SinkOptions,
    cache: HandleCache,
}

impl<C: RecordChannel> SpoolFileSink<C> {
    pub fn new(channel: C, options: SinkOptions) -> Self {
        let cache = HandleCache::new(options.max_open_files);
        info!(
            "sink configured: dir={}, serializer={:?}, maxOpenFiles={}, rollInterval={:?}, batch={}",
            options.directory.display(),
            options.serializer,
            options.max_open_files,
            options.roll_interval,
            options.txn_batch_max
        );
        Self { channel, options, cache }
    }

    pub fn cache(&self) -> &HandleCache {
        &self.cache
    }

    /// Process one transaction of up to `txn_batch_max` records. An I/O error
    /// rolls back the whole transaction (the channel redelivers) and returns
    /// `Backoff`; nothing already committed is ever lost.
    pub fn process(&mut self) -> Status {
        let mut txn = self.channel.transaction();
        match Self::drive(&self.options, &self.cache, txn.as_mut()) {
            Ok(status) => {
                txn.commit();
                status
            }
            Err(e) => {
                warn!("file I/O error in sink batch: {e:#}");
                txn.rollback();
                Status::Backoff
            }
        }
    }

    fn drive(
        options: &SinkOptions,
        cache: &HandleCache,
        txn: &mut dyn ChannelTransaction,
    ) -> Result<Status> {
        let mut touched: Vec<(String, Arc<Mutex<BucketWriter>>)> = Vec::new();
        let mut exhausted = false;

        for _ in 0..options.txn_batch_max {
            let Some(record) = txn.take() else {
                exhausted = true;
                break;
            };

            let host = record.header(&options.host_key).unwrap_or("unknown");
            let base = record.header(&options.base_name_key).unwrap_or("unnamed");
            let dest = options.directory.join(host).join(base);
            let key = dest.to_string_lossy().into_owned();

            let bucket = match cache.get(&key) {
                Some(bucket) => bucket,
                None => {
                    let writer = BucketWriter::open(&dest, options.serializer)?;
                    let bucket = cache.insert(key.clone(), writer);
                    if options.roll_interval > Duration::ZERO {
                        cache.schedule_roll(key.clone(), options.roll_interval);
                    }
                    bucket
                }
            };
            if !touched.iter().any(|(k, _)| k == &key) {
                touched.push((key.clone(), bucket.clone()));
            }

            if record.has_header(&options.file_done_key) {
                // File-send-complete signal: finalize this bucket and commit
                // right away so the signal never straddles a transaction.
                let success = record
                    .header(&options.file_done_key)
                    .map(|v| v == "true")
                    .unwrap_or(false);
                info!("file send complete, host: {host}, file: {base}, clean: {success}");

                for (_, bucket) in &touched {
                    bucket.lock().flush()?;
                }
                {
                    let mut writer = bucket.lock();
                    writer.close()?;
                    writer.rename_bucket(success);
                }
                cache.remove(&key);
                return Ok(Status::Ready);
            }

            bucket.lock().append(&record)?;
        }

        for (_, bucket) in &touched {
            bucket.lock().flush()?;
        }

        Ok(if exhausted { Status::Backoff } else { Status::Ready })
    }

    /// Shutdown: flush and close (do not finalize) all open buckets, leaving
    /// temp files for the next startup's redo-suffix walk.
    pub fn shutdown(&mut self) {
        self.cache.close_all();
    }
}
