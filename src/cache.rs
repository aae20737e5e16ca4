use crate::bucket::BucketWriter;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Access-ordered, capacity-bounded map from destination key to bucket.
/// Inserting past capacity synchronously evicts the least-recently-used
/// bucket, closing its stream first, so open file descriptors stay bounded no
/// matter how many distinct destinations show up.
///
/// Bucket lifecycle transitions go cache lock first, bucket lock second, on
/// every path (append, evict, roll, shutdown), so a roll-triggered close can
/// never race a mid-flight append to the same bucket.
#[derive(Clone)]
pub struct HandleCache {
    inner: Arc<Mutex<LruCache<String, Arc<Mutex<BucketWriter>>, ahash::RandomState>>>,
}

impl HandleCache {
    pub fn new(max_open_files: usize) -> Self {
        let cap = NonZeroUsize::new(max_open_files).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(Mutex::new(LruCache::with_hasher(cap, ahash::RandomState::new()))),
        }
    }

    /// Look up a bucket, marking it most-recently-used.
    pub fn get(&self, key: &str) -> Option<Arc<Mutex<BucketWriter>>> {
        self.inner.lock().get(key).cloned()
    }

    /// Insert a freshly opened bucket. If this pushes the cache over
    /// capacity, the least-recently-used bucket is closed (flushed to disk,
    /// left as a temp file, not renamed) and dropped before this returns.
    pub fn insert(&self, key: String, writer: BucketWriter) -> Arc<Mutex<BucketWriter>> {
        let bucket = Arc::new(Mutex::new(writer));
        let mut inner = self.inner.lock();
        // push returns the displaced entry: either the LRU bucket evicted for
        // capacity, or a previous bucket under the same key. Close it either
        // way; its stream must not stay open unreachable.
        if let Some((evicted_key, evicted)) = inner.push(key, bucket.clone()) {
            if let Err(e) = evicted.lock().close() {
                warn!("closing evicted bucket {evicted_key}: {e:#}");
            }
        }
        bucket
    }

    /// Detach a bucket from the cache without closing it.
    pub fn remove(&self, key: &str) -> Option<Arc<Mutex<BucketWriter>>> {
        self.inner.lock().pop(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Arrange an asynchronous close of `key` once `after` elapses,
    /// regardless of completion signals. The bucket is removed from the cache
    /// before it is closed so no further writes can target a closing handle.
    pub fn schedule_roll(&self, key: String, after: Duration) {
        info!("scheduling roll of {key} after {after:?}");
        let cache = self.clone();
        std::thread::spawn(move || {
            std::thread::sleep(after);
            if let Some(bucket) = cache.remove(&key) {
                info!("rolling bucket {key}: roll interval elapsed");
                if let Err(e) = bucket.lock().close() {
                    warn!("closing rolled bucket {key}: {e:#}");
                }
            }
        });
    }

    /// Shutdown: flush and close every bucket, leaving temp files for the
    /// next startup's redo-suffix walk to step around.
    pub fn close_all(&self) {
        let mut inner = self.inner.lock();
        while let Some((key, bucket)) = inner.pop_lru() {
            if let Err(e) = bucket.lock().close() {
                warn!("closing bucket {key} at shutdown: {e:#}");
            }
        }
    }
}
