//! The transactional record channel between the spool reader and the sink.
//! The core state machines only see these traits; the bounded in-memory
//! implementation below is what the demo binary and the tests run on.

use crate::record::Record;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// Delivery failures the producer must react to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelError {
    /// The channel is at capacity; retry after backoff.
    Full,
    /// The channel was shut down; no further delivery is possible.
    Closed,
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelError::Full => write!(f, "channel is full"),
            ChannelError::Closed => write!(f, "channel is closed"),
        }
    }
}

impl std::error::Error for ChannelError {}

/// Producer/consumer handle over a durable, transactional record buffer.
pub trait RecordChannel {
    /// Deliver a whole batch atomically, or fail without enqueueing anything.
    fn put_batch(&self, records: &[Record]) -> Result<(), ChannelError>;

    /// Open a consume transaction. Records taken from it are redelivered if
    /// the transaction rolls back (or is dropped without a commit).
    fn transaction(&self) -> Box<dyn ChannelTransaction + '_>;
}

/// One consume transaction: take up to N records, then commit or roll back.
pub trait ChannelTransaction {
    fn take(&mut self) -> Option<Record>;
    fn commit(&mut self);
    fn rollback(&mut self);
}

struct MemoryChannelInner {
    queue: VecDeque<Record>,
    closed: bool,
}

/// Bounded in-memory channel with rollback-requeues-taken semantics.
#[derive(Clone)]
pub struct MemoryChannel {
    inner: Arc<Mutex<MemoryChannelInner>>,
    capacity: usize,
}

impl MemoryChannel {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryChannelInner {
                queue: VecDeque::new(),
                closed: false,
            })),
            capacity: capacity.max(1),
        }
    }

    pub fn close(&self) {
        self.inner.lock().closed = true;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().queue.is_empty()
    }
}

impl RecordChannel for MemoryChannel {
    fn put_batch(&self, records: &[Record]) -> Result<(), ChannelError> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(ChannelError::Closed);
        }
        if inner.queue.len() + records.len() > self.capacity {
            return Err(ChannelError::Full);
        }
        inner.queue.extend(records.iter().cloned());
        Ok(())
    }

    fn transaction(&self) -> Box<dyn ChannelTransaction + '_> {
        Box::new(MemoryTransaction { channel: self, taken: Vec::new(), settled: false })
    }
}

struct MemoryTransaction<'a> {
    channel: &'a MemoryChannel,
    taken: Vec<Record>,
    settled: bool,
}

impl ChannelTransaction for MemoryTransaction<'_> {
    fn take(&mut self) -> Option<Record> {
        let record = self.channel.inner.lock().queue.pop_front()?;
        self.taken.push(record.clone());
        Some(record)
    }

    fn commit(&mut self) {
        self.taken.clear();
        self.settled = true;
    }

    fn rollback(&mut self) {
        let mut inner = self.channel.inner.lock();
        // Requeue at the front, preserving the original take order.
        for record in self.taken.drain(..).rev() {
            inner.queue.push_front(record);
        }
        self.settled = true;
    }
}

impl Drop for MemoryTransaction<'_> {
    fn drop(&mut self) {
        // An abandoned transaction must redeliver, never lose.
        if !self.settled {
            self.rollback();
        }
    }
}
