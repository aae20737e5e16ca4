use crate::config::RateLimitOptions;
use crate::record::Record;
use std::thread::sleep;
use std::time::{Duration, Instant};

/// Average-throughput throttle over a record stream. Bursty but bounded:
/// anything up to the byte threshold passes untouched within one window, then
/// the caller is put to sleep long enough to hold the long-run rate at
/// threshold/window. Data is never dropped.
pub struct RateLimiter {
    threshold: u64,       // bytes admitted per window
    header_overhead: u64, // fixed framing cost added per record
    window: Duration,
    last_tick: Instant,
    sent: u64, // bytes accumulated since the checkpoint
}

impl RateLimiter {
    pub fn new(options: &RateLimitOptions) -> Self {
        Self {
            threshold: options.limit_rate_kb.max(1) * 1024,
            header_overhead: options.header_overhead,
            window: options.window,
            last_tick: Instant::now(),
            sent: 0,
        }
    }

    /// Account for `record`, sleeping first if the accumulated bytes have
    /// overrun the threshold. The record itself passes through unchanged.
    pub fn admit(&mut self, record: &Record) {
        if self.sent > self.threshold {
            let now = Instant::now();
            // How many full thresholds the accumulator has crossed; the ideal
            // schedule owes one window per crossing.
            let multiple = self.sent / self.threshold;
            let elapsed = now.duration_since(self.last_tick);
            let target = self.window.saturating_mul(multiple.min(u32::MAX as u64) as u32);

            let owed = target.checked_sub(elapsed).unwrap_or(Duration::ZERO);
            if owed > Duration::ZERO {
                tracing::debug!(
                    "throttling sender: {} bytes since checkpoint, sleeping {:?}",
                    self.sent,
                    owed
                );
                sleep(owed);
            }

            self.sent = 0;
            // Advance the checkpoint to the ideal schedule, not to the
            // wall clock after sleeping, so measured sleep latency does not
            // accumulate as drift.
            self.last_tick = now + owed;
        }

        self.sent += self.header_overhead + record.body_len() as u64;
    }
}
