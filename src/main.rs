use anyhow::Result;
use spoolrelay::{
    init_tracing_once, LineFormat, MemoryChannel, RateLimitOptions, RateLimiter, ReaderOptions,
    SinkOptions, SpoolFileReader, SpoolFileSink, SpoolSourceRunner, Status, DEFAULT_HOST_KEY,
};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const CHANNEL_CAPACITY: usize = 10_000;

/// One-shot relay: drain every file currently in the spool directory into
/// per-host output files, then exit.
fn main() -> Result<()> {
    init_tracing_once();

    let mut args = std::env::args().skip(1);
    let spool_dir = PathBuf::from(args.next().unwrap_or_else(|| "./spool".to_string()));
    let out_dir = PathBuf::from(args.next().unwrap_or_else(|| "./out".to_string()));
    fs::create_dir_all(&spool_dir)?;
    fs::create_dir_all(&out_dir)?;

    let reader_options = ReaderOptions::default().with_spool_directory(&spool_dir);
    let format = LineFormat {
        charset: reader_options.input_charset,
        decode_error_policy: reader_options.decode_error_policy,
        max_line_bytes: reader_options.max_line_bytes,
    };
    let batch_size = reader_options.batch_size;
    let max_backoff = reader_options.max_backoff;
    let reader = SpoolFileReader::new(reader_options, Box::new(format))?;

    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    let channel = MemoryChannel::new(CHANNEL_CAPACITY);
    let mut source = SpoolSourceRunner::new(reader, channel.clone(), batch_size, max_backoff)
        .with_limiter(RateLimiter::new(&RateLimitOptions::default()))
        .with_static_header(DEFAULT_HOST_KEY, host);

    let producer_done = Arc::new(AtomicBool::new(false));
    let sink_done = producer_done.clone();
    let sink_channel = channel.clone();
    let sink_out = out_dir.clone();
    let sink_handle = std::thread::spawn(move || {
        let mut sink =
            SpoolFileSink::new(sink_channel.clone(), SinkOptions::default().with_directory(&sink_out));
        loop {
            match sink.process() {
                Status::Ready => {}
                Status::Backoff => {
                    if sink_done.load(Ordering::Acquire) && sink_channel.is_empty() {
                        break;
                    }
                    std::thread::sleep(Duration::from_millis(200));
                }
            }
        }
        sink.shutdown();
    });

    let delivered = source.drain()?;
    producer_done.store(true, Ordering::Release);
    println!("delivered {delivered} records from {}", spool_dir.display());

    source.close()?;
    if sink_handle.join().is_err() {
        anyhow::bail!("sink thread panicked");
    }

    Ok(())
}
