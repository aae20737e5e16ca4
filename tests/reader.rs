#[path = "common/mod.rs"]
mod common;

use common::*;
use spoolrelay::{
    CompletionJournal, DeletePolicy, RecordDeserializer, SpoolFormat, DEFAULT_FILE_DONE_KEY,
};
use std::fs;

/// Full happy path: batches come out annotated and in order, retirement
/// journals the file and emits the synthetic done record.
#[test]
fn reads_commits_and_retires_cleanly() {
    let (_guard, spool) = spool_dir();
    write_lines(&spool.join("app.log"), &["l1", "l2", "l3", "l4", "l5"]);

    let mut reader = make_reader(reader_options(&spool));

    let batch = reader.read_batch(2).unwrap();
    assert_eq!(bodies(&batch), vec!["l1", "l2"]);
    assert_eq!(batch[0].header("basename"), Some("app.log"));
    assert!(batch[0].header("file").unwrap().ends_with("app.log"));
    reader.commit().unwrap();

    let batch = reader.read_batch(2).unwrap();
    assert_eq!(bodies(&batch), vec!["l3", "l4"]);
    reader.commit().unwrap();

    let batch = reader.read_batch(2).unwrap();
    assert_eq!(bodies(&batch), vec!["l5"]);
    reader.commit().unwrap();

    // End of file: the single synthetic record, empty body, three headers.
    let batch = reader.read_batch(2).unwrap();
    assert_eq!(batch.len(), 1);
    let done = &batch[0];
    assert!(done.body().is_empty());
    assert_eq!(done.header(DEFAULT_FILE_DONE_KEY), Some("true"));
    assert_eq!(done.header("basename"), Some("app.log"));
    assert!(done.header("file").unwrap().ends_with("app.log"));

    assert!(reader.journal().contains("app.log"));
    assert!(spool.join("app.log").exists()); // delete policy: never

    // Nothing left to consume.
    assert!(reader.read_batch(2).unwrap().is_empty());
}

/// A new read while a batch is uncommitted resets to the last mark and
/// re-delivers the same records.
#[test]
fn uncommitted_read_redelivers_same_batch() {
    let (_guard, spool) = spool_dir();
    write_lines(&spool.join("app.log"), &["l1", "l2", "l3"]);

    let mut reader = make_reader(reader_options(&spool));

    let first = reader.read_batch(2).unwrap();
    assert_eq!(bodies(&first), vec!["l1", "l2"]);

    // No commit: the same two lines come back.
    let again = reader.read_batch(2).unwrap();
    assert_eq!(bodies(&again), vec!["l1", "l2"]);

    reader.commit().unwrap();
    let rest = reader.read_batch(2).unwrap();
    assert_eq!(bodies(&rest), vec!["l3"]);
}

/// Crash after a commit: a fresh reader resumes from the committed offset,
/// never re-delivering committed records and never skipping uncommitted ones.
#[test]
fn restart_resumes_from_last_committed_offset() {
    let (_guard, spool) = spool_dir();
    write_lines(&spool.join("app.log"), &["l1", "l2", "l3", "l4"]);
    let options = reader_options(&spool);

    {
        let mut reader = make_reader(options.clone());
        let batch = reader.read_batch(2).unwrap();
        assert_eq!(bodies(&batch), vec!["l1", "l2"]);
        reader.commit().unwrap();

        // Delivered but never committed; must be redelivered after restart.
        let batch = reader.read_batch(1).unwrap();
        assert_eq!(bodies(&batch), vec!["l3"]);
        // Simulated crash: reader dropped without commit or close.
    }

    let mut reader = make_reader(options);
    let batch = reader.read_batch(10).unwrap();
    assert_eq!(bodies(&batch), vec!["l3", "l4"]);
}

/// A file already in the completion journal is never re-opened, even though
/// it still sits in the spool directory.
#[test]
fn restart_skips_journaled_files() {
    let (_guard, spool) = spool_dir();
    write_lines(&spool.join("app.log"), &["l1"]);
    let options = reader_options(&spool);

    {
        let mut reader = make_reader(options.clone());
        reader.read_batch(10).unwrap();
        reader.commit().unwrap();
        let done = reader.read_batch(10).unwrap();
        assert_eq!(done[0].header(DEFAULT_FILE_DONE_KEY), Some("true"));
    }

    assert!(spool.join("app.log").exists());
    let mut reader = make_reader(options);
    assert!(reader.read_batch(10).unwrap().is_empty());
}

/// A stale position record naming a different file is discarded, not applied.
#[test]
fn stale_tracker_record_is_discarded() {
    let (_guard, spool) = spool_dir();
    write_lines(&spool.join("first.log"), &["f1", "f2"]);
    let options = reader_options(&spool);

    {
        let mut reader = make_reader(options.clone());
        let batch = reader.read_batch(1).unwrap();
        assert_eq!(bodies(&batch), vec!["f1"]);
        reader.commit().unwrap();
        // Crash mid-file; the tracker still points at first.log, offset 3.
    }

    fs::remove_file(spool.join("first.log")).unwrap();
    write_lines(&spool.join("second.log"), &["s1", "s2"]);

    let mut reader = make_reader(options);
    let batch = reader.read_batch(1).unwrap();
    assert_eq!(bodies(&batch), vec!["s1"]); // from offset 0, not 3
}

/// A file mutated between open and full read must be flagged, must stay out
/// of the journal, and must survive an immediate delete policy.
#[test]
fn changed_file_is_flagged_and_preserved() {
    let (_guard, spool) = spool_dir();
    let path = spool.join("app.log");
    write_lines(&path, &["l1", "l2"]);

    let options = reader_options(&spool).with_delete_policy(DeletePolicy::Immediate);
    let mut reader = make_reader(options);

    let batch = reader.read_batch(2).unwrap();
    assert_eq!(bodies(&batch), vec!["l1", "l2"]);
    reader.commit().unwrap();

    // Concurrent mutation while the file is open.
    append_lines(&path, &["l3"]);

    let batch = reader.read_batch(2).unwrap();
    assert_eq!(bodies(&batch), vec!["l3"]);
    reader.commit().unwrap();

    let done = reader.read_batch(2).unwrap();
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].header(DEFAULT_FILE_DONE_KEY), Some("false"));

    assert!(!reader.journal().contains("app.log"));
    assert!(path.exists(), "a changed file must not be deleted");
}

/// Immediate delete removes a cleanly consumed file from the spool.
#[test]
fn delete_policy_immediate_removes_clean_files() {
    let (_guard, spool) = spool_dir();
    write_lines(&spool.join("app.log"), &["l1"]);

    let options = reader_options(&spool).with_delete_policy(DeletePolicy::Immediate);
    let mut reader = make_reader(options);

    reader.read_batch(10).unwrap();
    reader.commit().unwrap();
    let done = reader.read_batch(10).unwrap();
    assert_eq!(done[0].header(DEFAULT_FILE_DONE_KEY), Some("true"));

    assert!(!spool.join("app.log").exists());
    assert!(reader.journal().contains("app.log"));
}

/// An empty spooled file retires immediately on its first read.
#[test]
fn empty_file_retires_on_first_read() {
    let (_guard, spool) = spool_dir();
    write_lines(&spool.join("empty.log"), &[]);

    let mut reader = make_reader(reader_options(&spool));
    let batch = reader.read_batch(10).unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].header(DEFAULT_FILE_DONE_KEY), Some("true"));
    assert!(reader.journal().contains("empty.log"));
}

/// Closing mid-file aborts without retiring; nothing is journaled and the
/// next reader resumes from the last commit.
#[test]
fn close_mid_file_does_not_retire() {
    let (_guard, spool) = spool_dir();
    write_lines(&spool.join("app.log"), &["l1", "l2"]);
    let options = reader_options(&spool);

    {
        let mut reader = make_reader(options.clone());
        let batch = reader.read_batch(1).unwrap();
        assert_eq!(bodies(&batch), vec!["l1"]);
        reader.commit().unwrap();
        reader.close().unwrap();
    }

    let mut reader = make_reader(options);
    assert!(!reader.journal().contains("app.log"));
    let batch = reader.read_batch(10).unwrap();
    assert_eq!(bodies(&batch), vec!["l2"]);
}

/// The journal survives reload and keeps its tab-separated line format.
#[test]
fn journal_reloads_recorded_names() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".done-files.meta");

    let mut journal = CompletionJournal::load(&path).unwrap();
    assert!(!journal.contains("a.log"));
    journal.record("a.log").unwrap();
    journal.record("b.log").unwrap();

    let contents = read_file(&path);
    for line in contents.lines() {
        let (stamp, name) = line.split_once('\t').unwrap();
        assert!(!stamp.is_empty());
        assert!(name.ends_with(".log"));
    }

    let reloaded = CompletionJournal::load(&path).unwrap();
    assert!(reloaded.contains("a.log"));
    assert!(reloaded.contains("b.log"));
    assert!(!reloaded.contains("c.log"));
}

/// Decode-error policy: replace substitutes U+FFFD, ignore drops the bad
/// bytes, fail surfaces an error.
#[test]
fn decode_error_policies() {
    use spoolrelay::DecodeErrorPolicy;
    use std::io::Write;

    let (_guard, spool) = spool_dir();
    let path = spool.join("app.log");
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(b"ok\xff\n").unwrap();

    let open = |policy: DecodeErrorPolicy| {
        let options = reader_options(&spool).with_decode_error_policy(policy);
        let format = line_format(&options);
        format.open(&path, &spool.join(".meta"))
    };

    let mut des = open(DecodeErrorPolicy::Replace).unwrap();
    assert_eq!(bodies(&des.read_batch(1).unwrap()), vec!["ok\u{FFFD}"]);

    let mut des = open(DecodeErrorPolicy::Ignore).unwrap();
    assert_eq!(bodies(&des.read_batch(1).unwrap()), vec!["ok"]);

    let mut des = open(DecodeErrorPolicy::Fail).unwrap();
    assert!(des.read_batch(1).is_err());
}

/// Latin-1 input decodes byte for byte.
#[test]
fn latin1_input_is_decoded() {
    use spoolrelay::InputCharset;
    use std::io::Write;

    let (_guard, spool) = spool_dir();
    let path = spool.join("app.log");
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(b"caf\xe9\n").unwrap(); // "café" in Latin-1

    let options = reader_options(&spool).with_input_charset(InputCharset::Latin1);
    let format = line_format(&options);
    let mut des = format.open(&path, &spool.join(".meta")).unwrap();
    assert_eq!(bodies(&des.read_batch(1).unwrap()), vec!["café"]);
}

/// Over-long lines are truncated to the configured maximum.
#[test]
fn long_lines_are_truncated() {
    let (_guard, spool) = spool_dir();
    let long = "x".repeat(100);
    write_lines(&spool.join("app.log"), &[&long, "short"]);

    let options = reader_options(&spool).with_max_line_bytes(10);
    let format = line_format(&options);
    let meta = spool.join(".meta");
    let mut des = format.open(&spool.join("app.log"), &meta).unwrap();

    let batch = des.read_batch(10).unwrap();
    assert_eq!(bodies(&batch), vec!["xxxxxxxxxx", "short"]);
}
