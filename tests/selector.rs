#[path = "common/mod.rs"]
mod common;

use common::*;
use spoolrelay::{ConsumeOrder, FileSelector};
use std::collections::HashSet;
use std::fs;

fn no_done() -> HashSet<String, ahash::RandomState> {
    HashSet::with_hasher(ahash::RandomState::new())
}

/// OLDEST yields ascending mtime regardless of the order files were created;
/// YOUNGEST yields descending mtime.
#[test]
fn oldest_and_youngest_follow_mtime() {
    let (_guard, spool) = spool_dir();
    // Created out of order on purpose.
    write_lines(&spool.join("mid.log"), &["m"]);
    write_lines(&spool.join("new.log"), &["n"]);
    write_lines(&spool.join("old.log"), &["o"]);
    set_mtime_epoch_secs(&spool.join("old.log"), 1_000);
    set_mtime_epoch_secs(&spool.join("mid.log"), 2_000);
    set_mtime_epoch_secs(&spool.join("new.log"), 3_000);

    let mut done = no_done();
    let mut oldest = FileSelector::new(&spool, "^.*$", "^$", ConsumeOrder::Oldest).unwrap();
    for expected in ["old.log", "mid.log", "new.log"] {
        let picked = oldest.select_next(&done).unwrap();
        assert_eq!(picked.base_name(), expected);
        done.insert(picked.base_name());
    }
    assert!(oldest.select_next(&done).is_none());

    let mut done = no_done();
    let mut youngest = FileSelector::new(&spool, "^.*$", "^$", ConsumeOrder::Youngest).unwrap();
    for expected in ["new.log", "mid.log", "old.log"] {
        let picked = youngest.select_next(&done).unwrap();
        assert_eq!(picked.base_name(), expected);
        done.insert(picked.base_name());
    }
}

/// Equal mtimes break ties by the lexicographically smaller name, in both
/// directions.
#[test]
fn equal_mtimes_break_ties_by_name() {
    let (_guard, spool) = spool_dir();
    for name in ["b.log", "c.log", "a.log"] {
        write_lines(&spool.join(name), &["x"]);
        set_mtime_epoch_secs(&spool.join(name), 5_000);
    }

    let done = no_done();
    let mut oldest = FileSelector::new(&spool, "^.*$", "^$", ConsumeOrder::Oldest).unwrap();
    assert_eq!(oldest.select_next(&done).unwrap().base_name(), "a.log");

    let mut youngest = FileSelector::new(&spool, "^.*$", "^$", ConsumeOrder::Youngest).unwrap();
    assert_eq!(youngest.select_next(&done).unwrap().base_name(), "a.log");
}

/// Directories, hidden files, journaled names, ignore matches, and
/// non-matching names are all filtered out.
#[test]
fn filters_exclude_non_candidates() {
    let (_guard, spool) = spool_dir();
    write_lines(&spool.join("keep.log"), &["k"]);
    write_lines(&spool.join(".hidden.log"), &["h"]);
    write_lines(&spool.join("done.log"), &["d"]);
    write_lines(&spool.join("skip.tmp"), &["s"]);
    write_lines(&spool.join("notes.txt"), &["t"]);
    fs::create_dir_all(spool.join("subdir.log")).unwrap();

    let mut done = no_done();
    done.insert("done.log".to_string());

    let mut selector =
        FileSelector::new(&spool, r"^.*\.(log|txt)$", r"^notes.*$", ConsumeOrder::Oldest).unwrap();
    let picked = selector.select_next(&done).unwrap();
    assert_eq!(picked.base_name(), "keep.log");

    done.insert("keep.log".to_string());
    assert!(selector.select_next(&done).is_none());
}

/// The candidate snapshot carries the size needed for integrity verification.
#[test]
fn candidate_snapshot_records_size() {
    let (_guard, spool) = spool_dir();
    write_lines(&spool.join("a.log"), &["hello"]);

    let mut selector = FileSelector::new(&spool, "^.*$", "^$", ConsumeOrder::Oldest).unwrap();
    let picked = selector.select_next(&no_done()).unwrap();
    assert_eq!(picked.size, 6); // "hello\n"
}

/// RANDOM materializes the listing once and walks it in encounter order:
/// files added mid-iteration are not seen until the cache is exhausted.
#[test]
fn random_order_caches_listing_until_exhausted() {
    let (_guard, spool) = spool_dir();
    write_lines(&spool.join("a.log"), &["a"]);
    write_lines(&spool.join("b.log"), &["b"]);

    let mut done = no_done();
    let mut selector = FileSelector::new(&spool, "^.*$", "^$", ConsumeOrder::Random).unwrap();

    let first = selector.select_next(&done).unwrap().base_name();
    done.insert(first.clone());

    // Arrives after the listing was cached; must stay invisible for now.
    write_lines(&spool.join("c.log"), &["c"]);

    let second = selector.select_next(&done).unwrap().base_name();
    assert_ne!(second, "c.log");
    assert_ne!(second, first);
    done.insert(second.clone());

    // Cache exhausted: the rescan finally surfaces the latecomer.
    let third = selector.select_next(&done).unwrap().base_name();
    assert_eq!(third, "c.log");
}
