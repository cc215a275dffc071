use kv_engine::{Db, Error};
use tempfile::tempdir;

fn init() {
    let _ = env_logger::try_init();
}

#[test]
fn basic_put_get() {
    init();
    let dir = tempdir().unwrap();
    let db = Db::open(dir.path(), 300).unwrap();

    db.put("key1", "value1").unwrap();
    db.put("key2", "value2").unwrap();
    db.put("key3", "value3").unwrap();

    assert_eq!(db.get("key1").unwrap(), "value1");
    assert_eq!(db.get("key2").unwrap(), "value2");
    assert_eq!(db.get("key3").unwrap(), "value3");

    let segment_path = dir.path().join("current-data0");
    let expected_size: u64 = ["key1value1", "key2value2", "key3value3"]
        .iter()
        .map(|_| 22u64)
        .sum();
    assert_eq!(
        std::fs::metadata(&segment_path).unwrap().len(),
        expected_size
    );
}

#[test]
fn size_doubles_on_rewrite() {
    init();
    let dir = tempdir().unwrap();
    let db = Db::open(dir.path(), 300).unwrap();

    let pairs = [("key1", "value1"), ("key2", "value2"), ("key3", "value3")];
    for (k, v) in pairs {
        db.put(k, v).unwrap();
    }
    let segment_path = dir.path().join("current-data0");
    let first_round_size = std::fs::metadata(&segment_path).unwrap().len();

    for (k, v) in pairs {
        db.put(k, v).unwrap();
    }
    let second_round_size = std::fs::metadata(&segment_path).unwrap().len();

    assert_eq!(second_round_size, first_round_size * 2);
}

#[test]
fn segmentation_splits_at_the_byte_threshold() {
    init();
    let dir = tempdir().unwrap();
    let db = Db::open(dir.path(), 45).unwrap();

    db.put("key1", "value1").unwrap();
    db.put("key2", "value2").unwrap();
    assert_eq!(db.segment_count(), 1);

    db.put("key3", "value3").unwrap();
    assert_eq!(db.segment_count(), 2);
}

#[test]
fn merge_collapses_segments_once_three_accumulate() {
    init();
    let dir = tempdir().unwrap();
    let db = Db::open(dir.path(), 45).unwrap();

    db.put("key1", "value1").unwrap();
    db.put("key2", "value2").unwrap();
    db.put("key3", "value3").unwrap();
    db.put("key4", "value4").unwrap();
    db.put("key5", "value5").unwrap();

    db.wait_for_merge();
    assert_eq!(db.segment_count(), 2);

    // Ordinals are a unique-filename counter, not a position index: the merged segment is
    // allocated its ordinal only once the merge actually runs, after the active segment (seg2,
    // ordinal 2) already exists, so the merged file ends up named current-data3 even though it
    // logically precedes current-data2 in the segment list.
    let merged_path = dir.path().join("current-data3");
    let active_path = dir.path().join("current-data2");
    assert_eq!(std::fs::metadata(&merged_path).unwrap().len(), 88);
    assert_eq!(std::fs::metadata(&active_path).unwrap().len(), 22);
}

#[test]
fn last_write_wins_across_a_merge() {
    init();
    let dir = tempdir().unwrap();
    let db = Db::open(dir.path(), 45).unwrap();

    for (k, v) in [
        ("key1", "value1"),
        ("key2", "value2"),
        ("key3", "value3"),
        ("key4", "value4"),
        ("key5", "value5"),
    ] {
        db.put(k, v).unwrap();
    }
    db.wait_for_merge();

    db.put("key2", "value0").unwrap();
    assert_eq!(db.get("key2").unwrap(), "value0");
}

#[test]
fn delete_then_reopen_stays_not_found() {
    init();
    let dir = tempdir().unwrap();
    {
        let db = Db::open(dir.path(), 300).unwrap();
        db.put("key1", "value1").unwrap();
        db.put("key2", "value2").unwrap();
        db.put("key3", "value3").unwrap();
        db.delete("key1").unwrap();
        db.delete("key2").unwrap();
        db.delete("key3").unwrap();
        for key in ["key1", "key2", "key3"] {
            assert!(matches!(db.get(key), Err(Error::NotFound)));
        }
        db.close().unwrap();
    }

    let db = Db::open(dir.path(), 300).unwrap();
    for key in ["key1", "key2", "key3"] {
        assert!(matches!(db.get(key), Err(Error::NotFound)));
    }
}

#[test]
fn reopen_recovers_keys_from_every_segment_not_just_the_latest() {
    init();
    let dir = tempdir().unwrap();
    {
        let db = Db::open(dir.path(), 45).unwrap();
        db.put("key1", "value1").unwrap();
        db.put("key2", "value2").unwrap();
        // Still only two segments: this must stay below the merge trigger so the only way to
        // recover key1 after reopening is by replaying every segment file, not only the newest.
        assert_eq!(db.segment_count(), 2);
        db.close().unwrap();
    }

    let db = Db::open(dir.path(), 45).unwrap();
    assert_eq!(db.get("key1").unwrap(), "value1");
    assert_eq!(db.get("key2").unwrap(), "value2");
}

#[test]
fn put_exactly_at_capacity_is_not_a_rollover() {
    init();
    let dir = tempdir().unwrap();
    let db = Db::open(dir.path(), 44).unwrap();

    db.put("key1", "value1").unwrap();
    db.put("key2", "value2").unwrap();
    assert_eq!(db.segment_count(), 1);
}

#[test]
fn empty_value_is_permitted() {
    init();
    let dir = tempdir().unwrap();
    let db = Db::open(dir.path(), 300).unwrap();

    db.put("key1", "").unwrap();
    assert_eq!(db.get("key1").unwrap(), "");
}
