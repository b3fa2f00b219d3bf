//! Tests for StorageEngine
//!
//! These tests verify:
//! - Basic get/put/delete operations
//! - Flush threshold and reads through the SSTable path
//! - Tombstones across flushes, compaction and restarts
//! - WAL rotation and crash recovery
//! - Range reads merging MemTable and SSTables
//! - Background compaction lifecycle
//! - Configuration validation
//! - Concurrent access patterns

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use stratakv::storage::SSTableManager;
use stratakv::wal::{WalEntry, WalRecovery};
use stratakv::{Config, StorageEngine, StrataError, WalSyncStrategy};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn open_engine(dir: &Path, flush_threshold: usize) -> StorageEngine {
    let config = Config::builder()
        .data_dir(dir)
        .flush_threshold(flush_threshold)
        .build();
    StorageEngine::open(config).unwrap()
}

fn setup_temp_engine() -> (TempDir, StorageEngine) {
    let temp_dir = TempDir::new().unwrap();
    let engine = open_engine(temp_dir.path(), 1000);
    (temp_dir, engine)
}

fn get_str(engine: &StorageEngine, key: &str) -> Option<String> {
    engine
        .get(key.as_bytes())
        .unwrap()
        .map(|v| String::from_utf8(v).unwrap())
}

fn range_str(engine: &StorageEngine, lo: &str, hi: &str) -> Vec<(String, String)> {
    engine
        .read_key_range(lo.as_bytes(), hi.as_bytes())
        .unwrap()
        .into_iter()
        .map(|(k, v)| (String::from_utf8(k).unwrap(), String::from_utf8(v).unwrap()))
        .collect()
}

fn pairs(entries: &[(&str, &str)]) -> Vec<(String, String)> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_engine_open_creates_directory() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("mydb");

    let engine = StorageEngine::open_path(&data_dir).unwrap();

    assert!(data_dir.is_dir());
    assert!(engine.wal_path().starts_with(&data_dir));
    assert!(engine.wal_path().exists());
    assert_eq!(engine.sstable_count(), 0);
    assert_eq!(engine.config().flush_threshold, 1000);
}

#[test]
fn test_put_get_delete_then_compact() {
    let (_temp, engine) = setup_temp_engine();

    engine.put(b"key1", b"value1").unwrap();
    engine.put(b"key2", b"value2").unwrap();
    engine.put(b"key3", b"value3").unwrap();

    assert_eq!(get_str(&engine, "key1"), Some("value1".to_string()));
    assert_eq!(get_str(&engine, "key2"), Some("value2".to_string()));
    assert_eq!(get_str(&engine, "key3"), Some("value3".to_string()));

    engine.delete(b"key2").unwrap();
    assert_eq!(get_str(&engine, "key2"), None);

    engine.compact_ss_tables().unwrap();

    assert_eq!(get_str(&engine, "key1"), Some("value1".to_string()));
    assert_eq!(get_str(&engine, "key2"), None);
    assert_eq!(get_str(&engine, "key3"), Some("value3".to_string()));
}

#[test]
fn test_get_missing_key() {
    let (_temp, engine) = setup_temp_engine();
    assert_eq!(engine.get(b"nope").unwrap(), None);
}

#[test]
fn test_overwrite_returns_latest() {
    let (_temp, engine) = setup_temp_engine();

    engine.put(b"k", b"v1").unwrap();
    engine.put(b"k", b"v2").unwrap();

    assert_eq!(get_str(&engine, "k"), Some("v2".to_string()));
}

#[test]
fn test_put_after_delete() {
    let (_temp, engine) = setup_temp_engine();

    engine.put(b"k", b"v1").unwrap();
    engine.delete(b"k").unwrap();
    engine.put(b"k", b"v2").unwrap();

    assert_eq!(get_str(&engine, "k"), Some("v2".to_string()));
}

#[test]
fn test_arbitrary_bytes() {
    let (temp, engine) = setup_temp_engine();
    let key: &[u8] = b"k,with\nbreaks\\";
    let val: &[u8] = b"__TOMBSTONE__";

    engine.put(key, val).unwrap();
    engine.flush().unwrap();
    assert_eq!(engine.get(key).unwrap(), Some(val.to_vec()));

    engine.close().unwrap();
    let engine = open_engine(temp.path(), 1000);
    assert_eq!(engine.get(key).unwrap(), Some(val.to_vec()));
}

// =============================================================================
// Flush Tests
// =============================================================================

#[test]
fn test_flush_threshold() {
    let (_temp, engine) = setup_temp_engine();

    for i in 0..2000 {
        engine
            .put(format!("key{}", i).as_bytes(), format!("value{}", i).as_bytes())
            .unwrap();
        if i == 999 {
            assert_eq!(engine.sstable_count(), 1);
            assert_eq!(engine.memtable_len(), 0);
        }
    }

    let sstables = engine.sstables();
    assert_eq!(sstables.read(b"key500").unwrap(), Some(b"value500".to_vec()));
    assert_eq!(sstables.read(b"key1999").unwrap(), Some(b"value1999".to_vec()));

    assert_eq!(engine.memtable_len(), 0);
    assert_eq!(get_str(&engine, "key500"), Some("value500".to_string()));
}

#[test]
fn test_tombstone_survives_flush() {
    let temp_dir = TempDir::new().unwrap();

    {
        let engine = open_engine(temp_dir.path(), 1000);
        engine.put(b"a", b"1").unwrap();
        engine.put(b"b", b"2").unwrap();
        engine.put(b"c", b"3").unwrap();
        engine.delete(b"b").unwrap();

        for i in 0..1006 {
            engine.put(format!("extra{}", i).as_bytes(), b"x").unwrap();
        }
        assert!(engine.sstable_count() >= 1);
        engine.close().unwrap();
    }

    let manager = SSTableManager::open(temp_dir.path(), 0.01).unwrap();
    assert_eq!(manager.read(b"b").unwrap(), None);
    assert_eq!(manager.read(b"a").unwrap(), Some(b"1".to_vec()));
    assert_eq!(manager.read(b"c").unwrap(), Some(b"3".to_vec()));
}

#[test]
fn test_explicit_flush_empties_wal() {
    let (_temp, engine) = setup_temp_engine();

    engine.put(b"alpha", b"A").unwrap();
    engine.put(b"beta", b"B").unwrap();
    engine.delete(b"alpha").unwrap();

    assert!(engine.flush().unwrap());

    let (entries, _) = WalRecovery::recover(&engine.wal_path()).unwrap();
    assert!(entries.is_empty());

    engine.put(b"key2", b"value2").unwrap();

    let (entries, _) = WalRecovery::recover(&engine.wal_path()).unwrap();
    assert_eq!(entries, vec![WalEntry::put(b"key2", b"value2")]);
}

#[test]
fn test_flush_nothing_is_noop() {
    let (_temp, engine) = setup_temp_engine();

    assert!(!engine.flush().unwrap());
    assert_eq!(engine.sstable_count(), 0);
}

// =============================================================================
// Compaction Tests
// =============================================================================

#[test]
fn test_compaction_reinsert_beats_flushed_tombstone() {
    let (_temp, engine) = setup_temp_engine();

    engine.put(b"a", b"1").unwrap();
    engine.put(b"b", b"2").unwrap();
    engine.put(b"c", b"3").unwrap();
    engine.delete(b"b").unwrap();
    engine.flush().unwrap();

    engine.put(b"b", b"new2").unwrap();
    engine.compact_ss_tables().unwrap();

    assert_eq!(get_str(&engine, "b"), Some("new2".to_string()));
    assert_eq!(get_str(&engine, "a"), Some("1".to_string()));
}

#[test]
fn test_compaction_second_delete_stays_deleted() {
    let (_temp, engine) = setup_temp_engine();

    engine.put(b"a", b"1").unwrap();
    engine.put(b"b", b"2").unwrap();
    engine.put(b"c", b"3").unwrap();
    engine.delete(b"b").unwrap();
    engine.flush().unwrap();

    engine.put(b"b", b"new2").unwrap();
    engine.delete(b"b").unwrap();
    engine.compact_ss_tables().unwrap();

    assert_eq!(get_str(&engine, "b"), None);
    assert_eq!(get_str(&engine, "c"), Some("3".to_string()));
}

#[test]
fn test_compaction_preserves_observable_state() {
    let (_temp, engine) = {
        let temp_dir = TempDir::new().unwrap();
        let engine = open_engine(temp_dir.path(), 25);
        (temp_dir, engine)
    };

    for i in 0..200 {
        let key = format!("k{:03}", i % 60);
        match i % 7 {
            3 => engine.delete(key.as_bytes()).unwrap(),
            _ => engine.put(key.as_bytes(), format!("v{}", i).as_bytes()).unwrap(),
        }
    }
    assert!(engine.sstable_count() > 1);

    let keys: Vec<String> = (0..60).map(|i| format!("k{:03}", i)).collect();
    let before: Vec<Option<String>> = keys.iter().map(|k| get_str(&engine, k)).collect();
    let range_before = range_str(&engine, "k000", "k999");

    assert!(engine.compact_ss_tables().unwrap() <= 1);

    let after: Vec<Option<String>> = keys.iter().map(|k| get_str(&engine, k)).collect();
    assert_eq!(before, after);
    assert_eq!(range_str(&engine, "k000", "k999"), range_before);
    assert_eq!(engine.tombstone_count(), 0);
}

#[test]
fn test_compaction_without_sstables() {
    let (_temp, engine) = setup_temp_engine();
    engine.put(b"k", b"v").unwrap();

    assert_eq!(engine.compact_ss_tables().unwrap(), 0);
    assert_eq!(get_str(&engine, "k"), Some("v".to_string()));
}

// =============================================================================
// Range Tests
// =============================================================================

#[test]
fn test_read_key_range() {
    let (_temp, engine) = setup_temp_engine();

    engine.put(b"apple", b"red").unwrap();
    engine.put(b"banana", b"yellow").unwrap();
    engine.put(b"cherry", b"red").unwrap();
    engine.put(b"date", b"brown").unwrap();
    engine.put(b"elderberry", b"black").unwrap();

    assert_eq!(
        range_str(&engine, "banana", "date"),
        pairs(&[("banana", "yellow"), ("cherry", "red"), ("date", "brown")])
    );
}

#[test]
fn test_read_key_range_merges_layers() {
    let (_temp, engine) = setup_temp_engine();

    engine.put(b"a", b"old").unwrap();
    engine.put(b"b", b"2").unwrap();
    engine.put(b"c", b"3").unwrap();
    engine.flush().unwrap();

    engine.put(b"a", b"new").unwrap();
    engine.delete(b"c").unwrap();
    engine.put(b"d", b"4").unwrap();

    assert_eq!(
        range_str(&engine, "a", "z"),
        pairs(&[("a", "new"), ("b", "2"), ("d", "4")])
    );
}

#[test]
fn test_read_key_range_inverted_is_empty() {
    let (_temp, engine) = setup_temp_engine();
    engine.put(b"m", b"1").unwrap();

    assert!(engine.read_key_range(b"z", b"a").unwrap().is_empty());
}

#[test]
fn test_batch_put() {
    let (_temp, engine) = setup_temp_engine();

    let mut batch = BTreeMap::new();
    batch.insert(b"x".to_vec(), b"1".to_vec());
    batch.insert(b"y".to_vec(), b"2".to_vec());
    engine.batch_put(batch).unwrap();

    assert_eq!(range_str(&engine, "x", "y"), pairs(&[("x", "1"), ("y", "2")]));
}

// =============================================================================
// Recovery Tests
// =============================================================================

#[test]
fn test_reopen_recovers_unflushed_writes() {
    let temp_dir = TempDir::new().unwrap();

    {
        let engine = open_engine(temp_dir.path(), 1000);
        engine.put(b"a", b"1").unwrap();
        engine.put(b"b", b"2").unwrap();
        engine.delete(b"a").unwrap();
        engine.close().unwrap();
    }

    let engine = open_engine(temp_dir.path(), 1000);
    assert_eq!(get_str(&engine, "a"), None);
    assert_eq!(get_str(&engine, "b"), Some("2".to_string()));
    assert_eq!(engine.memtable_len(), 1);
}

#[test]
fn test_reopen_without_close() {
    let temp_dir = TempDir::new().unwrap();

    {
        let engine = open_engine(temp_dir.path(), 1000);
        engine.put(b"k", b"v").unwrap();
        // dropped without close(), as after a crash
    }

    let engine = open_engine(temp_dir.path(), 1000);
    assert_eq!(get_str(&engine, "k"), Some("v".to_string()));
}

#[test]
fn test_reopen_mixed_flushed_and_unflushed() {
    let temp_dir = TempDir::new().unwrap();
    let keys: Vec<String> = (0..150).map(|i| format!("key{:03}", i)).collect();

    let before: Vec<Option<String>> = {
        let engine = open_engine(temp_dir.path(), 40);
        for (i, key) in keys.iter().enumerate() {
            engine.put(key.as_bytes(), format!("v{}", i).as_bytes()).unwrap();
        }
        for key in keys.iter().step_by(3) {
            engine.delete(key.as_bytes()).unwrap();
        }
        let snapshot = keys.iter().map(|k| get_str(&engine, k)).collect();
        engine.close().unwrap();
        snapshot
    };

    let engine = open_engine(temp_dir.path(), 40);
    let after: Vec<Option<String>> = keys.iter().map(|k| get_str(&engine, k)).collect();
    assert_eq!(before, after);
}

#[test]
fn test_reopen_repairs_torn_wal_tail() {
    let temp_dir = TempDir::new().unwrap();

    let wal_path = {
        let engine = open_engine(temp_dir.path(), 1000);
        engine.put(b"a", b"1").unwrap();
        let path = engine.wal_path();
        engine.close().unwrap();
        path
    };

    let mut contents = std::fs::read(&wal_path).unwrap();
    contents.extend_from_slice(b"PUT,half");
    std::fs::write(&wal_path, contents).unwrap();

    let engine = open_engine(temp_dir.path(), 1000);
    engine.put(b"b", b"2").unwrap();
    engine.close().unwrap();

    let engine = open_engine(temp_dir.path(), 1000);
    assert_eq!(get_str(&engine, "a"), Some("1".to_string()));
    assert_eq!(get_str(&engine, "b"), Some("2".to_string()));
    assert_eq!(get_str(&engine, "half"), None);
}

// =============================================================================
// Background Compaction Tests
// =============================================================================

#[test]
fn test_background_compaction_merges_runs() {
    let (_temp, engine) = setup_temp_engine();

    for round in 0..3 {
        engine.put(format!("k{}", round).as_bytes(), b"v").unwrap();
        engine.flush().unwrap();
    }
    assert_eq!(engine.sstable_count(), 3);

    engine
        .start_background_compaction(Duration::from_millis(20))
        .unwrap();
    assert!(engine.is_background_compaction_running());

    assert!(wait_for(Duration::from_secs(5), || engine.sstable_count() == 1));

    engine.stop_background_compaction().unwrap();
    assert!(!engine.is_background_compaction_running());
    assert_eq!(get_str(&engine, "k2"), Some("v".to_string()));
}

#[test]
fn test_background_compaction_from_config() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .background_compaction_period_ms(20)
        .build();

    let engine = StorageEngine::open(config).unwrap();
    assert!(engine.is_background_compaction_running());
    assert_eq!(
        engine.background_compaction_period(),
        Some(Duration::from_millis(20))
    );

    engine.close().unwrap();
}

#[test]
fn test_background_compaction_restart_replaces_worker() {
    let (_temp, engine) = setup_temp_engine();

    engine
        .start_background_compaction(Duration::from_millis(50))
        .unwrap();
    engine
        .start_background_compaction(Duration::from_millis(10))
        .unwrap();
    assert!(engine.is_background_compaction_running());
    assert_eq!(
        engine.background_compaction_period(),
        Some(Duration::from_millis(10))
    );

    engine.stop_background_compaction().unwrap();
    assert_eq!(engine.background_compaction_period(), None);
    // stopping twice is harmless
    engine.stop_background_compaction().unwrap();
}

#[test]
fn test_background_compaction_rejects_zero_period() {
    let (_temp, engine) = setup_temp_engine();

    let result = engine.start_background_compaction(Duration::ZERO);

    assert!(matches!(result, Err(StrataError::Config(_))));
    assert!(!engine.is_background_compaction_running());
}

// =============================================================================
// Configuration Tests
// =============================================================================

#[test]
fn test_invalid_config_rejected() {
    let temp_dir = TempDir::new().unwrap();

    let bad_configs = vec![
        Config::builder().data_dir(temp_dir.path()).flush_threshold(0).build(),
        Config::builder()
            .data_dir(temp_dir.path())
            .filter_false_positive_rate(0.0)
            .build(),
        Config::builder()
            .data_dir(temp_dir.path())
            .filter_false_positive_rate(1.0)
            .build(),
        Config::builder()
            .data_dir(temp_dir.path())
            .background_compaction_period_ms(0)
            .build(),
        Config::builder()
            .data_dir(temp_dir.path())
            .wal_sync_strategy(WalSyncStrategy::EveryNEntries { count: 0 })
            .build(),
    ];

    for config in bad_configs {
        assert!(matches!(
            StorageEngine::open(config),
            Err(StrataError::Config(_))
        ));
    }
}

#[test]
fn test_config_defaults() {
    let config = Config::default();

    assert_eq!(config.flush_threshold, 1000);
    assert_eq!(config.filter_false_positive_rate, 0.01);
    assert_eq!(config.wal_sync_strategy, WalSyncStrategy::OsFlush);
    assert!(config.background_compaction_period().is_none());
    assert!(config.validate().is_ok());
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_writes_with_compaction() {
    let temp_dir = TempDir::new().unwrap();
    let engine = Arc::new(open_engine(temp_dir.path(), 50));

    let writers: Vec<_> = (0..4)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for i in 0..150 {
                    let key = format!("t{}-{:03}", t, i);
                    engine.put(key.as_bytes(), key.as_bytes()).unwrap();
                    if i % 10 == 9 {
                        engine.delete(format!("t{}-{:03}", t, i - 1).as_bytes()).unwrap();
                    }
                }
            })
        })
        .collect();

    let compactor = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            for _ in 0..10 {
                engine.compact_ss_tables().unwrap();
                thread::sleep(Duration::from_millis(5));
            }
        })
    };

    for handle in writers {
        handle.join().unwrap();
    }
    compactor.join().unwrap();

    for t in 0..4 {
        for i in 0..150 {
            let key = format!("t{}-{:03}", t, i);
            let expected = if i % 10 == 8 { None } else { Some(key.clone()) };
            assert_eq!(get_str(&engine, &key), expected, "key {}", key);
        }
    }
}

#[test]
fn test_range_read_never_sees_stale_value_across_flush() {
    let temp_dir = TempDir::new().unwrap();
    // every third put crosses the threshold
    let engine = Arc::new(open_engine(temp_dir.path(), 2));

    let writer = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            for i in 0..150u32 {
                engine.put(b"a", format!("{:06}", 2 * i).as_bytes()).unwrap();
                engine.put(b"a", format!("{:06}", 2 * i + 1).as_bytes()).unwrap();
                engine.put(b"z", format!("{:06}", 2 * i + 1).as_bytes()).unwrap();
            }
        })
    };

    // z is written after a, so any view showing z must show an a at least as new
    loop {
        let finished = writer.is_finished();
        let range = engine.read_key_range(b"a", b"z").unwrap();
        if let Some(z) = range.get(&b"z"[..]) {
            let a = range.get(&b"a"[..]).expect("a written before z");
            assert!(a >= z, "a={:?} z={:?}", a, z);
        }
        if finished {
            break;
        }
    }

    writer.join().unwrap();
    assert_eq!(
        range_str(&engine, "a", "z"),
        pairs(&[("a", "000299"), ("z", "000299")])
    );
}
