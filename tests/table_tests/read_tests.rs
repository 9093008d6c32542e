//! Tests for the DiskTable read path
//!
//! These tests verify:
//! - load() returns once the first record is available
//! - Records come back in block order, then batch order
//! - done() semantics, including the empty table
//! - Reload reuses the catalog; refresh rediscovers
//! - Corruption handling in lenient and strict modes

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use disktable::dispatch::ReadOnlyDispatcher;
use disktable::storage::BlockWriter;
use disktable::{Batch, DiskTable, TableConfig, TableError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn config(dir: &Path) -> TableConfig {
    TableConfig::builder()
        .data_dir(dir)
        .name_prefix("t")
        .buffer_capacity(2)
        .poll_interval_ms(1)
        .build()
}

fn open_table(dir: &Path) -> DiskTable {
    DiskTable::new(config(dir), Arc::new(ReadOnlyDispatcher)).unwrap()
}

/// Write `blocks[i]` as block i, each inner vec a batch of keys
fn write_blocks(dir: &Path, blocks: &[Vec<Vec<&str>>]) {
    let mut writer = BlockWriter::new(dir, "t").unwrap();
    for (block_number, batches) in blocks.iter().enumerate() {
        for keys in batches {
            let mut batch = Batch::new(0, block_number as u64);
            for key in keys {
                batch.push(key.as_bytes(), format!("{}-value", key).as_bytes());
            }
            writer.write(&batch).unwrap();
        }
    }
    writer.sync().unwrap();
}

fn drain(table: &mut DiskTable) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut key = Vec::new();
    let mut value = Vec::new();
    while !table.done() {
        table.get(&mut key, &mut value).unwrap();
        out.push((
            String::from_utf8(key.clone()).unwrap(),
            String::from_utf8(value.clone()).unwrap(),
        ));
        table.advance_record().unwrap();
    }
    out
}

fn keys(records: &[(String, String)]) -> Vec<&str> {
    records.iter().map(|(k, _)| k.as_str()).collect()
}

// =============================================================================
// Load Tests
// =============================================================================

#[test]
fn test_load_empty_directory_is_done() {
    let temp = TempDir::new().unwrap();
    let mut table = open_table(temp.path());

    table.load().unwrap();

    assert!(table.done());
    assert!(table.current_record().is_none());
    let mut key = Vec::new();
    let mut value = Vec::new();
    assert!(matches!(
        table.get(&mut key, &mut value),
        Err(TableError::InvalidState(_))
    ));
    assert_eq!(table.catalog().unwrap().len(), 0);
}

#[test]
fn test_load_makes_first_record_available() {
    let temp = TempDir::new().unwrap();
    write_blocks(temp.path(), &[vec![vec!["a", "b"]]]);
    let mut table = open_table(temp.path());

    table.load().unwrap();

    assert!(!table.done());
    let record = table.current_record().unwrap();
    assert_eq!(record.key, b"a");
    assert_eq!(record.value, b"a-value");
}

#[test]
fn test_get_does_not_advance() {
    let temp = TempDir::new().unwrap();
    write_blocks(temp.path(), &[vec![vec!["a", "b"]]]);
    let mut table = open_table(temp.path());
    table.load().unwrap();

    let mut key = b"stale".to_vec();
    let mut value = Vec::new();
    table.get(&mut key, &mut value).unwrap();
    table.get(&mut key, &mut value).unwrap();

    assert_eq!(key, b"a");
    assert_eq!(value, b"a-value");
}

// =============================================================================
// Ordering Tests
// =============================================================================

#[test]
fn test_reads_in_block_then_batch_order() {
    let temp = TempDir::new().unwrap();
    write_blocks(
        temp.path(),
        &[
            vec![vec!["a", "b"], vec!["c"]],
            vec![vec!["d"], vec!["e", "f", "g"]],
            vec![vec!["h"]],
        ],
    );
    let mut table = open_table(temp.path());
    table.load().unwrap();

    let records = drain(&mut table);

    assert_eq!(keys(&records), vec!["a", "b", "c", "d", "e", "f", "g", "h"]);
    assert_eq!(records[4].1, "e-value");
}

#[test]
fn test_many_blocks_with_small_buffer() {
    let temp = TempDir::new().unwrap();
    let names: Vec<String> = (0..300).map(|i| format!("key{:04}", i)).collect();
    let blocks: Vec<Vec<Vec<&str>>> = names
        .chunks(25)
        .map(|chunk| {
            chunk
                .chunks(4)
                .map(|b| b.iter().map(|s| s.as_str()).collect())
                .collect()
        })
        .collect();
    write_blocks(temp.path(), &blocks);

    let mut table = open_table(temp.path());
    table.load().unwrap();
    let records = drain(&mut table);

    assert_eq!(table.catalog().unwrap().len(), 12);
    let expected: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
    assert_eq!(keys(&records), expected);
}

#[test]
fn test_records_iterator() {
    let temp = TempDir::new().unwrap();
    write_blocks(temp.path(), &[vec![vec!["a"]], vec![vec!["b", "c"]]]);
    let mut table = open_table(temp.path());
    table.load().unwrap();

    let keys: Vec<Vec<u8>> = table.records().map(|r| r.unwrap().key).collect();

    assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    assert!(table.done());
}

#[test]
fn test_empty_block_between_blocks_is_skipped() {
    let temp = TempDir::new().unwrap();
    write_blocks(temp.path(), &[vec![vec!["a"]]]);
    std::fs::File::create(temp.path().join("t_1")).unwrap();
    let mut writer = BlockWriter::new(temp.path(), "t").unwrap();
    let mut batch = Batch::new(0, 2);
    batch.push(b"z", b"z-value");
    writer.write(&batch).unwrap();
    writer.sync().unwrap();

    let mut table = open_table(temp.path());
    table.load().unwrap();

    assert_eq!(keys(&drain(&mut table)), vec!["a", "z"]);
    assert_eq!(table.read_stats().unwrap().blocks_opened, 3);
}

// =============================================================================
// done() Tests
// =============================================================================

#[test]
fn test_done_false_until_last_record_consumed() {
    let temp = TempDir::new().unwrap();
    write_blocks(temp.path(), &[vec![vec!["a"]], vec![vec!["b"]]]);
    let mut table = open_table(temp.path());
    table.load().unwrap();

    assert!(!table.done());
    table.advance_record().unwrap();
    assert!(!table.done());
    assert_eq!(table.current_record().unwrap().key, b"b");
    table.advance_record().unwrap();
    assert!(table.done());
}

#[test]
fn test_done_is_monotone() {
    let temp = TempDir::new().unwrap();
    write_blocks(temp.path(), &[vec![vec!["a"]]]);
    let mut table = open_table(temp.path());
    table.load().unwrap();

    table.advance_record().unwrap();
    assert!(table.done());
    for _ in 0..3 {
        table.advance_record().unwrap();
        assert!(table.done());
    }
}

#[test]
fn test_advance_before_load_fails() {
    let temp = TempDir::new().unwrap();
    let mut table = open_table(temp.path());

    assert!(matches!(
        table.advance_record(),
        Err(TableError::InvalidState(_))
    ));
}

// =============================================================================
// Reload Tests
// =============================================================================

#[test]
fn test_reload_restarts_from_first_block() {
    let temp = TempDir::new().unwrap();
    write_blocks(temp.path(), &[vec![vec!["a", "b"]], vec![vec!["c"]]]);
    let mut table = open_table(temp.path());

    table.load().unwrap();
    table.advance_record().unwrap();
    table.load().unwrap();

    assert_eq!(keys(&drain(&mut table)), vec!["a", "b", "c"]);
}

#[test]
fn test_reload_keeps_catalog_until_refreshed() {
    let temp = TempDir::new().unwrap();
    write_blocks(temp.path(), &[vec![vec!["a"]]]);
    let mut table = open_table(temp.path());
    table.load().unwrap();
    drain(&mut table);

    // A block appearing later is not part of the existing catalog
    let mut writer = BlockWriter::new(temp.path(), "t").unwrap();
    let mut batch = Batch::new(0, 1);
    batch.push(b"b", b"b-value");
    writer.write(&batch).unwrap();
    writer.sync().unwrap();

    table.load().unwrap();
    assert_eq!(keys(&drain(&mut table)), vec!["a"]);

    assert_eq!(table.refresh_catalog().unwrap().len(), 2);
    table.load().unwrap();
    assert_eq!(keys(&drain(&mut table)), vec!["a", "b"]);
}

#[test]
fn test_drop_while_pipeline_blocked() {
    let temp = TempDir::new().unwrap();
    let batches: Vec<Vec<&str>> = (0..50).map(|_| vec!["k"]).collect();
    write_blocks(temp.path(), &[batches]);

    let mut table = open_table(temp.path());
    table.load().unwrap();
    // Read thread is parked on a full buffer; dropping must not hang
    drop(table);
}

// =============================================================================
// Corruption Tests
// =============================================================================

fn corrupt_first_block(dir: &Path) {
    let mut file = OpenOptions::new().append(true).open(dir.join("t_0")).unwrap();
    file.write_all(&[0xDE, 0xAD, 0xBE]).unwrap();
    file.sync_all().unwrap();
}

#[test]
fn test_corrupt_tail_ends_block_and_continues() {
    let temp = TempDir::new().unwrap();
    write_blocks(temp.path(), &[vec![vec!["a"]], vec![vec!["b"]]]);
    corrupt_first_block(temp.path());

    let mut table = open_table(temp.path());
    table.load().unwrap();

    assert_eq!(keys(&drain(&mut table)), vec!["a", "b"]);
    assert_eq!(table.read_stats().unwrap().corrupt_blocks, 1);
}

#[test]
fn test_strict_reads_surface_corruption() {
    let temp = TempDir::new().unwrap();
    write_blocks(temp.path(), &[vec![vec!["a"]], vec![vec!["b"]]]);
    corrupt_first_block(temp.path());

    let config = TableConfig::builder()
        .data_dir(temp.path())
        .name_prefix("t")
        .poll_interval_ms(1)
        .strict_reads(true)
        .build();
    let mut table = DiskTable::new(config, Arc::new(ReadOnlyDispatcher)).unwrap();
    table.load().unwrap();

    assert_eq!(table.current_record().unwrap().key, b"a");
    let result = table.advance_record();

    assert!(matches!(result, Err(TableError::Corruption(_))));
    assert!(table.done());
}

// =============================================================================
// Read-Only Dispatcher Tests
// =============================================================================

#[test]
fn test_read_only_load_leaves_missing_directory_alone() {
    let temp = TempDir::new().unwrap();
    let missing = temp.path().join("absent");

    let mut table = open_table(&missing);
    table.load().unwrap();

    assert!(table.done());
    assert!(!missing.exists());
}

#[test]
fn test_read_only_table_rejects_put() {
    let temp = TempDir::new().unwrap();
    let mut table = open_table(temp.path());

    assert!(matches!(table.put(b"k", b"v"), Err(TableError::Config(_))));
    assert!(!table.is_writing());
}
