//! Tests for BlockReader
//!
//! These tests verify:
//! - The first batch is available right after open
//! - Batches come back in file order, then the reader is exhausted
//! - Clean EOF and corrupt trailing data are told apart
//! - A new reader rereads the block from the start

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use disktable::storage::{write_batch, Block, BlockCatalog, BlockReader, ReadEnd};
use disktable::Batch;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn batch(block: u64, keys: &[&str]) -> Batch {
    let mut batch = Batch::new(1, block);
    for key in keys {
        batch.push(key.as_bytes(), format!("v-{}", key).as_bytes());
    }
    batch
}

fn write_block(dir: &Path, name: &str, batches: &[Batch]) -> Block {
    let path = dir.join(name);
    let mut file = fs::File::create(&path).unwrap();
    for b in batches {
        write_batch(&mut file, b).unwrap();
    }
    file.sync_all().unwrap();
    BlockCatalog::discover(dir, name.split('_').next().unwrap())
        .unwrap()
        .iter()
        .find(|block| block.path == path)
        .cloned()
        .unwrap()
}

fn keys(batch: &Batch) -> Vec<String> {
    batch
        .iter()
        .map(|r| String::from_utf8(r.key.clone()).unwrap())
        .collect()
}

// =============================================================================
// Reading Tests
// =============================================================================

#[test]
fn test_first_batch_ready_after_open() {
    let temp = TempDir::new().unwrap();
    let block = write_block(temp.path(), "t_0", &[batch(0, &["a", "b"])]);

    let reader = BlockReader::open(&block).unwrap();

    assert!(!reader.is_exhausted());
    assert_eq!(keys(reader.current().unwrap()), vec!["a", "b"]);
    assert_eq!(reader.end_state(), &ReadEnd::Pending);
    assert_eq!(reader.batches_read(), 1);
}

#[test]
fn test_batches_in_file_order() {
    let temp = TempDir::new().unwrap();
    let block = write_block(
        temp.path(),
        "t_0",
        &[batch(0, &["a"]), batch(0, &["b", "c"]), batch(0, &["d"])],
    );

    let mut reader = BlockReader::open(&block).unwrap();
    let mut seen = Vec::new();
    while let Some(current) = reader.current() {
        seen.extend(keys(current));
        reader.advance();
    }

    assert_eq!(seen, vec!["a", "b", "c", "d"]);
    assert!(reader.is_exhausted());
    assert_eq!(reader.end_state(), &ReadEnd::Eof);
    assert_eq!(reader.batches_read(), 3);
}

#[test]
fn test_empty_block_is_exhausted_immediately() {
    let temp = TempDir::new().unwrap();
    let block = write_block(temp.path(), "t_0", &[]);

    let reader = BlockReader::open(&block).unwrap();

    assert!(reader.is_exhausted());
    assert!(reader.current().is_none());
    assert_eq!(reader.end_state(), &ReadEnd::Eof);
}

#[test]
fn test_exhaustion_is_permanent() {
    let temp = TempDir::new().unwrap();
    let block = write_block(temp.path(), "t_0", &[batch(0, &["a"])]);

    let mut reader = BlockReader::open(&block).unwrap();
    reader.advance();
    assert!(reader.is_exhausted());

    // Appending after exhaustion is not picked up by the same reader
    let mut file = OpenOptions::new().append(true).open(&block.path).unwrap();
    write_batch(&mut file, &batch(0, &["late"])).unwrap();
    file.sync_all().unwrap();

    reader.advance();
    assert!(reader.is_exhausted());
    assert_eq!(reader.batches_read(), 1);
}

#[test]
fn test_corrupt_tail_is_distinguished_from_eof() {
    let temp = TempDir::new().unwrap();
    let block = write_block(temp.path(), "t_0", &[batch(0, &["a"])]);

    let mut file = OpenOptions::new().append(true).open(&block.path).unwrap();
    file.write_all(&[1, 2, 3]).unwrap();
    file.sync_all().unwrap();

    let mut reader = BlockReader::open(&block).unwrap();
    assert_eq!(keys(reader.current().unwrap()), vec!["a"]);

    reader.advance();

    assert!(reader.is_exhausted());
    assert!(matches!(reader.end_state(), ReadEnd::Corrupt(_)));
}

#[test]
fn test_new_reader_rereads_block() {
    let temp = TempDir::new().unwrap();
    let block = write_block(temp.path(), "t_0", &[batch(0, &["a"]), batch(0, &["b"])]);

    let mut first = BlockReader::open(&block).unwrap();
    first.advance();
    first.advance();
    assert!(first.is_exhausted());

    let second = BlockReader::open(&block).unwrap();
    assert_eq!(keys(second.current().unwrap()), vec!["a"]);
}

#[test]
fn test_open_missing_file_fails() {
    let temp = TempDir::new().unwrap();
    let block = Block {
        path: temp.path().join("t_0"),
        block_number: 0,
        size: 0,
    };

    assert!(BlockReader::open(&block).is_err());
}
