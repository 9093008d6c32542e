//! Tests for BlockCatalog
//!
//! These tests verify:
//! - Discovery of `<prefix>_<n>` files and their sizes
//! - Numeric block ordering
//! - Filtering of other tables and non-block files
//! - Empty and missing directories

use std::fs;
use std::path::Path;

use disktable::storage::BlockCatalog;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn touch(dir: &Path, name: &str, len: usize) {
    fs::write(dir.join(name), vec![0u8; len]).unwrap();
}

// =============================================================================
// Discovery Tests
// =============================================================================

#[test]
fn test_discover_empty_directory() {
    let temp = TempDir::new().unwrap();

    let catalog = BlockCatalog::discover(temp.path(), "t").unwrap();

    assert!(catalog.is_empty());
    assert_eq!(catalog.len(), 0);
    assert_eq!(catalog.total_bytes(), 0);
}

#[test]
fn test_discover_missing_directory() {
    let temp = TempDir::new().unwrap();
    let missing = temp.path().join("nope");

    let catalog = BlockCatalog::discover(&missing, "t").unwrap();

    assert!(catalog.is_empty());
}

#[test]
fn test_discover_records_sizes() {
    let temp = TempDir::new().unwrap();
    touch(temp.path(), "t_0", 10);
    touch(temp.path(), "t_1", 25);

    let catalog = BlockCatalog::discover(temp.path(), "t").unwrap();

    assert_eq!(catalog.len(), 2);
    assert_eq!(catalog.get(0).unwrap().size, 10);
    assert_eq!(catalog.get(1).unwrap().size, 25);
    assert_eq!(catalog.total_bytes(), 35);
}

#[test]
fn test_discover_orders_numerically() {
    let temp = TempDir::new().unwrap();
    for n in [10, 2, 0, 1, 9] {
        touch(temp.path(), &format!("t_{}", n), 1);
    }

    let catalog = BlockCatalog::discover(temp.path(), "t").unwrap();
    let numbers: Vec<u64> = catalog.iter().map(|b| b.block_number).collect();

    assert_eq!(numbers, vec![0, 1, 2, 9, 10]);
}

#[test]
fn test_discover_ignores_other_tables() {
    let temp = TempDir::new().unwrap();
    touch(temp.path(), "t_0", 1);
    touch(temp.path(), "tt_0", 1);
    touch(temp.path(), "other_0", 1);
    touch(temp.path(), "t_x_3", 1);
    touch(temp.path(), "t_1.tmp", 1);
    touch(temp.path(), "t_", 1);
    fs::create_dir(temp.path().join("t_5")).unwrap();

    let catalog = BlockCatalog::discover(temp.path(), "t").unwrap();

    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog.get(0).unwrap().block_number, 0);
}

#[test]
fn test_discover_is_deterministic() {
    let temp = TempDir::new().unwrap();
    for n in 0..20 {
        touch(temp.path(), &format!("data_{}", n), n);
    }

    let first = BlockCatalog::discover(temp.path(), "data").unwrap();
    let second = BlockCatalog::discover(temp.path(), "data").unwrap();

    let a: Vec<_> = first.iter().map(|b| b.path.clone()).collect();
    let b: Vec<_> = second.iter().map(|b| b.path.clone()).collect();
    assert_eq!(a, b);
}

#[test]
fn test_block_path_layout() {
    let path = BlockCatalog::block_path(Path::new("/data"), "t", 7);

    assert_eq!(path, Path::new("/data/t_7"));
}
