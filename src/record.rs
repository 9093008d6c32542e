//! Record and Batch definitions
//!
//! A batch is the unit that moves through the prefetch buffer, over the
//! dispatch layer, and into block files. Batches are never split.

use serde::{Deserialize, Serialize};

/// Identifier of a table, carried by every batch
pub type TableId = u32;

/// Identifier of a remote table server
pub type PeerId = usize;

/// A single key/value pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Record {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Ordered group of records bound for one block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    /// Table this batch belongs to
    pub table: TableId,

    /// Block (and therefore owning peer) this batch belongs to
    pub block_number: u64,

    /// Records in insertion order
    pub records: Vec<Record>,
}

impl Batch {
    /// Create an empty batch for the given table and block
    pub fn new(table: TableId, block_number: u64) -> Self {
        Self {
            table,
            block_number,
            records: Vec::new(),
        }
    }

    /// Append a record
    pub fn push(&mut self, key: &[u8], value: &[u8]) {
        self.records.push(Record::new(key, value));
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }
}
