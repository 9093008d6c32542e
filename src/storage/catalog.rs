//! Block Catalog
//!
//! Discovers the block files that belong to one table.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// One on-disk block, captured at discovery time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Full path to the block file
    pub path: PathBuf,

    /// Block number parsed from the file name
    pub block_number: u64,

    /// File size in bytes when the block was discovered
    pub size: u64,
}

/// Ordered list of blocks for one table
///
/// Built once and read-only afterwards, so it can be shared across threads
/// behind an `Arc` without locking.
#[derive(Debug, Clone, Default)]
pub struct BlockCatalog {
    blocks: Vec<Block>,
}

impl BlockCatalog {
    /// Discover blocks named `<prefix>_<n>` in `dir`
    ///
    /// Blocks are ordered by block number. A missing directory or no
    /// matching files yields an empty catalog.
    pub fn discover(dir: &Path, prefix: &str) -> Result<Self> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(
                    "Data directory {} does not exist, empty catalog",
                    dir.display()
                );
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        let mut blocks = Vec::new();
        for entry in entries {
            let entry = entry?;
            let file_path = entry.path();

            if !file_path.is_file() {
                continue;
            }

            let Some(block_number) = Self::parse_block_number(&file_path, prefix) else {
                continue;
            };

            let size = entry.metadata()?.len();
            tracing::debug!("Found block {} ({} bytes)", file_path.display(), size);
            blocks.push(Block {
                path: file_path,
                block_number,
                size,
            });
        }

        blocks.sort_by(|a, b| {
            a.block_number
                .cmp(&b.block_number)
                .then_with(|| a.path.cmp(&b.path))
        });

        tracing::info!(
            "Discovered {} blocks for prefix {:?} in {}",
            blocks.len(),
            prefix,
            dir.display()
        );

        Ok(Self { blocks })
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Block> {
        self.blocks.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Block> {
        self.blocks.iter()
    }

    /// Sum of block sizes at discovery time
    pub fn total_bytes(&self) -> u64 {
        self.blocks.iter().map(|b| b.size).sum()
    }

    /// Path of block `block_number` for the given table prefix
    pub fn block_path(dir: &Path, prefix: &str, block_number: u64) -> PathBuf {
        dir.join(format!("{}_{}", prefix, block_number))
    }

    /// Parse the block number from a file name
    /// "t_42" with prefix "t" → Some(42); "t_42.tmp" → None
    fn parse_block_number(path: &Path, prefix: &str) -> Option<u64> {
        let name = path.file_name()?.to_str()?;
        let suffix = name.strip_prefix(prefix)?.strip_prefix('_')?;
        if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
            tracing::debug!("Skipping {} (not a block of {:?})", name, prefix);
            return None;
        }
        suffix.parse().ok()
    }
}

impl<'a> IntoIterator for &'a BlockCatalog {
    type Item = &'a Block;
    type IntoIter = std::slice::Iter<'a, Block>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks.iter()
    }
}
