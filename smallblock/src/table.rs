use crate::{
    block::{Block, BlockWidth},
    error::{Error, Result},
};

pub const INITIAL_CAPACITY: usize = 16;

/// Maps a ciphertext block to the ciphertext block that preceded it.
///
/// Separate chaining over an arena: entries live in one vector and each bucket
/// holds the index of the head of its chain. When the share of non-empty buckets
/// reaches 4/5 the bucket array doubles and every chain is rebuilt.
pub struct CollisionTable {
    width: BlockWidth,
    buckets: Vec<Option<usize>>,
    entries: Vec<Entry>,
    occupied: usize,
}

struct Entry {
    block: Block,
    previous: Block,
    next: Option<usize>,
}

impl CollisionTable {
    pub fn new(width: BlockWidth) -> Self {
        Self::with_capacity(width, INITIAL_CAPACITY)
    }

    pub fn with_capacity(width: BlockWidth, capacity: usize) -> Self {
        Self {
            width,
            buckets: vec![None; capacity.max(1)],
            entries: Vec::new(),
            occupied: 0,
        }
    }

    /// Number of buckets.
    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Folds the block in 32-bit little-endian chunks: `hash = hash * 37 + chunk`,
    /// starting from 1. The last chunk only keeps the bits that are left, and is
    /// folded in even when no bits are left.
    pub fn hash(&self, block: Block) -> u32 {
        let mut hash: u32 = 1;
        let mut rest = block & self.width.block_mask();
        let mut bits = self.width.block_bits();
        while bits >= 32 {
            hash = hash.wrapping_mul(37).wrapping_add(rest as u32);
            rest >>= 32;
            bits -= 32;
        }
        let tail = (rest & ((1u64 << bits) - 1)) as u32;
        hash.wrapping_mul(37).wrapping_add(tail)
    }

    fn bucket(&self, block: Block) -> usize {
        self.hash(block) as usize % self.buckets.len()
    }

    fn find(&self, block: Block) -> Option<usize> {
        let mut node = self.buckets[self.bucket(block)];
        while let Some(index) = node {
            let entry = &self.entries[index];
            if entry.block == block {
                return Some(index);
            }
            node = entry.next;
        }
        None
    }

    pub fn contains(&self, block: Block) -> bool {
        self.find(block & self.width.block_mask()).is_some()
    }

    /// Returns the block stored as predecessor of `block`.
    pub fn get(&self, block: Block) -> Result<Block> {
        let block = block & self.width.block_mask();
        self.find(block)
            .map(|index| self.entries[index].previous)
            .ok_or(Error::NotFound(block))
    }

    /// Stores `previous` as predecessor of `block`. A block that is already
    /// present keeps its slot and gets the new predecessor.
    pub fn put(&mut self, block: Block, previous: Block) {
        let mask = self.width.block_mask();
        let (block, previous) = (block & mask, previous & mask);

        if let Some(index) = self.find(block) {
            self.entries[index].previous = previous;
            return;
        }

        let index = self.entries.len();
        self.entries.push(Entry {
            block,
            previous,
            next: None,
        });
        self.link(index);

        if self.occupied * 5 >= self.buckets.len() * 4 {
            self.resize();
        }
    }

    fn link(&mut self, index: usize) {
        let bucket = self.bucket(self.entries[index].block);
        let head = &mut self.buckets[bucket];
        if head.is_none() {
            self.occupied += 1;
        }
        self.entries[index].next = head.replace(index);
    }

    fn resize(&mut self) {
        self.buckets = vec![None; 2 * self.buckets.len()];
        self.occupied = 0;
        for index in 0..self.entries.len() {
            self.link(index);
        }
    }
}

#[cfg(test)]
fn entry_count(table: &CollisionTable) -> usize {
    let mut count = 0;
    for head in &table.buckets {
        let mut node = *head;
        while let Some(index) = node {
            count += 1;
            node = table.entries[index].next;
        }
    }
    count
}

#[test]
fn test_hash_fold() {
    let byte = CollisionTable::new(BlockWidth::new(4).unwrap());
    assert_eq!(byte.hash(0xab), 37 + 0xab);

    let word = CollisionTable::new(BlockWidth::new(16).unwrap());
    assert_eq!(word.hash(0x0403_0201), (37 + 0x0403_0201u32).wrapping_mul(37));

    let wide = CollisionTable::new(BlockWidth::new(32).unwrap());
    let expected = 37u32
        .wrapping_add(0x0403_0201)
        .wrapping_mul(37)
        .wrapping_add(0x0807_0605)
        .wrapping_mul(37);
    assert_eq!(wide.hash(0x0807_0605_0403_0201), expected);

    let odd = CollisionTable::new(BlockWidth::new(20).unwrap());
    let expected = 37u32.wrapping_add(0x0403_0201).wrapping_mul(37).wrapping_add(0xf5);
    assert_eq!(odd.hash(0xf5_0403_0201), expected);
}

#[test]
fn test_put_contains_get() {
    let mut table = CollisionTable::new(BlockWidth::new(16).unwrap());
    assert!(table.is_empty());
    assert!(!table.contains(42));

    table.put(42, 7);
    table.put(43, 8);
    assert!(table.contains(42));
    assert_eq!(table.get(42).unwrap(), 7);
    assert_eq!(table.get(43).unwrap(), 8);
    assert_eq!(table.len(), 2);
}

#[test]
fn test_get_absent_fails() {
    let table = CollisionTable::new(BlockWidth::new(8).unwrap());
    assert!(matches!(table.get(0x1234), Err(Error::NotFound(0x1234))));
}

#[test]
fn test_put_overwrites() {
    let mut table = CollisionTable::new(BlockWidth::new(8).unwrap());
    table.put(0x1234, 1);
    table.put(0x1234, 2);
    assert_eq!(table.len(), 1);
    assert_eq!(table.get(0x1234).unwrap(), 2);
}

#[test]
fn test_keys_are_masked() {
    let mut table = CollisionTable::new(BlockWidth::new(4).unwrap());
    table.put(0x1_23, 0xff_ff);
    assert!(table.contains(0x23));
    assert_eq!(table.get(0x23).unwrap(), 0xff);
}

#[test]
fn test_resize_keeps_entries() {
    let width = BlockWidth::new(16).unwrap();
    let mut table = CollisionTable::with_capacity(width, 4);
    for block in 0..1000u64 {
        let block = block.wrapping_mul(0x9e37_79b9) & width.block_mask();
        table.put(block, block ^ 0x5555);
    }
    assert!(table.capacity() > 4);
    assert_eq!(table.len(), 1000);
    assert_eq!(entry_count(&table), 1000);
    for block in 0..1000u64 {
        let block = block.wrapping_mul(0x9e37_79b9) & width.block_mask();
        assert_eq!(table.get(block).unwrap(), block ^ 0x5555);
    }
}

#[test]
fn test_load_factor() {
    let width = BlockWidth::new(16).unwrap();
    let mut table = CollisionTable::with_capacity(width, 64);
    for block in 0..10_000 {
        table.put(block, 0);
        assert!(table.occupied * 5 < table.capacity() * 4);
    }
}

#[cfg(test)]
mod proptests {
    use std::collections::HashMap;

    use proptest::prelude::*;

    use super::{entry_count, CollisionTable};
    use crate::block::BlockWidth;

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            .. ProptestConfig::default()
        })]

        #[test]
        fn behaves_like_a_map(
            half_bits in prop::sample::select(vec![4u32, 8, 12, 16, 24, 32]),
            capacity in 1usize..64,
            puts in prop::collection::vec((any::<u64>(), any::<u64>()), 0..400),
        ) {
            let width = BlockWidth::new(half_bits).unwrap();
            let mask = width.block_mask();
            let mut table = CollisionTable::with_capacity(width, capacity);
            let mut model = HashMap::new();

            for &(block, previous) in &puts {
                table.put(block, previous);
                model.insert(block & mask, previous & mask);
            }

            prop_assert_eq!(table.len(), model.len());
            prop_assert_eq!(entry_count(&table), model.len());
            for (&block, &previous) in &model {
                prop_assert!(table.contains(block));
                prop_assert_eq!(table.get(block).unwrap(), previous);
            }
        }
    }
}
