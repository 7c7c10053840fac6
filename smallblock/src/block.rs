use bytes::{Buf, BufMut};

use crate::error::{Error, Result};

/// A full block, kept in the low `block_bits` bits of a `u64`.
pub type Block = u64;

/// One half of a block, kept in the low `half_bits` bits of a `u32`.
pub type HalfBlock = u32;

pub const MIN_HALF_BITS: u32 = 4;
pub const MAX_HALF_BITS: u32 = 32;

/// Geometry of the block cipher: how many bits per half-block, and from that
/// the block size in bits and bytes plus the masks that keep values in range.
///
/// Blocks are stored little-endian, so the first half-block of a buffer is the
/// low half of the [`Block`] and the second one is the high half.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockWidth {
    half_bits: u32,
}

impl BlockWidth {
    /// 4-bit halves, 8-bit blocks.
    pub const NIBBLE: BlockWidth = BlockWidth { half_bits: 4 };

    /// Accepts half-blocks of 4 to 32 bits as long as a whole block is a whole number of bytes.
    pub fn new(half_bits: u32) -> Result<Self> {
        if (MIN_HALF_BITS..=MAX_HALF_BITS).contains(&half_bits) && (2 * half_bits) % 8 == 0 {
            Ok(Self { half_bits })
        } else {
            Err(Error::UnsupportedWidth(half_bits))
        }
    }

    pub fn half_bits(&self) -> u32 {
        self.half_bits
    }

    pub fn block_bits(&self) -> u32 {
        2 * self.half_bits
    }

    pub fn block_bytes(&self) -> usize {
        (self.block_bits() / 8) as usize
    }

    /// True if a half-block can be copied as whole bytes.
    pub fn is_byte_aligned(&self) -> bool {
        self.half_bits % 8 == 0
    }

    pub fn half_mask(&self) -> HalfBlock {
        u32::MAX >> (u32::BITS - self.half_bits)
    }

    pub fn block_mask(&self) -> Block {
        u64::MAX >> (u64::BITS - self.block_bits())
    }

    /// Reads `half_bits / 8` bytes into a half-block. Only defined for byte aligned widths.
    pub fn read_half(&self, mut buf: impl Buf) -> HalfBlock {
        assert!(self.is_byte_aligned(), "half-block is not a whole number of bytes");
        (buf.get_uint_le(self.half_bits as usize / 8) as HalfBlock) & self.half_mask()
    }

    /// Writes the `half_bits / 8` bytes of a half-block. Only defined for byte aligned widths.
    pub fn write_half(&self, half: HalfBlock, buf: &mut impl BufMut) {
        assert!(self.is_byte_aligned(), "half-block is not a whole number of bytes");
        buf.put_uint_le(u64::from(half & self.half_mask()), self.half_bits as usize / 8);
    }

    /// Reads exactly `block_bytes` bytes into a masked block.
    pub fn read_block(&self, mut buf: impl Buf) -> Block {
        buf.get_uint_le(self.block_bytes()) & self.block_mask()
    }

    pub fn write_block(&self, block: Block, buf: &mut impl BufMut) {
        buf.put_uint_le(block & self.block_mask(), self.block_bytes());
    }

    /// Splits a block into its (high, low) halves.
    pub fn split(&self, block: Block) -> (HalfBlock, HalfBlock) {
        let mask = self.half_mask();
        ((block >> self.half_bits) as HalfBlock & mask, block as HalfBlock & mask)
    }

    pub fn join(&self, high: HalfBlock, low: HalfBlock) -> Block {
        let mask = self.half_mask();
        (Block::from(high & mask) << self.half_bits) | Block::from(low & mask)
    }

    /// Iterates over the whole blocks of `bytes`. A trailing partial block is ignored.
    pub fn blocks<'a>(&self, bytes: &'a [u8]) -> impl Iterator<Item = Block> + 'a {
        let width = *self;
        bytes
            .chunks_exact(self.block_bytes())
            .map(move |chunk| width.read_block(chunk))
    }

    /// Serialises a block into a fresh byte vector.
    pub fn to_bytes(&self, block: Block) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.block_bytes());
        self.write_block(block, &mut bytes);
        bytes
    }
}

#[test]
fn test_supported_widths() {
    assert!(BlockWidth::new(4).is_ok());
    assert!(BlockWidth::new(12).is_ok());
    assert!(BlockWidth::new(32).is_ok());

    for half_bits in [0, 3, 6, 10, 33, 64] {
        assert!(matches!(
            BlockWidth::new(half_bits),
            Err(Error::UnsupportedWidth(bits)) if bits == half_bits
        ));
    }
}

#[test]
fn test_masks() {
    let small = BlockWidth::new(4).unwrap();
    assert_eq!(small.half_mask(), 0x0f);
    assert_eq!(small.block_mask(), 0xff);
    assert_eq!(small.block_bytes(), 1);

    let full = BlockWidth::new(32).unwrap();
    assert_eq!(full.half_mask(), u32::MAX);
    assert_eq!(full.block_mask(), u64::MAX);
    assert_eq!(full.block_bytes(), 8);
}

#[test]
fn test_half_block_codec() {
    let width = BlockWidth::new(16).unwrap();
    assert_eq!(width.read_half(&[0x34, 0x12, 0xff][..]), 0x1234);

    let mut out = Vec::new();
    width.write_half(0xabcd_1234, &mut out);
    assert_eq!(out, vec![0x34, 0x12]);
}

#[test]
fn test_block_codec() {
    let width = BlockWidth::new(16).unwrap();
    let block = width.read_block(&[0x01, 0x02, 0x03, 0x04, 0xee][..]);
    assert_eq!(block, 0x0403_0201);
    assert_eq!(width.split(block), (0x0403, 0x0201));
    assert_eq!(width.join(0x0403, 0x0201), block);
    assert_eq!(width.to_bytes(block), vec![0x01, 0x02, 0x03, 0x04]);

    // the half-block codec and the block codec agree on the layout
    let bytes = [0x01, 0x02, 0x03, 0x04];
    let low = width.read_half(&bytes[..2]);
    let high = width.read_half(&bytes[2..]);
    assert_eq!(width.join(high, low), block);
}

#[test]
fn test_nibble_halves() {
    let width = BlockWidth::new(4).unwrap();
    assert_eq!(width.split(0xa7), (0x0a, 0x07));
    assert_eq!(width.join(0x1a, 0xf7), 0xa7);
    assert_eq!(width.to_bytes(0x1ff), vec![0xff]);
}

#[test]
fn test_blocks_iterator() {
    let width = BlockWidth::new(8).unwrap();
    let blocks: Vec<Block> = width.blocks(&[1, 0, 2, 0, 3]).collect();
    assert_eq!(blocks, vec![1, 2]);
}
