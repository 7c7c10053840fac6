use rand_core::RngCore;

use crate::{
    block::{Block, BlockWidth},
    error::{Error, Result},
};

/// Fills `buf` completely or fails. A short read is never handed back to the caller.
pub fn fill(rng: &mut impl RngCore, buf: &mut [u8]) -> Result<()> {
    rng.try_fill_bytes(buf)
        .map_err(|source| Error::EntropyExhausted {
            needed: buf.len(),
            source,
        })
}

/// Draws one uniformly random block of the given width.
pub fn block(rng: &mut impl RngCore, width: BlockWidth) -> Result<Block> {
    let mut buf = [0u8; 8];
    let bytes = &mut buf[..width.block_bytes()];
    fill(rng, bytes)?;
    Ok(width.read_block(&bytes[..]))
}

/// Random source that is always out of entropy.
#[cfg(test)]
pub(crate) struct Exhausted;

#[cfg(test)]
impl RngCore for Exhausted {
    fn next_u32(&mut self) -> u32 {
        panic!("entropy exhausted")
    }

    fn next_u64(&mut self) -> u64 {
        panic!("entropy exhausted")
    }

    fn fill_bytes(&mut self, _dest: &mut [u8]) {
        panic!("entropy exhausted")
    }

    fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> std::result::Result<(), rand_core::Error> {
        Err(rand_core::Error::new("entropy pool is empty"))
    }
}

#[test]
fn test_block_is_masked() {
    use rand::{rngs::StdRng, SeedableRng};

    let mut rng = StdRng::seed_from_u64(7);
    let width = BlockWidth::new(12).unwrap();
    for _ in 0..100 {
        assert!(block(&mut rng, width).unwrap() <= width.block_mask());
    }
}

#[test]
fn test_exhausted_source() {
    let width = BlockWidth::new(16).unwrap();
    match block(&mut Exhausted, width) {
        Err(Error::EntropyExhausted { needed, .. }) => assert_eq!(needed, 4),
        other => panic!("expected exhaustion, got {other:?}"),
    }
}
