use std::time::Instant;

use rand::rngs::OsRng;
use rand_core::RngCore;

use crate::{
    block::{Block, BlockWidth},
    cbc::CbcEngine,
    cipher::BlockCipher,
    error::{Error, Result},
    random,
    table::CollisionTable,
};

/// Upper bound on the number of buckets allocated up front.
const MAX_PRESIZE_BITS: u32 = 20;

/// Decides when the active phase gives up. Checked before every fresh encryption.
pub trait StopCondition {
    fn should_stop(&mut self, encryptions: u64) -> bool;
}

/// Never gives up.
pub struct Unbounded;

impl StopCondition for Unbounded {
    fn should_stop(&mut self, _encryptions: u64) -> bool {
        false
    }
}

/// Gives up once this many encryptions have been counted.
pub struct MaxEncryptions(pub u64);

impl StopCondition for MaxEncryptions {
    fn should_stop(&mut self, encryptions: u64) -> bool {
        encryptions >= self.0
    }
}

/// Gives up once the wall clock passes the deadline.
pub struct Deadline(pub Instant);

impl StopCondition for Deadline {
    fn should_stop(&mut self, _encryptions: u64) -> bool {
        Instant::now() >= self.0
    }
}

impl<F: FnMut(u64) -> bool> StopCondition for F {
    fn should_stop(&mut self, encryptions: u64) -> bool {
        self(encryptions)
    }
}

/// Where the repeated ciphertext block showed up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Index of the block of the given ciphertext that repeated an earlier one.
    Passive { block: usize },
    /// Number of fresh single-block encryptions done when the repeat appeared.
    Active { iteration: u64 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Collision {
    /// `C_{i-1} ^ C_{j-1}`, which equals `P_i ^ P_j`.
    pub xor: Block,
    /// The ciphertext block seen twice.
    pub block: Block,
    pub phase: Phase,
    /// Encryptions counted up to and including the colliding one.
    pub encryptions: u64,
}

/// Looks for two equal ciphertext blocks `C_i == C_j` under one key. The cipher is
/// a permutation, so `P_i ^ C_{i-1} == P_j ^ C_{j-1}` and the XOR of the two
/// plaintext blocks falls out of the two preceding ciphertext blocks.
///
/// The key is never used directly: new ciphertext only comes from the oracle.
pub struct BirthdayAttacker<'a, C: BlockCipher> {
    oracle: &'a CbcEngine<C>,
    width: BlockWidth,
    table: CollisionTable,
    encryptions: u64,
}

impl<'a, C: BlockCipher> BirthdayAttacker<'a, C> {
    /// Sizes the table for the `2^H` insertions the birthday bound predicts.
    pub fn new(oracle: &'a CbcEngine<C>) -> Self {
        let width = oracle.width();
        let capacity = 1usize << (width.half_bits() + 1).min(MAX_PRESIZE_BITS);
        Self::with_table(oracle, CollisionTable::with_capacity(width, capacity))
    }

    pub fn with_table(oracle: &'a CbcEngine<C>, table: CollisionTable) -> Self {
        Self {
            oracle,
            width: oracle.width(),
            table,
            encryptions: 0,
        }
    }

    /// Encryptions counted so far. Passive blocks count as one each.
    pub fn encryptions(&self) -> u64 {
        self.encryptions
    }

    pub fn table(&self) -> &CollisionTable {
        &self.table
    }

    /// Runs both phases with OS randomness for the active one.
    pub fn run(self, ciphertext: &[u8], stop: impl StopCondition) -> Result<Collision> {
        self.run_with(&mut OsRng, ciphertext, stop)
    }

    /// Scans `ciphertext` first, then keeps encrypting random blocks until a
    /// ciphertext block repeats or `stop` fires.
    pub fn run_with(
        mut self,
        rng: &mut impl RngCore,
        ciphertext: &[u8],
        stop: impl StopCondition,
    ) -> Result<Collision> {
        if let Some(collision) = self.scan(ciphertext)? {
            return Ok(collision);
        }
        self.generate(rng, stop)
    }

    /// Passive phase: records every `(C_i, C_{i-1})` of `ciphertext`, starting at
    /// `i = 1`, and stops at the first block that is already known.
    pub fn scan(&mut self, ciphertext: &[u8]) -> Result<Option<Collision>> {
        let block_bytes = self.width.block_bytes();
        if ciphertext.len() % block_bytes != 0 {
            return Err(Error::MalformedCiphertext {
                len: ciphertext.len(),
                block_bytes,
            });
        }

        let blocks: Vec<Block> = self.width.blocks(ciphertext).collect();
        for (i, pair) in blocks.windows(2).enumerate() {
            self.encryptions += 1;
            if let Some(xor) = self.observe(pair[0], pair[1])? {
                return Ok(Some(Collision {
                    xor,
                    block: pair[1],
                    phase: Phase::Passive { block: i + 1 },
                    encryptions: self.encryptions,
                }));
            }
        }
        Ok(None)
    }

    /// Active phase: asks the oracle to encrypt one random block at a time and
    /// records the resulting `(C_1, IV)` pairs in the same table.
    pub fn generate(
        &mut self,
        rng: &mut impl RngCore,
        mut stop: impl StopCondition,
    ) -> Result<Collision> {
        let mut iteration = 0;
        loop {
            if stop.should_stop(self.encryptions) {
                return Err(Error::GaveUp {
                    encryptions: self.encryptions,
                });
            }
            self.encryptions += 1;
            iteration += 1;

            let plaintext = self.width.to_bytes(random::block(rng, self.width)?);
            let ciphertext = self.oracle.encrypt_with(rng, &plaintext)?;
            let mut blocks = self.width.blocks(&ciphertext);
            let (iv, block) = blocks.next().zip(blocks.next()).ok_or(Error::MalformedCiphertext {
                len: ciphertext.len(),
                block_bytes: self.width.block_bytes(),
            })?;

            if let Some(xor) = self.observe(iv, block)? {
                return Ok(Collision {
                    xor,
                    block,
                    phase: Phase::Active { iteration },
                    encryptions: self.encryptions,
                });
            }
        }
    }

    /// Checks `block` against the table before inserting it with its predecessor.
    fn observe(&mut self, previous: Block, block: Block) -> Result<Option<Block>> {
        if self.table.contains(block) {
            let earlier = self.table.get(block)?;
            return Ok(Some((earlier ^ previous) & self.width.block_mask()));
        }
        self.table.put(block, previous);
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::cipher::{feistel::Feistel, sbox::SBox, Key};

    /// Identity on every block except `y`, which is sent to the image of `x`.
    struct Collapsing {
        x: Block,
        y: Block,
    }

    impl BlockCipher for Collapsing {
        fn init(_key: &Key, _width: BlockWidth) -> Result<Self> {
            Ok(Self { x: 0x3c, y: 0xa5 })
        }

        fn width(&self) -> BlockWidth {
            BlockWidth::NIBBLE
        }

        fn encrypt(&self, block: Block) -> Block {
            if block == self.y {
                self.x
            } else {
                block
            }
        }

        fn decrypt(&self, block: Block) -> Block {
            block
        }
    }

    #[test]
    fn test_forced_collision() {
        let engine = CbcEngine::<Collapsing>::init(&Key::new([0; 16]), BlockWidth::NIBBLE).unwrap();
        let (x, y) = (engine.core().x, engine.core().y);

        let mut rng = StdRng::seed_from_u64(3);
        let iv = random::block(&mut rng.clone(), BlockWidth::NIBBLE).unwrap();

        // the first block enters the cipher as x, the second as y
        let p1 = x ^ iv;
        let p2 = y ^ x;
        let ciphertext = engine.encrypt_with(&mut rng, &[p1 as u8, p2 as u8]).unwrap();
        assert_eq!(ciphertext, vec![iv as u8, x as u8, x as u8]);

        let collision = BirthdayAttacker::new(&engine)
            .run_with(&mut rng, &ciphertext, MaxEncryptions(0))
            .unwrap();
        assert_eq!(collision.phase, Phase::Passive { block: 2 });
        assert_eq!(collision.block, x);
        assert_eq!(collision.xor, iv ^ x);
        // C_{i-1} ^ C_{j-1} == (x ^ P_i) ^ (y ^ P_j)
        assert_eq!(collision.xor, x ^ y ^ p1 ^ p2);
    }

    #[test]
    fn test_passive_scan_stops_at_first_repeat() {
        let engine = CbcEngine::from_core(SBox::shuffled(&Key::new([1; 16])));
        let ciphertext = [0x10, 0x20, 0x30, 0x20, 0x40, 0x30];

        let mut attacker = BirthdayAttacker::new(&engine);
        let collision = attacker.scan(&ciphertext).unwrap().unwrap();
        assert_eq!(collision.phase, Phase::Passive { block: 3 });
        assert_eq!(collision.block, 0x20);
        assert_eq!(collision.xor, 0x10 ^ 0x30);
        assert_eq!(collision.encryptions, 3);
        assert_eq!(attacker.encryptions(), 3);
        assert_eq!(attacker.table().len(), 2);
    }

    #[test]
    fn test_scan_without_repeat() {
        let engine = CbcEngine::from_core(SBox::shuffled(&Key::new([1; 16])));
        let mut attacker = BirthdayAttacker::new(&engine);
        assert_eq!(attacker.scan(&[1, 2, 3, 4]).unwrap(), None);
        assert_eq!(attacker.encryptions(), 3);
        assert_eq!(attacker.table().len(), 3);
    }

    #[test]
    fn test_scan_rejects_partial_blocks() {
        let width = BlockWidth::new(8).unwrap();
        let engine = CbcEngine::<Feistel>::init(&Key::new([0; 16]), width).unwrap();
        let mut attacker = BirthdayAttacker::new(&engine);
        assert!(matches!(
            attacker.scan(&[1, 2, 3]),
            Err(Error::MalformedCiphertext { len: 3, block_bytes: 2 })
        ));
    }

    #[test]
    fn test_gives_up() {
        let width = BlockWidth::new(16).unwrap();
        let engine = CbcEngine::<Feistel>::init(&Key::new([0; 16]), width).unwrap();
        let ciphertext = engine.encrypt(&[0; 8]).unwrap();

        let result = BirthdayAttacker::new(&engine).run(&ciphertext, MaxEncryptions(10));
        assert!(matches!(result, Err(Error::GaveUp { encryptions: 10 })));

        let result = BirthdayAttacker::new(&engine).run(&ciphertext, |n: u64| n >= 5);
        assert!(matches!(result, Err(Error::GaveUp { encryptions: 5 })));
    }

    #[test]
    fn test_expired_deadline() {
        let engine = CbcEngine::from_core(SBox::shuffled(&Key::new([2; 16])));
        let result = BirthdayAttacker::new(&engine).run(&[0x00], Deadline(Instant::now()));
        assert!(matches!(result, Err(Error::GaveUp { encryptions: 0 })));
    }

    #[test]
    fn test_active_phase_recovers_plaintext_xor() {
        let key = Key::new(*b"YELLOW SUBMARINE");
        let width = BlockWidth::new(8).unwrap();
        let engine = CbcEngine::<Feistel>::init(&key, width).unwrap();

        let mut rng = StdRng::seed_from_u64(11);
        let mut replay = rng.clone();
        let collision = BirthdayAttacker::new(&engine)
            .run_with(&mut rng, &[0, 0], Unbounded)
            .unwrap();
        let Phase::Active { iteration } = collision.phase else {
            panic!("an IV alone cannot collide");
        };
        assert_eq!(collision.encryptions, iteration);

        // replay the draws: one plaintext block, then one IV, per iteration
        let mut seen: Vec<(Block, Block)> = Vec::new();
        for _ in 0..iteration {
            let p = random::block(&mut replay, width).unwrap();
            let iv = random::block(&mut replay, width).unwrap();
            seen.push((p, engine.core().encrypt(p ^ iv)));
        }
        let (p_j, c_j) = seen[seen.len() - 1];
        assert_eq!(c_j, collision.block);
        let (p_i, _) = seen
            .iter()
            .find(|(_, c)| *c == c_j)
            .copied()
            .unwrap();
        assert_eq!(collision.xor, p_i ^ p_j);
    }
}
