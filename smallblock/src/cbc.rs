use bytes::BytesMut;
use rand::rngs::OsRng;
use rand_core::RngCore;

use crate::{
    block::BlockWidth,
    cipher::{BlockCipher, Key},
    error::{Error, Result},
    random,
};

/// CBC mode with a fresh random IV per message. The IV is sent as ciphertext block 0.
pub struct CbcEngine<C: BlockCipher> {
    core: C,
    width: BlockWidth,
}

impl<C: BlockCipher> CbcEngine<C> {
    /// Initializes the underlying cipher with `key` for blocks of `width`.
    pub fn init(key: &Key, width: BlockWidth) -> Result<Self> {
        Ok(Self::from_core(C::init(key, width)?))
    }

    pub fn from_core(core: C) -> Self {
        let width = core.width();
        Self { core, width }
    }

    pub fn width(&self) -> BlockWidth {
        self.width
    }

    pub fn core(&self) -> &C {
        &self.core
    }

    /// Encrypts with an IV drawn from the operating system.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.encrypt_with(&mut OsRng, plaintext)
    }

    /// `C_0 = IV`, `C_i = E(P_i ^ C_{i-1})`. The plaintext must already be padded
    /// to whole blocks.
    pub fn encrypt_with(&self, rng: &mut impl RngCore, plaintext: &[u8]) -> Result<Vec<u8>> {
        let block_bytes = self.width.block_bytes();
        if plaintext.len() % block_bytes != 0 {
            return Err(Error::UnalignedPlaintext {
                len: plaintext.len(),
                block_bytes,
            });
        }

        let mut ciphertext = BytesMut::with_capacity(plaintext.len() + block_bytes);
        let mut prev = random::block(rng, self.width)?;
        self.width.write_block(prev, &mut ciphertext);

        for block in self.width.blocks(plaintext) {
            prev = self.core.encrypt(block ^ prev);
            self.width.write_block(prev, &mut ciphertext);
        }
        Ok(ciphertext.into())
    }

    /// `P_i = D(C_i) ^ C_{i-1}`. An IV on its own decrypts to an empty plaintext.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let block_bytes = self.width.block_bytes();
        if ciphertext.is_empty() || ciphertext.len() % block_bytes != 0 {
            return Err(Error::MalformedCiphertext {
                len: ciphertext.len(),
                block_bytes,
            });
        }

        let mut blocks = self.width.blocks(ciphertext);
        let mut prev = blocks.next().ok_or(Error::MalformedCiphertext {
            len: ciphertext.len(),
            block_bytes,
        })?;

        let mut plaintext = BytesMut::with_capacity(ciphertext.len() - block_bytes);
        for block in blocks {
            self.width
                .write_block(self.core.decrypt(block) ^ prev, &mut plaintext);
            prev = block;
        }
        Ok(plaintext.into())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rand::{rngs::StdRng, SeedableRng};

    use super::CbcEngine;
    use crate::{
        block::{Block, BlockWidth},
        cipher::{feistel::Feistel, sbox::SBox, BlockCipher, Key},
        error::Error,
        random::{self, Exhausted},
    };

    fn engine(half_bits: u32) -> CbcEngine<Feistel> {
        let width = BlockWidth::new(half_bits).unwrap();
        CbcEngine::init(&Key::new(*b"YELLOW SUBMARINE"), width).unwrap()
    }

    #[test]
    fn test_chaining() {
        let engine = CbcEngine::from_core(SBox::shuffled(&Key::new([5; 16])));
        let plaintext = b"CBC!";

        let mut rng = StdRng::seed_from_u64(1);
        let iv = random::block(&mut rng.clone(), engine.width());
        let ciphertext = engine.encrypt_with(&mut rng, plaintext).unwrap();

        assert_eq!(ciphertext.len(), plaintext.len() + 1);
        assert_eq!(Block::from(ciphertext[0]), iv.unwrap());
        let mut prev = Block::from(ciphertext[0]);
        for (p, c) in plaintext.iter().zip(&ciphertext[1..]) {
            assert_eq!(engine.core().encrypt(Block::from(*p) ^ prev), Block::from(*c));
            prev = Block::from(*c);
        }
    }

    #[test]
    fn test_round_trip() {
        let engine = engine(16);
        let plaintext = b"YELLOW SUBMARINE and then some..";
        let ciphertext = engine.encrypt(plaintext).unwrap();
        assert_eq!(ciphertext.len(), plaintext.len() + 4);
        assert_eq!(engine.decrypt(&ciphertext).unwrap(), plaintext);
    }

    #[test]
    fn test_non_deterministic() {
        let engine = engine(16);
        let plaintext = [0u8; 64];
        assert_ne!(
            engine.encrypt(&plaintext).unwrap(),
            engine.encrypt(&plaintext).unwrap()
        );
    }

    #[test]
    fn test_iv_only_decrypts_to_nothing() {
        let engine = engine(8);
        assert_eq!(engine.decrypt(&[0xde, 0xad]).unwrap(), Vec::<u8>::new());

        let ciphertext = engine.encrypt(&[]).unwrap();
        assert_eq!(ciphertext.len(), 2);
        assert!(engine.decrypt(&ciphertext).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_ciphertext() {
        let engine = engine(16);
        assert!(matches!(
            engine.decrypt(&[]),
            Err(Error::MalformedCiphertext { len: 0, block_bytes: 4 })
        ));
        assert!(matches!(
            engine.decrypt(&[0; 6]),
            Err(Error::MalformedCiphertext { len: 6, block_bytes: 4 })
        ));
    }

    #[test]
    fn test_unaligned_plaintext() {
        let engine = engine(16);
        assert!(matches!(
            engine.encrypt(b"abcde"),
            Err(Error::UnalignedPlaintext { len: 5, block_bytes: 4 })
        ));
    }

    #[test]
    fn test_no_iv_without_entropy() {
        let engine = engine(16);
        assert!(matches!(
            engine.encrypt_with(&mut Exhausted, b"abcd"),
            Err(Error::EntropyExhausted { needed: 4, .. })
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 48,
            .. ProptestConfig::default()
        })]

        #[test]
        fn decrypt_inverts_encrypt(
            key in any::<[u8; 16]>(),
            half_bits in prop::sample::select(vec![4u32, 8, 12, 16, 20, 24, 28, 32]),
            seed in any::<u64>(),
            blocks in 0usize..40,
        ) {
            let width = BlockWidth::new(half_bits).unwrap();
            let engine = CbcEngine::<Feistel>::init(&Key::new(key), width).unwrap();
            let mut rng = StdRng::seed_from_u64(seed);
            let mut plaintext = vec![0u8; blocks * width.block_bytes()];
            random::fill(&mut rng, &mut plaintext).unwrap();

            let ciphertext = engine.encrypt_with(&mut rng, &plaintext).unwrap();
            prop_assert_eq!(ciphertext.len(), plaintext.len() + width.block_bytes());
            prop_assert_eq!(engine.decrypt(&ciphertext).unwrap(), plaintext);
        }
    }
}
