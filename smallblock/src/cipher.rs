use std::fmt;

use rand_core::RngCore;

use crate::{
    block::{Block, BlockWidth},
    error::{Error, Result},
    random,
};

/// 128-bit key of a block cipher.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Key([u8; Key::BYTES]);

impl Key {
    pub const BYTES: usize = 16;

    pub fn new(bytes: [u8; Key::BYTES]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; Key::BYTES] {
        &self.0
    }

    /// Parses 32 hex digits.
    pub fn from_hex(text: &str) -> Result<Self> {
        let bytes = hex::decode(text).map_err(|err| Error::InvalidKey(err.to_string()))?;
        let bytes: [u8; Key::BYTES] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            Error::InvalidKey(format!(
                "expected {} bytes, found {}",
                Key::BYTES,
                bytes.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn generate(rng: &mut impl RngCore) -> Result<Self> {
        let mut bytes = [0u8; Key::BYTES];
        random::fill(rng, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Key(..)")
    }
}

/// Keyed permutation over blocks of a fixed width.
///
/// For a fixed key `decrypt` must invert `encrypt`. The birthday attack relies on
/// `encrypt` being injective: equal outputs can only come from equal inputs.
pub trait BlockCipher {
    fn init(key: &Key, width: BlockWidth) -> Result<Self>
    where
        Self: Sized;
    fn width(&self) -> BlockWidth;
    fn encrypt(&self, block: Block) -> Block;
    fn decrypt(&self, block: Block) -> Block;
}

pub mod feistel {
    use aes::{
        cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit},
        Aes128,
    };

    use super::{BlockCipher, Key};
    use crate::{
        block::{Block, BlockWidth, HalfBlock},
        error::Result,
    };

    const ROUNDS: u8 = 8;

    /// Balanced Feistel network over two half-blocks, with AES-128 under the key
    /// as round function. Works for every supported width.
    pub struct Feistel {
        aes: Aes128,
        width: BlockWidth,
    }

    impl Feistel {
        fn round(&self, round: u8, half: HalfBlock) -> HalfBlock {
            let mut block = GenericArray::from([0u8; 16]);
            block[0] = round;
            block[1] = self.width.half_bits() as u8;
            block[4..8].copy_from_slice(&half.to_le_bytes());
            self.aes.encrypt_block(&mut block);
            HalfBlock::from_le_bytes([block[0], block[1], block[2], block[3]]) & self.width.half_mask()
        }
    }

    impl BlockCipher for Feistel {
        fn init(key: &Key, width: BlockWidth) -> Result<Self> {
            Ok(Self {
                aes: Aes128::new(GenericArray::from_slice(key.as_bytes())),
                width,
            })
        }

        fn width(&self) -> BlockWidth {
            self.width
        }

        fn encrypt(&self, block: Block) -> Block {
            let (mut left, mut right) = self.width.split(block);
            for round in 0..ROUNDS {
                (left, right) = (right, left ^ self.round(round, right));
            }
            self.width.join(left, right)
        }

        fn decrypt(&self, block: Block) -> Block {
            let (mut left, mut right) = self.width.split(block);
            for round in (0..ROUNDS).rev() {
                (left, right) = (right ^ self.round(round, left), left);
            }
            self.width.join(left, right)
        }
    }

    #[test]
    fn test_feistel_is_permutation() {
        let width = BlockWidth::new(4).unwrap();
        let feistel = Feistel::init(&Key::new([3; 16]), width).unwrap();

        let mut outputs: Vec<Block> = (0..=width.block_mask()).map(|b| feistel.encrypt(b)).collect();
        assert!(outputs.iter().all(|&c| c <= width.block_mask()));
        outputs.sort();
        outputs.dedup();
        assert_eq!(outputs.len(), 256);
    }

    #[test]
    fn test_feistel_inverse() {
        let key = Key::new(*b"YELLOW SUBMARINE");
        for half_bits in [4, 8, 12, 16, 24, 32] {
            let width = BlockWidth::new(half_bits).unwrap();
            let feistel = Feistel::init(&key, width).unwrap();
            for i in 0..500u64 {
                let block = i.wrapping_mul(0x9e37_79b9_7f4a_7c15) & width.block_mask();
                assert_eq!(feistel.decrypt(feistel.encrypt(block)), block);
            }
        }
    }

    #[test]
    fn test_feistel_depends_on_key() {
        let width = BlockWidth::new(16).unwrap();
        let a = Feistel::init(&Key::new([0; 16]), width).unwrap();
        let b = Feistel::init(&Key::new([1; 16]), width).unwrap();
        assert!((0..64).any(|block| a.encrypt(block) != b.encrypt(block)));
    }
}

pub mod sbox {
    use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

    use super::{BlockCipher, Key};
    use crate::{
        block::{Block, BlockWidth},
        error::{Error, Result},
    };

    /// Substitution table over the 8-bit domain, i.e. half-blocks of 4 bits.
    pub struct SBox {
        forward: [u8; 256],
        inverse: [u8; 256],
        width: BlockWidth,
    }

    impl SBox {
        /// Builds the cipher from an explicit table. Returns None if the table is not a bijection.
        pub fn from_table(forward: [u8; 256]) -> Option<Self> {
            let mut inverse = [0u8; 256];
            let mut seen = [false; 256];
            for (input, &output) in forward.iter().enumerate() {
                if seen[output as usize] {
                    return None;
                }
                seen[output as usize] = true;
                inverse[output as usize] = input as u8;
            }
            Some(Self {
                forward,
                inverse,
                width: BlockWidth::NIBBLE,
            })
        }

        /// Shuffles the identity table with a generator seeded from the key.
        pub fn shuffled(key: &Key) -> Self {
            let mut seed = [0u8; 32];
            seed[..Key::BYTES].copy_from_slice(key.as_bytes());
            seed[Key::BYTES..].copy_from_slice(key.as_bytes());

            let mut table: Vec<u8> = (0..=u8::MAX).collect();
            table.shuffle(&mut StdRng::from_seed(seed));

            let mut forward = [0u8; 256];
            forward.copy_from_slice(&table);
            let mut inverse = [0u8; 256];
            for (input, &output) in forward.iter().enumerate() {
                inverse[output as usize] = input as u8;
            }
            Self {
                forward,
                inverse,
                width: BlockWidth::NIBBLE,
            }
        }
    }

    impl BlockCipher for SBox {
        fn init(key: &Key, width: BlockWidth) -> Result<Self> {
            if width.half_bits() != 4 {
                return Err(Error::UnsupportedWidth(width.half_bits()));
            }
            Ok(Self::shuffled(key))
        }

        fn width(&self) -> BlockWidth {
            self.width
        }

        fn encrypt(&self, block: Block) -> Block {
            Block::from(self.forward[(block & 0xff) as usize])
        }

        fn decrypt(&self, block: Block) -> Block {
            Block::from(self.inverse[(block & 0xff) as usize])
        }
    }

    #[test]
    fn test_shuffled_is_bijection() {
        let sbox = SBox::shuffled(&Key::new([9; 16]));
        assert!(SBox::from_table(sbox.forward).is_some());
        for block in 0..256 {
            assert_eq!(sbox.decrypt(sbox.encrypt(block)), block);
        }
    }

    #[test]
    fn test_from_table_rejects_collisions() {
        let mut table = [0u8; 256];
        for (i, v) in table.iter_mut().enumerate() {
            *v = i as u8;
        }
        table[13] = table[5];
        assert!(SBox::from_table(table).is_none());
    }

    #[test]
    fn test_init_needs_nibble_halves() {
        let key = Key::new([0; 16]);
        assert!(SBox::init(&key, BlockWidth::new(4).unwrap()).is_ok());
        assert!(matches!(
            SBox::init(&key, BlockWidth::new(8).unwrap()),
            Err(Error::UnsupportedWidth(8))
        ));
    }
}

#[test]
fn test_key_hex() {
    let key = Key::from_hex("000102030405060708090a0b0c0d0e0f").unwrap();
    assert_eq!(key.as_bytes()[15], 0x0f);
    assert_eq!(key.to_hex(), "000102030405060708090a0b0c0d0e0f");

    assert!(matches!(Key::from_hex("0001"), Err(Error::InvalidKey(_))));
    assert!(matches!(Key::from_hex("zz0102030405060708090a0b0c0d0e0f"), Err(Error::InvalidKey(_))));
}

#[test]
fn test_generated_keys_differ() {
    let mut rng = rand::rngs::OsRng;
    assert_ne!(Key::generate(&mut rng).unwrap(), Key::generate(&mut rng).unwrap());
}
