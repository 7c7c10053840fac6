use thiserror::Error;

use crate::block::Block;

#[derive(Error, Debug)]
pub enum Error {
    #[error("unsupported half-block width of {0} bits (expected 4..=32 with a whole number of bytes per block)")]
    UnsupportedWidth(u32),

    #[error("random source could not supply {needed} bytes")]
    EntropyExhausted {
        needed: usize,
        #[source]
        source: rand_core::Error,
    },

    #[error("block {0:#x} is not in the collision table")]
    NotFound(Block),

    #[error("ciphertext of {len} bytes is not an IV followed by whole {block_bytes}-byte blocks")]
    MalformedCiphertext { len: usize, block_bytes: usize },

    #[error("plaintext of {len} bytes is not a multiple of the {block_bytes}-byte block size")]
    UnalignedPlaintext { len: usize, block_bytes: usize },

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("no collision found after {encryptions} encryptions")]
    GaveUp { encryptions: u64 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
