//! CBC over small block widths, and the birthday attack that makes them unsafe.
//!
//! With a block of `n` bits, a CBC ciphertext repeats a block after roughly
//! `2^(n/2)` blocks. Since the block cipher is a permutation, two equal
//! ciphertext blocks `C_i == C_j` leak `P_i ^ P_j == C_{i-1} ^ C_{j-1}`.

pub mod attack;
pub mod block;
pub mod cbc;
pub mod cipher;
pub mod error;
pub mod load;
pub mod random;
pub mod table;

pub use error::{Error, Result};
