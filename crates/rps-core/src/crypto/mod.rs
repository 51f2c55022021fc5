//! Cryptographic primitives for the commit-reveal scheme.

mod commitment;

pub use commitment::{Commitment, Nonce};
