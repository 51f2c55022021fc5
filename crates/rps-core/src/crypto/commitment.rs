//! Nonce and Commitment for the commit-reveal scheme.

use crate::game::{Choice, Slot};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Secret nonce blinding a committed choice
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nonce([u8; 32]);

impl Nonce {
    /// Create a new random nonce
    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the underlying bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Encode as a fixed-width (64 character) hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Decode from a 64 character hex string
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let bytes: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(bytes))
    }
}

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nonce({})", hex::encode(&self.0[..8]))
    }
}

/// Commitment = H(slot || choice || nonce)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Commitment([u8; 32]);

impl Commitment {
    /// Create a commitment binding a slot to its choice under a nonce
    pub fn new(slot: Slot, choice: Choice, nonce: &Nonce) -> Self {
        let mut hasher = Sha256::new();
        hasher.update([slot.as_u8(), choice.code()]);
        hasher.update(nonce.as_bytes());
        let result = hasher.finalize();
        Self(result.into())
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the underlying bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Verify that the given slot, choice and nonce produce this commitment
    pub fn verify(&self, slot: Slot, choice: Choice, nonce: &Nonce) -> bool {
        *self == Self::new(slot, choice, nonce)
    }
}

impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Commitment({})", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commitment_verification() {
        let nonce = Nonce::random();
        let commitment = Commitment::new(Slot::A, Choice::Rock, &nonce);

        assert!(commitment.verify(Slot::A, Choice::Rock, &nonce));
    }

    #[test]
    fn test_wrong_choice_fails_verification() {
        let nonce = Nonce::random();
        let commitment = Commitment::new(Slot::A, Choice::Rock, &nonce);

        assert!(!commitment.verify(Slot::A, Choice::Paper, &nonce));
        assert!(!commitment.verify(Slot::A, Choice::Scissors, &nonce));
    }

    #[test]
    fn test_wrong_slot_fails_verification() {
        let nonce = Nonce::random();
        let commitment = Commitment::new(Slot::A, Choice::Rock, &nonce);

        assert!(!commitment.verify(Slot::B, Choice::Rock, &nonce));
    }

    #[test]
    fn test_wrong_nonce_fails_verification() {
        let nonce = Nonce::random();
        let other = Nonce::random();
        let commitment = Commitment::new(Slot::A, Choice::Rock, &nonce);

        assert!(!commitment.verify(Slot::A, Choice::Rock, &other));
    }

    #[test]
    fn test_binding_across_choices_and_nonces() {
        // Distinct (choice, nonce) pairs must not collide.
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            for choice in [Choice::Rock, Choice::Paper, Choice::Scissors] {
                let commitment = Commitment::new(Slot::A, choice, &Nonce::random());
                assert!(seen.insert(*commitment.as_bytes()));
            }
        }
    }

    #[test]
    fn test_hiding_under_random_nonces() {
        // The same choice under independent nonces never repeats, so the
        // hash alone leaks nothing about the choice.
        for choice in [Choice::Rock, Choice::Paper, Choice::Scissors] {
            let mut seen = std::collections::HashSet::new();
            for _ in 0..500 {
                let commitment = Commitment::new(Slot::B, choice, &Nonce::random());
                assert!(seen.insert(*commitment.as_bytes()));
            }
        }
    }

    #[test]
    fn test_nonce_hex_roundtrip() {
        let nonce = Nonce::random();
        let encoded = nonce.to_hex();

        assert_eq!(encoded.len(), 64);
        assert_eq!(Nonce::from_hex(&encoded), Some(nonce));
    }

    #[test]
    fn test_nonce_from_bad_hex() {
        assert_eq!(Nonce::from_hex("zz"), None);
        assert_eq!(Nonce::from_hex("abcd"), None); // too short
    }
}
