//! Commit-Reveal Rock-Paper-Scissors Core Library
//!
//! This crate provides the protocol logic for a two-player
//! commit-reveal Rock-Paper-Scissors game: the commitment scheme, the
//! phase/transition state machine, the timeout policy, and the
//! authoritative ledger interface with an in-memory serializing
//! implementation.

pub mod crypto;
pub mod game;
pub mod ledger;

pub use crypto::{Commitment, Nonce};
pub use game::{
    AccountId, Choice, CompletedGame, EndReason, Game, GameError, Outcome, Phase, Slot,
    TimeoutPolicy,
};
pub use ledger::{
    InMemoryLedger, Ledger, LedgerConfig, LedgerError, LedgerEvent, LedgerSnapshot, TxResult,
};
