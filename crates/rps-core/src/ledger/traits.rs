//! Ledger trait definition.

use crate::crypto::{Commitment, Nonce};
use crate::game::{AccountId, Choice, CompletedGame, Game, GameError, Phase, Slot};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

/// Errors from ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A state-machine guard rejected the action
    #[error("action rejected: {0}")]
    Rejected(#[from] GameError),

    #[error("insufficient payment: required {required}, provided {provided}")]
    InsufficientPayment { required: u64, provided: u64 },

    #[error("insufficient funds to cover the payment")]
    InsufficientFunds,

    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

/// Receipt for an accepted mutating operation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResult {
    /// The game the operation applied to
    pub game_number: u64,
    /// Overpayment returned to the caller (registration only)
    pub refund: u64,
}

/// Asynchronous one-shot-per-occurrence notifications.
///
/// Consumers must tolerate missed and duplicated deliveries; every
/// notification just triggers an idempotent full refetch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum LedgerEvent {
    PhaseChanged { game_number: u64, phase: Phase },
    PlayerRegistered { game_number: u64, slot: Slot, account: AccountId },
    PlayerCommitted { game_number: u64, slot: Slot },
    PlayerRevealed { game_number: u64, slot: Slot },
    GameOver(CompletedGame),
}

/// A consistent read of the full authoritative state
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub game: Game,
    pub last_game: Option<CompletedGame>,
}

/// Trait for the authoritative game store.
///
/// Mutating operations carry the caller identity explicitly, are applied
/// in some total order, and fail with a typed reason when a guard is
/// violated at their serialization point. Queries are read-only and
/// eventually consistent with the latest applied mutation.
///
/// Implementations can be:
/// - InMemoryLedger for tests and demos
/// - an adapter over a real deployed arbitration contract
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Register the caller, paying at least price + bond; the excess is
    /// returned via [`TxResult::refund`]
    async fn register(&self, caller: AccountId, payment: u64) -> Result<TxResult, LedgerError>;

    /// Record the caller's commitment
    async fn commit(&self, caller: AccountId, commitment: Commitment)
        -> Result<TxResult, LedgerError>;

    /// Disclose the caller's choice and nonce for verification
    async fn reveal(
        &self,
        caller: AccountId,
        choice: Choice,
        nonce: Nonce,
    ) -> Result<TxResult, LedgerError>;

    /// End a stalled game in the caller's favor
    async fn abort(&self, caller: AccountId) -> Result<TxResult, LedgerError>;

    /// Claim victory against an opponent who failed to reveal
    async fn forfeit(&self, caller: AccountId) -> Result<TxResult, LedgerError>;

    async fn phase(&self) -> Result<Phase, LedgerError>;
    async fn players(&self) -> Result<[Option<AccountId>; 2], LedgerError>;
    async fn committed(&self) -> Result<[bool; 2], LedgerError>;
    async fn commitments(&self) -> Result<[Option<Commitment>; 2], LedgerError>;
    async fn revealed(&self) -> Result<[bool; 2], LedgerError>;
    async fn choices(&self) -> Result<[Option<Choice>; 2], LedgerError>;
    async fn timeout_start_time(&self) -> Result<DateTime<Utc>, LedgerError>;
    async fn game_number(&self) -> Result<u64, LedgerError>;
    async fn last_game(&self) -> Result<Option<CompletedGame>, LedgerError>;

    /// Atomic read of the full state, used for every reconciliation pass
    async fn snapshot(&self) -> Result<LedgerSnapshot, LedgerError>;

    /// Subscribe to ledger notifications
    fn subscribe(&self) -> broadcast::Receiver<LedgerEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::EndReason;

    #[test]
    fn test_event_serialization() {
        let event = LedgerEvent::PlayerRegistered {
            game_number: 3,
            slot: Slot::B,
            account: AccountId::new(),
        };

        let json = serde_json::to_string(&event).unwrap();
        let deserialized: LedgerEvent = serde_json::from_str(&json).unwrap();

        assert_eq!(event, deserialized);
    }

    #[test]
    fn test_snapshot_serialization() {
        let snapshot = LedgerSnapshot {
            game: Game::new(5, chrono::Utc::now()),
            last_game: Some(CompletedGame {
                game_number: 4,
                players: [Some(AccountId::new()), Some(AccountId::new())],
                choices: [Some(Choice::Rock), Some(Choice::Paper)],
                winner: Some(Slot::B),
                reason: EndReason::Completed,
            }),
        };

        let json = serde_json::to_string(&snapshot).unwrap();
        let deserialized: LedgerSnapshot = serde_json::from_str(&json).unwrap();

        assert_eq!(snapshot, deserialized);
    }
}
