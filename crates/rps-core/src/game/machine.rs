//! Phase transitions and validity rules.
//!
//! Transitions are pure: each takes the current [`Game`] snapshot plus
//! action parameters and returns either the next snapshot or a typed
//! error. Submitting the result to the authoritative ledger is a
//! separate step.

use super::timeout::TimeoutPolicy;
use super::types::{AccountId, Choice, EndReason, Game, Outcome, Phase, Slot};
use crate::crypto::{Commitment, Nonce};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Validation errors raised by the game state machine
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("caller is already registered for this game")]
    AlreadyRegistered,

    #[error("both player slots are taken")]
    GameFull,

    #[error("caller is not a registered player")]
    NotAPlayer,

    #[error("slot {0} has already committed")]
    AlreadyCommitted(Slot),

    #[error("slot {0} has already revealed")]
    AlreadyRevealed(Slot),

    #[error("choice and nonce do not match the recorded commitment")]
    CommitmentMismatch,

    #[error("action not permitted in phase {0}")]
    WrongPhase(Phase),

    #[error("timeout window has not elapsed")]
    TimeoutNotReached,
}

impl Game {
    /// Register `caller` in the first empty slot.
    ///
    /// When the second slot fills, the game enters the Commit phase.
    /// The timeout window restarts on every registration.
    pub fn register(&self, caller: AccountId, now: DateTime<Utc>) -> Result<Game, GameError> {
        if self.phase != Phase::Init {
            return Err(GameError::WrongPhase(self.phase));
        }
        if self.slot_of(caller).is_some() {
            return Err(GameError::AlreadyRegistered);
        }
        let slot = self
            .players
            .iter()
            .position(|p| p.is_none())
            .and_then(Slot::from_index)
            .ok_or(GameError::GameFull)?;

        let mut next = self.clone();
        next.players[slot.index()] = Some(caller);
        next.timeout_start_time = now;
        if next.player_count() == 2 {
            next.phase = Phase::Commit;
        }
        Ok(next)
    }

    /// Record `caller`'s commitment. Both commitments present moves the
    /// game to the Reveal phase and restarts the timeout window.
    pub fn commit(
        &self,
        caller: AccountId,
        commitment: Commitment,
        now: DateTime<Utc>,
    ) -> Result<Game, GameError> {
        if self.phase != Phase::Commit {
            return Err(GameError::WrongPhase(self.phase));
        }
        let slot = self.slot_of(caller).ok_or(GameError::NotAPlayer)?;
        if self.committed[slot.index()] {
            return Err(GameError::AlreadyCommitted(slot));
        }

        let mut next = self.clone();
        next.commitments[slot.index()] = Some(commitment);
        next.committed[slot.index()] = true;
        if next.both_committed() {
            next.phase = Phase::Reveal;
            next.timeout_start_time = now;
        }
        Ok(next)
    }

    /// Disclose `caller`'s choice and verify it against the recorded
    /// commitment. The second verified reveal resolves the match.
    pub fn reveal(
        &self,
        caller: AccountId,
        choice: Choice,
        nonce: &Nonce,
    ) -> Result<Game, GameError> {
        if self.phase != Phase::Reveal {
            return Err(GameError::WrongPhase(self.phase));
        }
        let slot = self.slot_of(caller).ok_or(GameError::NotAPlayer)?;
        if self.revealed[slot.index()] {
            return Err(GameError::AlreadyRevealed(slot));
        }
        let verified = self.commitments[slot.index()]
            .map(|c| c.verify(slot, choice, nonce))
            .unwrap_or(false);
        if !verified {
            return Err(GameError::CommitmentMismatch);
        }

        let mut next = self.clone();
        next.choices[slot.index()] = Some(choice);
        next.revealed[slot.index()] = true;
        if next.both_revealed() {
            if let (Some(a), Some(b)) = (next.choices[0], next.choices[1]) {
                next.outcome = Some(Outcome {
                    winner: resolve(a, b),
                    reason: EndReason::Completed,
                });
                next.phase = Phase::GameOver;
            }
        }
        Ok(next)
    }

    /// End a stalled game in `caller`'s favor.
    ///
    /// Permitted once the timeout window has elapsed, while waiting for
    /// an opponent in Init or while a committed caller waits for the
    /// opponent's commitment.
    pub fn abort(
        &self,
        caller: AccountId,
        policy: &TimeoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<Game, GameError> {
        let slot = self.slot_of(caller).ok_or(GameError::NotAPlayer)?;
        if !policy.is_timed_out(now, self.timeout_start_time) {
            return Err(GameError::TimeoutNotReached);
        }
        if !policy.can_abort(self, caller, now) {
            return Err(GameError::WrongPhase(self.phase));
        }

        let mut next = self.clone();
        next.outcome = Some(Outcome {
            winner: Some(slot),
            reason: EndReason::Aborted,
        });
        next.phase = Phase::GameOver;
        Ok(next)
    }

    /// Claim victory against an opponent who failed to reveal in time.
    pub fn forfeit(
        &self,
        caller: AccountId,
        policy: &TimeoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<Game, GameError> {
        let slot = self.slot_of(caller).ok_or(GameError::NotAPlayer)?;
        if !policy.is_timed_out(now, self.timeout_start_time) {
            return Err(GameError::TimeoutNotReached);
        }
        if !policy.can_forfeit(self, caller, now) {
            return Err(GameError::WrongPhase(self.phase));
        }

        let mut next = self.clone();
        next.outcome = Some(Outcome {
            winner: Some(slot),
            reason: EndReason::Forfeited,
        });
        next.phase = Phase::GameOver;
        Ok(next)
    }
}

/// Winner of `a` (slot 0) versus `b` (slot 1), or `None` on a draw
fn resolve(a: Choice, b: Choice) -> Option<Slot> {
    if a == b {
        None
    } else if a.beats(&b) {
        Some(Slot::A)
    } else {
        Some(Slot::B)
    }
}
