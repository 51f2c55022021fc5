//! Timeout window rules for abort and forfeiture.

use super::types::{AccountId, Game, Phase};
use chrono::{DateTime, Duration, Utc};

/// Decides whether time-gated actions are currently permitted.
///
/// All predicates are pure; the client recomputes them continuously to
/// drive UI affordances, and the ledger evaluates them once more when
/// the action is actually submitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeoutPolicy {
    window: Duration,
}

impl TimeoutPolicy {
    pub const DEFAULT_WINDOW_SECS: i64 = 60;

    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn from_secs(secs: i64) -> Self {
        Self::new(Duration::seconds(secs))
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// The window has elapsed strictly: false at exactly
    /// `started + window`, true one second later.
    pub fn is_timed_out(&self, now: DateTime<Utc>, started: DateTime<Utc>) -> bool {
        now > started + self.window
    }

    /// Abort is available to a registered caller once the window has
    /// elapsed, while waiting for an opponent in Init or while the
    /// caller's own commitment is in and the opponent's is not.
    pub fn can_abort(&self, game: &Game, caller: AccountId, now: DateTime<Utc>) -> bool {
        let Some(slot) = game.slot_of(caller) else {
            return false;
        };
        self.is_timed_out(now, game.timeout_start_time)
            && match game.phase {
                Phase::Init => game.player_count() < 2,
                Phase::Commit => game.committed[slot.index()],
                Phase::Reveal | Phase::GameOver => false,
            }
    }

    /// Forfeiture is available to a caller who has revealed while the
    /// opponent has not, once the window has elapsed.
    pub fn can_forfeit(&self, game: &Game, caller: AccountId, now: DateTime<Utc>) -> bool {
        let Some(slot) = game.slot_of(caller) else {
            return false;
        };
        self.is_timed_out(now, game.timeout_start_time)
            && game.phase == Phase::Reveal
            && game.revealed[slot.index()]
            && !game.revealed[slot.opponent().index()]
    }
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self::from_secs(Self::DEFAULT_WINDOW_SECS)
    }
}
