//! The merged view consumers render from.

use chrono::{DateTime, Utc};
use rps_core::{AccountId, CompletedGame, Game, LedgerSnapshot, Slot, TimeoutPolicy};

/// Local operator state, separate from the cached game snapshot
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientSession {
    /// False until the first successful full fetch, and again while a
    /// refetch triggered by an account switch is in flight
    pub ready: bool,
    /// Identity of the local operator, if any
    pub account: Option<AccountId>,
}

/// Immutable merged view of session, cached game state and the most
/// recently finished game. Reconciliation always replaces the whole
/// value, so change detection is plain equality.
#[derive(Clone, Debug, PartialEq)]
pub struct GameView {
    pub session: ClientSession,
    pub game: Game,
    pub last_game: Option<CompletedGame>,
    timeout: TimeoutPolicy,
}

impl GameView {
    pub(crate) fn initial(timeout: TimeoutPolicy) -> Self {
        Self {
            session: ClientSession {
                ready: false,
                account: None,
            },
            game: Game::new(0, Utc::now()),
            last_game: None,
            timeout,
        }
    }

    pub(crate) fn synced(
        account: Option<AccountId>,
        snapshot: LedgerSnapshot,
        timeout: TimeoutPolicy,
    ) -> Self {
        Self {
            session: ClientSession {
                ready: true,
                account,
            },
            game: snapshot.game,
            last_game: snapshot.last_game,
            timeout,
        }
    }

    pub fn ready(&self) -> bool {
        self.session.ready
    }

    pub fn account(&self) -> Option<AccountId> {
        self.session.account
    }

    /// The slot the local operator occupies, if playing
    pub fn my_slot(&self) -> Option<Slot> {
        self.session
            .account
            .and_then(|account| self.game.slot_of(account))
    }

    pub fn is_playing(&self) -> bool {
        self.my_slot().is_some()
    }

    pub fn timeout_policy(&self) -> TimeoutPolicy {
        self.timeout
    }

    /// Whether the abort action is currently available to the operator.
    /// Recomputed continuously (e.g. on a countdown tick) to drive UI
    /// affordances; the ledger remains the final arbiter.
    pub fn can_abort(&self, now: DateTime<Utc>) -> bool {
        self.session.ready
            && self
                .session
                .account
                .map(|account| self.timeout.can_abort(&self.game, account, now))
                .unwrap_or(false)
    }

    /// Whether claiming victory by forfeiture is currently available.
    pub fn can_forfeit(&self, now: DateTime<Utc>) -> bool {
        self.session.ready
            && self
                .session
                .account
                .map(|account| self.timeout.can_forfeit(&self.game, account, now))
                .unwrap_or(false)
    }
}
