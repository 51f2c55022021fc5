//! In-memory serializing ledger for tests and demos.

use super::traits::{Ledger, LedgerError, LedgerEvent, LedgerSnapshot, TxResult};
use crate::crypto::{Commitment, Nonce};
use crate::game::{AccountId, Choice, CompletedGame, Game, Phase, TimeoutPolicy};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::info;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Deployment parameters of the game ledger
#[derive(Clone, Copy, Debug)]
pub struct LedgerConfig {
    /// Entry price per player, escrowed into the pot
    pub price: u64,
    /// Extra stake discouraging non-participation
    pub bond: u64,
    /// Timeout window in seconds
    pub window_secs: i64,
}

impl LedgerConfig {
    /// Minimum payment required at registration
    pub fn stake(&self) -> u64 {
        self.price + self.bond
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            price: 100_000,
            bond: 10_000,
            window_secs: TimeoutPolicy::DEFAULT_WINDOW_SECS,
        }
    }
}

struct LedgerInner {
    game: Game,
    last_game: Option<CompletedGame>,
    balances: HashMap<AccountId, u64>,
    pot: u64,
    /// Simulated current time (for timeout testing)
    current_time: Option<DateTime<Utc>>,
}

impl LedgerInner {
    fn now(&self) -> DateTime<Utc> {
        self.current_time.unwrap_or_else(Utc::now)
    }
}

/// Authoritative store holding the single game slot behind one mutex,
/// so concurrent mutations are applied in a total order and each is
/// validated against the state left by the previous one.
#[derive(Clone)]
pub struct InMemoryLedger {
    config: LedgerConfig,
    policy: TimeoutPolicy,
    inner: Arc<Mutex<LedgerInner>>,
    events: broadcast::Sender<LedgerEvent>,
}

impl InMemoryLedger {
    pub fn new(config: LedgerConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            policy: TimeoutPolicy::from_secs(config.window_secs),
            config,
            inner: Arc::new(Mutex::new(LedgerInner {
                game: Game::new(0, Utc::now()),
                last_game: None,
                balances: HashMap::new(),
                pot: 0,
                current_time: None,
            })),
            events,
        }
    }

    pub fn config(&self) -> LedgerConfig {
        self.config
    }

    /// The timeout policy this ledger arbitrates with
    pub fn policy(&self) -> TimeoutPolicy {
        self.policy
    }

    /// Get current time (real or simulated)
    pub fn now(&self) -> DateTime<Utc> {
        self.inner.lock().unwrap().now()
    }

    /// Advance simulated time by seconds
    pub fn advance_time(&self, seconds: i64) {
        let mut inner = self.inner.lock().unwrap();
        let current = inner.now();
        inner.current_time = Some(current + Duration::seconds(seconds));
    }

    /// Fund an account (test/demo fixture)
    pub fn credit(&self, account: AccountId, amount: u64) {
        let mut inner = self.inner.lock().unwrap();
        *inner.balances.entry(account).or_insert(0) += amount;
    }

    /// Current spendable balance of an account
    pub fn balance(&self, account: AccountId) -> u64 {
        self.inner
            .lock()
            .unwrap()
            .balances
            .get(&account)
            .copied()
            .unwrap_or(0)
    }

    fn emit(&self, events: Vec<LedgerEvent>) {
        for event in events {
            // No subscribers is fine
            let _ = self.events.send(event);
        }
    }

    /// Settle the pot, archive the finished game and start the next one.
    /// Only meaningful once `inner.game` has reached GameOver.
    fn finalize(inner: &mut LedgerInner) -> Option<CompletedGame> {
        let outcome = inner.game.outcome?;
        let pot = std::mem::take(&mut inner.pot);
        match outcome.winner {
            Some(slot) => {
                if let Some(winner) = inner.game.player(slot) {
                    *inner.balances.entry(winner).or_insert(0) += pot;
                }
            }
            None => {
                let share = pot / 2;
                for player in inner.game.players.into_iter().flatten() {
                    *inner.balances.entry(player).or_insert(0) += share;
                }
            }
        }

        let completed = CompletedGame {
            game_number: inner.game.game_number,
            players: inner.game.players,
            choices: inner.game.choices,
            winner: outcome.winner,
            reason: outcome.reason,
        };

        let now = inner.now();
        inner.game = Game::new(completed.game_number + 1, now);
        inner.last_game = Some(completed.clone());
        Some(completed)
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new(LedgerConfig::default())
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn register(&self, caller: AccountId, payment: u64) -> Result<TxResult, LedgerError> {
        let required = self.config.stake();
        if payment < required {
            return Err(LedgerError::InsufficientPayment {
                required,
                provided: payment,
            });
        }

        let mut pending = Vec::new();
        let result = {
            let mut inner = self.inner.lock().unwrap();
            let now = inner.now();
            let balance = inner.balances.get(&caller).copied().unwrap_or(0);
            if balance < payment {
                return Err(LedgerError::InsufficientFunds);
            }

            let prev_phase = inner.game.phase;
            let next = inner.game.register(caller, now)?;
            let slot = next.slot_of(caller);
            let game_number = next.game_number;
            let phase = next.phase;

            // Only price + bond is escrowed; the excess never leaves
            // the caller's balance and is reported back as the refund.
            inner.balances.insert(caller, balance - required);
            inner.pot += required;
            inner.game = next;

            if let Some(slot) = slot {
                pending.push(LedgerEvent::PlayerRegistered {
                    game_number,
                    slot,
                    account: caller,
                });
            }
            if phase != prev_phase {
                pending.push(LedgerEvent::PhaseChanged { game_number, phase });
            }

            TxResult {
                game_number,
                refund: payment - required,
            }
        };

        info!(account = %caller, game = result.game_number, refund = result.refund, "player registered");
        self.emit(pending);
        Ok(result)
    }

    async fn commit(
        &self,
        caller: AccountId,
        commitment: Commitment,
    ) -> Result<TxResult, LedgerError> {
        let mut pending = Vec::new();
        let result = {
            let mut inner = self.inner.lock().unwrap();
            let now = inner.now();

            let prev_phase = inner.game.phase;
            let next = inner.game.commit(caller, commitment, now)?;
            let slot = next.slot_of(caller);
            let game_number = next.game_number;
            let phase = next.phase;
            inner.game = next;

            if let Some(slot) = slot {
                pending.push(LedgerEvent::PlayerCommitted { game_number, slot });
            }
            if phase != prev_phase {
                pending.push(LedgerEvent::PhaseChanged { game_number, phase });
            }

            TxResult {
                game_number,
                refund: 0,
            }
        };

        info!(account = %caller, game = result.game_number, "commitment recorded");
        self.emit(pending);
        Ok(result)
    }

    async fn reveal(
        &self,
        caller: AccountId,
        choice: Choice,
        nonce: Nonce,
    ) -> Result<TxResult, LedgerError> {
        let mut pending = Vec::new();
        let result = {
            let mut inner = self.inner.lock().unwrap();

            let next = inner.game.reveal(caller, choice, &nonce)?;
            let slot = next.slot_of(caller);
            let game_number = next.game_number;
            inner.game = next;

            if let Some(slot) = slot {
                pending.push(LedgerEvent::PlayerRevealed { game_number, slot });
            }
            if inner.game.phase == Phase::GameOver {
                if let Some(completed) = Self::finalize(&mut inner) {
                    pending.push(LedgerEvent::GameOver(completed));
                    pending.push(LedgerEvent::PhaseChanged {
                        game_number: inner.game.game_number,
                        phase: inner.game.phase,
                    });
                }
            }

            TxResult {
                game_number,
                refund: 0,
            }
        };

        info!(account = %caller, game = result.game_number, %choice, "choice revealed");
        self.emit(pending);
        Ok(result)
    }

    async fn abort(&self, caller: AccountId) -> Result<TxResult, LedgerError> {
        let mut pending = Vec::new();
        let result = {
            let mut inner = self.inner.lock().unwrap();
            let now = inner.now();

            let next = inner.game.abort(caller, &self.policy, now)?;
            let game_number = next.game_number;
            inner.game = next;

            if let Some(completed) = Self::finalize(&mut inner) {
                pending.push(LedgerEvent::GameOver(completed));
                pending.push(LedgerEvent::PhaseChanged {
                    game_number: inner.game.game_number,
                    phase: inner.game.phase,
                });
            }

            TxResult {
                game_number,
                refund: 0,
            }
        };

        info!(account = %caller, game = result.game_number, "game aborted");
        self.emit(pending);
        Ok(result)
    }

    async fn forfeit(&self, caller: AccountId) -> Result<TxResult, LedgerError> {
        let mut pending = Vec::new();
        let result = {
            let mut inner = self.inner.lock().unwrap();
            let now = inner.now();

            let next = inner.game.forfeit(caller, &self.policy, now)?;
            let game_number = next.game_number;
            inner.game = next;

            if let Some(completed) = Self::finalize(&mut inner) {
                pending.push(LedgerEvent::GameOver(completed));
                pending.push(LedgerEvent::PhaseChanged {
                    game_number: inner.game.game_number,
                    phase: inner.game.phase,
                });
            }

            TxResult {
                game_number,
                refund: 0,
            }
        };

        info!(account = %caller, game = result.game_number, "victory claimed by forfeiture");
        self.emit(pending);
        Ok(result)
    }

    async fn phase(&self) -> Result<Phase, LedgerError> {
        Ok(self.inner.lock().unwrap().game.phase)
    }

    async fn players(&self) -> Result<[Option<AccountId>; 2], LedgerError> {
        Ok(self.inner.lock().unwrap().game.players)
    }

    async fn committed(&self) -> Result<[bool; 2], LedgerError> {
        Ok(self.inner.lock().unwrap().game.committed)
    }

    async fn commitments(&self) -> Result<[Option<Commitment>; 2], LedgerError> {
        Ok(self.inner.lock().unwrap().game.commitments)
    }

    async fn revealed(&self) -> Result<[bool; 2], LedgerError> {
        Ok(self.inner.lock().unwrap().game.revealed)
    }

    async fn choices(&self) -> Result<[Option<Choice>; 2], LedgerError> {
        Ok(self.inner.lock().unwrap().game.choices)
    }

    async fn timeout_start_time(&self) -> Result<DateTime<Utc>, LedgerError> {
        Ok(self.inner.lock().unwrap().game.timeout_start_time)
    }

    async fn game_number(&self) -> Result<u64, LedgerError> {
        Ok(self.inner.lock().unwrap().game.game_number)
    }

    async fn last_game(&self) -> Result<Option<CompletedGame>, LedgerError> {
        Ok(self.inner.lock().unwrap().last_game.clone())
    }

    async fn snapshot(&self) -> Result<LedgerSnapshot, LedgerError> {
        let inner = self.inner.lock().unwrap();
        Ok(LedgerSnapshot {
            game: inner.game.clone(),
            last_game: inner.last_game.clone(),
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{EndReason, GameError, Slot};

    const FUNDS: u64 = 1_000_000;

    fn funded_ledger() -> (InMemoryLedger, AccountId, AccountId) {
        let ledger = InMemoryLedger::default();
        let (p0, p1) = (AccountId::new(), AccountId::new());
        ledger.credit(p0, FUNDS);
        ledger.credit(p1, FUNDS);
        (ledger, p0, p1)
    }

    fn drain(rx: &mut broadcast::Receiver<LedgerEvent>) -> Vec<LedgerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    async fn play_to_reveal(
        ledger: &InMemoryLedger,
        p0: AccountId,
        p1: AccountId,
        c0: Choice,
        c1: Choice,
    ) -> (Nonce, Nonce) {
        let stake = ledger.config().stake();
        ledger.register(p0, stake).await.unwrap();
        ledger.register(p1, stake).await.unwrap();

        let nonce0 = Nonce::random();
        let nonce1 = Nonce::random();
        ledger
            .commit(p0, Commitment::new(Slot::A, c0, &nonce0))
            .await
            .unwrap();
        ledger
            .commit(p1, Commitment::new(Slot::B, c1, &nonce1))
            .await
            .unwrap();
        (nonce0, nonce1)
    }

    #[tokio::test]
    async fn test_underpayment_rejected() {
        let (ledger, p0, _) = funded_ledger();
        let config = ledger.config();

        let result = ledger.register(p0, config.price).await;
        assert!(matches!(
            result,
            Err(LedgerError::InsufficientPayment { required, provided })
                if required == config.stake() && provided == config.price
        ));
        assert_eq!(ledger.phase().await.unwrap(), Phase::Init);
    }

    #[tokio::test]
    async fn test_unfunded_account_rejected() {
        let ledger = InMemoryLedger::default();
        let result = ledger
            .register(AccountId::new(), ledger.config().stake())
            .await;
        assert!(matches!(result, Err(LedgerError::InsufficientFunds)));
    }

    #[tokio::test]
    async fn test_overpayment_refunded() {
        let (ledger, p0, _) = funded_ledger();
        let stake = ledger.config().stake();

        let result = ledger.register(p0, stake + 2_500).await.unwrap();
        assert_eq!(result.refund, 2_500);
        // Only the stake left the balance
        assert_eq!(ledger.balance(p0), FUNDS - stake);
    }

    #[tokio::test]
    async fn test_two_registrations_enter_commit() {
        let (ledger, p0, p1) = funded_ledger();
        let mut rx = ledger.subscribe();
        let stake = ledger.config().stake();

        ledger.register(p0, stake).await.unwrap();
        assert_eq!(ledger.phase().await.unwrap(), Phase::Init);

        ledger.register(p1, stake).await.unwrap();
        assert_eq!(ledger.phase().await.unwrap(), Phase::Commit);

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                LedgerEvent::PlayerRegistered {
                    game_number: 0,
                    slot: Slot::A,
                    account: p0,
                },
                LedgerEvent::PlayerRegistered {
                    game_number: 0,
                    slot: Slot::B,
                    account: p1,
                },
                LedgerEvent::PhaseChanged {
                    game_number: 0,
                    phase: Phase::Commit,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_full_game_pays_winner() {
        let (ledger, p0, p1) = funded_ledger();
        let stake = ledger.config().stake();
        let (nonce0, nonce1) = play_to_reveal(&ledger, p0, p1, Choice::Rock, Choice::Scissors).await;

        ledger.reveal(p0, Choice::Rock, nonce0).await.unwrap();
        ledger.reveal(p1, Choice::Scissors, nonce1).await.unwrap();

        let last = ledger.last_game().await.unwrap().unwrap();
        assert_eq!(last.winner, Some(Slot::A));
        assert_eq!(last.reason, EndReason::Completed);
        assert_eq!(last.choices, [Some(Choice::Rock), Some(Choice::Scissors)]);

        // Winner takes the whole pot, loser is down one stake
        assert_eq!(ledger.balance(p0), FUNDS + stake);
        assert_eq!(ledger.balance(p1), FUNDS - stake);

        // Fresh game follows immediately
        assert_eq!(ledger.game_number().await.unwrap(), 1);
        assert_eq!(ledger.phase().await.unwrap(), Phase::Init);
    }

    #[tokio::test]
    async fn test_draw_splits_pot() {
        let (ledger, p0, p1) = funded_ledger();
        let (nonce0, nonce1) = play_to_reveal(&ledger, p0, p1, Choice::Paper, Choice::Paper).await;

        ledger.reveal(p0, Choice::Paper, nonce0).await.unwrap();
        ledger.reveal(p1, Choice::Paper, nonce1).await.unwrap();

        let last = ledger.last_game().await.unwrap().unwrap();
        assert_eq!(last.winner, None);
        assert_eq!(ledger.balance(p0), FUNDS);
        assert_eq!(ledger.balance(p1), FUNDS);
    }

    #[tokio::test]
    async fn test_wrong_nonce_reveal_rejected() {
        let (ledger, p0, p1) = funded_ledger();
        play_to_reveal(&ledger, p0, p1, Choice::Rock, Choice::Paper).await;

        let result = ledger.reveal(p0, Choice::Rock, Nonce::random()).await;
        assert!(matches!(
            result,
            Err(LedgerError::Rejected(GameError::CommitmentMismatch))
        ));

        // Phase unchanged, nothing recorded
        assert_eq!(ledger.phase().await.unwrap(), Phase::Reveal);
        assert_eq!(ledger.revealed().await.unwrap(), [false, false]);
    }

    #[tokio::test]
    async fn test_duplicate_commit_rejected() {
        let (ledger, p0, p1) = funded_ledger();
        let stake = ledger.config().stake();
        ledger.register(p0, stake).await.unwrap();
        ledger.register(p1, stake).await.unwrap();

        let nonce = Nonce::random();
        let commitment = Commitment::new(Slot::A, Choice::Rock, &nonce);
        ledger.commit(p0, commitment).await.unwrap();

        let result = ledger.commit(p0, commitment).await;
        assert!(matches!(
            result,
            Err(LedgerError::Rejected(GameError::AlreadyCommitted(Slot::A)))
        ));
    }

    #[tokio::test]
    async fn test_abort_rolls_over_to_fresh_game() {
        let (ledger, p0, p1) = funded_ledger();
        let stake = ledger.config().stake();
        ledger.register(p0, stake).await.unwrap();
        ledger.register(p1, stake).await.unwrap();

        let nonce = Nonce::random();
        ledger
            .commit(p0, Commitment::new(Slot::A, Choice::Rock, &nonce))
            .await
            .unwrap();

        // Window not yet elapsed
        ledger.advance_time(60);
        let early = ledger.abort(p0).await;
        assert!(matches!(
            early,
            Err(LedgerError::Rejected(GameError::TimeoutNotReached))
        ));

        ledger.advance_time(1);
        ledger.abort(p0).await.unwrap();

        let last = ledger.last_game().await.unwrap().unwrap();
        assert_eq!(last.game_number, 0);
        assert_eq!(last.winner, Some(Slot::A));
        assert_eq!(last.reason, EndReason::Aborted);

        assert_eq!(ledger.game_number().await.unwrap(), 1);
        assert_eq!(ledger.phase().await.unwrap(), Phase::Init);
        assert_eq!(ledger.players().await.unwrap(), [None, None]);
        assert_eq!(ledger.balance(p0), FUNDS + stake);
    }

    #[tokio::test]
    async fn test_forfeit_after_partial_reveal() {
        let (ledger, p0, p1) = funded_ledger();
        let stake = ledger.config().stake();
        let (nonce0, _) = play_to_reveal(&ledger, p0, p1, Choice::Scissors, Choice::Rock).await;

        ledger.reveal(p0, Choice::Scissors, nonce0).await.unwrap();
        ledger.advance_time(61);
        ledger.forfeit(p0).await.unwrap();

        let last = ledger.last_game().await.unwrap().unwrap();
        assert_eq!(last.winner, Some(Slot::A));
        assert_eq!(last.reason, EndReason::Forfeited);
        assert_eq!(ledger.balance(p0), FUNDS + stake);
    }

    #[tokio::test]
    async fn test_game_over_event_carries_completed_record() {
        let (ledger, p0, p1) = funded_ledger();
        let (nonce0, nonce1) = play_to_reveal(&ledger, p0, p1, Choice::Rock, Choice::Paper).await;
        let mut rx = ledger.subscribe();

        ledger.reveal(p0, Choice::Rock, nonce0).await.unwrap();
        ledger.reveal(p1, Choice::Paper, nonce1).await.unwrap();

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            LedgerEvent::GameOver(completed)
                if completed.winner == Some(Slot::B) && completed.reason == EndReason::Completed
        )));
        assert!(events.contains(&LedgerEvent::PhaseChanged {
            game_number: 1,
            phase: Phase::Init,
        }));
    }
}
