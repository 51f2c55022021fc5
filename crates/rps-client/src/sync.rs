//! State synchronizer reconciling the local view with the ledger.
//!
//! Two reconciliation sources converge on the same operation: a polling
//! timer and the ledger's notification stream both trigger a full
//! snapshot refetch that replaces the cached view. Deltas are never
//! applied, so out-of-order and duplicated notifications are harmless.

use crate::secrets::{ClientSecret, ClientSecretStore, SecretStoreError};
use crate::view::GameView;
use rps_core::{
    AccountId, Choice, Commitment, Ledger, LedgerError, Nonce, Slot, TimeoutPolicy, TxResult,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Errors surfaced by action dispatchers
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("no active account")]
    NoAccount,

    #[error("local operator is not a registered player")]
    NotPlaying,

    /// The stored secret for this slot is gone; the reveal can never be
    /// produced and the opponent will eventually win by forfeiture.
    #[error("no stored secret for slot {0}; reveal cannot proceed")]
    SecretMissing(Slot),

    #[error(transparent)]
    Secrets(#[from] SecretStoreError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Source of the local operator's identity.
///
/// The active account can change underneath a running client (wallet
/// switch); the poll loop watches for that and forces a full
/// not-ready refetch so downstream permissions are recomputed.
pub trait AccountProvider: Send + Sync {
    fn active_account(&self) -> Option<AccountId>;
}

/// Fixed identity, for services and demos
pub struct StaticAccount(pub AccountId);

impl AccountProvider for StaticAccount {
    fn active_account(&self) -> Option<AccountId> {
        Some(self.0)
    }
}

/// Switchable identity, for tests and interactive shells
#[derive(Clone, Default)]
pub struct SwitchableAccount {
    current: Arc<Mutex<Option<AccountId>>>,
}

impl SwitchableAccount {
    pub fn new(initial: Option<AccountId>) -> Self {
        Self {
            current: Arc::new(Mutex::new(initial)),
        }
    }

    pub fn switch_to(&self, account: Option<AccountId>) {
        *self.current.lock().unwrap() = account;
    }
}

impl AccountProvider for SwitchableAccount {
    fn active_account(&self) -> Option<AccountId> {
        *self.current.lock().unwrap()
    }
}

/// Synchronizer tuning
#[derive(Clone, Copy, Debug)]
pub struct SyncConfig {
    /// Cadence of the background snapshot/account poll
    pub poll_interval: Duration,
    /// Must match the window the ledger arbitrates with
    pub timeout: TimeoutPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            timeout: TimeoutPolicy::default(),
        }
    }
}

struct SyncShared {
    ledger: Arc<dyn Ledger>,
    accounts: Arc<dyn AccountProvider>,
    secrets: ClientSecretStore,
    timeout: TimeoutPolicy,
    tx: watch::Sender<GameView>,
    last_account: Mutex<Option<AccountId>>,
}

impl SyncShared {
    /// One reconciliation pass: replace the cached view with a fresh
    /// full snapshot. `mark_not_ready` shows a loading state while the
    /// refetch is in flight (used for account switches, not for routine
    /// background refreshes). Fetch failures are transient: log and
    /// leave the stale view for the next tick to repair.
    async fn reload(&self, mark_not_ready: bool) {
        if mark_not_ready {
            self.tx.send_modify(|view| view.session.ready = false);
        }
        let account = self.accounts.active_account();
        *self.last_account.lock().unwrap() = account;
        match self.ledger.snapshot().await {
            Ok(snapshot) => {
                self.tx
                    .send_replace(GameView::synced(account, snapshot, self.timeout));
            }
            Err(err) => warn!(%err, "state refetch failed; retrying on the next tick"),
        }
    }
}

/// Owns the reconciliation loops and the published view.
///
/// Constructed explicitly with its ledger, account source and secret
/// store; consumers receive it (or a `subscribe()` receiver) directly.
/// Dropping it cancels both background tasks deterministically.
pub struct StateSynchronizer {
    shared: Arc<SyncShared>,
    poll_task: JoinHandle<()>,
    event_task: JoinHandle<()>,
}

impl StateSynchronizer {
    /// Spawns the poll and notification loops; must be called within a
    /// Tokio runtime. The first poll tick performs the initial fetch.
    pub fn new(
        ledger: Arc<dyn Ledger>,
        accounts: Arc<dyn AccountProvider>,
        secrets: ClientSecretStore,
        config: SyncConfig,
    ) -> Self {
        let (tx, _) = watch::channel(GameView::initial(config.timeout));
        let shared = Arc::new(SyncShared {
            ledger,
            accounts,
            secrets,
            timeout: config.timeout,
            tx,
            last_account: Mutex::new(None),
        });

        let poll_shared = shared.clone();
        let poll_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.poll_interval);
            loop {
                ticker.tick().await;
                let account = poll_shared.accounts.active_account();
                let switched = *poll_shared.last_account.lock().unwrap() != account;
                poll_shared.reload(switched).await;
            }
        });

        let mut events = shared.ledger.subscribe();
        let event_shared = shared.clone();
        let event_task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        debug!(?event, "ledger notification");
                        event_shared.reload(false).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "notification stream lagged; resynchronizing");
                        event_shared.reload(false).await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Self {
            shared,
            poll_task,
            event_task,
        }
    }

    /// Current merged view
    pub fn view(&self) -> GameView {
        self.shared.tx.borrow().clone()
    }

    /// Watch the merged view for changes
    pub fn subscribe(&self) -> watch::Receiver<GameView> {
        self.shared.tx.subscribe()
    }

    /// Force a reconciliation pass outside the regular cadence
    pub async fn reload_state(&self, mark_not_ready: bool) {
        self.shared.reload(mark_not_ready).await;
    }

    /// Register the local operator, paying at least price + bond
    pub async fn register(&self, payment: u64) -> Result<TxResult, ClientError> {
        let account = self.require_account()?;
        let result = self.shared.ledger.register(account, payment).await?;
        self.reload_state(false).await;
        Ok(result)
    }

    /// Pick a move: generate a nonce, persist the secret, then submit
    /// the binding commitment.
    ///
    /// The secret is written before the submission so a crash between
    /// the two leaves a reusable secret rather than an unrevealable
    /// commitment.
    pub async fn commit_choice(&self, choice: Choice) -> Result<TxResult, ClientError> {
        let account = self.require_account()?;
        let slot = self.my_slot(account)?;

        let nonce = Nonce::random();
        let commitment = Commitment::new(slot, choice, &nonce);
        self.shared
            .secrets
            .save(slot, &ClientSecret { choice, nonce })?;

        let result = self.shared.ledger.commit(account, commitment).await?;
        self.reload_state(false).await;
        Ok(result)
    }

    /// Disclose the move committed earlier, using the stored secret
    pub async fn reveal(&self) -> Result<TxResult, ClientError> {
        let account = self.require_account()?;
        let slot = self.my_slot(account)?;

        let secret = self
            .shared
            .secrets
            .load(slot)?
            .ok_or(ClientError::SecretMissing(slot))?;

        let result = self
            .shared
            .ledger
            .reveal(account, secret.choice, secret.nonce)
            .await?;

        // The reveal is on the ledger; the secret has served its purpose.
        if let Err(err) = self.shared.secrets.clear(slot) {
            warn!(%err, "failed to clear revealed secret");
        }

        self.reload_state(false).await;
        Ok(result)
    }

    /// Abort a stalled game (availability gated by `GameView::can_abort`)
    pub async fn abort(&self) -> Result<TxResult, ClientError> {
        let account = self.require_account()?;
        let result = self.shared.ledger.abort(account).await?;
        self.reload_state(false).await;
        Ok(result)
    }

    /// Claim victory against an opponent who failed to reveal in time
    pub async fn forfeit(&self) -> Result<TxResult, ClientError> {
        let account = self.require_account()?;
        let result = self.shared.ledger.forfeit(account).await?;
        self.reload_state(false).await;
        Ok(result)
    }

    fn require_account(&self) -> Result<AccountId, ClientError> {
        self.shared
            .accounts
            .active_account()
            .ok_or(ClientError::NoAccount)
    }

    fn my_slot(&self, account: AccountId) -> Result<Slot, ClientError> {
        self.view()
            .game
            .slot_of(account)
            .ok_or(ClientError::NotPlaying)
    }
}

impl Drop for StateSynchronizer {
    fn drop(&mut self) {
        self.poll_task.abort();
        self.event_task.abort();
    }
}
