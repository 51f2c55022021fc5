//! Commit-reveal Rock-Paper-Scissors demo.
//!
//! Wires two synchronized clients to one in-memory ledger, plays a
//! complete game, then shows a stalled opponent being aborted against.

use rps_client::{ClientSecretStore, StateSynchronizer, StaticAccount, SyncConfig};
use rps_core::{AccountId, Choice, InMemoryLedger, LedgerConfig};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use uuid::Uuid;

fn spawn_client(
    ledger: &InMemoryLedger,
    dir: &Path,
    name: &str,
    account: AccountId,
) -> StateSynchronizer {
    StateSynchronizer::new(
        Arc::new(ledger.clone()),
        Arc::new(StaticAccount(account)),
        ClientSecretStore::new(dir.join(format!("{name}.json"))),
        SyncConfig {
            poll_interval: Duration::from_millis(250),
            timeout: ledger.policy(),
        },
    )
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let ledger = InMemoryLedger::new(LedgerConfig::default());
    // Pin the clock so the timeout round is deterministic
    ledger.advance_time(0);

    let alice = AccountId::new();
    let bob = AccountId::new();
    ledger.credit(alice, 1_000_000);
    ledger.credit(bob, 1_000_000);

    let secrets_dir = std::env::temp_dir().join(format!("rps-demo-{}", Uuid::new_v4()));
    let alice_client = spawn_client(&ledger, &secrets_dir, "alice", alice);
    let bob_client = spawn_client(&ledger, &secrets_dir, "bob", bob);

    let stake = ledger.config().stake();
    info!(%alice, %bob, stake, "table ready");

    // Round 1: a complete game
    alice_client.register(stake).await.expect("alice registers");
    let receipt = bob_client
        .register(stake + 25_000)
        .await
        .expect("bob registers");
    info!(refund = receipt.refund, "bob overpaid and was refunded");

    alice_client
        .commit_choice(Choice::Rock)
        .await
        .expect("alice commits");
    bob_client
        .commit_choice(Choice::Scissors)
        .await
        .expect("bob commits");

    alice_client.reveal().await.expect("alice reveals");
    bob_client.reveal().await.expect("bob reveals");

    if let Some(last) = alice_client.view().last_game {
        match last.winner {
            Some(slot) => {
                info!(game = last.game_number, winner = %slot, reason = %last.reason, "game finished")
            }
            None => info!(game = last.game_number, reason = %last.reason, "game drawn"),
        }
    }
    info!(
        alice_balance = ledger.balance(alice),
        bob_balance = ledger.balance(bob),
        "balances settled"
    );

    // Round 2: bob registers, then goes silent
    alice_client.register(stake).await.expect("alice registers");
    bob_client.register(stake).await.expect("bob registers");
    alice_client
        .commit_choice(Choice::Paper)
        .await
        .expect("alice commits");

    ledger.advance_time(61);
    let view = alice_client.view();
    info!(
        can_abort = view.can_abort(ledger.now()),
        "timeout window elapsed without bob's commitment"
    );

    alice_client.abort().await.expect("alice aborts");
    if let Some(last) = alice_client.view().last_game {
        info!(game = last.game_number, reason = %last.reason, "stalled game ended");
    }
    info!(
        alice_balance = ledger.balance(alice),
        bob_balance = ledger.balance(bob),
        "final balances"
    );
}
