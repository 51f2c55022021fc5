//! Client-Side State Synchronizer Library
//!
//! Keeps a local read-only view of the authoritative game ledger
//! consistent through polling and event notifications, guards the
//! secret (choice, nonce) pairs between commit and reveal, and exposes
//! the action dispatchers consumers drive the game with.

pub mod secrets;
pub mod sync;
pub mod view;

pub use secrets::{ClientSecret, ClientSecretStore, SecretStoreError};
pub use sync::{
    AccountProvider, ClientError, StateSynchronizer, StaticAccount, SwitchableAccount, SyncConfig,
};
pub use view::{ClientSession, GameView};
