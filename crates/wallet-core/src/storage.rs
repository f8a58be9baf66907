//! The storage adapter interface (spec §4.C "Persistence contract", §6.4)
//! and an in-memory reference implementation used by tests and as a
//! starting point for callers without their own durable store.
//!
//! Mirrors `cdk_common::database::wallet::Database` (`async_trait`, deep
//! copies passed to `save`) trimmed to exactly the four operations spec
//! §6.4 names: `load`, `save`, `loadHistory`, `saveHistory`.

use async_trait::async_trait;
use cashu::Proofs;
use tokio::sync::Mutex;

use crate::error::Error;
use crate::pending::PendingSnapshot;

/// Direction of a [`HistoryEntry`] (spec §6.4 kind 7376).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Value entered the wallet (mint, receive).
    In,
    /// Value left the wallet (send, pay).
    Out,
}

/// One entry of the wallet's transaction history, as mirrored into a NIP-60
/// kind 7376 event when the remote-state adapter is enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    /// In or out.
    pub direction: Direction,
    /// Amount moved.
    pub amount: cashu::Amount,
    /// Currency unit.
    pub unit: cashu::CurrencyUnit,
}

/// The durable state a storage adapter persists: the proof set plus any
/// pending entries (spec §4.C "load() restores pending entries but never
/// their timers").
#[derive(Debug, Clone, Default)]
pub struct PersistedState {
    /// All proofs, pending or not.
    pub proofs: Proofs,
    /// Pending entries as of the last save.
    pub pending: Vec<PendingSnapshot>,
}

/// Exclusively owned by the proof store; no other component may address
/// it directly (spec §5 "Shared resources").
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait StorageAdapter: std::fmt::Debug + Send + Sync {
    /// Restore the last-persisted proof set and pending entries.
    async fn load(&self) -> Result<PersistedState, Error>;

    /// Persist the full current state. Must be atomic against concurrent
    /// reads; the store passes deep copies so the adapter may retain the
    /// argument without aliasing live state.
    async fn save(&self, state: PersistedState) -> Result<(), Error>;

    /// Load transaction history.
    async fn load_history(&self) -> Result<Vec<HistoryEntry>, Error>;

    /// Persist transaction history.
    async fn save_history(&self, history: Vec<HistoryEntry>) -> Result<(), Error>;
}

/// A non-durable [`StorageAdapter`] backed by an in-process mutex. Used by
/// the integration tests (spec §8 S1-S6) and as the default for callers
/// who only need process-lifetime persistence.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    state: Mutex<PersistedState>,
    history: Mutex<Vec<HistoryEntry>>,
}

impl InMemoryStorage {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl StorageAdapter for InMemoryStorage {
    async fn load(&self) -> Result<PersistedState, Error> {
        Ok(self.state.lock().await.clone())
    }

    async fn save(&self, state: PersistedState) -> Result<(), Error> {
        *self.state.lock().await = state;
        Ok(())
    }

    async fn load_history(&self) -> Result<Vec<HistoryEntry>, Error> {
        Ok(self.history.lock().await.clone())
    }

    async fn save_history(&self, history: Vec<HistoryEntry>) -> Result<(), Error> {
        *self.history.lock().await = history;
        Ok(())
    }
}
