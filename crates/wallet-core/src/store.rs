//! The proof store (spec §4.C): the authoritative secret→proof mapping,
//! its pending-proof subtable, and persistence through a
//! [`StorageAdapter`].
//!
//! Mutation operations are non-suspending and serialize through a single
//! `tokio::sync::Mutex` (spec §5 "The store's mutation operations are
//! non-suspending and serialize naturally"); only the call out to the
//! storage adapter suspends.

use std::collections::HashMap;
use std::sync::Arc;

use cashu::{Amount, Proof, Proofs, PublicKey, Secret};
use tokio::sync::{Mutex, RwLock};

use crate::error::Error;
use crate::storage::{PersistedState, StorageAdapter};

/// A proof plus whether it is currently locked inside a pending entry.
/// The pending flag is store-local bookkeeping, not part of the wire
/// [`Proof`] — the deferred-debit manager drives it exclusively through
/// [`ProofStore::mark_pending`] / [`ProofStore::release_pending`].
#[derive(Debug, Clone)]
struct Entry {
    proof: Proof,
    pending: bool,
}

/// Balance snapshot returned by [`ProofStore::snapshot`], already
/// excluding pending proofs (spec §4.C "snapshot() ... must exclude
/// pending proofs").
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Non-pending proofs available for selection.
    pub proofs: Proofs,
}

/// A subscriber callback fired after a durable mutation (spec §9
/// "Reactive notifications ... the core must fire after the mutation is
/// durable").
pub type ChangeListener = Box<dyn Fn(StoreEvent) + Send + Sync>;

/// The two events the store's reactive surface exposes (spec §9).
#[derive(Debug, Clone, Copy)]
pub enum StoreEvent {
    /// `balance()` or `available_balance()` may have changed.
    BalanceChange,
    /// The proof set itself changed (added or removed).
    ProofsChange,
}

/// The authoritative proof store (component C).
#[derive(Debug)]
pub struct ProofStore {
    storage: Arc<dyn StorageAdapter>,
    entries: Mutex<HashMap<String, Entry>>,
    listeners: RwLock<Vec<ChangeListener>>,
    // Cached so that proof-only mutations (add/remove) don't clobber the
    // pending entries the deferred-debit manager has on file — the two
    // halves of persisted state are written by different owners but must
    // land in the same `save` call (spec §4.C "mutation ordering is
    // preserved").
    pending_cache: Mutex<Vec<crate::pending::PendingSnapshot>>,
}

impl ProofStore {
    /// Construct an empty store bound to a storage adapter. Call
    /// [`ProofStore::load`] before use.
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self {
            storage,
            entries: Mutex::new(HashMap::new()),
            listeners: RwLock::new(Vec::new()),
            pending_cache: Mutex::new(Vec::new()),
        }
    }

    /// Register a listener invoked after every durable mutation.
    pub async fn subscribe(&self, listener: ChangeListener) {
        self.listeners.write().await.push(listener);
    }

    async fn notify(&self, event: StoreEvent) {
        for listener in self.listeners.read().await.iter() {
            listener(event);
        }
    }

    /// Populate from the storage adapter. Pending entries are restored as
    /// pending proofs; their timers are not (the deferred-debit manager
    /// re-establishes them from the same persisted snapshot — spec §4.C,
    /// §4.G "Startup validation").
    pub async fn load(&self) -> Result<PersistedState, Error> {
        let state = self
            .storage
            .load()
            .await
            .map_err(|e| Error::LoadFailed(e.to_string()))?;

        let pending_secrets: std::collections::HashSet<&str> = state
            .pending
            .iter()
            .flat_map(|p| p.proofs.iter().map(|pr| pr.secret.as_str()))
            .collect();

        let mut entries = self.entries.lock().await;
        entries.clear();
        for proof in &state.proofs {
            let pending = pending_secrets.contains(proof.secret.as_str());
            entries.insert(
                proof.secret.as_str().to_string(),
                Entry {
                    proof: proof.clone(),
                    pending,
                },
            );
        }
        *self.pending_cache.lock().await = state.pending.clone();

        self.notify(StoreEvent::BalanceChange).await;
        self.notify(StoreEvent::ProofsChange).await;

        Ok(state)
    }

    async fn persist(&self) -> Result<(), Error> {
        let entries = self.entries.lock().await;
        let proofs: Proofs = entries.values().map(|e| e.proof.clone()).collect();
        drop(entries);

        let pending = self.pending_cache.lock().await.clone();
        self.storage
            .save(PersistedState { proofs, pending })
            .await
            .map_err(|e| Error::SaveFailed(e.to_string()))
    }

    /// Total value of every proof, pending or not (spec §8 invariant 1).
    pub async fn balance(&self) -> Amount {
        let entries = self.entries.lock().await;
        entries
            .values()
            .map(|e| e.proof.amount)
            .fold(Amount::ZERO, |acc, a| acc + a)
    }

    /// `balance() - Σ pending proof amounts` (spec §8 invariant 1).
    pub async fn available_balance(&self) -> Amount {
        let entries = self.entries.lock().await;
        entries
            .values()
            .filter(|e| !e.pending)
            .map(|e| e.proof.amount)
            .fold(Amount::ZERO, |acc, a| acc + a)
    }

    /// Append proofs. A duplicate secret is rejected wholesale — the spec
    /// requires this MUST NOT be silently dropped (spec §4.C).
    pub async fn add(&self, proofs: Proofs) -> Result<(), Error> {
        if proofs.is_empty() {
            return Ok(());
        }

        let mut entries = self.entries.lock().await;
        for proof in &proofs {
            if entries.contains_key(proof.secret.as_str()) {
                return Err(Error::ReceiveFailed(format!(
                    "duplicate proof secret `{}`",
                    proof.secret
                )));
            }
        }
        for proof in proofs {
            entries.insert(
                proof.secret.as_str().to_string(),
                Entry {
                    proof,
                    pending: false,
                },
            );
        }
        drop(entries);

        self.persist().await?;
        self.notify(StoreEvent::ProofsChange).await;
        self.notify(StoreEvent::BalanceChange).await;
        Ok(())
    }

    /// Remove proofs by secret. Unknown secrets are ignored silently,
    /// which is what makes at-most-once settlement safe without error
    /// plumbing (spec §4.C). Idempotent: calling twice with the same
    /// input has the same effect as calling once (spec §8 invariant 8).
    pub async fn remove(&self, secrets: &[Secret]) -> Result<(), Error> {
        let mut entries = self.entries.lock().await;
        let mut removed_any = false;
        for secret in secrets {
            if entries.remove(secret.as_str()).is_some() {
                removed_any = true;
            }
        }
        drop(entries);

        if removed_any {
            self.persist().await?;
            self.notify(StoreEvent::ProofsChange).await;
            self.notify(StoreEvent::BalanceChange).await;
        }
        Ok(())
    }

    /// First non-pending proof with exactly this amount, if any.
    pub async fn find_exact(&self, amount: Amount) -> Option<Proof> {
        let entries = self.entries.lock().await;
        entries
            .values()
            .find(|e| !e.pending && e.proof.amount == amount)
            .map(|e| e.proof.clone())
    }

    /// Number of non-pending proofs with exactly this amount.
    pub async fn count_exact(&self, amount: Amount) -> usize {
        let entries = self.entries.lock().await;
        entries
            .values()
            .filter(|e| !e.pending && e.proof.amount == amount)
            .count()
    }

    /// An immutable, pending-excluded view for the selector (spec §4.C,
    /// §4.D).
    pub async fn snapshot(&self) -> Snapshot {
        let entries = self.entries.lock().await;
        Snapshot {
            proofs: entries
                .values()
                .filter(|e| !e.pending)
                .map(|e| e.proof.clone())
                .collect(),
        }
    }

    /// Denomination → count over non-pending proofs, used to populate
    /// `InsufficientBalanceContext::denomination_counts` (spec §7).
    pub async fn denomination_counts(&self) -> Vec<(Amount, usize)> {
        let entries = self.entries.lock().await;
        let mut counts: std::collections::BTreeMap<Amount, usize> =
            std::collections::BTreeMap::new();
        for e in entries.values().filter(|e| !e.pending) {
            *counts.entry(e.proof.amount).or_insert(0) += 1;
        }
        counts.into_iter().collect()
    }

    /// Mark the given secrets pending (used internally by the
    /// deferred-debit manager, which owns the pending/non-pending
    /// transition policy — spec §4.G).
    pub(crate) async fn set_pending(&self, secrets: &[Secret], pending: bool) {
        let mut entries = self.entries.lock().await;
        for secret in secrets {
            if let Some(entry) = entries.get_mut(secret.as_str()) {
                entry.pending = pending;
            }
        }
        drop(entries);
        self.notify(StoreEvent::BalanceChange).await;
    }

    /// Begin tracking `proofs` as pending, whether or not they were
    /// already held non-pending — the deferred-debit manager calls this
    /// for proofs that never passed through [`ProofStore::add`] (e.g.
    /// freshly swapped outputs about to be handed to a counterparty, spec
    /// §4.G). A secret already present just has its pending flag flipped;
    /// an absent one is inserted pending. Without this, releasing proofs
    /// that were never in the store (`set_pending` alone) would silently
    /// no-op and the balance would never recover.
    pub(crate) async fn add_pending(&self, proofs: Proofs) -> Result<(), Error> {
        if proofs.is_empty() {
            return Ok(());
        }

        let mut entries = self.entries.lock().await;
        for proof in proofs {
            let secret = proof.secret.as_str().to_string();
            entries
                .entry(secret)
                .and_modify(|e| e.pending = true)
                .or_insert_with(|| Entry { proof, pending: true });
        }
        drop(entries);

        self.persist().await?;
        self.notify(StoreEvent::ProofsChange).await;
        self.notify(StoreEvent::BalanceChange).await;
        Ok(())
    }

    /// Look up a proof by its `Y` value (used to translate mint
    /// checkstate responses back into local secrets).
    pub async fn find_by_y(&self, y: PublicKey) -> Option<Proof> {
        let entries = self.entries.lock().await;
        entries
            .values()
            .find(|e| e.proof.y() == y)
            .map(|e| e.proof.clone())
    }

    /// Persist the current proof set together with an externally-owned
    /// pending snapshot (called by [`crate::pending::PendingManager`],
    /// which is the sole owner of pending-entry bookkeeping).
    pub(crate) async fn persist_with_pending(
        &self,
        pending: Vec<crate::pending::PendingSnapshot>,
    ) -> Result<(), Error> {
        *self.pending_cache.lock().await = pending;
        self.persist().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;
    use cashu::nuts::nut02::Id;
    use cashu::SecretKey;

    fn proof(amount: u64) -> Proof {
        Proof::new(
            Amount::from_u64(amount),
            Id::from_bytes(vec![0u8; 8]),
            Secret::generate(),
            SecretKey::generate().public_key(),
        )
    }

    #[tokio::test]
    async fn balance_equals_sum_of_proofs() {
        let store = ProofStore::new(Arc::new(InMemoryStorage::new()));
        store.load().await.unwrap();
        store
            .add(vec![proof(1), proof(2), proof(4), proof(8)])
            .await
            .unwrap();
        assert_eq!(store.balance().await, Amount::from_u64(15));
        assert_eq!(store.available_balance().await, Amount::from_u64(15));
    }

    #[tokio::test]
    async fn duplicate_secret_is_rejected() {
        let store = ProofStore::new(Arc::new(InMemoryStorage::new()));
        store.load().await.unwrap();
        let p = proof(4);
        store.add(vec![p.clone()]).await.unwrap();
        let err = store.add(vec![p]).await.unwrap_err();
        assert!(matches!(err, Error::ReceiveFailed(_)));
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let store = ProofStore::new(Arc::new(InMemoryStorage::new()));
        store.load().await.unwrap();
        let p = proof(4);
        store.add(vec![p.clone()]).await.unwrap();

        store.remove(&[p.secret.clone()]).await.unwrap();
        assert_eq!(store.balance().await, Amount::ZERO);

        // Second removal of the same (now-unknown) secret is a no-op.
        store.remove(&[p.secret]).await.unwrap();
        assert_eq!(store.balance().await, Amount::ZERO);
    }

    #[tokio::test]
    async fn snapshot_excludes_pending_proofs() {
        let store = ProofStore::new(Arc::new(InMemoryStorage::new()));
        store.load().await.unwrap();
        let p1 = proof(4);
        let p2 = proof(8);
        store.add(vec![p1.clone(), p2.clone()]).await.unwrap();

        store.set_pending(&[p1.secret.clone()], true).await;

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.proofs.len(), 1);
        assert_eq!(snapshot.proofs[0].secret, p2.secret);
        assert_eq!(store.available_balance().await, Amount::from_u64(8));
        assert_eq!(store.balance().await, Amount::from_u64(12));
    }
}
