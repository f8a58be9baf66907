//! Deferred-debit manager (component G, spec §4.G): the core correctness
//! engine. Proofs sent for content are not removed from the store until
//! the paywall server (or, failing that, the mint itself) attests
//! settlement — so an interrupted playback never silently burns credits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use cashu::{Proofs, ProofsMethods, Secret, State};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::mint_client::MintClient;
use crate::store::ProofStore;

/// Proofs remain pending for at most this long before a recovery
/// validation runs against the mint (spec §5 "Recovery timer: 60 s").
pub const T_RECOVERY: Duration = Duration::from_secs(60);

/// Proofs pending longer than this are treated as settled on the next
/// load, since they are almost certainly burned (spec §5 "Pending expiry:
/// 10 min").
pub const T_EXPIRY: Duration = Duration::from_secs(600);

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// The durable form of a pending entry (spec §3 "PendingEntry"), with no
/// timer handle — timers are re-established at load time, never
/// persisted (spec §4.C).
#[derive(Debug, Clone)]
pub struct PendingSnapshot {
    /// Content reference the proofs were sent for; the dedup key.
    pub reference: String,
    /// Wall-clock seconds at which the proofs were marked pending.
    pub sent_at: u64,
    /// The proofs held pending.
    pub proofs: Proofs,
}

struct PendingEntry {
    snapshot: PendingSnapshot,
    verifying: bool,
    timer: Option<JoinHandle<()>>,
    /// Distinguishes this entry from whatever may later occupy the same
    /// reference key, so a recovery task that resumes after a racing
    /// `mark_pending` replaced its entry can tell its result is stale
    /// instead of resolving the wrong proofs (spec §5 "Concurrency").
    generation: u64,
}

impl PendingEntry {
    fn abort_timer(&mut self) {
        if let Some(handle) = self.timer.take() {
            handle.abort();
        }
    }
}

/// Component G. Single-threaded cooperative: `mark_pending`, `resolve`,
/// and timer callbacks are all serialized on `entries`' mutex (spec §5
/// "Concurrency").
pub struct PendingManager {
    store: Arc<ProofStore>,
    mint_client: Arc<MintClient>,
    entries: Mutex<HashMap<String, PendingEntry>>,
    next_generation: AtomicU64,
}

impl std::fmt::Debug for PendingManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingManager").finish_non_exhaustive()
    }
}

impl PendingManager {
    /// Construct a manager over `store`, validating against `mint_client`
    /// when recovery timers fire. Must be wrapped in an `Arc` so timer
    /// callbacks can hold a handle back to the manager.
    pub fn new(store: Arc<ProofStore>, mint_client: Arc<MintClient>) -> Arc<Self> {
        Arc::new(Self {
            store,
            mint_client,
            entries: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
        })
    }

    fn next_generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::Relaxed)
    }

    /// `Idle -> Pending`. Evicts these secrets from any other entry that
    /// currently holds them first — cancelling that entry's timer if it
    /// becomes empty (spec §4.G precondition, §5 ordering guarantee, §8
    /// invariant 6). `proofs` need not already sit non-pending in the
    /// store — `ProofStore::add_pending` inserts them if absent, so
    /// freshly swapped outputs that never passed through the store's
    /// `add` path still become recoverable via `resolve`.
    pub async fn mark_pending(self: &Arc<Self>, reference: String, proofs: Proofs) -> Result<(), Error> {
        let secrets: Vec<Secret> = proofs.iter().map(|p| p.secret.clone()).collect();

        let mut entries = self.entries.lock().await;

        let secret_set: std::collections::HashSet<&str> =
            secrets.iter().map(|s| s.as_str()).collect();
        let mut emptied = Vec::new();
        for (other_ref, entry) in entries.iter_mut() {
            if other_ref == &reference {
                continue;
            }
            entry
                .snapshot
                .proofs
                .retain(|p| !secret_set.contains(p.secret.as_str()));
            if entry.snapshot.proofs.is_empty() {
                entry.abort_timer();
                emptied.push(other_ref.clone());
            }
        }
        for r in emptied {
            entries.remove(&r);
        }

        if let Some(mut old) = entries.remove(&reference) {
            old.abort_timer();
        }

        self.store.add_pending(proofs.clone()).await?;

        let snapshot = PendingSnapshot {
            reference: reference.clone(),
            sent_at: now(),
            proofs,
        };

        let timer = self.spawn_recovery_timer(reference.clone(), T_RECOVERY);
        entries.insert(
            reference,
            PendingEntry {
                snapshot,
                verifying: false,
                timer: Some(timer),
                generation: self.next_generation(),
            },
        );

        self.persist_locked(&entries).await
    }

    /// `Pending -> Settled` (`spent=true`) or `Pending -> Released`
    /// (`spent=false`). A no-op if `reference` has no pending entry,
    /// which keeps `resolve` safe to call from a racing cancellation
    /// path (spec §5 "Cancellation").
    pub async fn resolve(self: &Arc<Self>, reference: &str, spent: bool) -> Result<(), Error> {
        self.resolve_if_current(reference, None, spent).await
    }

    /// Same as [`Self::resolve`], but when `expected_generation` is
    /// `Some`, a no-op unless the live entry at `reference` is still the
    /// one that generation identifies — guards against a recovery task
    /// resuming after a racing `mark_pending` already replaced the entry
    /// it validated (spec §5 "Concurrency").
    async fn resolve_if_current(
        self: &Arc<Self>,
        reference: &str,
        expected_generation: Option<u64>,
        spent: bool,
    ) -> Result<(), Error> {
        let mut entries = self.entries.lock().await;
        let Some(entry) = entries.get(reference) else {
            return Ok(());
        };
        if let Some(expected) = expected_generation {
            if entry.generation != expected {
                debug!(reference, "recovery result stale, a newer pending entry has taken over");
                return Ok(());
            }
        }
        let mut entry = entries.remove(reference).expect("just checked present");
        entry.abort_timer();

        let secrets: Vec<Secret> = entry
            .snapshot
            .proofs
            .iter()
            .map(|p| p.secret.clone())
            .collect();

        if spent {
            self.store.remove(&secrets).await?;
            info!(reference, "pending entry settled, proofs removed");
        } else {
            self.store.set_pending(&secrets, false).await;
            info!(reference, "pending entry released, proofs freed");
        }

        self.persist_locked(&entries).await
    }

    fn spawn_recovery_timer(self: &Arc<Self>, reference: String, delay: Duration) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            manager.on_recovery_timer(&reference).await;
        })
    }

    /// Fires when a recovery timer elapses: `Pending -> Verifying`, then
    /// resolves based on the mint's answer (spec §4.G). Carries the
    /// entry's generation across the `validate_proofs` await so a
    /// `mark_pending` that races in and replaces this reference's entry
    /// can't have its new entry resolved by this stale result.
    async fn on_recovery_timer(self: &Arc<Self>, reference: &str) {
        let (proofs, generation) = {
            let mut entries = self.entries.lock().await;
            let Some(entry) = entries.get_mut(reference) else {
                debug!(reference, "recovery timer fired for absent entry, ignoring");
                return;
            };
            entry.verifying = true;
            entry.timer = None;
            (entry.snapshot.proofs.clone(), entry.generation)
        };

        match self.validate_proofs(&proofs).await {
            Ok(spent_secrets) => {
                if spent_secrets.is_empty() {
                    let _ = self.resolve_if_current(reference, Some(generation), false).await;
                } else {
                    self.resolve_partial_spend(reference, Some(generation), &spent_secrets).await;
                }
            }
            Err(err) => {
                warn!(reference, error = %err, "recovery validation failed, will retry on next startup");
                let mut entries = self.entries.lock().await;
                if let Some(entry) = entries.get_mut(reference) {
                    if entry.generation == generation {
                        entry.verifying = false;
                    }
                }
            }
        }
    }

    /// Ask the mint which of `proofs` are spent. Returns the spent
    /// secrets (spec §4.G, §6.2 operation 5).
    async fn validate_proofs(&self, proofs: &[cashu::Proof]) -> Result<Vec<Secret>, Error> {
        if proofs.is_empty() {
            return Ok(Vec::new());
        }
        let states = self.mint_client.check_state(proofs.ys()).await?;
        Ok(proofs
            .iter()
            .zip(states)
            .filter(|(_, state)| state.state == State::Spent)
            .map(|(proof, _)| proof.secret.clone())
            .collect())
    }

    /// As with [`Self::resolve_if_current`], `expected_generation` guards
    /// against a stale recovery task clobbering an entry that a racing
    /// `mark_pending` has since replaced.
    async fn resolve_partial_spend(
        self: &Arc<Self>,
        reference: &str,
        expected_generation: Option<u64>,
        spent_secrets: &[Secret],
    ) {
        let mut entries = self.entries.lock().await;
        let Some(entry) = entries.get(reference) else {
            return;
        };
        if let Some(expected) = expected_generation {
            if entry.generation != expected {
                debug!(reference, "partial-spend result stale, a newer pending entry has taken over");
                return;
            }
        }
        let mut entry = entries.remove(reference).expect("just checked present");
        entry.abort_timer();

        let all_secrets: Vec<Secret> = entry
            .snapshot
            .proofs
            .iter()
            .map(|p| p.secret.clone())
            .collect();
        let release_secrets: Vec<Secret> = all_secrets
            .iter()
            .filter(|s| !spent_secrets.contains(s))
            .cloned()
            .collect();

        if let Err(err) = self.store.remove(spent_secrets).await {
            warn!(reference, error = %err, "failed to remove spent proofs");
        }
        self.store.set_pending(&release_secrets, false).await;

        if let Err(err) = self.persist_locked(&entries).await {
            warn!(reference, error = %err, "failed to persist after partial spend");
        }
    }

    async fn persist_locked(&self, entries: &HashMap<String, PendingEntry>) -> Result<(), Error> {
        let snapshots: Vec<PendingSnapshot> =
            entries.values().map(|e| e.snapshot.clone()).collect();
        self.store.persist_with_pending(snapshots).await
    }

    /// Startup validation (spec §4.G "Startup validation"), run once
    /// after [`ProofStore::load`]:
    ///
    /// - entries older than [`T_EXPIRY`] are treated as settled;
    /// - entries between [`T_RECOVERY`] and [`T_EXPIRY`] old are
    ///   validated synchronously;
    /// - fresher entries get a timer for their remaining recovery
    ///   window;
    /// - the non-pending portion of the store is checked in one batch
    ///   and any mint-reported-spent proofs are removed, healing from
    ///   tokens externally copied and spent.
    pub async fn startup_validate(self: &Arc<Self>, persisted: Vec<PendingSnapshot>) -> Result<(), Error> {
        let current = now();

        for snapshot in persisted {
            let age = Duration::from_secs(current.saturating_sub(snapshot.sent_at));
            let reference = snapshot.reference.clone();

            if age > T_EXPIRY {
                let secrets: Vec<Secret> = snapshot.proofs.iter().map(|p| p.secret.clone()).collect();
                self.store.remove(&secrets).await?;
                info!(reference, "stale pending entry treated as settled on load");
                continue;
            }

            if age >= T_RECOVERY {
                let generation = self.restore_entry(snapshot.clone(), None).await;
                match self.validate_proofs(&snapshot.proofs).await {
                    Ok(spent) if spent.is_empty() => {
                        let _ = self.resolve_if_current(&reference, Some(generation), false).await;
                    }
                    Ok(spent) => {
                        self.resolve_partial_spend(&reference, Some(generation), &spent)
                            .await
                    }
                    Err(err) => {
                        warn!(reference, error = %err, "startup recovery validation failed");
                    }
                }
                continue;
            }

            let remaining = T_RECOVERY - age;
            let timer = self.spawn_recovery_timer(reference.clone(), remaining);
            self.restore_entry(snapshot, Some(timer)).await;
        }

        self.validate_non_pending_portion().await
    }

    async fn restore_entry(&self, snapshot: PendingSnapshot, timer: Option<JoinHandle<()>>) -> u64 {
        let secrets: Vec<Secret> = snapshot.proofs.iter().map(|p| p.secret.clone()).collect();
        self.store.set_pending(&secrets, true).await;

        let generation = self.next_generation();
        let mut entries = self.entries.lock().await;
        entries.insert(
            snapshot.reference.clone(),
            PendingEntry {
                snapshot,
                verifying: false,
                timer,
                generation,
            },
        );
        generation
    }

    /// Batch-check every non-pending proof still in the store and remove
    /// any the mint reports spent — the only way to heal from tokens
    /// externally copied and spent (spec §4.G).
    async fn validate_non_pending_portion(&self) -> Result<(), Error> {
        let snapshot = self.store.snapshot().await;
        if snapshot.proofs.is_empty() {
            return Ok(());
        }

        let states = match self.mint_client.check_state(snapshot.proofs.ys()).await {
            Ok(states) => states,
            Err(err) => {
                warn!(error = %err, "could not validate resting proofs on load");
                return Ok(());
            }
        };

        let spent_secrets: Vec<Secret> = snapshot
            .proofs
            .iter()
            .zip(states)
            .filter(|(_, state)| state.state == State::Spent)
            .map(|(proof, _)| proof.secret.clone())
            .collect();

        if !spent_secrets.is_empty() {
            info!(count = spent_secrets.len(), "removing externally-spent proofs found at load");
            self.store.remove(&spent_secrets).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;
    use cashu::nuts::nut02::Id;
    use cashu::{Amount, Proof, SecretKey};

    fn proof(amount: u64) -> Proof {
        Proof::new(
            Amount::from_u64(amount),
            Id::from_bytes(vec![0u8; 8]),
            Secret::generate(),
            SecretKey::generate().public_key(),
        )
    }

    fn manager() -> (Arc<ProofStore>, Arc<PendingManager>) {
        let store = Arc::new(ProofStore::new(Arc::new(InMemoryStorage::new())));
        let mint_client = Arc::new(MintClient::new("https://127.0.0.1:1".parse().unwrap(), 0));
        let manager = PendingManager::new(Arc::clone(&store), mint_client);
        (store, manager)
    }

    #[tokio::test]
    async fn mark_pending_reduces_available_balance_only() {
        let (store, manager) = manager();
        store.load().await.unwrap();
        let proofs = vec![proof(5), proof(5)];
        store.add(proofs.clone()).await.unwrap();

        manager
            .mark_pending("trackA".to_string(), proofs.clone())
            .await
            .unwrap();

        assert_eq!(store.available_balance().await, Amount::ZERO);
        assert_eq!(store.balance().await, Amount::from_u64(10));
    }

    #[tokio::test]
    async fn resolve_settled_removes_proofs() {
        let (store, manager) = manager();
        store.load().await.unwrap();
        let proofs = vec![proof(5), proof(5)];
        store.add(proofs.clone()).await.unwrap();
        manager.mark_pending("trackA".to_string(), proofs).await.unwrap();

        manager.resolve("trackA", true).await.unwrap();

        assert_eq!(store.balance().await, Amount::ZERO);
    }

    #[tokio::test]
    async fn resolve_released_restores_balance() {
        let (store, manager) = manager();
        store.load().await.unwrap();
        let proofs = vec![proof(5), proof(5)];
        store.add(proofs.clone()).await.unwrap();
        manager.mark_pending("trackA".to_string(), proofs).await.unwrap();

        manager.resolve("trackA", false).await.unwrap();

        assert_eq!(store.balance().await, Amount::from_u64(10));
        assert_eq!(store.available_balance().await, Amount::from_u64(10));
    }

    // Proofs swapped fresh out of the mint (e.g. the output of a
    // send-exact swap) are never passed through `ProofStore::add` before
    // they are marked pending. `mark_pending` must still make them
    // recoverable on release, not just flag a store entry that was never
    // created.
    #[tokio::test]
    async fn mark_pending_tracks_proofs_never_added_to_the_store() {
        let (store, manager) = manager();
        store.load().await.unwrap();
        let proofs = vec![proof(5), proof(5)];

        manager
            .mark_pending("trackA".to_string(), proofs.clone())
            .await
            .unwrap();
        assert_eq!(store.balance().await, Amount::from_u64(10));
        assert_eq!(store.available_balance().await, Amount::ZERO);

        manager.resolve("trackA", false).await.unwrap();

        assert_eq!(store.balance().await, Amount::from_u64(10));
        assert_eq!(store.available_balance().await, Amount::from_u64(10));
    }

    #[tokio::test]
    async fn second_mark_pending_moves_ownership_between_references() {
        let (store, manager) = manager();
        store.load().await.unwrap();
        let shared = proof(5);
        store.add(vec![shared.clone()]).await.unwrap();

        manager
            .mark_pending("trackA".to_string(), vec![shared.clone()])
            .await
            .unwrap();
        manager
            .mark_pending("trackB".to_string(), vec![shared.clone()])
            .await
            .unwrap();

        // trackA's entry should have been emptied and removed.
        manager.resolve("trackA", false).await.unwrap();
        // Balance still fully pending because trackB owns it now.
        assert_eq!(store.available_balance().await, Amount::ZERO);

        manager.resolve("trackB", false).await.unwrap();
        assert_eq!(store.available_balance().await, Amount::from_u64(5));
    }

    #[tokio::test]
    async fn startup_recovery_settles_stale_entries() {
        let (store, manager) = manager();
        store.load().await.unwrap();
        let proofs = vec![proof(5), proof(5)];
        store.add(proofs.clone()).await.unwrap();

        let stale = PendingSnapshot {
            reference: "trackA".to_string(),
            sent_at: now().saturating_sub(700),
            proofs,
        };

        manager.startup_validate(vec![stale]).await.unwrap();

        assert_eq!(store.balance().await, Amount::ZERO);
    }
}
