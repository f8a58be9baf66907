//! Keyset cache (component A, spec §4.A): fetch and memoize active mint
//! keysets. Keys for a keyset are immutable once served — refreshing may
//! reveal new keysets but never mutates an already-cached one.

use std::collections::HashMap;

use cashu::{CurrencyUnit, Id, KeySetInfo, Keys};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::error::Error;
use crate::mint_client::MintClient;

/// The result of [`KeysetCache::load`].
#[derive(Debug, Clone)]
pub struct ActiveKeysets {
    /// The keyset pinned for the wallet's configured unit.
    pub active_keyset: Id,
    /// Every keyset the mint currently reports as active.
    pub all_active: Vec<KeySetInfo>,
}

#[derive(Debug, Default)]
struct Cached {
    info: HashMap<Id, KeySetInfo>,
    keys: HashMap<Id, Keys>,
}

/// Component A. Append-only after first fetch (spec §5 "Shared
/// resources").
#[derive(Debug)]
pub struct KeysetCache {
    cache: RwLock<Cached>,
}

impl Default for KeysetCache {
    fn default() -> Self {
        Self::new()
    }
}

impl KeysetCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self {
            cache: RwLock::new(Cached::default()),
        }
    }

    /// Fetch `/v1/keysets`, pin the active keyset for `unit`, and
    /// memoize every active keyset's denomination map (spec §4.A).
    #[instrument(skip(self, client))]
    pub async fn load(&self, client: &MintClient, unit: &CurrencyUnit) -> Result<ActiveKeysets, Error> {
        let keysets = client.get_keysets().await?;
        let all_active: Vec<KeySetInfo> = keysets.into_iter().filter(|k| k.active).collect();

        let pinned = all_active
            .iter()
            .find(|k| &k.unit == unit)
            .ok_or_else(|| Error::UnknownKeyset(format!("no active keyset for unit `{unit}`")))?
            .clone();

        for info in &all_active {
            self.ensure_keys(client, &info.id).await?;
        }

        debug!(keyset_id = %pinned.id, "pinned active keyset");

        Ok(ActiveKeysets {
            active_keyset: pinned.id,
            all_active,
        })
    }

    /// Fetch and cache `/v1/keys/{id}` if not already cached. Existing
    /// entries are never overwritten — keys for a keyset are immutable
    /// once served (spec §4.A).
    pub async fn ensure_keys(&self, client: &MintClient, id: &Id) -> Result<Keys, Error> {
        if let Some(keys) = self.cache.read().await.keys.get(id) {
            return Ok(keys.clone());
        }

        let keyset = client.get_keys(id).await?;
        let mut cache = self.cache.write().await;
        // Another task may have raced us; keep whichever landed first so
        // the "immutable once served" guarantee holds even under
        // concurrent first-fetches.
        let keys = cache.keys.entry(id.clone()).or_insert(keyset.keys).clone();
        Ok(keys)
    }

    /// A previously-cached keyset's keys, without any network access.
    pub async fn cached_keys(&self, id: &Id) -> Option<Keys> {
        self.cache.read().await.keys.get(id).cloned()
    }

    /// Remember a keyset's metadata (unit, active flag) alongside its
    /// keys, so later lookups by id don't need another `/v1/keysets`
    /// round trip.
    pub async fn remember_info(&self, info: KeySetInfo) {
        self.cache.write().await.info.insert(info.id.clone(), info);
    }

    /// Previously-remembered keyset metadata.
    pub async fn cached_info(&self, id: &Id) -> Option<KeySetInfo> {
        self.cache.read().await.info.get(id).cloned()
    }
}
