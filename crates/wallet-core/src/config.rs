//! Wallet configuration surface (spec §6.5), built with a `cdk`-style
//! `WalletBuilder`.

use std::sync::Arc;

use cashu::{CurrencyUnit, MintUrl};

use crate::error::Error;
use crate::selector::SelectionStrategy;
use crate::storage::StorageAdapter;

/// Recognized options on wallet construction (spec §6.5).
#[derive(Clone)]
pub struct WalletConfig {
    /// Base URL of the mint.
    pub mint_url: MintUrl,
    /// Currency unit that selects which active keyset is pinned.
    pub unit: CurrencyUnit,
    /// Proof selection strategy used by `create_token`.
    pub selector: SelectionStrategy,
    /// Non-negative number of network retries per mint operation.
    pub retry_budget: u32,
    /// If a received signature references an unknown keyset, refresh
    /// keysets once before failing.
    pub keyset_refresh_on_unknown_id: bool,
}

impl std::fmt::Debug for WalletConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletConfig")
            .field("mint_url", &self.mint_url)
            .field("unit", &self.unit)
            .field("selector", &self.selector)
            .field("retry_budget", &self.retry_budget)
            .field(
                "keyset_refresh_on_unknown_id",
                &self.keyset_refresh_on_unknown_id,
            )
            .finish()
    }
}

/// Builder for [`WalletConfig`] plus the storage adapter, mirroring
/// `cdk`'s `WalletBuilder` (`crates/cdk/src/wallet/builder.rs`) trimmed to
/// this spec's configuration surface — no Lightning backend, NUT-11/14
/// spending conditions, or auth-token fields.
#[derive(Default)]
pub struct WalletConfigBuilder {
    mint_url: Option<MintUrl>,
    storage: Option<Arc<dyn StorageAdapter>>,
    unit: Option<CurrencyUnit>,
    selector: Option<SelectionStrategy>,
    retry_budget: Option<u32>,
    keyset_refresh_on_unknown_id: Option<bool>,
}

impl WalletConfigBuilder {
    /// Start a new, empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Required: the mint this wallet instance talks to.
    pub fn mint_url(mut self, mint_url: MintUrl) -> Self {
        self.mint_url = Some(mint_url);
        self
    }

    /// Required: the durable storage adapter.
    pub fn storage(mut self, storage: Arc<dyn StorageAdapter>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Default `"usd"`.
    pub fn unit(mut self, unit: CurrencyUnit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Default smallest-first.
    pub fn selector(mut self, selector: SelectionStrategy) -> Self {
        self.selector = Some(selector);
        self
    }

    /// Default 1.
    pub fn retry_budget(mut self, retries: u32) -> Self {
        self.retry_budget = Some(retries);
        self
    }

    /// Default `true`.
    pub fn keyset_refresh_on_unknown_id(mut self, refresh: bool) -> Self {
        self.keyset_refresh_on_unknown_id = Some(refresh);
        self
    }

    /// Finalize into a `(WalletConfig, storage adapter)` pair.
    pub fn build(self) -> Result<(WalletConfig, Arc<dyn StorageAdapter>), Error> {
        let mint_url = self
            .mint_url
            .ok_or_else(|| Error::InvalidAmount("mint_url is required".to_string()))?;
        let storage = self
            .storage
            .ok_or_else(|| Error::InvalidAmount("storage is required".to_string()))?;

        Ok((
            WalletConfig {
                mint_url,
                unit: self.unit.unwrap_or_else(CurrencyUnit::usd),
                selector: self.selector.unwrap_or(SelectionStrategy::SmallestFirst),
                retry_budget: self.retry_budget.unwrap_or(1),
                keyset_refresh_on_unknown_id: self
                    .keyset_refresh_on_unknown_id
                    .unwrap_or(true),
            },
            storage,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;

    #[test]
    fn defaults_match_spec_6_5() {
        let (config, _storage) = WalletConfigBuilder::new()
            .mint_url("https://mint.example.com".parse().unwrap())
            .storage(Arc::new(InMemoryStorage::new()))
            .build()
            .unwrap();

        assert_eq!(config.unit, CurrencyUnit::usd());
        assert_eq!(config.selector, SelectionStrategy::SmallestFirst);
        assert_eq!(config.retry_budget, 1);
        assert!(config.keyset_refresh_on_unknown_id);
    }

    #[test]
    fn missing_mint_url_is_rejected() {
        let result = WalletConfigBuilder::new()
            .storage(Arc::new(InMemoryStorage::new()))
            .build();
        assert!(result.is_err());
    }
}
