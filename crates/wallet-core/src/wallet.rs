//! The wallet façade: wires components A-J together behind the surface a
//! host application drives (spec §2 "Data flow").

use std::sync::Arc;

use cashu::{Amount, CurrencyUnit, Proofs, ProofsMethods, Secret};
use tracing::{info, instrument};

use crate::blinding::{self, BlindedBatch};
use crate::config::{WalletConfig, WalletConfigBuilder};
use crate::error::Error;
use crate::keyset_cache::KeysetCache;
use crate::mint_client::MintClient;
use crate::paywall::{ContentAccess, PaywallClient};
use crate::pending::PendingManager;
use crate::selector;
use crate::storage::StorageAdapter;
use crate::store::{ChangeListener, ProofStore};
use crate::swap;
use crate::token;

/// The quote returned by [`Wallet::create_mint_quote`] (spec §3 "Mint
/// quote").
pub type MintQuote = cashu::nuts::nut04::MintQuoteBolt11Response;

/// The wallet core (spec §2). Owns the proof store, the keyset cache, the
/// mint client, and the deferred-debit manager; the token codec and
/// selector are free functions invoked through it.
pub struct Wallet {
    config: WalletConfig,
    store: Arc<ProofStore>,
    keyset_cache: KeysetCache,
    mint_client: Arc<MintClient>,
    pending: Arc<PendingManager>,
    paywall: Option<PaywallClient>,
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("mint_url", &self.config.mint_url)
            .field("unit", &self.config.unit)
            .finish_non_exhaustive()
    }
}

impl Wallet {
    /// Build and hydrate a wallet from `builder` (spec §6.5). Performs the
    /// full startup sequence: load the store, fetch active keysets, and
    /// run deferred-debit startup validation (spec §4.G "Startup
    /// validation").
    #[instrument(skip(builder))]
    pub async fn load(builder: WalletConfigBuilder) -> Result<Self, Error> {
        let (config, storage) = builder.build()?;
        Self::load_with_storage(config, storage).await
    }

    async fn load_with_storage(
        config: WalletConfig,
        storage: Arc<dyn StorageAdapter>,
    ) -> Result<Self, Error> {
        let store = Arc::new(ProofStore::new(storage));
        let persisted = store.load().await?;

        let mint_client = Arc::new(MintClient::new(config.mint_url.clone(), config.retry_budget));
        let keyset_cache = KeysetCache::new();
        keyset_cache.load(&mint_client, &config.unit).await?;

        let pending = PendingManager::new(Arc::clone(&store), Arc::clone(&mint_client));
        pending.startup_validate(persisted.pending).await?;

        info!(mint_url = %config.mint_url, unit = %config.unit, "wallet loaded");

        Ok(Self {
            config,
            store,
            keyset_cache,
            mint_client,
            pending,
            paywall: None,
        })
    }

    /// Attach a paywall client (component J) for [`Wallet::pay_for_content`].
    pub fn with_paywall(mut self, paywall: PaywallClient) -> Self {
        self.paywall = Some(paywall);
        self
    }

    /// Register a listener fired after every durable store mutation
    /// (spec §9 "Reactive notifications").
    pub async fn subscribe(&self, listener: ChangeListener) {
        self.store.subscribe(listener).await;
    }

    /// Total value of every proof, pending or not.
    pub async fn balance(&self) -> Amount {
        self.store.balance().await
    }

    /// `balance() - Σ pending proof amounts`.
    pub async fn available_balance(&self) -> Amount {
        self.store.available_balance().await
    }

    async fn active_keyset_id(&self) -> Result<cashu::Id, Error> {
        let keysets = self.keyset_cache.load(&self.mint_client, &self.config.unit).await?;
        Ok(keysets.active_keyset)
    }

    // --- Mint flow: user amount -> F -> B -> E(create quote) -> ... ----

    /// `E.create_quote`: request a Lightning invoice for `amount` (spec §4.E
    /// operation 1).
    #[instrument(skip(self))]
    pub async fn create_mint_quote(&self, amount: Amount) -> Result<MintQuote, Error> {
        self.mint_client
            .create_quote(amount, self.config.unit.clone())
            .await
    }

    /// `E.check_quote`: poll the invoice's payment state (spec §4.E
    /// operation 2).
    #[instrument(skip(self))]
    pub async fn check_mint_quote(&self, quote_id: &str) -> Result<MintQuote, Error> {
        self.mint_client.check_quote(quote_id).await
    }

    /// Blind, mint, unblind, and add the resulting proofs to the store
    /// (spec §2 mint data flow: `B -> E(mint) -> B(unblind) -> C(add)`).
    /// Fails with [`Error::QuoteNotPaid`] / [`Error::QuoteExpired`] rather
    /// than attempting a doomed mint call.
    #[instrument(skip(self))]
    pub async fn mint(&self, quote: &MintQuote) -> Result<(), Error> {
        use cashu::nuts::nut04::MintQuoteState;

        if quote.state != MintQuoteState::Paid {
            return Err(Error::QuoteNotPaid);
        }
        if is_expired(quote.expiry) {
            return Err(Error::QuoteExpired);
        }

        let keyset_id = self.active_keyset_id().await?;
        let keys = self
            .keyset_cache
            .ensure_keys(&self.mint_client, &keyset_id)
            .await?;

        let BlindedBatch { outputs, pending } = blinding::blind(quote.amount, &keyset_id, &keys)?;
        let signatures = self
            .mint_client
            .mint(quote.quote.clone(), outputs)
            .await?;
        let proofs = blinding::unblind(signatures, pending, &keys)?;

        self.store.add(proofs).await
    }

    // --- Pay flow: price -> D(select) -> F(swap) -> H(encode) ----------

    /// Build a token of exactly `amount`, swapping change back into the
    /// store as needed (spec §2 pay data flow through `H`).
    #[instrument(skip(self))]
    pub async fn create_token(&self, amount: Amount) -> Result<(String, Proofs), Error> {
        let snapshot = self.store.snapshot().await;
        let selection = selector::select(self.config.selector, &snapshot.proofs, amount)?;

        let keyset_id = self.active_keyset_id().await?;
        let outcome = swap::split_to_exact(
            selection.selected.clone(),
            amount,
            &keyset_id,
            &self.mint_client,
            &self.keyset_cache,
        )
        .await?;

        let removed: Vec<Secret> = selection.selected.iter().map(|p| p.secret.clone()).collect();
        self.store.remove(&removed).await?;
        if !outcome.keep.is_empty() {
            self.store.add(outcome.keep).await?;
        }

        let encoded = token::encode(&self.config.mint_url, &self.config.unit, &outcome.send)?;
        Ok((encoded, outcome.send))
    }

    /// Decode and validate a token, then add its proofs to the store
    /// (receive flow — spec §4.H, §7 `ReceiveFailed`/`MintMismatch`).
    #[instrument(skip(self, token_str))]
    pub async fn receive_token(&self, token_str: &str) -> Result<Amount, Error> {
        let decoded = token::decode(token_str)?;
        if decoded.mint_url != self.config.mint_url {
            return Err(Error::MintMismatch {
                token_mint: decoded.mint_url.to_string(),
                wallet_mint: self.config.mint_url.to_string(),
            });
        }

        self.ensure_keysets_known(&decoded.proofs).await?;

        let amount = decoded
            .proofs
            .total_amount()
            .map_err(|e| Error::ReceiveFailed(e.to_string()))?;
        self.store
            .add(decoded.proofs)
            .await
            .map_err(|e| Error::ReceiveFailed(e.to_string()))?;
        Ok(amount)
    }

    /// Verify every proof's keyset is one the cache can resolve keys for,
    /// refreshing the active keyset list once on a miss when
    /// `keyset_refresh_on_unknown_id` allows it, before failing with
    /// [`Error::UnknownKeyset`] (spec §4.A, §6.5).
    async fn ensure_keysets_known(&self, proofs: &Proofs) -> Result<(), Error> {
        let mut seen = std::collections::HashSet::new();
        for proof in proofs {
            if !seen.insert(proof.keyset_id.clone()) {
                continue;
            }
            if self
                .keyset_cache
                .ensure_keys(&self.mint_client, &proof.keyset_id)
                .await
                .is_ok()
            {
                continue;
            }
            if !self.config.keyset_refresh_on_unknown_id {
                return Err(Error::UnknownKeyset(proof.keyset_id.to_string()));
            }
            self.keyset_cache
                .load(&self.mint_client, &self.config.unit)
                .await?;
            self.keyset_cache
                .ensure_keys(&self.mint_client, &proof.keyset_id)
                .await
                .map_err(|_| Error::UnknownKeyset(proof.keyset_id.to_string()))?;
        }
        Ok(())
    }

    // --- Paywall flow: H -> J -> G(mark_pending) ------------------------

    /// Build a token for `amount`, spend it against the paywall for
    /// `content_id`, and mark the sent proofs pending (spec §2 pay data
    /// flow `... -> paywall client -> G(mark_pending)`). The caller must
    /// follow up with [`Wallet::confirm_settlement`] once the server's
    /// final disposition is known, unless the immediate response already
    /// settles it (handled internally here on success).
    ///
    /// A failed request only releases the pending proofs immediately when
    /// the failure is unambiguous — the request never reached the paywall
    /// ([`Error::PaywallUnreachable`]). Any other failure (an explicit
    /// rejection, a 5xx, a timeout after the request was sent) leaves the
    /// entry `Pending`; the recovery timer and check-state validator in
    /// `pending.rs` adjudicate it rather than risk releasing proofs the
    /// paywall actually redeemed.
    #[instrument(skip(self))]
    pub async fn pay_for_content(
        &self,
        content_id: &str,
        amount: Amount,
    ) -> Result<ContentAccess, Error> {
        let paywall = self
            .paywall
            .as_ref()
            .ok_or_else(|| Error::ServerError("no paywall client configured".to_string()))?;

        let (token_str, sent_proofs) = self.create_token(amount).await?;
        self.pending
            .mark_pending(content_id.to_string(), sent_proofs)
            .await?;

        match paywall.request(content_id, &token_str).await {
            Ok(access) => {
                self.pending.resolve(content_id, true).await?;
                Ok(access)
            }
            Err(err) => {
                if matches!(err, Error::PaywallUnreachable(_)) {
                    self.pending.resolve(content_id, false).await?;
                }
                Err(err)
            }
        }
    }

    /// `G.resolve`: confirm settlement (`spent=true`) or release
    /// (`spent=false`) for a previously marked-pending reference.
    #[instrument(skip(self))]
    pub async fn confirm_settlement(&self, reference: &str, spent: bool) -> Result<(), Error> {
        self.pending.resolve(reference, spent).await
    }

    /// The configured mint and unit, for display purposes.
    pub fn mint_url(&self) -> &cashu::MintUrl {
        &self.config.mint_url
    }

    /// The configured currency unit.
    pub fn unit(&self) -> &CurrencyUnit {
        &self.config.unit
    }
}

fn is_expired(expiry: u64) -> bool {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    now > expiry
}
