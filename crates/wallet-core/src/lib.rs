//! Client-side ecash wallet core for a music paywall (spec §1): a local
//! store of Cashu (BDHKE) proofs plus the algorithms that mint proofs
//! against a paid Lightning invoice, split proofs into exact-denomination
//! payment tokens, track in-flight proofs under a deferred-debit
//! discipline, and optionally mirror state through NIP-60 relay events.

pub mod blinding;
pub mod config;
pub mod error;
pub mod keyset_cache;
pub mod mint_client;
pub mod paywall;
pub mod pending;
#[cfg(feature = "remote-state")]
pub mod remote_state;
pub mod selector;
pub mod storage;
pub mod store;
pub mod swap;
pub mod token;
pub mod wallet;

pub use config::{WalletConfig, WalletConfigBuilder};
pub use error::Error;
pub use keyset_cache::KeysetCache;
pub use mint_client::MintClient;
pub use paywall::{ContentAccess, PaywallClient, TwoChunkInfo};
pub use pending::{PendingManager, PendingSnapshot};
pub use selector::{SelectionResult, SelectionStrategy};
pub use storage::{Direction, HistoryEntry, InMemoryStorage, PersistedState, StorageAdapter};
pub use store::{ChangeListener, ProofStore, StoreEvent};
pub use token::{validate_token, DecodedToken, ValidationReport};
pub use wallet::{MintQuote, Wallet};

#[cfg(feature = "remote-state")]
pub use remote_state::RemoteStateAdapter;
