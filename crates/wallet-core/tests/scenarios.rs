//! End-to-end scenarios mirroring the literal-value walkthroughs: exact
//! selection, insufficient balance, a swap for an exact amount, deferred
//! debit settlement and cancellation, and startup recovery of a stale
//! pending entry.

use std::sync::Arc;

use cashu::nuts::{BlindSignature, BlindedMessage, SwapRequest, SwapResponse};
use cashu::{Amount, Id, Proof, Secret, SecretKey as CashuSecretKey};
use k256::{ProjectivePoint, Scalar};
use mockito::{Server, ServerGuard};
use wallet_core::storage::{PersistedState, StorageAdapter};
use wallet_core::{InMemoryStorage, PaywallClient, PendingSnapshot, SelectionStrategy, Wallet, WalletConfigBuilder};

const KEYSET_ID_HEX: &str = "0011223344556677";
const DENOMINATION_BITS: u32 = 20;

struct MockMint {
    server: ServerGuard,
    mint_sk: k256::SecretKey,
}

impl MockMint {
    async fn start() -> Self {
        let mut server = Server::new_async().await;
        let mint_sk = k256::SecretKey::random(&mut rand::thread_rng());
        let pubkey_hex = {
            let pk: cashu::PublicKey = CashuSecretKey::from(mint_sk.clone()).public_key();
            pk.to_hex()
        };

        let keys_json: String = (0..DENOMINATION_BITS)
            .map(|bit| format!("\"{}\":\"{}\"", 1u64 << bit, pubkey_hex))
            .collect::<Vec<_>>()
            .join(",");

        server
            .mock("GET", "/v1/keysets")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(
                "{{\"keysets\":[{{\"id\":\"{KEYSET_ID_HEX}\",\"unit\":\"usd\",\"active\":true}}]}}"
            ))
            .create_async()
            .await;

        server
            .mock("GET", format!("/v1/keys/{KEYSET_ID_HEX}").as_str())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(
                "{{\"keysets\":[{{\"id\":\"{KEYSET_ID_HEX}\",\"unit\":\"usd\",\"keys\":{{{keys_json}}}}}]}}"
            ))
            .create_async()
            .await;

        // The exact Y values in the response are never matched against
        // the request positionally in this wallet's state-healing pass —
        // only the state matters (spec §4.G "validate the non-pending
        // portion in one batched state check"). A static all-unspent
        // response of ample length covers every scenario below.
        let unspent_body = {
            let states: Vec<String> = (0..16)
                .map(|_| format!("{{\"Y\":\"{pubkey_hex}\",\"state\":\"UNSPENT\"}}"))
                .collect();
            format!("{{\"states\":[{}]}}", states.join(","))
        };
        server
            .mock("POST", "/v1/checkstate")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(unspent_body)
            .create_async()
            .await;

        let signing_key = mint_sk.clone();
        server
            .mock("POST", "/v1/swap")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body_from_request(move |request| {
                let body = request.body().unwrap_or(&[]);
                let swap_request: SwapRequest =
                    serde_json::from_slice(body).expect("valid swap request");
                let signatures: Vec<BlindSignature> = swap_request
                    .outputs
                    .into_iter()
                    .map(|output| sign_output(&signing_key, &output))
                    .collect();
                serde_json::to_vec(&SwapResponse { signatures }).expect("serialize swap response")
            })
            .create_async()
            .await;

        Self { server, mint_sk }
    }

    fn url(&self) -> String {
        self.server.url()
    }
}

fn sign_output(mint_sk: &k256::SecretKey, output: &BlindedMessage) -> BlindSignature {
    let b: k256::PublicKey = output.blinded_secret.clone().into();
    let signed_point = ProjectivePoint::from(b) * Scalar::from(mint_sk.as_scalar_primitive());
    let signed = k256::PublicKey::try_from(signed_point).expect("valid curve point");
    BlindSignature {
        amount: output.amount,
        keyset_id: output.keyset_id.clone(),
        c: signed.into(),
    }
}

fn keyset_id() -> Id {
    Id::from_bytes(hex::decode(KEYSET_ID_HEX).unwrap())
}

fn proof(amount: u64, mint_sk: &k256::SecretKey) -> Proof {
    let secret = Secret::generate();
    let y = cashu::dhke::hash_to_curve(secret.as_bytes());
    let c_point = ProjectivePoint::from(y) * Scalar::from(mint_sk.as_scalar_primitive());
    let c = k256::PublicKey::try_from(c_point).expect("valid curve point");
    Proof::new(Amount::from_u64(amount), keyset_id(), secret, c.into())
}

async fn seeded_storage(amounts: &[u64], mint_sk: &k256::SecretKey) -> (Arc<InMemoryStorage>, Vec<Proof>) {
    let storage = Arc::new(InMemoryStorage::new());
    let proofs: Vec<Proof> = amounts.iter().map(|a| proof(*a, mint_sk)).collect();
    storage
        .save(PersistedState {
            proofs: proofs.clone(),
            pending: Vec::new(),
        })
        .await
        .unwrap();
    (storage, proofs)
}

// S1 — exact-match happy path: [1,2,4,8] selecting 3 yields {1,2}, no swap.
#[tokio::test]
async fn s1_exact_match_happy_path() {
    let mint = MockMint::start().await;
    let (storage, _proofs) = seeded_storage(&[1, 2, 4, 8], &mint.mint_sk).await;

    let wallet = Wallet::load(
        WalletConfigBuilder::new()
            .mint_url(mint.url().parse().unwrap())
            .storage(storage)
            .selector(SelectionStrategy::ExactMatch),
    )
    .await
    .unwrap();

    assert_eq!(wallet.balance().await, Amount::from_u64(15));

    let (token_str, send_proofs) = wallet.create_token(Amount::from_u64(3)).await.unwrap();
    let mut amounts: Vec<u64> = send_proofs.iter().map(|p| p.amount.to_u64()).collect();
    amounts.sort();
    assert_eq!(amounts, vec![1, 2]);

    let decoded = wallet_core::token::decode(&token_str).unwrap();
    let mut decoded_amounts: Vec<u64> = decoded.proofs.iter().map(|p| p.amount.to_u64()).collect();
    decoded_amounts.sort();
    assert_eq!(decoded_amounts, vec![1, 2]);

    assert_eq!(wallet.balance().await, Amount::from_u64(12));
}

// S2 — insufficient balance: [1,2,4,8] cannot cover 100.
#[tokio::test]
async fn s2_insufficient_balance() {
    let mint = MockMint::start().await;
    let (storage, _proofs) = seeded_storage(&[1, 2, 4, 8], &mint.mint_sk).await;

    let wallet = Wallet::load(
        WalletConfigBuilder::new()
            .mint_url(mint.url().parse().unwrap())
            .storage(storage),
    )
    .await
    .unwrap();

    let err = wallet
        .create_token(Amount::from_u64(100))
        .await
        .unwrap_err();

    match err {
        wallet_core::Error::InsufficientBalance(ctx) => {
            assert_eq!(ctx.requested, Amount::from_u64(100));
            assert_eq!(ctx.available, Amount::from_u64(15));
            assert_eq!(ctx.shortfall(), Amount::from_u64(85));
            assert!(err_user_message_contains_shortfall(&wallet_core::Error::InsufficientBalance(ctx)));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

fn err_user_message_contains_shortfall(err: &wallet_core::Error) -> bool {
    err.user_message().contains("85")
}

// S3 — swap for exact amount: [8] -> create_token(5) issues outputs
// {4,1} (send) + {2,1} (keep); balance goes from 8 to 3.
#[tokio::test]
async fn s3_swap_for_exact_amount() {
    let mint = MockMint::start().await;
    let (storage, _proofs) = seeded_storage(&[8], &mint.mint_sk).await;

    let wallet = Wallet::load(
        WalletConfigBuilder::new()
            .mint_url(mint.url().parse().unwrap())
            .storage(storage),
    )
    .await
    .unwrap();

    assert_eq!(wallet.balance().await, Amount::from_u64(8));

    let (token_str, send_proofs) = wallet.create_token(Amount::from_u64(5)).await.unwrap();
    let total: u64 = send_proofs.iter().map(|p| p.amount.to_u64()).sum();
    assert_eq!(total, 5);

    let decoded = wallet_core::token::decode(&token_str).unwrap();
    let decoded_total: u64 = decoded.proofs.iter().map(|p| p.amount.to_u64()).sum();
    assert_eq!(decoded_total, 5);

    assert_eq!(wallet.balance().await, Amount::from_u64(3));
}

// S4 — deferred debit, successful settlement via the paywall client.
#[tokio::test]
async fn s4_deferred_debit_successful_settlement() {
    let mint = MockMint::start().await;
    let (storage, _proofs) = seeded_storage(&[5, 5], &mint.mint_sk).await;

    let mut paywall_server = Server::new_async().await;
    paywall_server
        .mock("GET", "/api/v1/content/trackA")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"data":{"url":"https://cdn.example.com/trackA.mp3"}}"#)
        .create_async()
        .await;

    let wallet = Wallet::load(
        WalletConfigBuilder::new()
            .mint_url(mint.url().parse().unwrap())
            .storage(storage),
    )
    .await
    .unwrap()
    .with_paywall(PaywallClient::new(paywall_server.url()));

    assert_eq!(wallet.balance().await, Amount::from_u64(10));

    let access = wallet
        .pay_for_content("trackA", Amount::from_u64(10))
        .await
        .unwrap();
    assert_eq!(access.url.as_deref(), Some("https://cdn.example.com/trackA.mp3"));

    assert_eq!(wallet.balance().await, Amount::ZERO);
    assert_eq!(wallet.available_balance().await, Amount::ZERO);
}

// S5 — deferred debit, ambiguous failure before settlement: the paywall
// returns a 5xx, which reached the server but leaves the token's fate
// unknown, so the manager leaves the entry pending for the recovery timer
// and check-state validator rather than releasing proofs it cannot prove
// were never spent.
#[tokio::test]
async fn s5_deferred_debit_ambiguous_failure_stays_pending() {
    let mint = MockMint::start().await;
    let (storage, _proofs) = seeded_storage(&[5, 5], &mint.mint_sk).await;

    let mut paywall_server = Server::new_async().await;
    paywall_server
        .mock("GET", "/api/v1/content/trackA")
        .with_status(500)
        .with_body("internal error")
        .create_async()
        .await;

    let wallet = Wallet::load(
        WalletConfigBuilder::new()
            .mint_url(mint.url().parse().unwrap())
            .storage(storage),
    )
    .await
    .unwrap()
    .with_paywall(PaywallClient::new(paywall_server.url()));

    let err = wallet
        .pay_for_content("trackA", Amount::from_u64(10))
        .await
        .unwrap_err();
    assert!(matches!(err, wallet_core::Error::ServerError(_)));

    assert_eq!(wallet.balance().await, Amount::from_u64(10));
    assert_eq!(wallet.available_balance().await, Amount::ZERO);
}

// S5b — deferred debit, explicit rejection: a non-402 4xx reached the
// paywall, which still leaves the entry pending rather than releasing it
// (the paywall's rejection says nothing about whether the mint ultimately
// saw the token as spent).
#[tokio::test]
async fn s5b_deferred_debit_explicit_rejection_stays_pending() {
    let mint = MockMint::start().await;
    let (storage, _proofs) = seeded_storage(&[5, 5], &mint.mint_sk).await;

    let mut paywall_server = Server::new_async().await;
    paywall_server
        .mock("GET", "/api/v1/content/trackA")
        .with_status(403)
        .with_body("token already used")
        .create_async()
        .await;

    let wallet = Wallet::load(
        WalletConfigBuilder::new()
            .mint_url(mint.url().parse().unwrap())
            .storage(storage),
    )
    .await
    .unwrap()
    .with_paywall(PaywallClient::new(paywall_server.url()));

    let err = wallet
        .pay_for_content("trackA", Amount::from_u64(10))
        .await
        .unwrap_err();
    assert!(matches!(err, wallet_core::Error::PaymentRejected(_)));

    assert_eq!(wallet.available_balance().await, Amount::ZERO);
}

// S5c — deferred debit, the request never reaches the paywall at all: the
// only case that unambiguously means the proofs were never spent, so the
// manager releases them immediately.
#[tokio::test]
async fn s5c_deferred_debit_unreachable_paywall_releases_immediately() {
    let mint = MockMint::start().await;
    let (storage, _proofs) = seeded_storage(&[5, 5], &mint.mint_sk).await;

    let wallet = Wallet::load(
        WalletConfigBuilder::new()
            .mint_url(mint.url().parse().unwrap())
            .storage(storage),
    )
    .await
    .unwrap()
    .with_paywall(PaywallClient::new("http://127.0.0.1:1"));

    let err = wallet
        .pay_for_content("trackA", Amount::from_u64(10))
        .await
        .unwrap_err();
    assert!(matches!(err, wallet_core::Error::PaywallUnreachable(_)));

    assert_eq!(wallet.balance().await, Amount::from_u64(10));
    assert_eq!(wallet.available_balance().await, Amount::from_u64(10));
}

// S7 — receiving a token whose proofs cite a keyset the wallet has never
// resolved keys for (spec §4.A, §6.5 `keyset_refresh_on_unknown_id`).
// With the flag off the wallet fails fast after a single lookup; with it
// on, a `/v1/keysets` refresh is attempted before giving up.
#[tokio::test]
async fn s7_receive_token_rejects_unknown_keyset_id_fast_when_refresh_disabled() {
    let mint = MockMint::start().await;
    let unknown_id = Id::from_bytes(hex::decode("99887766554433fa").unwrap());

    let keys_mock = mint
        .server
        .mock("GET", format!("/v1/keys/{unknown_id}").as_str())
        .with_status(404)
        .with_body("unknown keyset")
        .expect(1)
        .create_async()
        .await;
    let keysets_mock = mint
        .server
        .mock("GET", "/v1/keysets")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(format!(
            "{{\"keysets\":[{{\"id\":\"{KEYSET_ID_HEX}\",\"unit\":\"usd\",\"active\":true}}]}}"
        ))
        .expect(1)
        .create_async()
        .await;

    let (storage, _proofs) = seeded_storage(&[], &mint.mint_sk).await;
    let wallet = Wallet::load(
        WalletConfigBuilder::new()
            .mint_url(mint.url().parse().unwrap())
            .storage(storage)
            .keyset_refresh_on_unknown_id(false),
    )
    .await
    .unwrap();

    let mut proof = proof(4, &mint.mint_sk);
    proof.keyset_id = unknown_id.clone();
    let token_str = wallet_core::token::encode(
        wallet.mint_url(),
        wallet.unit(),
        &vec![proof],
    )
    .unwrap();

    let err = wallet.receive_token(&token_str).await.unwrap_err();
    assert!(matches!(err, wallet_core::Error::UnknownKeyset(id) if id == unknown_id.to_string()));

    // `/v1/keysets` was only ever hit once, at load — no refresh attempt.
    keysets_mock.assert_async().await;
    keys_mock.assert_async().await;
}

#[tokio::test]
async fn s7_receive_token_refreshes_keysets_once_before_failing_when_enabled() {
    let mint = MockMint::start().await;
    let unknown_id = Id::from_bytes(hex::decode("99887766554433fa").unwrap());

    let keys_mock = mint
        .server
        .mock("GET", format!("/v1/keys/{unknown_id}").as_str())
        .with_status(404)
        .with_body("unknown keyset")
        .expect(2)
        .create_async()
        .await;
    // One call from `Wallet::load`, one more from the refresh-on-miss path.
    let keysets_mock = mint
        .server
        .mock("GET", "/v1/keysets")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(format!(
            "{{\"keysets\":[{{\"id\":\"{KEYSET_ID_HEX}\",\"unit\":\"usd\",\"active\":true}}]}}"
        ))
        .expect(2)
        .create_async()
        .await;

    let (storage, _proofs) = seeded_storage(&[], &mint.mint_sk).await;
    let wallet = Wallet::load(
        WalletConfigBuilder::new()
            .mint_url(mint.url().parse().unwrap())
            .storage(storage)
            .keyset_refresh_on_unknown_id(true),
    )
    .await
    .unwrap();

    let mut proof = proof(4, &mint.mint_sk);
    proof.keyset_id = unknown_id.clone();
    let token_str = wallet_core::token::encode(
        wallet.mint_url(),
        wallet.unit(),
        &vec![proof],
    )
    .unwrap();

    let err = wallet.receive_token(&token_str).await.unwrap_err();
    assert!(matches!(err, wallet_core::Error::UnknownKeyset(id) if id == unknown_id.to_string()));

    keysets_mock.assert_async().await;
    keys_mock.assert_async().await;
}

// S6 — startup recovery, stale pending: a persisted pending entry older
// than 10 minutes is settled automatically on load.
#[tokio::test]
async fn s6_startup_recovery_stale_pending() {
    let mint = MockMint::start().await;
    let storage = Arc::new(InMemoryStorage::new());
    let proofs = vec![proof(5, &mint.mint_sk), proof(5, &mint.mint_sk)];

    let sent_at = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs()
        .saturating_sub(700);

    storage
        .save(PersistedState {
            proofs: proofs.clone(),
            pending: vec![PendingSnapshot {
                reference: "trackA".to_string(),
                sent_at,
                proofs,
            }],
        })
        .await
        .unwrap();

    let wallet = Wallet::load(
        WalletConfigBuilder::new()
            .mint_url(mint.url().parse().unwrap())
            .storage(storage),
    )
    .await
    .unwrap();

    assert_eq!(wallet.balance().await, Amount::ZERO);
}
