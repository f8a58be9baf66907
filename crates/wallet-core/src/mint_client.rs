//! Mint client (component E, spec §4.E, §6.2): the HTTP dialog with a
//! conformant Cashu mint.
//!
//! Mirrors `cdk-common::http::client::HttpClient`'s thin `reqwest`
//! wrapper, with the retry policy spec §4.E and §6.5's `retry_budget`
//! require layered on top.

use cashu::nuts::{
    CheckStateRequest, CheckStateResponse, MintBolt11Request, MintBolt11Response,
    MintQuoteBolt11Request, MintQuoteBolt11Response, SwapRequest, SwapResponse,
};
use cashu::{
    BlindSignature, BlindedMessage, CurrencyUnit, Id, KeySet, KeySetInfo, Keys, MintUrl, Proofs,
    ProofState, PublicKey,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{instrument, warn};

use crate::error::Error;

#[derive(serde::Deserialize)]
struct KeysetsResponse {
    keysets: Vec<KeySetInfo>,
}

#[derive(serde::Deserialize)]
struct KeysResponseEntry {
    id: Id,
    unit: CurrencyUnit,
    keys: Keys,
}

#[derive(serde::Deserialize)]
struct KeysResponse {
    keysets: Vec<KeysResponseEntry>,
}

/// The HTTP dialog with one mint (component E).
#[derive(Debug, Clone)]
pub struct MintClient {
    inner: reqwest::Client,
    base_url: MintUrl,
    /// Non-negative number of retries per operation, beyond the first
    /// attempt (spec §6.5 `retry_budget`).
    retry_budget: u32,
}

impl MintClient {
    /// Construct a client against `base_url`, retrying each operation up
    /// to `retry_budget` additional times on network failure.
    pub fn new(base_url: MintUrl, retry_budget: u32) -> Self {
        Self {
            inner: reqwest::Client::new(),
            base_url,
            retry_budget,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.as_str(), path)
    }

    async fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R, Error> {
        self.with_retries(|| async {
            let response = self
                .inner
                .get(self.url(path))
                .send()
                .await
                .map_err(|e| Error::MintUnreachable(e.to_string()))?;
            decode(response, path).await
        })
        .await
    }

    async fn post<B: Serialize + Sync, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, Error> {
        self.with_retries(|| async {
            let response = self
                .inner
                .post(self.url(path))
                .json(body)
                .send()
                .await
                .map_err(|e| Error::MintUnreachable(e.to_string()))?;
            decode(response, path).await
        })
        .await
    }

    async fn with_retries<F, Fut, R>(&self, mut op: F) -> Result<R, Error>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<R, Error>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.retry_budget && is_retriable(&err) => {
                    warn!(attempt, error = %err, "retrying mint request");
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// `GET /v1/keysets`.
    #[instrument(skip(self))]
    pub async fn get_keysets(&self) -> Result<Vec<KeySetInfo>, Error> {
        let response: KeysetsResponse = self.get("/v1/keysets").await?;
        Ok(response.keysets)
    }

    /// `GET /v1/keys/{id}`.
    #[instrument(skip(self))]
    pub async fn get_keys(&self, id: &Id) -> Result<KeySet, Error> {
        let response: KeysResponse = self.get(&format!("/v1/keys/{id}")).await?;
        let entry = response
            .keysets
            .into_iter()
            .find(|k| &k.id == id)
            .ok_or_else(|| Error::UnknownKeyset(id.to_string()))?;
        Ok(KeySet {
            id: entry.id,
            unit: entry.unit,
            keys: entry.keys,
        })
    }

    /// `POST /v1/mint/quote/bolt11`.
    #[instrument(skip(self))]
    pub async fn create_quote(
        &self,
        amount: cashu::Amount,
        unit: CurrencyUnit,
    ) -> Result<MintQuoteBolt11Response, Error> {
        self.post(
            "/v1/mint/quote/bolt11",
            &MintQuoteBolt11Request { amount, unit },
        )
        .await
    }

    /// `GET /v1/mint/quote/bolt11/{id}`.
    #[instrument(skip(self))]
    pub async fn check_quote(&self, quote_id: &str) -> Result<MintQuoteBolt11Response, Error> {
        self.get(&format!("/v1/mint/quote/bolt11/{quote_id}")).await
    }

    /// `POST /v1/mint/bolt11`. Ordering of the returned signatures
    /// mirrors `outputs` (spec §4.E item 3).
    #[instrument(skip(self, outputs))]
    pub async fn mint(
        &self,
        quote_id: String,
        outputs: Vec<BlindedMessage>,
    ) -> Result<Vec<BlindSignature>, Error> {
        let expected_len = outputs.len();
        let response: MintBolt11Response = self
            .post(
                "/v1/mint/bolt11",
                &MintBolt11Request {
                    quote: quote_id,
                    outputs,
                },
            )
            .await?;
        ensure_ordering_preserved(response.signatures, expected_len)
    }

    /// `POST /v1/swap`. Precondition: `Σ inputs.amount == Σ outputs.amount`
    /// (checked by the caller — the swap/split engine — before this is
    /// invoked).
    #[instrument(skip(self, inputs, outputs))]
    pub async fn swap(
        &self,
        inputs: Proofs,
        outputs: Vec<BlindedMessage>,
    ) -> Result<Vec<BlindSignature>, Error> {
        let expected_len = outputs.len();
        let response: SwapResponse = self
            .post("/v1/swap", &SwapRequest { inputs, outputs })
            .await?;
        ensure_ordering_preserved(response.signatures, expected_len)
    }

    /// `POST /v1/checkstate`.
    #[instrument(skip(self, ys))]
    pub async fn check_state(&self, ys: Vec<PublicKey>) -> Result<Vec<ProofState>, Error> {
        let response: CheckStateResponse =
            self.post("/v1/checkstate", &CheckStateRequest { ys }).await?;
        Ok(response.states)
    }
}

fn ensure_ordering_preserved(
    signatures: Vec<BlindSignature>,
    expected_len: usize,
) -> Result<Vec<BlindSignature>, Error> {
    if signatures.len() != expected_len {
        return Err(Error::SwapFailed(format!(
            "mint returned {} signatures for {expected_len} outputs",
            signatures.len()
        )));
    }
    Ok(signatures)
}

async fn decode<R: DeserializeOwned>(response: reqwest::Response, path: &str) -> Result<R, Error> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(classify_http_error(status, path, body));
    }
    response
        .json()
        .await
        .map_err(|e| Error::ServerError(e.to_string()))
}

/// Classifies a non-2xx mint response by the endpoint that produced it, so
/// `code()` reflects which operation actually failed (spec §7 "dynamic
/// error codes") instead of always blaming the swap path.
fn classify_http_error(status: reqwest::StatusCode, path: &str, body: String) -> Error {
    if status.is_server_error() {
        return Error::MintUnreachable(format!("{status}: {body}"));
    }
    if path == "/v1/swap" {
        Error::SwapFailed(format!("{status}: {body}"))
    } else {
        Error::MintRejected(format!("{path}: {status}: {body}"))
    }
}

fn is_retriable(err: &Error) -> bool {
    matches!(err, Error::MintUnreachable(_))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retriable_errors_are_network_only() {
        assert!(is_retriable(&Error::MintUnreachable("x".into())));
        assert!(!is_retriable(&Error::SwapFailed("x".into())));
        assert!(!is_retriable(&Error::QuoteExpired));
    }

    #[test]
    fn non_swap_client_errors_are_not_blamed_on_swap() {
        let err = classify_http_error(
            reqwest::StatusCode::BAD_REQUEST,
            "/v1/mint/quote/bolt11",
            "bad request".to_string(),
        );
        assert!(matches!(err, Error::MintRejected(_)));
    }

    #[test]
    fn swap_client_errors_stay_swap_failed() {
        let err = classify_http_error(
            reqwest::StatusCode::BAD_REQUEST,
            "/v1/swap",
            "already spent".to_string(),
        );
        assert!(matches!(err, Error::SwapFailed(_)));
    }

    #[test]
    fn server_errors_are_mint_unreachable_regardless_of_path() {
        let err = classify_http_error(
            reqwest::StatusCode::BAD_GATEWAY,
            "/v1/swap",
            "".to_string(),
        );
        assert!(matches!(err, Error::MintUnreachable(_)));
    }

    #[test]
    fn url_concatenates_without_double_slash_assumption() {
        let client = MintClient::new("https://mint.example.com".parse().unwrap(), 1);
        assert_eq!(client.url("/v1/keysets"), "https://mint.example.com/v1/keysets");
    }
}
