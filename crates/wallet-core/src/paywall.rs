//! Paywall client (component J, spec §4.I, §6.3): the thin HTTP wrapper
//! that trades a token for a signed media URL.

use serde::Deserialize;
use tracing::{instrument, warn};

use crate::error::{Error, PaymentRequiredContext};

/// The result of a successful [`PaywallClient::request`].
#[derive(Debug, Clone)]
pub struct ContentAccess {
    /// The signed media URL, if the response carried JSON.
    pub url: Option<String>,
    /// Change token the server returned alongside the URL, if any.
    pub change_token: Option<String>,
    /// Raw media bytes, if the response body was audio/octet-stream.
    pub body: Option<Vec<u8>>,
    /// Two-chunk progress headers, passed through verbatim (spec §4.I,
    /// §6.3) — the core does not interpret them.
    pub two_chunk_info: TwoChunkInfo,
}

/// Passthrough headers surfacing two-chunk streaming state. Orthogonal to
/// the wallet state machine (spec §9 "Two chunk streaming").
#[derive(Debug, Clone, Default)]
pub struct TwoChunkInfo {
    /// `X-Chunk-Type`.
    pub chunk_type: Option<String>,
    /// `X-Payment-Required`.
    pub payment_required: Option<String>,
    /// `X-Payment-Settled`.
    pub payment_settled: Option<String>,
    /// `X-Resume-Token`.
    pub resume_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentResponseData {
    url: String,
    #[serde(default)]
    #[allow(dead_code)]
    stream_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    data: ContentResponseData,
    #[serde(default)]
    change: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentRequiredDetails {
    required: cashu::Amount,
    mint_url: String,
}

#[derive(Debug, Deserialize)]
struct PaymentRequiredErrorBody {
    details: PaymentRequiredDetails,
}

#[derive(Debug, Deserialize)]
struct PaymentRequiredBody {
    #[serde(default)]
    price_credits: Option<cashu::Amount>,
    #[serde(default)]
    mint_url: Option<String>,
    #[serde(default)]
    error: Option<PaymentRequiredErrorBody>,
}

/// Component J: posts a token and returns a media handle. Holds no wallet
/// state — every call is self-contained (spec §4.I).
#[derive(Debug, Clone)]
pub struct PaywallClient {
    inner: reqwest::Client,
    base_url: String,
}

impl PaywallClient {
    /// Construct a client against `base_url` (e.g. `https://paywall.example.com`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            inner: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// `GET /api/v1/content/{id}` with `X-Ecash-Token: <token>` (spec
    /// §6.3). No retry on 402; one retry on network error.
    #[instrument(skip(self, token))]
    pub async fn request(&self, content_id: &str, token: &str) -> Result<ContentAccess, Error> {
        let url = format!("{}/api/v1/content/{content_id}", self.base_url);

        let response = match self.send(&url, token).await {
            Ok(response) => response,
            Err(err) if err.is_retriable() => {
                warn!(content_id, "paywall request failed, retrying once");
                self.send(&url, token).await.map_err(|e| e.into_error())?
            }
            Err(err) => return Err(err.into_error()),
        };

        self.handle_response(response).await
    }

    async fn send(&self, url: &str, token: &str) -> Result<reqwest::Response, SendError> {
        self.inner
            .get(url)
            .header("X-Ecash-Token", token)
            .send()
            .await
            .map_err(SendError)
    }

    async fn handle_response(&self, response: reqwest::Response) -> Result<ContentAccess, Error> {
        let status = response.status();
        let two_chunk_info = TwoChunkInfo {
            chunk_type: header(&response, "X-Chunk-Type"),
            payment_required: header(&response, "X-Payment-Required"),
            payment_settled: header(&response, "X-Payment-Settled"),
            resume_token: header(&response, "X-Resume-Token"),
        };

        if status.as_u16() == 402 {
            let body: PaymentRequiredBody = response
                .json()
                .await
                .map_err(|e| Error::ServerError(e.to_string()))?;
            return Err(payment_required_error(body));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // A 5xx (or anything outside the ordinary client-error range)
            // leaves the server's handling of the token unknown; a 4xx is
            // an explicit rejection that reached the server.
            return Err(if status.is_server_error() {
                Error::ServerError(format!("{status}: {body}"))
            } else {
                Error::PaymentRejected(format!("{status}: {body}"))
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if content_type.starts_with("audio/") || content_type == "application/octet-stream" {
            let bytes = response
                .bytes()
                .await
                .map_err(|e| Error::ServerError(e.to_string()))?;
            return Ok(ContentAccess {
                url: None,
                change_token: None,
                body: Some(bytes.to_vec()),
                two_chunk_info,
            });
        }

        let parsed: ContentResponse = response
            .json()
            .await
            .map_err(|e| Error::ServerError(e.to_string()))?;
        Ok(ContentAccess {
            url: Some(parsed.data.url),
            change_token: parsed.change,
            body: None,
            two_chunk_info,
        })
    }
}

struct SendError(reqwest::Error);

impl SendError {
    fn is_retriable(&self) -> bool {
        self.0.is_timeout() || self.0.is_connect()
    }

    fn into_error(self) -> Error {
        if self.0.is_connect() {
            Error::PaywallUnreachable(self.0.to_string())
        } else {
            Error::ServerError(self.0.to_string())
        }
    }
}

fn header(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn payment_required_error(body: PaymentRequiredBody) -> Error {
    let (required, mint_url) = if let Some(details) = body.error {
        (details.details.required, details.details.mint_url)
    } else {
        (
            body.price_credits.unwrap_or(cashu::Amount::ZERO),
            body.mint_url.unwrap_or_default(),
        )
    };
    Error::PaymentRequired(PaymentRequiredContext { required, mint_url })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_credits_shape_maps_to_payment_required() {
        let body = PaymentRequiredBody {
            price_credits: Some(cashu::Amount::from_u64(5)),
            mint_url: Some("https://mint.example.com".to_string()),
            error: None,
        };
        match payment_required_error(body) {
            Error::PaymentRequired(ctx) => {
                assert_eq!(ctx.required, cashu::Amount::from_u64(5));
                assert_eq!(ctx.mint_url, "https://mint.example.com");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn nested_error_shape_maps_to_payment_required() {
        let body = PaymentRequiredBody {
            price_credits: None,
            mint_url: None,
            error: Some(PaymentRequiredErrorBody {
                details: PaymentRequiredDetails {
                    required: cashu::Amount::from_u64(7),
                    mint_url: "https://mint.example.com".to_string(),
                },
            }),
        };
        match payment_required_error(body) {
            Error::PaymentRequired(ctx) => {
                assert_eq!(ctx.required, cashu::Amount::from_u64(7));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
