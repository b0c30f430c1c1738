//! HTTP client for the PayMongo REST API.
//!
//! Authenticates with the account secret key as the Basic-auth username and
//! surfaces PayMongo's `{"errors": [...]}` envelope as [`GatewayError::Api`].

use std::fmt;
use std::time::Duration;

use reqwest::{Client, Url};

use crate::error::GatewayError;
use crate::types::{
    ChargeRequest, ChargedPayment, CreatePaymentBody, ErrorEnvelope, PaymentResponse,
};

pub const DEFAULT_BASE_URL: &str = "https://api.paymongo.com";

/// Client for the PayMongo REST API.
///
/// Use [`PaymongoClient::new`] for production or
/// [`PaymongoClient::with_base_url`] to point at a mock server in tests.
pub struct PaymongoClient {
    client: Client,
    secret_key: String,
    base_url: Url,
}

impl fmt::Debug for PaymongoClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymongoClient")
            .field("secret_key", &"<redacted>")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl PaymongoClient {
    /// Creates a client pointed at the production PayMongo API.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(secret_key: &str, timeout_secs: u64) -> Result<Self, GatewayError> {
        Self::with_base_url(secret_key, timeout_secs, DEFAULT_BASE_URL)
    }

    /// Creates a client with a custom base URL.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`GatewayError::InvalidBaseUrl`] if
    /// `base_url` does not parse.
    pub fn with_base_url(
        secret_key: &str,
        timeout_secs: u64,
        base_url: &str,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("glowcart/0.1 (payment-webhooks)")
            .build()?;

        // Exactly one trailing slash so `join` appends instead of replacing
        // the last path segment.
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised).map_err(|e| GatewayError::InvalidBaseUrl {
            base_url: base_url.to_owned(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            client,
            secret_key: secret_key.to_owned(),
            base_url,
        })
    }

    /// Creates a payment that charges a chargeable source.
    ///
    /// Calls `POST /v1/payments` with the amount, currency and a
    /// `{"id": .., "type": "source"}` source reference.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::Api`] on any non-2xx response, carrying PayMongo's
    ///   error details when the body has them.
    /// - [`GatewayError::Http`] on network failure.
    /// - [`GatewayError::Deserialize`] if a 2xx body is not a payment resource.
    pub async fn create_payment(
        &self,
        request: &ChargeRequest,
    ) -> Result<ChargedPayment, GatewayError> {
        let url = self.endpoint("v1/payments")?;
        let response = self
            .client
            .post(url)
            .basic_auth(&self.secret_key, Some(""))
            .json(&CreatePaymentBody::from_request(request))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let detail = error_detail(&body);
            tracing::warn!(
                status = status.as_u16(),
                source_id = %request.source_id,
                detail = %detail,
                "PayMongo rejected payment creation"
            );
            return Err(GatewayError::Api {
                status: status.as_u16(),
                detail,
            });
        }

        let parsed: PaymentResponse =
            serde_json::from_str(&body).map_err(|e| GatewayError::Deserialize {
                context: format!("create payment for source {}", request.source_id),
                source: e,
            })?;

        Ok(ChargedPayment {
            payment_id: parsed.data.id,
            status: parsed.data.attributes.status,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, GatewayError> {
        self.base_url
            .join(path)
            .map_err(|e| GatewayError::InvalidBaseUrl {
                base_url: self.base_url.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Flattens PayMongo's error envelope into one message; falls back to the
/// raw body when it is not an envelope.
fn error_detail(body: &str) -> String {
    let details: Vec<String> = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| {
            envelope
                .errors
                .into_iter()
                .filter_map(|item| match (item.code, item.detail) {
                    (Some(code), Some(detail)) => Some(format!("{code}: {detail}")),
                    (None, Some(detail)) => Some(detail),
                    (Some(code), None) => Some(code),
                    (None, None) => None,
                })
                .collect()
        })
        .unwrap_or_default();

    if details.is_empty() {
        body.trim().to_owned()
    } else {
        details.join("; ")
    }
}
