use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use glowcart_core::SignatureError;
use glowcart_db::DbError;
use glowcart_paymongo::GatewayError;
use thiserror::Error;
use uuid::Uuid;

use crate::api::ErrorBody;

/// Everything that stops a webhook delivery from being acknowledged.
///
/// All variants except `Unauthorized` answer 400 so the provider redelivers.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("invalid signature: {0}")]
    InvalidSignature(#[source] SignatureError),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("webhook is misconfigured: {0}")]
    Configuration(String),

    #[error("failed to persist order change")]
    Persistence(#[from] DbError),

    #[error("order {order_id} kept changing underneath the update after {attempts} attempts")]
    Conflict { order_id: Uuid, attempts: u32 },

    #[error("payment gateway error: {0}")]
    Gateway(#[from] GatewayError),
}

impl From<SignatureError> for WebhookError {
    fn from(err: SignatureError) -> Self {
        match err {
            SignatureError::Payload(e) => WebhookError::MalformedPayload(e.to_string()),
            e if e.is_configuration() => WebhookError::Configuration(e.to_string()),
            e => WebhookError::InvalidSignature(e),
        }
    }
}

impl WebhookError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            WebhookError::Unauthorized => StatusCode::UNAUTHORIZED,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        match &self {
            WebhookError::Persistence(e) => {
                tracing::error!(error = %e, "webhook persistence failed");
            }
            WebhookError::Configuration(_) | WebhookError::Gateway(_) => {
                tracing::error!(error = %self, "webhook not processed");
            }
            _ => tracing::warn!(error = %self, "webhook rejected"),
        }
        (
            self.status(),
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
