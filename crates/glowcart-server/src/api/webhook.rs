use axum::{body::Bytes, extract::State, http::HeaderMap, Extension, Json};
use glowcart_core::{verify_event, SIGNATURE_HEADER};
use serde::Serialize;
use tracing::Instrument;

use crate::dispatch::Dispatcher;
use crate::error::WebhookError;
use crate::middleware::RequestId;

use super::AppState;

#[derive(Debug, Serialize)]
pub(super) struct Ack {
    received: bool,
}

/// Verifies the raw body against the signature header, then dispatches the
/// event. The body is only parsed after the signature matches.
pub(super) async fn receive_webhook(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Ack>, WebhookError> {
    let span = tracing::info_span!("webhook", request_id = %req_id.0);

    async move {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok());
        let parsed = verify_event(
            &body,
            signature,
            state.webhook.secret.as_deref(),
            state.webhook.mode,
        )?;

        Dispatcher::new(state.store.as_ref(), state.gateway.as_ref())
            .dispatch(parsed)
            .await?;

        Ok(Json(Ack { received: true }))
    }
    .instrument(span)
    .await
}
