mod webhook;


use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use glowcart_core::{AppConfig, SignatureMode};
use glowcart_db::OrderStore;
use glowcart_paymongo::PaymentGateway;
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::middleware::{request_id, require_basic_auth, BasicAuthState};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn OrderStore>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub webhook: WebhookSettings,
}

/// How incoming deliveries are verified.
#[derive(Clone, Default)]
pub struct WebhookSettings {
    pub secret: Option<String>,
    pub mode: SignatureMode,
}

impl WebhookSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        if config.webhook_secret.is_none() {
            tracing::warn!(
                "GLOWCART_WEBHOOK_SECRET is not set; every webhook delivery will be rejected"
            );
        }
        Self {
            secret: config.webhook_secret.clone(),
            mode: if config.paymongo_live_mode {
                SignatureMode::Live
            } else {
                SignatureMode::Test
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

fn webhook_router(auth: BasicAuthState) -> Router<AppState> {
    Router::new()
        .route("/api/webhook", post(webhook::receive_webhook))
        .route("/api/v1/webhooks/paymongo", post(webhook::receive_webhook))
        .route_layer(axum::middleware::from_fn_with_state(
            auth,
            require_basic_auth,
        ))
}

pub fn build_app(state: AppState, auth: BasicAuthState) -> Router {
    let public_routes = Router::new().route("/api/v1/health", get(health));

    Router::new()
        .merge(public_routes)
        .merge(webhook_router(auth))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(request_id))
                .layer(TraceLayer::new_for_http()),
        )
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthData {
                status: "ok",
                database: "ok",
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthData {
                    status: "degraded",
                    database: "unavailable",
                }),
            )
        }
    }
}
