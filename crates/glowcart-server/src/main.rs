mod api;
mod dispatch;
mod error;
mod middleware;

use std::sync::Arc;

use glowcart_db::{OrderStore, PgOrderStore};
use glowcart_paymongo::{PaymentGateway, PaymongoClient, UnconfiguredGateway};
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, AppState, WebhookSettings},
    middleware::BasicAuthState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = glowcart_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = glowcart_db::PoolConfig::from_app_config(&config);
    let pool = glowcart_db::connect_pool(&config.database_url, pool_config).await?;
    let applied = glowcart_db::run_migrations(&pool).await?;
    tracing::info!(applied, "migrations up to date");

    let store: Arc<dyn OrderStore> = Arc::new(PgOrderStore::new(pool));
    let gateway: Arc<dyn PaymentGateway> = match config.paymongo_secret_key.as_deref() {
        Some(key) => Arc::new(PaymongoClient::with_base_url(
            key,
            config.gateway_timeout_secs,
            &config.paymongo_base_url,
        )?),
        None => {
            tracing::warn!(
                "GLOWCART_PAYMONGO_SECRET_KEY is not set; source.chargeable events will fail"
            );
            Arc::new(UnconfiguredGateway)
        }
    };

    let state = AppState {
        store,
        gateway,
        webhook: WebhookSettings::from_app_config(&config),
    };
    let auth = BasicAuthState::new(config.webhook_basic_auth.clone());
    let app = build_app(state, auth);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, env = %config.env, "glowcart-server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
