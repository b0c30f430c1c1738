//! Domain types and pure logic for the glowcart payment webhook.

pub mod app_config;
pub mod config;
pub mod event;
pub mod order;
pub mod signature;
pub mod transition;

use thiserror::Error;

pub use app_config::{AppConfig, BasicCredentials, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use event::{parse_event, EventError, ParsedEvent, WebhookEvent};
pub use order::{
    CorrelationKind, InitialCorrelation, NewOrder, Order, OrderStatus, PaymentInfo, PaymentStatus,
};
pub use signature::{
    sign, sign_header, verify_event, verify_signature, SignatureError, SignatureMode,
    SIGNATURE_HEADER,
};
pub use transition::{transition, Change, Transition};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid order status: {0}")]
    InvalidOrderStatus(String),

    #[error("invalid payment status: {0}")]
    InvalidPaymentStatus(String),

    #[error("order amount must be positive, got {0}")]
    InvalidAmount(i64),

    #[error("invalid currency code: {0}")]
    InvalidCurrency(String),
}
