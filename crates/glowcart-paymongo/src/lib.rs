//! PayMongo REST client and the [`PaymentGateway`] seam the webhook server
//! charges through.

pub mod client;
pub mod error;
pub mod gateway;
pub mod types;

pub use client::PaymongoClient;
pub use error::GatewayError;
pub use gateway::{PaymentGateway, UnconfiguredGateway};
pub use types::{ChargeRequest, ChargedPayment};
