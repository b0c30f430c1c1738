use async_trait::async_trait;

use crate::client::PaymongoClient;
use crate::error::GatewayError;
use crate::types::{ChargeRequest, ChargedPayment};

/// Creates payments against chargeable sources.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment(&self, request: &ChargeRequest)
        -> Result<ChargedPayment, GatewayError>;
}

#[async_trait]
impl PaymentGateway for PaymongoClient {
    async fn create_payment(
        &self,
        request: &ChargeRequest,
    ) -> Result<ChargedPayment, GatewayError> {
        PaymongoClient::create_payment(self, request).await
    }
}

/// Gateway used when no PayMongo secret key is configured; every charge
/// fails with [`GatewayError::NotConfigured`].
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredGateway;

#[async_trait]
impl PaymentGateway for UnconfiguredGateway {
    async fn create_payment(
        &self,
        _request: &ChargeRequest,
    ) -> Result<ChargedPayment, GatewayError> {
        Err(GatewayError::NotConfigured)
    }
}
