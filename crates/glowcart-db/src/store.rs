//! The order store seam the webhook handlers are written against.

use async_trait::async_trait;
use glowcart_core::{CorrelationKind, Order};
use uuid::Uuid;

use crate::DbError;

/// Document-store operations on orders.
///
/// Implementations must make [`OrderStore::update_if_version`] atomic with
/// respect to the version check: a write only lands if the stored version
/// still equals `expected_version`, and it bumps the version by one.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Returns the oldest order whose `kind` correlation id equals `id`.
    async fn find_by_correlation(
        &self,
        kind: CorrelationKind,
        id: &str,
    ) -> Result<Option<Order>, DbError>;

    async fn get(&self, id: Uuid) -> Result<Option<Order>, DbError>;

    async fn insert(&self, order: &Order) -> Result<(), DbError>;

    /// Writes `order` if the stored version is `expected_version` and returns
    /// the stored result.
    ///
    /// # Errors
    ///
    /// [`DbError::VersionConflict`] when the stored version moved on,
    /// [`DbError::NotFound`] when the order no longer exists.
    async fn update_if_version(&self, order: &Order, expected_version: i64)
        -> Result<Order, DbError>;

    async fn health_check(&self) -> Result<(), DbError>;
}
