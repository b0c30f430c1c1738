//! In-process [`OrderStore`] used by tests and local runs without Postgres.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use glowcart_core::{CorrelationKind, Order};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::store::OrderStore;
use crate::DbError;

#[derive(Debug, Default, Clone)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<HashMap<Uuid, Order>>>,
    fail_all: Arc<AtomicBool>,
    pending_conflicts: Arc<AtomicU32>,
}

impl InMemoryOrderStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with [`DbError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.fail_all.store(unavailable, Ordering::SeqCst);
    }

    /// Makes the next `count` conditional updates report a version conflict,
    /// as if another writer had got there first.
    pub fn inject_conflicts(&self, count: u32) {
        self.pending_conflicts.store(count, Ordering::SeqCst);
    }

    /// Snapshot of every stored order, oldest first.
    pub async fn all(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self.orders.read().await.values().cloned().collect();
        orders.sort_by_key(|o| (o.created_at, o.id));
        orders
    }

    fn check_available(&self) -> Result<(), DbError> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(DbError::Unavailable("in-memory store disabled".to_string()));
        }
        Ok(())
    }

    fn take_conflict(&self) -> bool {
        self.pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn find_by_correlation(
        &self,
        kind: CorrelationKind,
        id: &str,
    ) -> Result<Option<Order>, DbError> {
        self.check_available()?;
        let orders = self.orders.read().await;
        Ok(orders
            .values()
            .filter(|o| o.payment.correlation_id(kind) == Some(id))
            .min_by_key(|o| (o.created_at, o.id))
            .cloned())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>, DbError> {
        self.check_available()?;
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn insert(&self, order: &Order) -> Result<(), DbError> {
        self.check_available()?;
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            return Err(DbError::Duplicate(order.id));
        }
        orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn update_if_version(
        &self,
        order: &Order,
        expected_version: i64,
    ) -> Result<Order, DbError> {
        self.check_available()?;
        let mut orders = self.orders.write().await;
        let stored = orders.get_mut(&order.id).ok_or(DbError::NotFound)?;

        if stored.version != expected_version || self.take_conflict() {
            return Err(DbError::VersionConflict {
                id: order.id,
                expected_version,
            });
        }

        stored.status = order.status;
        stored.payment = order.payment.clone();
        stored.last_event_at = order.last_event_at;
        stored.updated_at = order.updated_at;
        stored.version += 1;
        Ok(stored.clone())
    }

    async fn health_check(&self) -> Result<(), DbError> {
        self.check_available()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use glowcart_core::{InitialCorrelation, NewOrder, OrderStatus};

    use super::*;

    fn order(correlation: InitialCorrelation) -> Order {
        NewOrder {
            amount: 99_900,
            currency: "PHP".to_string(),
            correlation,
        }
        .into_order(Utc::now())
        .unwrap()
    }

    #[tokio::test]
    async fn finds_order_by_each_correlation_kind() {
        let store = InMemoryOrderStore::new();
        let by_source = order(InitialCorrelation::Source("src_1".to_string()));
        let by_session = order(InitialCorrelation::CheckoutSession("cs_1".to_string()));
        store.insert(&by_source).await.unwrap();
        store.insert(&by_session).await.unwrap();

        let found = store
            .find_by_correlation(CorrelationKind::Source, "src_1")
            .await
            .unwrap()
            .expect("source order");
        assert_eq!(found.id, by_source.id);

        let found = store
            .find_by_correlation(CorrelationKind::CheckoutSession, "cs_1")
            .await
            .unwrap()
            .expect("session order");
        assert_eq!(found.id, by_session.id);

        assert!(store
            .find_by_correlation(CorrelationKind::Payment, "src_1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn update_bumps_version() {
        let store = InMemoryOrderStore::new();
        let original = order(InitialCorrelation::Payment("pay_1".to_string()));
        store.insert(&original).await.unwrap();

        let mut next = original.clone();
        next.status = OrderStatus::Processing;
        let stored = store.update_if_version(&next, 0).await.unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.status, OrderStatus::Processing);
    }

    #[tokio::test]
    async fn stale_version_is_a_conflict() {
        let store = InMemoryOrderStore::new();
        let original = order(InitialCorrelation::Payment("pay_1".to_string()));
        store.insert(&original).await.unwrap();
        store.update_if_version(&original, 0).await.unwrap();

        let err = store.update_if_version(&original, 0).await.unwrap_err();
        assert!(matches!(err, DbError::VersionConflict { expected_version: 0, .. }));
    }

    #[tokio::test]
    async fn injected_conflicts_are_consumed() {
        let store = InMemoryOrderStore::new();
        let original = order(InitialCorrelation::Payment("pay_1".to_string()));
        store.insert(&original).await.unwrap();
        store.inject_conflicts(1);

        assert!(store.update_if_version(&original, 0).await.is_err());
        assert!(store.update_if_version(&original, 0).await.is_ok());
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_call() {
        let store = InMemoryOrderStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.health_check().await,
            Err(DbError::Unavailable(_))
        ));
        assert!(store
            .find_by_correlation(CorrelationKind::Payment, "pay_1")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn updating_missing_order_is_not_found() {
        let store = InMemoryOrderStore::new();
        let ghost = order(InitialCorrelation::Payment("pay_1".to_string()));
        assert!(matches!(
            store.update_if_version(&ghost, 0).await,
            Err(DbError::NotFound)
        ));
    }
}
