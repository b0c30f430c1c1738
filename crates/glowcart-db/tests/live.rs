//! Live integration tests for glowcart-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness. The `migrations` path is relative to the crate root
//! (`crates/glowcart-db/`), so `"../../migrations"` resolves to the workspace
//! migration directory. They need `DATABASE_URL` and are ignored by default;
//! run them with `cargo test -p glowcart-db -- --ignored`.

use chrono::{TimeZone, Utc};
use glowcart_core::{
    CorrelationKind, InitialCorrelation, NewOrder, Order, OrderStatus, PaymentStatus,
};
use glowcart_db::{DbError, OrderStore, PgOrderStore};

fn new_order(correlation: InitialCorrelation) -> Order {
    NewOrder {
        amount: 180_000,
        currency: "PHP".to_string(),
        correlation,
    }
    .into_order(Utc::now())
    .expect("valid order")
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn insert_then_find_by_correlation(pool: sqlx::PgPool) {
    let store = PgOrderStore::new(pool);
    let order = new_order(InitialCorrelation::CheckoutSession("cs_live_1".to_string()));
    store.insert(&order).await.expect("insert");

    let found = store
        .find_by_correlation(CorrelationKind::CheckoutSession, "cs_live_1")
        .await
        .expect("query")
        .expect("order exists");
    assert_eq!(found.id, order.id);
    assert_eq!(found.status, OrderStatus::Pending);
    assert_eq!(found.payment.status, PaymentStatus::Unpaid);

    assert!(store
        .find_by_correlation(CorrelationKind::Payment, "cs_live_1")
        .await
        .expect("query")
        .is_none());
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn conditional_update_bumps_version(pool: sqlx::PgPool) {
    let store = PgOrderStore::new(pool);
    let order = new_order(InitialCorrelation::Payment("pay_live_1".to_string()));
    store.insert(&order).await.expect("insert");

    let mut next = order.clone();
    next.status = OrderStatus::Processing;
    next.payment.status = PaymentStatus::Paid;
    next.payment.details = Some(serde_json::json!({"id": "pay_live_1"}));
    next.last_event_at = Utc.timestamp_opt(1_700_000_000, 0).single();

    let stored = store.update_if_version(&next, 0).await.expect("update");
    assert_eq!(stored.version, 1);
    assert_eq!(stored.status, OrderStatus::Processing);
    assert_eq!(stored.payment.details, next.payment.details);
    assert_eq!(stored.last_event_at, next.last_event_at);

    let reread = store.get(order.id).await.expect("get").expect("exists");
    assert_eq!(reread.version, 1);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn charge_marker_is_persisted(pool: sqlx::PgPool) {
    let store = PgOrderStore::new(pool);
    let order = new_order(InitialCorrelation::Source("src_live_1".to_string()));
    store.insert(&order).await.expect("insert");

    let mut claimed = order.clone();
    claimed.payment.charge_requested_at = Utc.timestamp_opt(1_700_000_100, 0).single();
    store.update_if_version(&claimed, 0).await.expect("claim");

    let reread = store.get(order.id).await.expect("get").expect("exists");
    assert_eq!(
        reread.payment.charge_requested_at,
        claimed.payment.charge_requested_at
    );
    assert!(reread.payment.payment_id.is_none());
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn stale_version_update_is_rejected(pool: sqlx::PgPool) {
    let store = PgOrderStore::new(pool);
    let order = new_order(InitialCorrelation::Payment("pay_live_2".to_string()));
    store.insert(&order).await.expect("insert");
    store.update_if_version(&order, 0).await.expect("first update");

    let err = store.update_if_version(&order, 0).await.unwrap_err();
    assert!(
        matches!(err, DbError::VersionConflict { expected_version: 0, .. }),
        "expected VersionConflict, got: {err:?}"
    );
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn updating_unknown_order_is_not_found(pool: sqlx::PgPool) {
    let store = PgOrderStore::new(pool);
    let ghost = new_order(InitialCorrelation::Payment("pay_ghost".to_string()));
    let err = store.update_if_version(&ghost, 0).await.unwrap_err();
    assert!(matches!(err, DbError::NotFound), "got: {err:?}");
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn health_check_pings_pool(pool: sqlx::PgPool) {
    let store = PgOrderStore::new(pool);
    store.health_check().await.expect("healthy");
}
