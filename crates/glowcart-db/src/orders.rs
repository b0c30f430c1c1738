//! Database operations for the `orders` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use glowcart_core::{CorrelationKind, Order, PaymentInfo};
use sqlx::PgPool;
use uuid::Uuid;

use crate::store::OrderStore;
use crate::DbError;

const ORDER_COLUMNS: &str = "id, status, payment_source_id, payment_payment_id, \
     payment_checkout_session_id, payment_status, payment_details, \
     payment_charge_requested_at, amount, currency, version, last_event_at, created_at, updated_at";

// ---------------------------------------------------------------------------
// Row type
// ---------------------------------------------------------------------------

/// A row from the `orders` table.
///
/// Status columns are stored as text and validated when converting to [`Order`].
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderRow {
    pub id: Uuid,
    pub status: String,
    pub payment_source_id: Option<String>,
    pub payment_payment_id: Option<String>,
    pub payment_checkout_session_id: Option<String>,
    pub payment_status: String,
    pub payment_details: Option<serde_json::Value>,
    pub payment_charge_requested_at: Option<DateTime<Utc>>,
    pub amount: i64,
    pub currency: String,
    pub version: i64,
    pub last_event_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = DbError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let invalid = |e: glowcart_core::CoreError| DbError::InvalidRow {
            id: row.id,
            reason: e.to_string(),
        };
        let status = row.status.parse().map_err(invalid)?;
        let payment_status = row.payment_status.parse().map_err(invalid)?;

        Ok(Order {
            id: row.id,
            status,
            payment: PaymentInfo {
                source_id: row.payment_source_id,
                payment_id: row.payment_payment_id,
                checkout_session_id: row.payment_checkout_session_id,
                status: payment_status,
                details: row.payment_details,
                charge_requested_at: row.payment_charge_requested_at,
            },
            amount: row.amount,
            currency: row.currency,
            version: row.version,
            last_event_at: row.last_event_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Returns the oldest order whose correlation column for `kind` equals `id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or [`DbError::InvalidRow`]
/// if the stored statuses are not recognised.
pub async fn find_order_by_correlation(
    pool: &PgPool,
    kind: CorrelationKind,
    id: &str,
) -> Result<Option<Order>, DbError> {
    // `kind.column()` is a fixed identifier, never user input.
    let sql = format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE {} = $1 ORDER BY created_at, id LIMIT 1",
        kind.column()
    );
    let row = sqlx::query_as::<_, OrderRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.map(Order::try_from).transpose()
}

/// Returns a single order by id, or `None` if not found.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_order(pool: &PgPool, id: Uuid) -> Result<Option<Order>, DbError> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
    let row = sqlx::query_as::<_, OrderRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.map(Order::try_from).transpose()
}

/// Inserts a new order row exactly as given.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails (e.g. duplicate id).
pub async fn insert_order(pool: &PgPool, order: &Order) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO orders (id, status, payment_source_id, payment_payment_id, \
                             payment_checkout_session_id, payment_status, payment_details, \
                             payment_charge_requested_at, amount, currency, version, \
                             last_event_at, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
    )
    .bind(order.id)
    .bind(order.status.as_str())
    .bind(order.payment.source_id.as_deref())
    .bind(order.payment.payment_id.as_deref())
    .bind(order.payment.checkout_session_id.as_deref())
    .bind(order.payment.status.as_str())
    .bind(order.payment.details.as_ref())
    .bind(order.payment.charge_requested_at)
    .bind(order.amount)
    .bind(&order.currency)
    .bind(order.version)
    .bind(order.last_event_at)
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Writes the mutable fields of `order` if the row is still at `expected_version`.
///
/// Bumps `version` by one and returns the stored row.
///
/// # Errors
///
/// Returns [`DbError::VersionConflict`] if the row moved on,
/// [`DbError::NotFound`] if it does not exist, or [`DbError::Sqlx`] on failure.
pub async fn update_order_if_version(
    pool: &PgPool,
    order: &Order,
    expected_version: i64,
) -> Result<Order, DbError> {
    let sql = format!(
        "UPDATE orders \
         SET status = $1, payment_source_id = $2, payment_payment_id = $3, \
             payment_checkout_session_id = $4, payment_status = $5, payment_details = $6, \
             payment_charge_requested_at = $7, last_event_at = $8, updated_at = $9, \
             version = version + 1 \
         WHERE id = $10 AND version = $11 \
         RETURNING {ORDER_COLUMNS}"
    );
    let row = sqlx::query_as::<_, OrderRow>(&sql)
        .bind(order.status.as_str())
        .bind(order.payment.source_id.as_deref())
        .bind(order.payment.payment_id.as_deref())
        .bind(order.payment.checkout_session_id.as_deref())
        .bind(order.payment.status.as_str())
        .bind(order.payment.details.as_ref())
        .bind(order.payment.charge_requested_at)
        .bind(order.last_event_at)
        .bind(order.updated_at)
        .bind(order.id)
        .bind(expected_version)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => Order::try_from(row),
        None => {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM orders WHERE id = $1)")
                    .bind(order.id)
                    .fetch_one(pool)
                    .await?;
            if exists {
                Err(DbError::VersionConflict {
                    id: order.id,
                    expected_version,
                })
            } else {
                Err(DbError::NotFound)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// [`OrderStore`] backed by Postgres.
#[derive(Debug, Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn find_by_correlation(
        &self,
        kind: CorrelationKind,
        id: &str,
    ) -> Result<Option<Order>, DbError> {
        find_order_by_correlation(&self.pool, kind, id).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>, DbError> {
        get_order(&self.pool, id).await
    }

    async fn insert(&self, order: &Order) -> Result<(), DbError> {
        insert_order(&self.pool, order).await
    }

    async fn update_if_version(
        &self,
        order: &Order,
        expected_version: i64,
    ) -> Result<Order, DbError> {
        update_order_if_version(&self.pool, order, expected_version).await
    }

    async fn health_check(&self) -> Result<(), DbError> {
        crate::ping(&self.pool).await?;
        Ok(())
    }
}
