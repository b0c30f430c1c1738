//! Order record and its embedded payment sub-document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    PaymentFailed,
    Shipped,
    Delivered,
    Completed,
    Cancelled,
}

impl OrderStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::PaymentFailed => "payment_failed",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "processing" => Ok(OrderStatus::Processing),
            "payment_failed" => Ok(OrderStatus::PaymentFailed),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(CoreError::InvalidOrderStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    Failed,
}

impl PaymentStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unpaid" => Ok(PaymentStatus::Unpaid),
            "paid" => Ok(PaymentStatus::Paid),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(CoreError::InvalidPaymentStatus(other.to_string())),
        }
    }
}

/// Which provider-side identifier an order is looked up by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CorrelationKind {
    Source,
    Payment,
    CheckoutSession,
}

impl CorrelationKind {
    /// Column name used by the Postgres store.
    #[must_use]
    pub fn column(self) -> &'static str {
        match self {
            CorrelationKind::Source => "payment_source_id",
            CorrelationKind::Payment => "payment_payment_id",
            CorrelationKind::CheckoutSession => "payment_checkout_session_id",
        }
    }
}

impl std::fmt::Display for CorrelationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CorrelationKind::Source => write!(f, "source"),
            CorrelationKind::Payment => write!(f, "payment"),
            CorrelationKind::CheckoutSession => write!(f, "checkout_session"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentInfo {
    pub source_id: Option<String>,
    pub payment_id: Option<String>,
    pub checkout_session_id: Option<String>,
    pub status: PaymentStatus,
    /// Provider payment attributes; only written on checkout-session completion.
    pub details: Option<serde_json::Value>,
    /// Set before a chargeable source is sent to the provider. With no
    /// `payment_id` alongside it, a charge is in flight or its result was lost.
    #[serde(default)]
    pub charge_requested_at: Option<DateTime<Utc>>,
}

impl PaymentInfo {
    #[must_use]
    pub fn correlation_id(&self, kind: CorrelationKind) -> Option<&str> {
        match kind {
            CorrelationKind::Source => self.source_id.as_deref(),
            CorrelationKind::Payment => self.payment_id.as_deref(),
            CorrelationKind::CheckoutSession => self.checkout_session_id.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub status: OrderStatus,
    pub payment: PaymentInfo,
    /// Total in minor units (centavos).
    pub amount: i64,
    pub currency: String,
    /// Bumped on every applied write; stores only accept a write whose
    /// expected version matches the stored one.
    pub version: i64,
    pub last_event_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Returns `true` when `other` differs from `self` in any field the
    /// webhook handlers write. Bookkeeping fields are ignored.
    #[must_use]
    pub fn differs_from(&self, other: &Order) -> bool {
        self.status != other.status
            || self.payment != other.payment
            || self.last_event_at != other.last_event_at
    }
}

/// Correlation id an order is created with; exactly one is set per order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitialCorrelation {
    Source(String),
    Payment(String),
    CheckoutSession(String),
}

/// Input for creating a pending, unpaid order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub amount: i64,
    pub currency: String,
    pub correlation: InitialCorrelation,
}

impl NewOrder {
    /// Builds the initial record: `pending` / `unpaid`, version 0.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidAmount`] for non-positive amounts and
    /// [`CoreError::InvalidCurrency`] for anything that is not a three-letter code.
    pub fn into_order(self, now: DateTime<Utc>) -> Result<Order, CoreError> {
        if self.amount <= 0 {
            return Err(CoreError::InvalidAmount(self.amount));
        }
        let currency = self.currency.trim().to_ascii_uppercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(CoreError::InvalidCurrency(self.currency));
        }

        let mut payment = PaymentInfo {
            source_id: None,
            payment_id: None,
            checkout_session_id: None,
            status: PaymentStatus::Unpaid,
            details: None,
            charge_requested_at: None,
        };
        match self.correlation {
            InitialCorrelation::Source(id) => payment.source_id = Some(id),
            InitialCorrelation::Payment(id) => payment.payment_id = Some(id),
            InitialCorrelation::CheckoutSession(id) => payment.checkout_session_id = Some(id),
        }

        Ok(Order {
            id: Uuid::new_v4(),
            status: OrderStatus::Pending,
            payment,
            amount: self.amount,
            currency,
            version: 0,
            last_event_at: None,
            created_at: now,
            updated_at: now,
        })
    }
}
