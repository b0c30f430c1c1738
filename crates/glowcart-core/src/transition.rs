//! Pure order transitions driven by provider events.
//!
//! | change             | `payment.status` | `status`         | other                     |
//! |--------------------|------------------|------------------|---------------------------|
//! | `MarkPaid`         | `paid`           | `processing`     |                           |
//! | `MarkFailed`       | `failed`         | `payment_failed` |                           |
//! | `CompleteCheckout` | `paid`           | `processing`     | `payment.details` set     |
//! | `BeginCharge`      | unchanged        | unchanged        | `charge_requested_at` set |
//! | `RecordCharge`     | unchanged        | unchanged        | `payment.payment_id` set  |
//! | `AbandonCharge`    | unchanged        | unchanged        | `charge_requested_at` cleared |
//!
//! Transitions do not look at the current `status`. Staleness is the general
//! guard: an event older than the newest one already applied is skipped. The
//! charge changes never overwrite a recorded `payment_id`, so a charge happens
//! at most once per order.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::order::{Order, OrderStatus, PaymentStatus};

#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    MarkPaid,
    MarkFailed,
    CompleteCheckout { details: Value },
    /// Claims the order for a charge; only one claimant wins.
    BeginCharge,
    RecordCharge { payment_id: String },
    /// Releases a claim whose charge was refused by the provider.
    AbandonCharge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Write this order back (the store bumps the version).
    Apply(Box<Order>),
    /// Applying the change would leave the order as it is.
    Unchanged,
    /// The event predates the newest event already applied to the order.
    Stale {
        occurred_at: DateTime<Utc>,
        last_event_at: DateTime<Utc>,
    },
}

/// Computes the effect of `change` on `order`.
#[must_use]
pub fn transition(
    order: &Order,
    change: &Change,
    occurred_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Transition {
    if let (Some(occurred_at), Some(last_event_at)) = (occurred_at, order.last_event_at) {
        if occurred_at < last_event_at {
            return Transition::Stale {
                occurred_at,
                last_event_at,
            };
        }
    }

    let mut next = order.clone();
    match change {
        Change::MarkPaid => {
            next.payment.status = PaymentStatus::Paid;
            next.status = OrderStatus::Processing;
        }
        Change::MarkFailed => {
            next.payment.status = PaymentStatus::Failed;
            next.status = OrderStatus::PaymentFailed;
        }
        Change::CompleteCheckout { details } => {
            next.payment.status = PaymentStatus::Paid;
            next.payment.details = Some(details.clone());
            next.status = OrderStatus::Processing;
        }
        Change::BeginCharge => {
            if order.payment.payment_id.is_none() && order.payment.charge_requested_at.is_none() {
                next.payment.charge_requested_at = Some(now);
            }
        }
        Change::RecordCharge { payment_id } => {
            if order.payment.payment_id.is_none() {
                next.payment.payment_id = Some(payment_id.clone());
            }
        }
        Change::AbandonCharge => {
            if order.payment.payment_id.is_none() {
                next.payment.charge_requested_at = None;
            }
        }
    }
    if occurred_at.is_some() {
        next.last_event_at = occurred_at.max(order.last_event_at);
    }

    if next.differs_from(order) {
        next.updated_at = now;
        Transition::Apply(Box::new(next))
    } else {
        Transition::Unchanged
    }
}
