//! Typed view of the provider's webhook envelope.
//!
//! The wire shape is `{ "type": "...", "data": { "id": "...", "attributes": {...} } }`
//! with an optional top-level `created_at` (unix seconds). Recognised event
//! types become dedicated [`WebhookEvent`] variants; anything else is kept as
//! [`WebhookEvent::Unrecognized`] so new provider event types never fail the
//! endpoint.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::order::CorrelationKind;

pub const SOURCE_CHARGEABLE: &str = "source.chargeable";
pub const PAYMENT_PAID: &str = "payment.paid";
pub const PAYMENT_FAILED: &str = "payment.failed";
pub const CHECKOUT_SESSION_PAYMENT_PAID: &str = "checkout_session.payment.paid";

#[derive(Debug, Error)]
pub enum EventError {
    #[error("payload is not a valid event envelope: {0}")]
    Envelope(#[from] serde_json::Error),

    #[error("`{event_type}` event is missing `{field}`")]
    MissingField {
        event_type: String,
        field: &'static str,
    },

    #[error("`checkout_session.payment.paid` event has no payment attempts")]
    NoPayments,

    #[error("event timestamp {0} is out of range")]
    InvalidTimestamp(i64),
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: Option<RawData>,
    #[serde(default)]
    created_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawData {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    attributes: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WebhookEvent {
    SourceChargeable {
        source_id: String,
        /// Provider source type (`gcash`, `grab_pay`, ...), when present.
        source_type: Option<String>,
    },
    PaymentPaid {
        payment_id: String,
    },
    PaymentFailed {
        payment_id: String,
    },
    CheckoutSessionPaid {
        checkout_session_id: String,
        /// First element of `data.attributes.payments`.
        payment: Value,
    },
    Unrecognized {
        event_type: String,
    },
}

impl WebhookEvent {
    #[must_use]
    pub fn event_type(&self) -> &str {
        match self {
            WebhookEvent::SourceChargeable { .. } => SOURCE_CHARGEABLE,
            WebhookEvent::PaymentPaid { .. } => PAYMENT_PAID,
            WebhookEvent::PaymentFailed { .. } => PAYMENT_FAILED,
            WebhookEvent::CheckoutSessionPaid { .. } => CHECKOUT_SESSION_PAYMENT_PAID,
            WebhookEvent::Unrecognized { event_type } => event_type.as_str(),
        }
    }

    /// The lookup key used to find the affected order, or `None` for
    /// unrecognised events.
    #[must_use]
    pub fn correlation(&self) -> Option<(CorrelationKind, &str)> {
        match self {
            WebhookEvent::SourceChargeable { source_id, .. } => {
                Some((CorrelationKind::Source, source_id.as_str()))
            }
            WebhookEvent::PaymentPaid { payment_id }
            | WebhookEvent::PaymentFailed { payment_id } => {
                Some((CorrelationKind::Payment, payment_id.as_str()))
            }
            WebhookEvent::CheckoutSessionPaid {
                checkout_session_id,
                ..
            } => Some((CorrelationKind::CheckoutSession, checkout_session_id.as_str())),
            WebhookEvent::Unrecognized { .. } => None,
        }
    }
}

/// A parsed event together with the provider timestamp, if the payload carried one.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEvent {
    pub event: WebhookEvent,
    pub occurred_at: Option<DateTime<Utc>>,
}

/// Parses a verified request body into a [`ParsedEvent`].
///
/// # Errors
///
/// Returns [`EventError`] when the body is not a JSON envelope, a recognised
/// event lacks `data.id`, or a checkout-session event has no payments.
pub fn parse_event(body: &[u8]) -> Result<ParsedEvent, EventError> {
    let raw: RawEnvelope = serde_json::from_slice(body)?;
    let attributes = raw.data.as_ref().and_then(|d| d.attributes.as_ref());

    let timestamp = raw.created_at.or_else(|| {
        attributes
            .and_then(|a| a.get("created_at"))
            .and_then(Value::as_i64)
    });
    let occurred_at = timestamp
        .map(|t| {
            Utc.timestamp_opt(t, 0)
                .single()
                .ok_or(EventError::InvalidTimestamp(t))
        })
        .transpose()?;

    let data_id = || -> Result<String, EventError> {
        raw.data
            .as_ref()
            .and_then(|d| d.id.clone())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| EventError::MissingField {
                event_type: raw.event_type.clone(),
                field: "data.id",
            })
    };

    let event = match raw.event_type.as_str() {
        SOURCE_CHARGEABLE => WebhookEvent::SourceChargeable {
            source_id: data_id()?,
            source_type: attributes
                .and_then(|a| a.get("type"))
                .and_then(Value::as_str)
                .map(ToOwned::to_owned),
        },
        PAYMENT_PAID => WebhookEvent::PaymentPaid {
            payment_id: data_id()?,
        },
        PAYMENT_FAILED => WebhookEvent::PaymentFailed {
            payment_id: data_id()?,
        },
        CHECKOUT_SESSION_PAYMENT_PAID => {
            let checkout_session_id = data_id()?;
            let payment = attributes
                .and_then(|a| a.get("payments"))
                .and_then(Value::as_array)
                .and_then(|payments| payments.first())
                .cloned()
                .ok_or(EventError::NoPayments)?;
            WebhookEvent::CheckoutSessionPaid {
                checkout_session_id,
                payment,
            }
        }
        other => WebhookEvent::Unrecognized {
            event_type: other.to_string(),
        },
    };

    Ok(ParsedEvent { event, occurred_at })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: &Value) -> Result<ParsedEvent, EventError> {
        parse_event(value.to_string().as_bytes())
    }

    #[test]
    fn parses_payment_paid() {
        let parsed = parse(&json!({"type": "payment.paid", "data": {"id": "pay_1"}})).unwrap();
        assert_eq!(
            parsed.event,
            WebhookEvent::PaymentPaid {
                payment_id: "pay_1".to_string()
            }
        );
        assert!(parsed.occurred_at.is_none());
    }

    #[test]
    fn parses_source_chargeable_with_source_type() {
        let parsed = parse(&json!({
            "type": "source.chargeable",
            "data": {"id": "src_1", "attributes": {"type": "gcash"}}
        }))
        .unwrap();
        assert_eq!(
            parsed.event,
            WebhookEvent::SourceChargeable {
                source_id: "src_1".to_string(),
                source_type: Some("gcash".to_string()),
            }
        );
    }

    #[test]
    fn checkout_session_takes_first_payment() {
        let parsed = parse(&json!({
            "type": "checkout_session.payment.paid",
            "data": {"id": "cs_1", "attributes": {"payments": [{"id": "p1"}, {"id": "p2"}]}}
        }))
        .unwrap();
        match parsed.event {
            WebhookEvent::CheckoutSessionPaid { payment, .. } => {
                assert_eq!(payment, json!({"id": "p1"}));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn checkout_session_without_payments_is_rejected() {
        let err = parse(&json!({
            "type": "checkout_session.payment.paid",
            "data": {"id": "cs_1", "attributes": {"payments": []}}
        }))
        .unwrap_err();
        assert!(matches!(err, EventError::NoPayments));
    }

    #[test]
    fn unknown_type_is_kept_without_data() {
        let parsed = parse(&json!({"type": "refund.created"})).unwrap();
        assert_eq!(
            parsed.event,
            WebhookEvent::Unrecognized {
                event_type: "refund.created".to_string()
            }
        );
        assert!(parsed.event.correlation().is_none());
    }

    #[test]
    fn recognised_type_requires_data_id() {
        let err = parse(&json!({"type": "payment.failed", "data": {}})).unwrap_err();
        assert!(matches!(err, EventError::MissingField { field: "data.id", .. }));
    }

    #[test]
    fn non_json_body_is_an_envelope_error() {
        assert!(matches!(
            parse_event(b"not json"),
            Err(EventError::Envelope(_))
        ));
    }

    #[test]
    fn top_level_created_at_wins_over_attributes() {
        let parsed = parse(&json!({
            "type": "payment.paid",
            "created_at": 1_700_000_100,
            "data": {"id": "pay_1", "attributes": {"created_at": 1_700_000_000}}
        }))
        .unwrap();
        assert_eq!(parsed.occurred_at.unwrap().timestamp(), 1_700_000_100);
    }

    #[test]
    fn attribute_created_at_is_used_as_fallback() {
        let parsed = parse(&json!({
            "type": "payment.paid",
            "data": {"id": "pay_1", "attributes": {"created_at": 1_700_000_000}}
        }))
        .unwrap();
        assert_eq!(parsed.occurred_at.unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn correlation_maps_event_to_lookup_key() {
        let event = WebhookEvent::PaymentFailed {
            payment_id: "pay_9".to_string(),
        };
        assert_eq!(event.correlation(), Some((CorrelationKind::Payment, "pay_9")));
        assert_eq!(event.event_type(), "payment.failed");
    }
}
