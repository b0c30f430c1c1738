//! Routes a verified event to its order and applies the resulting change.
//!
//! Writes are conditional on the order's `version`; on a conflicting write the
//! order is reread and the change reapplied, up to [`MAX_WRITE_ATTEMPTS`] times.
//!
//! A chargeable source is claimed with a persisted marker before the provider
//! is called. A redelivery that finds the marker does not charge again, even
//! when the earlier attempt failed to record its payment.

use chrono::{DateTime, Utc};
use glowcart_core::{
    transition, Change, CorrelationKind, Order, ParsedEvent, Transition, WebhookEvent,
};
use glowcart_db::{DbError, OrderStore};
use glowcart_paymongo::{ChargeRequest, PaymentGateway};
use uuid::Uuid;

use crate::error::WebhookError;

pub const MAX_WRITE_ATTEMPTS: u32 = 3;

/// What a dispatched event did. Every variant is acknowledged with 200.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Applied { order_id: Uuid, version: i64 },
    Unchanged { order_id: Uuid },
    Stale { order_id: Uuid },
    /// A charge for this order was already requested and has no recorded result.
    ChargePending { order_id: Uuid },
    NoMatchingOrder { kind: CorrelationKind, correlation_id: String },
    Ignored { event_type: String },
}

pub struct Dispatcher<'a> {
    store: &'a dyn OrderStore,
    gateway: &'a dyn PaymentGateway,
}

impl<'a> Dispatcher<'a> {
    #[must_use]
    pub fn new(store: &'a dyn OrderStore, gateway: &'a dyn PaymentGateway) -> Self {
        Self { store, gateway }
    }

    /// Applies `parsed` to the order it refers to.
    ///
    /// # Errors
    ///
    /// [`WebhookError::Persistence`] when the store fails,
    /// [`WebhookError::Gateway`] when a chargeable source cannot be charged and
    /// [`WebhookError::Conflict`] when every conditional write lost a race.
    pub async fn dispatch(&self, parsed: ParsedEvent) -> Result<Outcome, WebhookError> {
        let ParsedEvent { event, occurred_at } = parsed;
        let event_type = event.event_type().to_owned();

        let Some((kind, correlation_id)) = event.correlation() else {
            tracing::debug!(event_type = %event_type, "ignoring unrecognized webhook event");
            return Ok(Outcome::Ignored { event_type });
        };

        let Some(order) = self.store.find_by_correlation(kind, correlation_id).await? else {
            tracing::warn!(
                event_type = %event_type,
                correlation_kind = %kind,
                correlation_id,
                "no order matches webhook event"
            );
            return Ok(Outcome::NoMatchingOrder {
                kind,
                correlation_id: correlation_id.to_owned(),
            });
        };

        let outcome = match event {
            WebhookEvent::PaymentPaid { .. } => {
                self.apply(order, &Change::MarkPaid, occurred_at).await?
            }
            WebhookEvent::PaymentFailed { .. } => {
                self.apply(order, &Change::MarkFailed, occurred_at).await?
            }
            WebhookEvent::CheckoutSessionPaid { payment, .. } => {
                let change = Change::CompleteCheckout { details: payment };
                self.apply(order, &change, occurred_at).await?
            }
            WebhookEvent::SourceChargeable { source_id, .. } => {
                self.charge_source(order, source_id, occurred_at).await?
            }
            WebhookEvent::Unrecognized { .. } => {
                return Ok(Outcome::Ignored { event_type });
            }
        };

        tracing::info!(event_type = %event_type, outcome = ?outcome, "webhook event dispatched");
        Ok(outcome)
    }

    /// Claims the order, creates the payment, then records its id.
    ///
    /// The claim is released when the provider refuses the charge. When the
    /// payment cannot be recorded the claim stays, and later deliveries answer
    /// [`Outcome::ChargePending`] instead of charging again.
    async fn charge_source(
        &self,
        order: Order,
        source_id: String,
        occurred_at: Option<DateTime<Utc>>,
    ) -> Result<Outcome, WebhookError> {
        let order_id = order.id;
        if let Some(payment_id) = order.payment.payment_id.as_deref() {
            tracing::info!(
                order_id = %order_id,
                payment_id,
                "source already charged; skipping payment creation"
            );
            return Ok(Outcome::Unchanged { order_id });
        }
        if let Some(requested_at) = order.payment.charge_requested_at {
            tracing::warn!(
                order_id = %order_id,
                %requested_at,
                "charge already requested without a recorded payment; not charging again"
            );
            return Ok(Outcome::ChargePending { order_id });
        }

        let request = ChargeRequest {
            source_id,
            amount: order.amount,
            currency: order.currency.clone(),
            description: Some(format!("Order {order_id}")),
        };

        match self.apply(order, &Change::BeginCharge, occurred_at).await? {
            Outcome::Applied { .. } => {}
            other => return Ok(other),
        }

        let payment = match self.gateway.create_payment(&request).await {
            Ok(payment) => payment,
            Err(e) => {
                if let Err(release) = self.reapply(order_id, &Change::AbandonCharge).await {
                    tracing::warn!(
                        order_id = %order_id,
                        error = %release,
                        "failed to release charge claim"
                    );
                }
                return Err(e.into());
            }
        };
        tracing::info!(
            order_id = %order_id,
            source_id = %request.source_id,
            payment_id = %payment.payment_id,
            payment_status = %payment.status,
            "created payment for chargeable source"
        );

        let change = Change::RecordCharge {
            payment_id: payment.payment_id.clone(),
        };
        match self.reapply(order_id, &change).await {
            Ok(Outcome::Unchanged { .. }) => {
                tracing::warn!(
                    order_id = %order_id,
                    payment_id = %payment.payment_id,
                    "order already carries a payment; new payment left unrecorded"
                );
                Ok(Outcome::Unchanged { order_id })
            }
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::error!(
                    order_id = %order_id,
                    payment_id = %payment.payment_id,
                    error = %e,
                    "payment created but not recorded"
                );
                Err(e)
            }
        }
    }

    /// Rereads the order and applies an untimestamped `change` to it.
    async fn reapply(&self, order_id: Uuid, change: &Change) -> Result<Outcome, WebhookError> {
        let order = self
            .store
            .get(order_id)
            .await?
            .ok_or(WebhookError::Persistence(DbError::NotFound))?;
        self.apply(order, change, None).await
    }

    async fn apply(
        &self,
        mut order: Order,
        change: &Change,
        occurred_at: Option<DateTime<Utc>>,
    ) -> Result<Outcome, WebhookError> {
        let order_id = order.id;

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let next = match transition(&order, change, occurred_at, Utc::now()) {
                Transition::Apply(next) => next,
                Transition::Unchanged => return Ok(Outcome::Unchanged { order_id }),
                Transition::Stale {
                    occurred_at,
                    last_event_at,
                } => {
                    tracing::info!(
                        order_id = %order_id,
                        %occurred_at,
                        %last_event_at,
                        "skipping stale webhook event"
                    );
                    return Ok(Outcome::Stale { order_id });
                }
            };

            match self.store.update_if_version(&next, order.version).await {
                Ok(stored) => {
                    return Ok(Outcome::Applied {
                        order_id,
                        version: stored.version,
                    })
                }
                Err(DbError::VersionConflict { .. }) => {
                    tracing::debug!(
                        order_id = %order_id,
                        attempt,
                        "version conflict; rereading order"
                    );
                    order = self
                        .store
                        .get(order_id)
                        .await?
                        .ok_or(WebhookError::Persistence(DbError::NotFound))?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(WebhookError::Conflict {
            order_id,
            attempts: MAX_WRITE_ATTEMPTS,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use chrono::TimeZone;
    use glowcart_core::{InitialCorrelation, NewOrder};
    use glowcart_db::InMemoryOrderStore;
    use glowcart_paymongo::{ChargedPayment, GatewayError, UnconfiguredGateway};
    use serde_json::json;

    use super::*;

    /// Side effect a [`MeddlingGateway`] has on the store while a charge is in flight.
    enum Meddling {
        /// Another writer records this payment id on the order.
        RecordPayment(&'static str),
        /// The store goes down before the charge result can be saved.
        StoreOutage,
    }

    struct MeddlingGateway {
        store: InMemoryOrderStore,
        meddling: Meddling,
        calls: AtomicU32,
    }

    impl MeddlingGateway {
        fn new(store: &InMemoryOrderStore, meddling: Meddling) -> Self {
            Self {
                store: store.clone(),
                meddling,
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PaymentGateway for MeddlingGateway {
        async fn create_payment(
            &self,
            request: &ChargeRequest,
        ) -> Result<ChargedPayment, GatewayError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            match self.meddling {
                Meddling::RecordPayment(payment_id) => {
                    let mut order = self
                        .store
                        .find_by_correlation(CorrelationKind::Source, &request.source_id)
                        .await
                        .unwrap()
                        .unwrap();
                    let version = order.version;
                    order.payment.payment_id = Some(payment_id.to_string());
                    self.store.update_if_version(&order, version).await.unwrap();
                }
                Meddling::StoreOutage => self.store.set_unavailable(true),
            }
            Ok(ChargedPayment {
                payment_id: format!("pay_charge_{call}"),
                status: "pending".to_string(),
            })
        }
    }

    fn chargeable(source_id: &str) -> ParsedEvent {
        parsed(
            WebhookEvent::SourceChargeable {
                source_id: source_id.to_string(),
                source_type: Some("gcash".to_string()),
            },
            Some(1_760_000_000),
        )
    }

    fn parsed(event: WebhookEvent, ts: Option<i64>) -> ParsedEvent {
        ParsedEvent {
            event,
            occurred_at: ts.and_then(|t| Utc.timestamp_opt(t, 0).single()),
        }
    }

    async fn seeded(store: &InMemoryOrderStore, correlation: InitialCorrelation) -> Order {
        let order = NewOrder {
            amount: 50_000,
            currency: "PHP".to_string(),
            correlation,
        }
        .into_order(Utc::now())
        .unwrap();
        store.insert(&order).await.unwrap();
        order
    }

    #[tokio::test]
    async fn unrecognized_event_is_ignored() {
        let store = InMemoryOrderStore::new();
        let outcome = Dispatcher::new(&store, &UnconfiguredGateway)
            .dispatch(parsed(
                WebhookEvent::Unrecognized {
                    event_type: "payment.refunded".to_string(),
                },
                None,
            ))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            Outcome::Ignored {
                event_type: "payment.refunded".to_string()
            }
        );
    }

    #[tokio::test]
    async fn lookup_miss_reports_correlation() {
        let store = InMemoryOrderStore::new();
        let outcome = Dispatcher::new(&store, &UnconfiguredGateway)
            .dispatch(parsed(
                WebhookEvent::PaymentPaid {
                    payment_id: "pay_missing".to_string(),
                },
                None,
            ))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            Outcome::NoMatchingOrder {
                kind: CorrelationKind::Payment,
                correlation_id: "pay_missing".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn applied_then_unchanged_on_redelivery() {
        let store = InMemoryOrderStore::new();
        let order = seeded(&store, InitialCorrelation::CheckoutSession("cs_9".to_string())).await;
        let dispatcher = Dispatcher::new(&store, &UnconfiguredGateway);
        let event = || {
            parsed(
                WebhookEvent::CheckoutSessionPaid {
                    checkout_session_id: "cs_9".to_string(),
                    payment: json!({"id": "pay_9"}),
                },
                Some(1_760_000_000),
            )
        };

        assert_eq!(
            dispatcher.dispatch(event()).await.unwrap(),
            Outcome::Applied {
                order_id: order.id,
                version: 1
            }
        );
        assert_eq!(
            dispatcher.dispatch(event()).await.unwrap(),
            Outcome::Unchanged { order_id: order.id }
        );
    }

    #[tokio::test]
    async fn older_event_is_stale() {
        let store = InMemoryOrderStore::new();
        let order = seeded(&store, InitialCorrelation::Payment("pay_s".to_string())).await;
        let dispatcher = Dispatcher::new(&store, &UnconfiguredGateway);

        dispatcher
            .dispatch(parsed(
                WebhookEvent::PaymentFailed {
                    payment_id: "pay_s".to_string(),
                },
                Some(200),
            ))
            .await
            .unwrap();
        let outcome = dispatcher
            .dispatch(parsed(
                WebhookEvent::PaymentPaid {
                    payment_id: "pay_s".to_string(),
                },
                Some(100),
            ))
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Stale { order_id: order.id });
    }

    #[tokio::test]
    async fn chargeable_source_without_gateway_config_fails() {
        let store = InMemoryOrderStore::new();
        seeded(&store, InitialCorrelation::Source("src_x".to_string())).await;

        let err = Dispatcher::new(&store, &UnconfiguredGateway)
            .dispatch(parsed(
                WebhookEvent::SourceChargeable {
                    source_id: "src_x".to_string(),
                    source_type: Some("gcash".to_string()),
                },
                None,
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::Gateway(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn payment_recorded_during_charge_is_kept() {
        let store = InMemoryOrderStore::new();
        let order = seeded(&store, InitialCorrelation::Source("src_race".to_string())).await;
        let gateway = MeddlingGateway::new(&store, Meddling::RecordPayment("pay_other"));

        let outcome = Dispatcher::new(&store, &gateway)
            .dispatch(chargeable("src_race"))
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Unchanged { order_id: order.id });
        let stored = store.get(order.id).await.unwrap().unwrap();
        assert_eq!(stored.payment.payment_id.as_deref(), Some("pay_other"));
    }

    #[tokio::test]
    async fn unrecorded_charge_is_not_repeated_on_redelivery() {
        let store = InMemoryOrderStore::new();
        let order = seeded(&store, InitialCorrelation::Source("src_lost".to_string())).await;
        let gateway = MeddlingGateway::new(&store, Meddling::StoreOutage);
        let dispatcher = Dispatcher::new(&store, &gateway);

        let err = dispatcher.dispatch(chargeable("src_lost")).await.unwrap_err();
        assert!(matches!(err, WebhookError::Persistence(_)), "got: {err:?}");

        store.set_unavailable(false);
        let outcome = dispatcher.dispatch(chargeable("src_lost")).await.unwrap();

        assert_eq!(outcome, Outcome::ChargePending { order_id: order.id });
        assert_eq!(gateway.calls(), 1);
        let stored = store.get(order.id).await.unwrap().unwrap();
        assert!(stored.payment.payment_id.is_none());
        assert!(stored.payment.charge_requested_at.is_some());
    }

    #[tokio::test]
    async fn refused_charge_releases_the_claim() {
        let store = InMemoryOrderStore::new();
        let order = seeded(&store, InitialCorrelation::Source("src_retry".to_string())).await;

        let err = Dispatcher::new(&store, &UnconfiguredGateway)
            .dispatch(chargeable("src_retry"))
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::Gateway(_)), "got: {err:?}");
        let stored = store.get(order.id).await.unwrap().unwrap();
        assert!(stored.payment.charge_requested_at.is_none());

        let gateway = MeddlingGateway::new(&store, Meddling::StoreOutage);
        Dispatcher::new(&store, &gateway)
            .dispatch(chargeable("src_retry"))
            .await
            .unwrap_err();
        assert_eq!(gateway.calls(), 1);
    }
}
