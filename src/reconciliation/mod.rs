use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::cascade::{CancellationReport, CascadeCoordinator};
use crate::domain::measurements::Money;
use crate::domain::order::{Order, OrderCommand, OrderStatus};
use crate::domain::order_return::{OrderReturnCommand, OrderReturnError, ReturnStatus};
use crate::domain::payment::{
    derive_order_payment_status, GatewayId, Payment, PaymentCommand, PaymentError, PaymentEvent, PaymentStatus,
};
use crate::engine::EngineContext;
use crate::error::{EngineError, EngineResult};
use crate::gateway::{GatewayError, GatewayRegistry, PaymentGateway};
use crate::lifecycle::{CommandContext, Committed, EntityRef};

// ============================================================================
// Payment Reconciliation
// ============================================================================
//
// Applies gateway-reported statuses to local payments and derives the order's
// payment status from all of its payments.
//
// Pushes are matched on the gateway's external id and applied under the
// payment status precedence, so duplicates and late, stale deliveries are
// no-ops. A derived `Timeout` cancels the order; a derived `Paid` moves a
// fresh order on to confirmation.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    /// Used when the caller supplies no return URL
    pub default_return_url: Option<String>,
    /// Return reason recorded when a payment failure cancels an order
    pub timeout_reason_id: Uuid,
}

/// Return reason for orders canceled because payment failed
pub const PAYMENT_TIMEOUT_REASON: Uuid = Uuid::from_u128(0x0190_0000_0000_7000_8000_0000_0000_0001);

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            default_return_url: None,
            timeout_reason_id: PAYMENT_TIMEOUT_REASON,
        }
    }
}

/// What a push notification did to local state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PushOutcome {
    Applied,
    /// The payment already has this status
    Duplicate,
    /// Superseded by a terminal or further-progressed status
    Stale,
    /// No payment with this external id
    UnknownPayment,
}

impl PushOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PushOutcome::Applied => "applied",
            PushOutcome::Duplicate => "duplicate",
            PushOutcome::Stale => "stale",
            PushOutcome::UnknownPayment => "unknown_payment",
        }
    }
}

/// Outcome of re-deriving an order's payment status
#[derive(Debug, Clone)]
pub struct OrderPaymentUpdate {
    pub order: Order,
    pub changed: bool,
    /// Present when the derived status canceled the order
    pub cancellation: Option<CancellationReport>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExpiryReport {
    pub expired: Vec<Uuid>,
    pub orders_updated: Vec<Uuid>,
    pub failures: usize,
}

pub struct PaymentReconciler {
    coordinator: Arc<CascadeCoordinator>,
    gateways: GatewayRegistry,
    settings: ReconcilerSettings,
}

impl PaymentReconciler {
    pub fn new(coordinator: Arc<CascadeCoordinator>, gateways: GatewayRegistry, settings: ReconcilerSettings) -> Self {
        Self {
            coordinator,
            gateways,
            settings,
        }
    }

    fn ctx(&self) -> &EngineContext {
        self.coordinator.context()
    }

    pub fn gateways(&self) -> &GatewayRegistry {
        &self.gateways
    }

    pub fn gateway(&self, id: GatewayId) -> EngineResult<Arc<dyn PaymentGateway>> {
        Ok(self.gateways.get(id)?)
    }

    // ========================================================================
    // Payment creation
    // ========================================================================

    /// Create the local payment, then the external one through the order's
    /// gateway (or `gateway` when given). A gateway failure leaves the local
    /// payment in `Created`; the expiry sweep times it out.
    pub async fn start_payment(
        &self,
        order_id: Uuid,
        sum: Money,
        gateway: Option<GatewayId>,
        return_url: Option<&str>,
        ctx: CommandContext,
    ) -> EngineResult<Payment> {
        let order = self.ctx().stores.orders.load(order_id).await?.entity;
        if order.is_canceled {
            return Err(EngineError::invalid(format!("order {order_id} is canceled")));
        }
        let gateway_id = gateway.unwrap_or(order.payment_gateway);
        let adapter = self.gateway(gateway_id)?;

        let (payment, event) = Payment::create(Uuid::now_v7(), order_id, sum, gateway_id)?;
        let created = self.ctx().payments.create(payment, vec![event], ctx).await?;
        self.after_payment(&created).await;

        let return_url = return_url.or(self.settings.default_return_url.as_deref());
        let external = match adapter.create_external_payment(&created.entity, return_url).await {
            Ok(external) => external,
            Err(e) => {
                tracing::warn!(
                    payment_id = %created.entity.id,
                    gateway = %gateway_id,
                    error = %e,
                    "External payment creation failed"
                );
                return Err(e.into());
            }
        };

        let started = self
            .ctx()
            .payments
            .handle(
                created.entity.id,
                PaymentCommand::AttachExternal {
                    external_id: external.external_id,
                    payment_link: external.payment_link,
                    data: external.data,
                },
                ctx,
            )
            .await?;
        self.after_payment(&started).await;
        self.recompute_order_payment_status(order_id, ctx).await?;

        tracing::info!(
            payment_id = %started.entity.id,
            order_id = %order_id,
            gateway = %gateway_id,
            sum,
            "Payment started"
        );
        Ok(started.entity)
    }

    /// Link where the customer completes `payment`
    pub async fn payment_link(&self, payment_id: Uuid) -> EngineResult<Option<String>> {
        let payment = self.ctx().stores.payments.load(payment_id).await?.entity;
        Ok(self.gateway(payment.gateway)?.payment_link(&payment))
    }

    // ========================================================================
    // Push notifications & polling
    // ========================================================================

    /// Verify, decode and apply a raw gateway notification
    pub async fn handle_push(&self, gateway_id: GatewayId, payload: &[u8]) -> EngineResult<PushOutcome> {
        let gateway = gateway_id.as_str();
        let adapter = self.gateway(gateway_id)?;

        let push = match adapter.parse_push(payload) {
            Ok(push) => push,
            Err(e) => {
                let outcome = match e {
                    GatewayError::InvalidSignature => "invalid_signature",
                    _ => "invalid_payload",
                };
                self.ctx().metrics.record_gateway_push(gateway, outcome);
                tracing::warn!(gateway, error = %e, "Rejected gateway push");
                return Err(e.into());
            }
        };

        let Some(payment) = self
            .ctx()
            .stores
            .payment_by_external_id(gateway_id, &push.external_id)
            .await?
        else {
            let outcome = PushOutcome::UnknownPayment;
            self.ctx().metrics.record_gateway_push(gateway, outcome.as_str());
            tracing::warn!(gateway, external_id = %push.external_id, "Push for unknown payment");
            return Ok(outcome);
        };

        let outcome = self
            .apply_gateway_status(payment.id, push.status, CommandContext::system())
            .await?;
        self.ctx().metrics.record_gateway_push(gateway, outcome.as_str());
        match outcome {
            PushOutcome::Applied => tracing::info!(
                gateway,
                payment_id = %payment.id,
                raw_status = %push.raw_status,
                status = push.status.as_str(),
                "Gateway push applied"
            ),
            _ => tracing::debug!(
                gateway,
                payment_id = %payment.id,
                raw_status = %push.raw_status,
                outcome = outcome.as_str(),
                "Gateway push ignored"
            ),
        }
        Ok(outcome)
    }

    /// Poll the gateway and apply what it reports
    pub async fn sync_payment(&self, payment_id: Uuid, ctx: CommandContext) -> EngineResult<Payment> {
        let payment = self.ctx().stores.payments.load(payment_id).await?.entity;
        if payment.status.is_terminal() {
            return Ok(payment);
        }
        if payment.external_id.is_none() {
            tracing::debug!(payment_id = %payment_id, "Payment not started at gateway, nothing to poll");
            return Ok(payment);
        }

        let status = self.gateway(payment.gateway)?.fetch_status(&payment).await?;
        let outcome = self.apply_gateway_status(payment_id, status, ctx).await?;
        tracing::debug!(payment_id = %payment_id, status = status.as_str(), outcome = outcome.as_str(), "Payment polled");
        Ok(self.ctx().stores.payments.load(payment_id).await?.entity)
    }

    /// Capture a held payment at the gateway, then mark it paid
    pub async fn capture_payment(&self, payment_id: Uuid, ctx: CommandContext) -> EngineResult<Payment> {
        let payment = self.ctx().stores.payments.load(payment_id).await?.entity;
        if payment.status != PaymentStatus::Hold {
            return Err(PaymentError::NotHeld(payment.status).into());
        }

        self.gateway(payment.gateway)?.commit_held_payment(&payment).await?;
        self.apply_gateway_status(payment_id, PaymentStatus::Paid, ctx).await?;
        tracing::info!(payment_id = %payment_id, order_id = %payment.order_id, "Held payment captured");
        Ok(self.ctx().stores.payments.load(payment_id).await?.entity)
    }

    async fn apply_gateway_status(
        &self,
        payment_id: Uuid,
        status: PaymentStatus,
        ctx: CommandContext,
    ) -> EngineResult<PushOutcome> {
        let committed = self
            .ctx()
            .payments
            .handle(payment_id, PaymentCommand::ApplyGatewayStatus { status }, ctx)
            .await?;

        if !committed.changed() {
            return Ok(if committed.entity.status == status {
                PushOutcome::Duplicate
            } else {
                PushOutcome::Stale
            });
        }

        self.after_payment(&committed).await;
        self.recompute_order_payment_status(committed.entity.order_id, ctx)
            .await?;
        Ok(PushOutcome::Applied)
    }

    // ========================================================================
    // Refunds
    // ========================================================================

    /// Refund a return's price against a paid payment of its order.
    ///
    /// The return is claimed (`Refunding`, bound to one payment) before the
    /// gateway is called, and the gateway refund is keyed on the return id,
    /// so concurrent callers cannot both send money and a retry after a
    /// partial failure resumes the same refund instead of starting another.
    pub async fn refund_return(&self, return_id: Uuid, ctx: CommandContext) -> EngineResult<Payment> {
        let order_return = self.ctx().stores.returns.load(return_id).await?.entity;
        let amount = order_return.price;
        if amount <= 0 {
            return Err(PaymentError::InvalidRefund(amount).into());
        }

        let payment = match (order_return.status, order_return.refunded_payment_id) {
            (ReturnStatus::Refunded, _) => return Err(OrderReturnError::AlreadyRefunded.into()),
            (ReturnStatus::Refunding, Some(payment_id)) => {
                tracing::info!(return_id = %return_id, payment_id = %payment_id, "Resuming claimed refund");
                self.ctx().stores.payments.load(payment_id).await?.entity
            }
            _ => {
                let payment = self
                    .ctx()
                    .stores
                    .payments_of_order(order_return.order_id)
                    .await?
                    .into_iter()
                    .find(|payment| payment.status == PaymentStatus::Paid && payment.refundable() >= amount)
                    .ok_or(PaymentError::NothingToRefund)?;

                let claimed = self
                    .ctx()
                    .returns
                    .handle(return_id, OrderReturnCommand::BeginRefund { payment_id: payment.id }, ctx)
                    .await?;
                self.ctx()
                    .history
                    .record_envelopes(&claimed.events, &[EntityRef::order(order_return.order_id)])
                    .await;
                payment
            }
        };

        if let Err(e) = self.gateway(payment.gateway)?.refund(&payment, amount, return_id).await {
            tracing::warn!(
                return_id = %return_id,
                payment_id = %payment.id,
                error = %e,
                "Gateway refund failed, return stays claimed for a retry"
            );
            return Err(e.into());
        }

        let refunded = self
            .ctx()
            .payments
            .handle(
                payment.id,
                PaymentCommand::RecordRefund {
                    refund_id: return_id,
                    amount,
                },
                ctx,
            )
            .await?;
        if refunded.changed() {
            self.after_payment(&refunded).await;
        }

        let marked = self
            .ctx()
            .returns
            .handle(return_id, OrderReturnCommand::MarkRefunded { payment_id: payment.id }, ctx)
            .await?;
        self.ctx()
            .history
            .record_envelopes(&marked.events, &[EntityRef::order(order_return.order_id)])
            .await;

        tracing::info!(
            return_id = %return_id,
            payment_id = %payment.id,
            amount,
            refunded_total = refunded.entity.refunded_sum,
            "Return refunded"
        );
        Ok(refunded.entity)
    }

    // ========================================================================
    // Order payment status
    // ========================================================================

    /// Re-derive the order's payment status from a fresh read of its
    /// payments, then apply the transitions the derived status implies.
    pub async fn recompute_order_payment_status(
        &self,
        order_id: Uuid,
        ctx: CommandContext,
    ) -> EngineResult<OrderPaymentUpdate> {
        let stores = &self.ctx().stores;

        let committed = self
            .ctx()
            .orders
            .handle_with(order_id, ctx, |order| async move {
                let payments = stores.payments_of_order(order.id).await?;
                let statuses: Vec<PaymentStatus> = payments.iter().map(|p| p.status).collect();
                let status = derive_order_payment_status(order.payment_status, &statuses);
                Ok::<_, EngineError>(Some(OrderCommand::SetPaymentStatus { status }))
            })
            .await?;

        let changed = committed.changed();
        if changed {
            self.coordinator.after_order(&committed).await;
        }

        let mut order = committed.entity;
        let mut cancellation = None;
        let open = !order.is_canceled && !order.status.is_terminal();

        match order.payment_status {
            PaymentStatus::Timeout if open => {
                tracing::warn!(order_id = %order_id, "Payment failed, canceling order");
                let report = self
                    .coordinator
                    .cancel_order(order_id, self.settings.timeout_reason_id, CommandContext::system())
                    .await?;
                order = self.ctx().stores.orders.load(order_id).await?.entity;
                cancellation = Some(report);
            }
            PaymentStatus::Paid if open && order.status == OrderStatus::Created => {
                let confirmed = self
                    .ctx()
                    .orders
                    .handle(
                        order_id,
                        OrderCommand::ChangeStatus {
                            to: OrderStatus::AwaitingConfirmation,
                        },
                        CommandContext::system(),
                    )
                    .await?;
                self.coordinator.after_order(&confirmed).await;
                order = confirmed.entity;
            }
            _ => {}
        }

        Ok(OrderPaymentUpdate {
            order,
            changed,
            cancellation,
        })
    }

    // ========================================================================
    // Expiry sweep
    // ========================================================================

    /// Time out every unresolved payment older than its gateway's window.
    /// Called by the external periodic sweep.
    pub async fn expire_overdue_payments(&self, now: DateTime<Utc>) -> EngineResult<ExpiryReport> {
        let ctx = CommandContext::system();
        let open = self
            .ctx()
            .stores
            .payments
            .find(&|payment: &Payment| !payment.status.is_terminal())
            .await?;

        let mut report = ExpiryReport::default();
        let mut orders = BTreeSet::new();

        for payment in open {
            let window = match self.gateways.get(payment.gateway) {
                Ok(adapter) => adapter.duration(),
                Err(e) => {
                    tracing::warn!(payment_id = %payment.id, error = %e, "Cannot judge payment expiry");
                    continue;
                }
            };
            if !payment.is_overdue(window, now) {
                continue;
            }

            let committed = self
                .ctx()
                .payments
                .handle(
                    payment.id,
                    PaymentCommand::ApplyGatewayStatus {
                        status: PaymentStatus::Timeout,
                    },
                    ctx,
                )
                .await;
            match committed {
                Ok(committed) if committed.changed() => {
                    self.after_payment(&committed).await;
                    tracing::info!(payment_id = %payment.id, order_id = %payment.order_id, "Payment expired");
                    report.expired.push(payment.id);
                    orders.insert(payment.order_id);
                }
                Ok(_) => {}
                Err(e) => {
                    report.failures += 1;
                    tracing::error!(payment_id = %payment.id, error = %e, "Payment expiry failed");
                }
            }
        }

        for order_id in orders {
            match self.recompute_order_payment_status(order_id, ctx).await {
                Ok(_) => report.orders_updated.push(order_id),
                Err(e) => {
                    report.failures += 1;
                    tracing::error!(order_id = %order_id, error = %e, "Order payment status update failed");
                }
            }
        }
        Ok(report)
    }

    async fn after_payment(&self, committed: &Committed<Payment>) {
        let payment = &committed.entity;
        self.ctx()
            .history
            .record_envelopes(&committed.events, &[EntityRef::order(payment.order_id)])
            .await;

        for envelope in &committed.events {
            if let PaymentEvent::StatusChanged(e) = &envelope.event_data {
                self.ctx().metrics.record_transition("payment", e.to.as_str());
                tracing::info!(
                    payment_id = %payment.id,
                    order_id = %payment.order_id,
                    from = e.from.as_str(),
                    to = e.to.as_str(),
                    "Payment status changed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{delivery_draft, local_push, order_draft, Harness};
    use chrono::Duration;

    async fn started_payment(harness: &Harness, sum: Money) -> (Order, Payment) {
        let order = harness
            .engine
            .fulfillment
            .create_order(order_draft(GatewayId::Local), CommandContext::system())
            .await
            .unwrap();
        let payment = harness
            .engine
            .payments
            .start_payment(order.id, sum, None, None, CommandContext::system())
            .await
            .unwrap();
        (order, payment)
    }

    async fn push(harness: &Harness, payment: &Payment, status: PaymentStatus) -> PushOutcome {
        harness
            .engine
            .payments
            .handle_push(GatewayId::Local, &local_push(payment, status))
            .await
            .unwrap()
    }

    async fn order(harness: &Harness, id: Uuid) -> Order {
        harness.engine.fulfillment.order(id).await.unwrap()
    }

    #[tokio::test]
    async fn test_start_payment_moves_order_to_started() {
        let harness = Harness::new();
        let (order_before, payment) = started_payment(&harness, 10_000).await;

        assert_eq!(payment.status, PaymentStatus::Started);
        assert!(payment.external_id.is_some());
        assert!(payment.payment_link.is_some());
        assert_eq!(order(&harness, order_before.id).await.payment_status, PaymentStatus::Started);
    }

    #[tokio::test]
    async fn test_single_succeeded_payment_marks_order_paid() {
        let harness = Harness::new();
        let (order_before, payment) = started_payment(&harness, 10_000).await;

        assert_eq!(push(&harness, &payment, PaymentStatus::Paid).await, PushOutcome::Applied);

        let order = order(&harness, order_before.id).await;
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert_eq!(order.status, OrderStatus::AwaitingConfirmation);
    }

    #[tokio::test]
    async fn test_duplicate_push_is_idempotent() {
        let harness = Harness::new();
        let (order_before, payment) = started_payment(&harness, 10_000).await;

        push(&harness, &payment, PaymentStatus::Paid).await;
        let payment_once = harness.engine.payments.ctx().stores.payments.load(payment.id).await.unwrap();
        let order_once = harness.engine.payments.ctx().stores.orders.load(order_before.id).await.unwrap();

        assert_eq!(push(&harness, &payment, PaymentStatus::Paid).await, PushOutcome::Duplicate);

        let payment_twice = harness.engine.payments.ctx().stores.payments.load(payment.id).await.unwrap();
        let order_twice = harness.engine.payments.ctx().stores.orders.load(order_before.id).await.unwrap();
        assert_eq!(payment_once.version, payment_twice.version);
        assert_eq!(order_once.version, order_twice.version);
        assert_eq!(payment_twice.entity.status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn test_paid_wins_in_either_delivery_order() {
        for sequence in [
            [PaymentStatus::Paid, PaymentStatus::Waiting],
            [PaymentStatus::Waiting, PaymentStatus::Paid],
        ] {
            let harness = Harness::new();
            let (order_before, payment) = started_payment(&harness, 10_000).await;

            for status in sequence {
                push(&harness, &payment, status).await;
            }

            let stored = harness.engine.payments.ctx().stores.payments.load(payment.id).await.unwrap();
            assert_eq!(stored.entity.status, PaymentStatus::Paid, "{sequence:?}");
            assert_eq!(order(&harness, order_before.id).await.payment_status, PaymentStatus::Paid);
        }
    }

    #[tokio::test]
    async fn test_late_waiting_is_stale() {
        let harness = Harness::new();
        let (_, payment) = started_payment(&harness, 10_000).await;

        push(&harness, &payment, PaymentStatus::Hold).await;
        assert_eq!(push(&harness, &payment, PaymentStatus::Waiting).await, PushOutcome::Stale);
    }

    #[tokio::test]
    async fn test_paid_and_timeout_is_partial_not_canceled() {
        let harness = Harness::new();
        let (order_before, first) = started_payment(&harness, 6_000).await;
        let second = harness
            .engine
            .payments
            .start_payment(order_before.id, 4_000, None, None, CommandContext::system())
            .await
            .unwrap();

        push(&harness, &first, PaymentStatus::Paid).await;
        push(&harness, &second, PaymentStatus::Timeout).await;

        let order = order(&harness, order_before.id).await;
        assert_eq!(order.payment_status, PaymentStatus::PartialDone);
        assert!(!order.is_canceled);
    }

    #[tokio::test]
    async fn test_timeout_cancels_order_with_system_reason() {
        let harness = Harness::new();
        let (order_before, payment) = started_payment(&harness, 10_000).await;

        push(&harness, &payment, PaymentStatus::Timeout).await;

        let order = order(&harness, order_before.id).await;
        assert_eq!(order.payment_status, PaymentStatus::Timeout);
        assert!(order.is_canceled);
        assert_eq!(order.cancel_reason_id, Some(harness.timeout_reason_id));
    }

    #[tokio::test]
    async fn test_unknown_external_id() {
        let harness = Harness::new();
        let payload = br#"{"external_id":"local-missing","status":"paid"}"#;
        let outcome = harness.engine.payments.handle_push(GatewayId::Local, payload).await.unwrap();
        assert_eq!(outcome, PushOutcome::UnknownPayment);
    }

    #[tokio::test]
    async fn test_capture_requires_hold() {
        let harness = Harness::new();
        let (order_before, payment) = started_payment(&harness, 10_000).await;

        let early = harness.engine.payments.capture_payment(payment.id, CommandContext::system()).await;
        assert!(matches!(early, Err(EngineError::Payment(PaymentError::NotHeld(PaymentStatus::Started)))));

        push(&harness, &payment, PaymentStatus::Hold).await;
        assert_eq!(order(&harness, order_before.id).await.payment_status, PaymentStatus::Hold);

        let captured = harness
            .engine
            .payments
            .capture_payment(payment.id, CommandContext::system())
            .await
            .unwrap();
        assert_eq!(captured.status, PaymentStatus::Paid);
        assert!(harness.local.captured(captured.external_id.as_deref().unwrap()).await);
        assert_eq!(order(&harness, order_before.id).await.payment_status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn test_sync_applies_polled_status() {
        let harness = Harness::new();
        let (_, payment) = started_payment(&harness, 10_000).await;
        harness
            .local
            .set_status(payment.external_id.as_deref().unwrap(), PaymentStatus::Waiting)
            .await;

        let synced = harness
            .engine
            .payments
            .sync_payment(payment.id, CommandContext::system())
            .await
            .unwrap();
        assert_eq!(synced.status, PaymentStatus::Waiting);
    }

    #[tokio::test]
    async fn test_expiry_sweep_times_out_and_cancels() {
        let harness = Harness::new();
        let (order_before, payment) = started_payment(&harness, 10_000).await;

        let early = harness.engine.payments.expire_overdue_payments(Utc::now()).await.unwrap();
        assert!(early.expired.is_empty());

        let later = payment.created_at + Duration::hours(2);
        let report = harness.engine.payments.expire_overdue_payments(later).await.unwrap();
        assert_eq!(report.expired, vec![payment.id]);
        assert!(order(&harness, order_before.id).await.is_canceled);
    }

    #[tokio::test]
    async fn test_refund_return_against_paid_payment() {
        let harness = Harness::new();
        let (order_before, payment) = started_payment(&harness, 10_000).await;
        push(&harness, &payment, PaymentStatus::Paid).await;

        let report = harness
            .engine
            .fulfillment
            .cancel_order(order_before.id, Uuid::now_v7(), CommandContext::system())
            .await
            .unwrap();
        let return_id = report.returns[0];

        let refunded = harness
            .engine
            .payments
            .refund_return(return_id, CommandContext::system())
            .await
            .unwrap();
        let delivery_cost = order_draft(GatewayId::Local).delivery_cost;
        assert_eq!(refunded.refunded_sum, delivery_cost);
        assert_eq!(
            harness.local.refunded(payment.external_id.as_deref().unwrap()).await,
            delivery_cost
        );

        let again = harness.engine.payments.refund_return(return_id, CommandContext::system()).await;
        assert!(matches!(again, Err(EngineError::Return(OrderReturnError::AlreadyRefunded))));
    }

    async fn paid_order_with_return(harness: &Harness) -> (Order, Payment, Uuid) {
        let (order_before, payment) = started_payment(harness, 10_000).await;
        push(harness, &payment, PaymentStatus::Paid).await;
        let report = harness
            .engine
            .fulfillment
            .cancel_order(order_before.id, Uuid::now_v7(), CommandContext::system())
            .await
            .unwrap();
        let payment = harness.engine.payments.ctx().stores.payments.load(payment.id).await.unwrap().entity;
        (order_before, payment, report.returns[0])
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_refunds_of_one_return_pay_out_once() {
        let harness = Arc::new(Harness::new());
        let (_, payment, return_id) = paid_order_with_return(&harness).await;
        let delivery_cost = order_draft(GatewayId::Local).delivery_cost;

        let mut tasks = Vec::new();
        for _ in 0..6 {
            let harness = harness.clone();
            tasks.push(tokio::spawn(async move {
                harness
                    .engine
                    .payments
                    .refund_return(return_id, CommandContext::system())
                    .await
            }));
        }
        let mut succeeded = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(EngineError::Return(
                    OrderReturnError::RefundInProgress(_) | OrderReturnError::AlreadyRefunded,
                )) => {}
                Err(other) => panic!("unexpected refund error: {other}"),
            }
        }
        assert!(succeeded >= 1);

        let external_id = payment.external_id.as_deref().unwrap();
        assert_eq!(harness.local.refunded(external_id).await, delivery_cost);
        let stored = harness.engine.payments.ctx().stores.payments.load(payment.id).await.unwrap().entity;
        assert_eq!(stored.refunded_sum, delivery_cost);
        assert_eq!(stored.refund_ids, vec![return_id]);
        let order_return = harness.engine.payments.ctx().stores.returns.load(return_id).await.unwrap().entity;
        assert_eq!(order_return.status, ReturnStatus::Refunded);
    }

    #[tokio::test]
    async fn test_refund_retry_resumes_claimed_return() {
        let harness = Harness::new();
        let (order_before, payment, return_id) = paid_order_with_return(&harness).await;
        let delivery_cost = order_draft(GatewayId::Local).delivery_cost;

        // Claimed and paid out at the gateway, but never recorded locally
        harness
            .engine
            .payments
            .ctx()
            .returns
            .handle(
                return_id,
                OrderReturnCommand::BeginRefund { payment_id: payment.id },
                CommandContext::system(),
            )
            .await
            .unwrap();
        harness.local.refund(&payment, delivery_cost, return_id).await.unwrap();

        let refunded = harness
            .engine
            .payments
            .refund_return(return_id, CommandContext::system())
            .await
            .unwrap();

        assert_eq!(refunded.refunded_sum, delivery_cost);
        assert_eq!(
            harness.local.refunded(payment.external_id.as_deref().unwrap()).await,
            delivery_cost
        );
        let order_return = harness.engine.payments.ctx().stores.returns.load(return_id).await.unwrap().entity;
        assert_eq!(order_return.status, ReturnStatus::Refunded);
        assert_eq!(order_return.order_id, order_before.id);
    }

    #[tokio::test]
    async fn test_two_returns_refund_separately_from_one_payment() {
        let harness = Harness::new();
        let (order_before, payment) = started_payment(&harness, 10_000).await;
        push(&harness, &payment, PaymentStatus::Paid).await;
        let fulfillment = &harness.engine.fulfillment;
        let mut return_ids = Vec::new();
        for _ in 0..2 {
            let delivery = fulfillment
                .add_delivery(order_before.id, delivery_draft(), CommandContext::system())
                .await
                .unwrap();
            let report = fulfillment
                .cancel_delivery(delivery.id, Uuid::now_v7(), CommandContext::system())
                .await
                .unwrap();
            return_ids.extend(report.returns);
        }

        for return_id in &return_ids {
            harness
                .engine
                .payments
                .refund_return(*return_id, CommandContext::system())
                .await
                .unwrap();
        }

        let delivery_cost = delivery_draft().delivery_cost;
        assert_eq!(
            harness.local.refunded(payment.external_id.as_deref().unwrap()).await,
            2 * delivery_cost
        );
        let stored = harness.engine.payments.ctx().stores.payments.load(payment.id).await.unwrap().entity;
        assert_eq!(stored.refunded_sum, 2 * delivery_cost);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_duplicate_pushes_apply_once() {
        let harness = Arc::new(Harness::new());
        let (order_before, payment) = started_payment(&harness, 10_000).await;

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let harness = harness.clone();
            let payment = payment.clone();
            tasks.push(tokio::spawn(async move {
                push(&harness, &payment, PaymentStatus::Paid).await
            }));
        }
        let mut applied = 0;
        for task in tasks {
            if task.await.unwrap() == PushOutcome::Applied {
                applied += 1;
            }
        }

        assert_eq!(applied, 1);
        let order = order(&harness, order_before.id).await;
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert_eq!(order.status, OrderStatus::AwaitingConfirmation);
    }
}
