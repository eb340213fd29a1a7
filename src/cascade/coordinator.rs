use std::sync::Arc;
use uuid::Uuid;

use super::rollup_batch::RollupBatch;
use super::side_effects::{RetryReport, SideEffect, SideEffectLog};
use crate::collaborators::{CollaboratorError, Notification, NotificationEvent};
use crate::domain::cargo::{Cargo, CargoCommand, CargoEvent};
use crate::domain::delivery::{Delivery, DeliveryCommand, DeliveryEvent};
use crate::domain::order::{Order, OrderCommand, OrderEvent};
use crate::domain::package::Package;
use crate::domain::shipment::{Shipment, ShipmentCommand, ShipmentEvent, ShipmentStatus};
use crate::engine::EngineContext;
use crate::error::{EngineError, EngineResult};
use crate::history::{HistoryEvent, HistoryEventType};
use crate::lifecycle::{CommandContext, Committed, Entity, EntityRef};
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};

// ============================================================================
// Cascade Coordinator
// ============================================================================
//
// Post-commit hooks, invoked explicitly by the operation that committed the
// change. Each hook runs in a fixed order:
//
//   1. history append         (never fails the caller)
//   2. rollups, bottom-up     (errors propagate)
//   3. dependent transitions  (order problem flag)
//   4. side effects           (carrier order, cargo assignment; failures are
//                              logged and kept for the corrective pass)
//   5. notifications          (failures are logged and counted)
//
// Parents are always recomputed from a fresh child query inside the parent's
// own load/save cycle, never from the collection the caller holds.
//
// ============================================================================

pub struct CascadeCoordinator {
    pub(super) ctx: Arc<EngineContext>,
    carrier_breaker: CircuitBreaker,
    side_effects: Arc<SideEffectLog>,
}

impl CascadeCoordinator {
    pub fn new(ctx: Arc<EngineContext>, carrier_breaker: CircuitBreakerConfig) -> Self {
        Self {
            ctx,
            carrier_breaker: CircuitBreaker::new("carrier_orders", carrier_breaker),
            side_effects: Arc::new(SideEffectLog::new()),
        }
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.ctx
    }

    pub fn side_effects(&self) -> &Arc<SideEffectLog> {
        &self.side_effects
    }

    pub fn carrier_breaker(&self) -> &CircuitBreaker {
        &self.carrier_breaker
    }

    // ========================================================================
    // Order / Delivery / Cargo hooks
    // ========================================================================

    pub async fn after_order(&self, committed: &Committed<Order>) {
        let order = &committed.entity;
        let order_ref = order.entity_ref();
        self.ctx.history.record_envelopes(&committed.events, &[order_ref]).await;

        for envelope in &committed.events {
            match &envelope.event_data {
                OrderEvent::StatusChanged(e) => {
                    self.ctx.metrics.record_transition("order", e.to.as_str());
                    tracing::info!(
                        order_id = %order.id,
                        from = e.from.as_str(),
                        to = e.to.as_str(),
                        "Order status changed"
                    );
                    self.notify(NotificationEvent::StatusChanged, order_ref, order_ref, e.to.as_str())
                        .await;
                }
                OrderEvent::Canceled(e) => {
                    self.ctx.metrics.record_transition("order", "canceled");
                    tracing::info!(
                        order_id = %order.id,
                        previous_status = e.previous_status.as_str(),
                        return_reason_id = %e.return_reason_id,
                        "Order canceled"
                    );
                    self.notify(NotificationEvent::Canceled, order_ref, order_ref, "canceled")
                        .await;
                }
                OrderEvent::ProblemChanged(e) => {
                    tracing::info!(order_id = %order.id, is_problem = e.is_problem, "Order problem flag changed");
                }
                OrderEvent::PaymentStatusChanged(e) => {
                    tracing::info!(
                        order_id = %order.id,
                        from = e.from.as_str(),
                        to = e.to.as_str(),
                        "Order payment status changed"
                    );
                }
                OrderEvent::Created(_) => {
                    tracing::info!(order_id = %order.id, "Order created");
                }
            }
        }
    }

    pub async fn after_delivery(&self, committed: &Committed<Delivery>) {
        let delivery = &committed.entity;
        self.ctx
            .history
            .record_envelopes(
                &committed.events,
                &[EntityRef::order(delivery.order_id), delivery.entity_ref()],
            )
            .await;

        for envelope in &committed.events {
            match &envelope.event_data {
                DeliveryEvent::StatusChanged(e) => {
                    self.ctx.metrics.record_transition("delivery", e.to.as_str());
                    tracing::info!(
                        delivery_id = %delivery.id,
                        from = e.from.as_str(),
                        to = e.to.as_str(),
                        "Delivery status changed"
                    );
                }
                DeliveryEvent::Canceled(_) => {
                    self.ctx.metrics.record_transition("delivery", "canceled");
                    tracing::info!(delivery_id = %delivery.id, "Delivery canceled");
                }
                DeliveryEvent::CarrierOrderSet(e) => {
                    tracing::info!(
                        delivery_id = %delivery.id,
                        carrier_order_id = %e.carrier_order_id,
                        created = e.created,
                        "Carrier order saved"
                    );
                }
                DeliveryEvent::Created(_) | DeliveryEvent::Recomputed(_) => {}
            }
        }
    }

    pub async fn after_cargo(&self, committed: &Committed<Cargo>) {
        let cargo = &committed.entity;
        self.ctx
            .history
            .record_envelopes(&committed.events, &[cargo.entity_ref()])
            .await;

        for envelope in &committed.events {
            match &envelope.event_data {
                CargoEvent::StatusChanged { from, to } => {
                    self.ctx.metrics.record_transition("cargo", to.as_str());
                    tracing::info!(cargo_id = %cargo.id, from = from.as_str(), to = to.as_str(), "Cargo status changed");
                }
                CargoEvent::Canceled { .. } => {
                    self.ctx.metrics.record_transition("cargo", "canceled");
                    tracing::info!(cargo_id = %cargo.id, "Cargo canceled");
                }
                CargoEvent::Created { .. } | CargoEvent::Recomputed { .. } => {}
            }
        }
    }

    // ========================================================================
    // Package hooks
    // ========================================================================

    /// Several package commits of one logical operation: one shipment
    /// recompute per affected shipment.
    pub async fn after_packages(&self, committed: &[Committed<Package>], ctx: CommandContext) -> EngineResult<()> {
        let mut batch = RollupBatch::new();
        for package in committed {
            self.ctx
                .history
                .record_envelopes(&package.events, &package_primaries(&package.entity))
                .await;
            if package.changed() {
                batch.shipment(package.entity.shipment_id);
            }
        }
        self.flush(batch, ctx).await
    }

    pub async fn after_package(&self, committed: &Committed<Package>, ctx: CommandContext) -> EngineResult<()> {
        self.after_packages(std::slice::from_ref(committed), ctx).await
    }

    pub async fn after_package_deleted(&self, package: &Package, ctx: CommandContext) -> EngineResult<()> {
        self.record_deletion(package.entity_ref(), package_primaries(package), ctx)
            .await;

        let mut batch = RollupBatch::new();
        batch.shipment(package.shipment_id);
        self.flush(batch, ctx).await
    }

    // ========================================================================
    // Shipment hooks
    // ========================================================================

    pub async fn after_shipment(&self, committed: &Committed<Shipment>, ctx: CommandContext) -> EngineResult<()> {
        let shipment = &committed.entity;
        let shipment_ref = shipment.entity_ref();
        let order_ref = EntityRef::order(shipment.order_id);
        self.record_shipment_history(committed).await;

        let mut batch = RollupBatch::new();
        let mut reevaluate_problem = false;
        let mut effects = Vec::new();
        let mut notifications = Vec::new();

        for envelope in &committed.events {
            match &envelope.event_data {
                ShipmentEvent::Created(_) => {
                    batch.delivery(shipment.delivery_id);
                }
                ShipmentEvent::Recomputed(_) => {
                    batch.cargo(shipment.cargo_id).delivery(shipment.delivery_id);
                }
                ShipmentEvent::CargoChanged(e) => {
                    self.record_cargo_links(shipment_ref, e.old, e.new, ctx).await;
                    batch.cargo(e.old).cargo(e.new);
                }
                ShipmentEvent::ProblemChanged(e) => {
                    reevaluate_problem = true;
                    if e.is_problem {
                        tracing::warn!(shipment_id = %shipment.id, order_id = %shipment.order_id, "Shipment flagged as problem");
                        notifications.push((NotificationEvent::ProblemRaised, shipment.status.as_str()));
                    }
                }
                ShipmentEvent::StatusChanged(e) => {
                    self.ctx.metrics.record_transition("shipment", e.to.as_str());
                    tracing::info!(
                        shipment_id = %shipment.id,
                        from = e.from.as_str(),
                        to = e.to.as_str(),
                        "Shipment status changed"
                    );
                    reevaluate_problem = true;
                    if e.to.triggers_carrier_order() {
                        effects.push(SideEffect::CarrierOrderUpsert {
                            delivery_id: shipment.delivery_id,
                        });
                    }
                    if e.to == ShipmentStatus::Assembled {
                        effects.push(SideEffect::CargoAssignment {
                            shipment_id: shipment.id,
                        });
                    }
                    notifications.push((NotificationEvent::StatusChanged, e.to.as_str()));
                }
                ShipmentEvent::Canceled(_) => {
                    self.ctx.metrics.record_transition("shipment", "canceled");
                    tracing::info!(shipment_id = %shipment.id, "Shipment canceled");
                    reevaluate_problem = true;
                    batch.delivery(shipment.delivery_id);
                    if let Some(cargo_id) = shipment.cargo_id {
                        effects.push(SideEffect::CargoDetachment {
                            shipment_id: shipment.id,
                            cargo_id,
                        });
                    }
                    notifications.push((NotificationEvent::Canceled, "canceled"));
                }
            }
        }

        self.flush(batch, ctx).await?;
        if reevaluate_problem {
            self.reevaluate_order_problem(shipment.order_id, ctx).await?;
        }
        for effect in effects {
            self.run_side_effect(effect, ctx).await;
        }
        for (event, status) in notifications {
            self.notify(event, order_ref, shipment_ref, status).await;
        }
        Ok(())
    }

    /// Packages go with the shipment; the former cargo and the delivery are
    /// recomputed without it. The shipment is already gone, so the rollups
    /// run even when a package could not be removed; the first such error is
    /// returned afterwards.
    pub async fn after_shipment_deleted(&self, shipment: &Shipment, ctx: CommandContext) -> EngineResult<()> {
        let shipment_ref = shipment.entity_ref();
        let primaries = vec![EntityRef::order(shipment.order_id), shipment_ref];
        let mut leftover: Option<EngineError> = None;

        match self.ctx.stores.packages_of_shipment(shipment.id).await {
            Ok(packages) => {
                for package in packages {
                    match self.ctx.packages.delete(package.id, |_| Ok(())).await {
                        Ok(_) => {
                            self.record_deletion(package.entity_ref(), primaries.clone(), ctx)
                                .await
                        }
                        Err(e) => {
                            tracing::error!(
                                shipment_id = %shipment.id,
                                package_id = %package.id,
                                error = %e,
                                "Package of deleted shipment was not removed"
                            );
                            leftover.get_or_insert(e);
                        }
                    }
                }
            }
            Err(e) => {
                tracing::error!(shipment_id = %shipment.id, error = %e, "Packages of deleted shipment not listed");
                leftover = Some(e.into());
            }
        }
        self.record_deletion(shipment_ref, primaries, ctx).await;
        self.record_cargo_links(shipment_ref, shipment.cargo_id, None, ctx)
            .await;

        let mut batch = RollupBatch::new();
        batch.cargo(shipment.cargo_id).delivery(shipment.delivery_id);
        self.flush(batch, ctx).await?;
        self.reevaluate_order_problem(shipment.order_id, ctx).await?;
        leftover.map_or(Ok(()), Err)
    }

    /// Attach (`Some`) or detach (`None`) a shipment; only an open cargo
    /// takes new shipments.
    ///
    /// The cargo is checked on every commit attempt and again after the
    /// commit. A cargo canceled or shipped in between either lists the
    /// shipment when detaching its members or is seen closed by the second
    /// check, which takes the shipment back out.
    pub async fn assign_cargo(
        &self,
        shipment_id: Uuid,
        cargo_id: Option<Uuid>,
        ctx: CommandContext,
    ) -> EngineResult<Committed<Shipment>> {
        let stores = &self.ctx.stores;
        let committed = self
            .ctx
            .shipments
            .handle_with(shipment_id, ctx, |_shipment| async move {
                if let Some(cargo_id) = cargo_id {
                    stores.cargos.load(cargo_id).await?.entity.ensure_accepts_shipments()?;
                }
                Ok::<_, EngineError>(Some(ShipmentCommand::AssignCargo { cargo_id }))
            })
            .await?;
        self.after_cargo_change(&committed, ctx).await?;

        if let Some(cargo_id) = cargo_id.filter(|_| committed.changed()) {
            let cargo = self.ctx.stores.cargos.load(cargo_id).await?.entity;
            if let Err(e) = cargo.ensure_accepts_shipments() {
                tracing::warn!(
                    shipment_id = %shipment_id,
                    cargo_id = %cargo_id,
                    status = %cargo.status,
                    "Cargo closed while the shipment joined, detaching"
                );
                self.detach_from_cargo(shipment_id, cargo_id, ctx).await?;
                return Err(e.into());
            }
        }
        Ok(committed)
    }

    /// History links and cargo rollups for a committed membership change
    async fn after_cargo_change(&self, committed: &Committed<Shipment>, ctx: CommandContext) -> EngineResult<()> {
        if !committed.changed() {
            return Ok(());
        }
        self.record_shipment_history(committed).await;
        let mut batch = RollupBatch::new();
        for envelope in &committed.events {
            if let ShipmentEvent::CargoChanged(e) = &envelope.event_data {
                self.record_cargo_links(committed.entity.entity_ref(), e.old, e.new, ctx)
                    .await;
                batch.cargo(e.old).cargo(e.new);
            }
        }
        self.flush(batch, ctx).await
    }

    // ========================================================================
    // Rollups
    // ========================================================================

    /// Recompute shipments, then the cargos and deliveries above them. A
    /// shipment whose values did not change does not trigger its parents.
    pub async fn flush(&self, mut batch: RollupBatch, ctx: CommandContext) -> EngineResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let shipment_ids: Vec<Uuid> = batch.shipments().collect();
        for shipment_id in shipment_ids {
            let committed = match self.recompute_shipment(shipment_id, ctx).await {
                Ok(committed) => committed,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            };
            if committed.changed() {
                batch
                    .cargo(committed.entity.cargo_id)
                    .delivery(committed.entity.delivery_id);
            }
        }

        let cargo_ids: Vec<Uuid> = batch.cargos().collect();
        for cargo_id in cargo_ids {
            match self.recompute_cargo(cargo_id, ctx).await {
                Err(e) if e.is_not_found() => continue,
                other => other?,
            }
        }

        let delivery_ids: Vec<Uuid> = batch.deliveries().collect();
        for delivery_id in delivery_ids {
            match self.recompute_delivery(delivery_id, ctx).await {
                Err(e) if e.is_not_found() => continue,
                other => other?,
            }
        }
        Ok(())
    }

    async fn recompute_shipment(&self, shipment_id: Uuid, ctx: CommandContext) -> EngineResult<Committed<Shipment>> {
        let stores = &self.ctx.stores;
        let rules = &self.ctx.rules;

        let committed = self
            .ctx
            .shipments
            .handle_with(shipment_id, ctx, |shipment| async move {
                let packages = stores.packages_of_shipment(shipment.id).await?;
                let rollup = rules.shipment(&packages, &shipment.items);
                Ok::<_, EngineError>(Some(ShipmentCommand::Recompute {
                    measurements: rollup.measurements,
                    cost: rollup.cost,
                }))
            })
            .await?;

        self.ctx.metrics.record_rollup("shipment");
        if committed.changed() {
            tracing::debug!(
                shipment_id = %shipment_id,
                weight = committed.entity.measurements.weight,
                cost = committed.entity.cost,
                "Shipment recomputed"
            );
            self.record_shipment_history(&committed).await;
        }
        Ok(committed)
    }

    async fn recompute_cargo(&self, cargo_id: Uuid, ctx: CommandContext) -> EngineResult<()> {
        let stores = &self.ctx.stores;
        let rules = &self.ctx.rules;

        let committed = self
            .ctx
            .cargos
            .handle_with(cargo_id, ctx, |cargo| async move {
                let members = stores.shipments_in_cargo(cargo.id).await?;
                Ok::<_, EngineError>(Some(CargoCommand::Recompute {
                    measurements: rules.cargo(&members),
                }))
            })
            .await?;

        self.ctx.metrics.record_rollup("cargo");
        if committed.changed() {
            tracing::debug!(cargo_id = %cargo_id, weight = committed.entity.measurements.weight, "Cargo recomputed");
            self.after_cargo(&committed).await;
        }
        Ok(())
    }

    async fn recompute_delivery(&self, delivery_id: Uuid, ctx: CommandContext) -> EngineResult<()> {
        let stores = &self.ctx.stores;
        let rules = &self.ctx.rules;

        let committed = self
            .ctx
            .deliveries
            .handle_with(delivery_id, ctx, |delivery| async move {
                let shipments = stores.shipments_of_delivery(delivery.id).await?;
                let rollup = rules.delivery(&shipments);
                Ok::<_, EngineError>(Some(DeliveryCommand::Recompute {
                    measurements: rollup.measurements,
                    cost: rollup.cost,
                }))
            })
            .await?;

        self.ctx.metrics.record_rollup("delivery");
        if committed.changed() {
            tracing::debug!(
                delivery_id = %delivery_id,
                weight = committed.entity.measurements.weight,
                cost = committed.entity.cost,
                "Delivery recomputed"
            );
            self.after_delivery(&committed).await;
        }
        Ok(())
    }

    // ========================================================================
    // Order problem flag
    // ========================================================================

    /// The order is a problem iff one of its non-canceled shipments is
    pub async fn reevaluate_order_problem(&self, order_id: Uuid, ctx: CommandContext) -> EngineResult<()> {
        let stores = &self.ctx.stores;

        let committed = self
            .ctx
            .orders
            .handle_with(order_id, ctx, |order| async move {
                let shipments = stores.shipments_of_order(order.id).await?;
                let is_problem = shipments
                    .iter()
                    .any(|shipment| !shipment.is_canceled && shipment.is_problem);
                Ok::<_, EngineError>(Some(OrderCommand::SetProblem { is_problem }))
            })
            .await?;

        if committed.changed() {
            self.after_order(&committed).await;
        }
        Ok(())
    }

    // ========================================================================
    // Side effects
    // ========================================================================

    /// Run one best-effort effect; a failure is logged and kept for the
    /// corrective pass. Returns whether the effect succeeded.
    pub async fn run_side_effect(&self, effect: SideEffect, ctx: CommandContext) -> bool {
        match self.execute_side_effect(effect, ctx).await {
            Ok(()) => {
                if self.side_effects.resolve(&effect).await {
                    tracing::info!(effect = effect.label(), target = %effect.target(), "Pending side effect resolved");
                }
                true
            }
            Err(e) => {
                self.ctx.metrics.record_side_effect_failure(effect.label());
                let failures = self.side_effects.record(effect, &e.to_string()).await;
                tracing::warn!(
                    effect = effect.label(),
                    target = %effect.target(),
                    failures,
                    error = %e,
                    "Side effect failed, kept for corrective pass"
                );
                false
            }
        }
    }

    /// Replay every recorded side-effect failure
    pub async fn retry_failed_side_effects(&self, ctx: CommandContext) -> RetryReport {
        let mut report = RetryReport::default();

        for pending in self.side_effects.pending().await {
            report.attempted += 1;
            let succeeded = self.run_side_effect(pending.effect, ctx).await;
            self.ctx
                .metrics
                .record_side_effect_retry(pending.effect.label(), succeeded);
            if succeeded {
                report.succeeded += 1;
            } else {
                report.still_failing += 1;
            }
        }

        if report.attempted > 0 {
            tracing::info!(
                attempted = report.attempted,
                succeeded = report.succeeded,
                still_failing = report.still_failing,
                "Corrective pass finished"
            );
        }
        report
    }

    async fn execute_side_effect(&self, effect: SideEffect, ctx: CommandContext) -> EngineResult<()> {
        match effect {
            SideEffect::CarrierOrderUpsert { delivery_id } => self.upsert_carrier_order(delivery_id, ctx).await,
            SideEffect::CargoAssignment { shipment_id } => self.auto_assign_cargo(shipment_id, ctx).await,
            SideEffect::CargoDetachment { shipment_id, cargo_id } => {
                self.detach_from_cargo(shipment_id, cargo_id, ctx).await
            }
        }
    }

    async fn upsert_carrier_order(&self, delivery_id: Uuid, ctx: CommandContext) -> EngineResult<()> {
        let delivery = self.ctx.stores.deliveries.load(delivery_id).await?.entity;
        if delivery.is_canceled {
            tracing::debug!(delivery_id = %delivery_id, "Delivery canceled, carrier order skipped");
            return Ok(());
        }

        // Reload: the payload must list every shipment as committed now
        let shipments: Vec<Shipment> = self
            .ctx
            .stores
            .shipments_of_delivery(delivery_id)
            .await?
            .into_iter()
            .filter(|shipment| !shipment.is_canceled)
            .collect();

        let carrier = &self.ctx.collaborators.carrier;
        let outcome = self
            .carrier_breaker
            .call(carrier.upsert_carrier_order(&delivery, &shipments))
            .await;
        self.ctx
            .metrics
            .update_carrier_circuit_state(self.carrier_breaker.state().await.as_gauge());

        let carrier_order_id = outcome.map_err(|e| match e {
            CircuitBreakerError::CircuitOpen => {
                CollaboratorError::Unavailable(format!("{} circuit is open", self.carrier_breaker.name()))
            }
            CircuitBreakerError::OperationFailed(e) => e,
        })?;

        let committed = self
            .ctx
            .deliveries
            .handle(delivery_id, DeliveryCommand::SetCarrierOrder { carrier_order_id }, ctx)
            .await?;
        self.after_delivery(&committed).await;
        Ok(())
    }

    async fn auto_assign_cargo(&self, shipment_id: Uuid, ctx: CommandContext) -> EngineResult<()> {
        let shipment = self.ctx.stores.shipments.load(shipment_id).await?.entity;
        if shipment.is_canceled || shipment.cargo_id.is_some() {
            return Ok(());
        }

        let Some(cargo_id) = self.ctx.collaborators.cargo_policy.try_assign(&shipment).await? else {
            tracing::debug!(shipment_id = %shipment_id, "No eligible cargo for shipment");
            return Ok(());
        };

        self.assign_cargo(shipment_id, Some(cargo_id), ctx).await?;
        tracing::info!(shipment_id = %shipment_id, cargo_id = %cargo_id, "Shipment attached to cargo");
        Ok(())
    }

    /// Take the shipment out of `cargo_id` if it is still a member there
    async fn detach_from_cargo(&self, shipment_id: Uuid, cargo_id: Uuid, ctx: CommandContext) -> EngineResult<()> {
        if self.ctx.stores.shipments.get(shipment_id).await?.is_none() {
            return Ok(());
        }
        let committed = self
            .ctx
            .shipments
            .handle_with(shipment_id, ctx, |shipment| async move {
                Ok::<_, EngineError>(
                    (shipment.cargo_id == Some(cargo_id)).then_some(ShipmentCommand::AssignCargo { cargo_id: None }),
                )
            })
            .await?;
        self.after_cargo_change(&committed, ctx).await
    }

    // ========================================================================
    // History & notifications
    // ========================================================================

    async fn record_shipment_history(&self, committed: &Committed<Shipment>) {
        let shipment = &committed.entity;
        self.ctx
            .history
            .record_envelopes(
                &committed.events,
                &[EntityRef::order(shipment.order_id), shipment.entity_ref()],
            )
            .await;
    }

    async fn record_cargo_links(&self, shipment: EntityRef, old: Option<Uuid>, new: Option<Uuid>, ctx: CommandContext) {
        if old == new {
            return;
        }
        if let Some(old) = old {
            self.ctx
                .history
                .record_link(HistoryEventType::LinkRemove, EntityRef::cargo(old), shipment, ctx.actor_id)
                .await;
        }
        if let Some(new) = new {
            self.ctx
                .history
                .record_link(HistoryEventType::LinkAdd, EntityRef::cargo(new), shipment, ctx.actor_id)
                .await;
        }
    }

    async fn record_deletion(&self, entity: EntityRef, primary: Vec<EntityRef>, ctx: CommandContext) {
        let changes = serde_json::json!({ "deleted": entity });
        self.ctx
            .history
            .record(HistoryEvent::new(HistoryEventType::Delete, entity, primary, changes, ctx.actor_id))
            .await;
    }

    async fn notify(&self, event: NotificationEvent, primary: EntityRef, entity: EntityRef, status: &str) {
        let notification = Notification {
            event,
            primary,
            entity,
            status: status.to_string(),
        };
        if let Err(e) = self.ctx.collaborators.notifier.notify(notification).await {
            self.ctx.metrics.record_side_effect_failure("notification");
            tracing::warn!(entity = %entity, error = %e, "Notification failed");
        }
    }
}

fn package_primaries(package: &Package) -> Vec<EntityRef> {
    vec![EntityRef::order(package.order_id), EntityRef::shipment(package.shipment_id)]
}
