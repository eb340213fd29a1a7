use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::cascade::{CancellationReport, CargoCancellation, CascadeCoordinator, FailedSideEffect, RetryReport};
use crate::domain::cargo::{Cargo, CargoCommand, CargoStatus};
use crate::domain::delivery::{Delivery, DeliveryCommand, DeliveryDraft, DeliveryStatus};
use crate::domain::measurements::Measurements;
use crate::domain::order::{Order, OrderCommand, OrderDraft, OrderStatus};
use crate::domain::order_return::OrderReturn;
use crate::domain::package::{Package, PackageCommand, PackageItem};
use crate::domain::shipment::{Shipment, ShipmentCommand, ShipmentItem, ShipmentStatus};
use crate::engine::EngineContext;
use crate::error::{EngineError, EngineResult};
use crate::history::{HistoryEvent, HistoryEventType};
use crate::lifecycle::{CommandContext, Committed, EntityKind, EntityRef};

// ============================================================================
// Fulfillment Service
// ============================================================================
//
// Entry point for every fulfillment mutation. Each operation commits one
// entity through its command handler and then runs the cascade hooks for
// that commit.
//
// ============================================================================

/// One package of a packing batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageDraft {
    pub wrapper: Measurements,
    pub items: Vec<PackageItem>,
}

pub struct FulfillmentService {
    coordinator: Arc<CascadeCoordinator>,
}

impl FulfillmentService {
    pub fn new(coordinator: Arc<CascadeCoordinator>) -> Self {
        Self { coordinator }
    }

    fn ctx(&self) -> &EngineContext {
        self.coordinator.context()
    }

    // ========================================================================
    // Creation
    // ========================================================================

    pub async fn create_order(&self, draft: OrderDraft, ctx: CommandContext) -> EngineResult<Order> {
        let (order, event) = Order::create(Uuid::now_v7(), draft)?;
        let committed = self.ctx().orders.create(order, vec![event], ctx).await?;
        self.coordinator.after_order(&committed).await;
        Ok(committed.entity)
    }

    pub async fn add_delivery(&self, order_id: Uuid, draft: DeliveryDraft, ctx: CommandContext) -> EngineResult<Delivery> {
        let order = self.ctx().stores.orders.load(order_id).await?.entity;
        if order.is_canceled || order.status.is_terminal() {
            return Err(EngineError::invalid(format!(
                "order {order_id} is {} and takes no new deliveries",
                order.status
            )));
        }

        let (delivery, event) = Delivery::create(Uuid::now_v7(), order_id, draft)?;
        let committed = self.ctx().deliveries.create(delivery, vec![event], ctx).await?;
        self.coordinator.after_delivery(&committed).await;
        Ok(committed.entity)
    }

    /// New shipment carrying the pre-packing estimate of its items
    pub async fn add_shipment(
        &self,
        delivery_id: Uuid,
        items: Vec<ShipmentItem>,
        ctx: CommandContext,
    ) -> EngineResult<Shipment> {
        let delivery = self.ctx().stores.deliveries.load(delivery_id).await?.entity;
        if delivery.is_canceled || delivery.status.is_terminal() {
            return Err(EngineError::invalid(format!(
                "delivery {delivery_id} is {} and takes no new shipments",
                delivery.status
            )));
        }

        let estimate = self.ctx().rules.shipment_estimate(&items);
        let (shipment, event) = Shipment::create(Uuid::now_v7(), delivery.order_id, delivery_id, items, estimate)?;
        let committed = self.ctx().shipments.create(shipment, vec![event], ctx).await?;
        self.coordinator.after_shipment(&committed, ctx).await?;
        Ok(committed.entity)
    }

    pub async fn create_cargo(&self, carrier_service_id: Uuid, ctx: CommandContext) -> EngineResult<Cargo> {
        let (cargo, event) = Cargo::create(Uuid::now_v7(), carrier_service_id);
        let committed = self.ctx().cargos.create(cargo, vec![event], ctx).await?;
        self.coordinator.after_cargo(&committed).await;
        Ok(committed.entity)
    }

    // ========================================================================
    // Packing
    // ========================================================================

    pub async fn add_package(
        &self,
        shipment_id: Uuid,
        wrapper: Measurements,
        items: Vec<PackageItem>,
        ctx: CommandContext,
    ) -> EngineResult<Package> {
        let mut packed = self
            .pack_shipment(shipment_id, vec![PackageDraft { wrapper, items }], ctx)
            .await?;
        packed
            .pop()
            .ok_or_else(|| EngineError::invalid("no package was created"))
    }

    /// Create several packages as one batch: the shipment and its parents
    /// are recomputed once, after the last package is stored.
    pub async fn pack_shipment(
        &self,
        shipment_id: Uuid,
        drafts: Vec<PackageDraft>,
        ctx: CommandContext,
    ) -> EngineResult<Vec<Package>> {
        if drafts.is_empty() {
            return Err(EngineError::invalid("packing batch is empty"));
        }
        let shipment = self.ctx().stores.shipments.load(shipment_id).await?.entity;
        shipment.ensure_packing_open()?;

        let mut committed = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let (package, event) = Package::create(
                Uuid::now_v7(),
                shipment_id,
                shipment.order_id,
                draft.wrapper,
                draft.items,
                self.ctx().rules,
            )?;
            committed.push(self.ctx().packages.create(package, vec![event], ctx).await?);
        }

        self.coordinator.after_packages(&committed, ctx).await?;
        tracing::info!(shipment_id = %shipment_id, packages = committed.len(), "Shipment packed");
        Ok(committed.into_iter().map(|c| c.entity).collect())
    }

    pub async fn set_package_wrapper(
        &self,
        package_id: Uuid,
        wrapper: Measurements,
        ctx: CommandContext,
    ) -> EngineResult<Package> {
        self.package_command(package_id, PackageCommand::SetWrapper { wrapper }, ctx)
            .await
    }

    pub async fn add_package_item(&self, package_id: Uuid, item: PackageItem, ctx: CommandContext) -> EngineResult<Package> {
        self.package_command(package_id, PackageCommand::AddItem { item }, ctx)
            .await
    }

    pub async fn remove_package_item(
        &self,
        package_id: Uuid,
        offer_id: Uuid,
        quantity: u32,
        ctx: CommandContext,
    ) -> EngineResult<Package> {
        self.package_command(package_id, PackageCommand::RemoveItem { offer_id, quantity }, ctx)
            .await
    }

    pub async fn delete_package(&self, package_id: Uuid, ctx: CommandContext) -> EngineResult<()> {
        let package = self.ctx().stores.packages.load(package_id).await?.entity;
        let shipment = self.ctx().stores.shipments.load(package.shipment_id).await?.entity;
        shipment.ensure_packing_open()?;

        let deleted = self.ctx().packages.delete(package_id, |_| Ok(())).await?;
        self.coordinator.after_package_deleted(&deleted, ctx).await
    }

    /// Packages only change while their shipment is still open for packing
    async fn package_command(
        &self,
        package_id: Uuid,
        command: PackageCommand,
        ctx: CommandContext,
    ) -> EngineResult<Package> {
        let stores = &self.ctx().stores;
        let command = &command;

        let committed = self
            .ctx()
            .packages
            .handle_with(package_id, ctx, |package| async move {
                let shipment = stores.shipments.load(package.shipment_id).await?.entity;
                shipment.ensure_packing_open()?;
                Ok::<_, EngineError>(Some(command.clone()))
            })
            .await?;

        self.coordinator.after_package(&committed, ctx).await?;
        Ok(committed.entity)
    }

    // ========================================================================
    // Shipments
    // ========================================================================

    /// `Assembled` asks the packing collaborator, against the packages as
    /// stored at the time of the attempt.
    pub async fn change_shipment_status(
        &self,
        shipment_id: Uuid,
        to: ShipmentStatus,
        ctx: CommandContext,
    ) -> EngineResult<Shipment> {
        let stores = &self.ctx().stores;
        let packing = &self.ctx().collaborators.packing;

        let committed = self
            .ctx()
            .shipments
            .handle_with(shipment_id, ctx, |shipment| async move {
                let all_items_packed = if to == ShipmentStatus::Assembled {
                    let packages = stores.packages_of_shipment(shipment.id).await?;
                    packing.all_items_packed(&shipment, &packages).await?
                } else {
                    true
                };
                Ok::<_, EngineError>(Some(ShipmentCommand::ChangeStatus { to, all_items_packed }))
            })
            .await?;

        self.finish_shipment(committed, ctx).await
    }

    pub async fn set_shipment_problem(&self, shipment_id: Uuid, is_problem: bool, ctx: CommandContext) -> EngineResult<Shipment> {
        let committed = self
            .ctx()
            .shipments
            .handle(shipment_id, ShipmentCommand::SetProblem { is_problem }, ctx)
            .await?;
        self.finish_shipment(committed, ctx).await
    }

    pub async fn assign_shipment_to_cargo(
        &self,
        shipment_id: Uuid,
        cargo_id: Option<Uuid>,
        ctx: CommandContext,
    ) -> EngineResult<Shipment> {
        let committed = self.coordinator.assign_cargo(shipment_id, cargo_id, ctx).await?;
        Ok(committed.entity)
    }

    /// Deletes the shipment with its packages; only before it is shipped
    pub async fn delete_shipment(&self, shipment_id: Uuid, ctx: CommandContext) -> EngineResult<()> {
        let deleted = self
            .ctx()
            .shipments
            .delete(shipment_id, |shipment| Ok(shipment.ensure_deletable()?))
            .await?;
        tracing::info!(shipment_id = %shipment_id, delivery_id = %deleted.delivery_id, "Shipment deleted");
        self.coordinator.after_shipment_deleted(&deleted, ctx).await
    }

    async fn finish_shipment(&self, committed: Committed<Shipment>, ctx: CommandContext) -> EngineResult<Shipment> {
        self.coordinator.after_shipment(&committed, ctx).await?;
        Ok(committed.entity)
    }

    // ========================================================================
    // Deliveries, cargo, orders
    // ========================================================================

    pub async fn change_delivery_status(
        &self,
        delivery_id: Uuid,
        to: DeliveryStatus,
        ctx: CommandContext,
    ) -> EngineResult<Delivery> {
        let committed = self
            .ctx()
            .deliveries
            .handle(delivery_id, DeliveryCommand::ChangeStatus { to }, ctx)
            .await?;
        self.coordinator.after_delivery(&committed).await;
        Ok(committed.entity)
    }

    pub async fn change_cargo_status(&self, cargo_id: Uuid, to: CargoStatus, ctx: CommandContext) -> EngineResult<Cargo> {
        let committed = self
            .ctx()
            .cargos
            .handle(cargo_id, CargoCommand::ChangeStatus { to }, ctx)
            .await?;
        self.coordinator.after_cargo(&committed).await;
        Ok(committed.entity)
    }

    pub async fn cancel_cargo(
        &self,
        cargo_id: Uuid,
        reason: Option<String>,
        ctx: CommandContext,
    ) -> EngineResult<CargoCancellation> {
        self.coordinator.cancel_cargo(cargo_id, reason, ctx).await
    }

    pub async fn change_order_status(&self, order_id: Uuid, to: OrderStatus, ctx: CommandContext) -> EngineResult<Order> {
        let committed = self
            .ctx()
            .orders
            .handle(order_id, OrderCommand::ChangeStatus { to }, ctx)
            .await?;
        self.coordinator.after_order(&committed).await;
        Ok(committed.entity)
    }

    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        return_reason_id: Uuid,
        ctx: CommandContext,
    ) -> EngineResult<CancellationReport> {
        self.coordinator.cancel_order(order_id, return_reason_id, ctx).await
    }

    pub async fn cancel_delivery(
        &self,
        delivery_id: Uuid,
        return_reason_id: Uuid,
        ctx: CommandContext,
    ) -> EngineResult<CancellationReport> {
        self.coordinator
            .cancel_delivery(delivery_id, return_reason_id, ctx)
            .await
    }

    pub async fn cancel_shipment(
        &self,
        shipment_id: Uuid,
        return_reason_id: Uuid,
        ctx: CommandContext,
    ) -> EngineResult<CancellationReport> {
        self.coordinator
            .cancel_shipment(shipment_id, return_reason_id, ctx)
            .await
    }

    // ========================================================================
    // History & corrective pass
    // ========================================================================

    /// Free-text comment on any entity, shown on the same timelines as the
    /// entity's own changes
    pub async fn add_comment(&self, entity: EntityRef, text: &str, ctx: CommandContext) -> EngineResult<()> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EngineError::invalid("comment is empty"));
        }

        let primary = self.primaries_of(entity).await?;
        let changes = serde_json::json!({ "comment": text });
        self.ctx()
            .history
            .record(HistoryEvent::new(HistoryEventType::Comment, entity, primary, changes, ctx.actor_id))
            .await;
        Ok(())
    }

    async fn primaries_of(&self, entity: EntityRef) -> EngineResult<Vec<EntityRef>> {
        let stores = &self.ctx().stores;
        let primaries = match entity.kind {
            EntityKind::Order => {
                stores.orders.load(entity.id).await?;
                vec![entity]
            }
            EntityKind::Delivery => {
                let delivery = stores.deliveries.load(entity.id).await?.entity;
                vec![EntityRef::order(delivery.order_id), entity]
            }
            EntityKind::Shipment => {
                let shipment = stores.shipments.load(entity.id).await?.entity;
                vec![EntityRef::order(shipment.order_id), entity]
            }
            EntityKind::Package => {
                let package = stores.packages.load(entity.id).await?.entity;
                vec![EntityRef::order(package.order_id), EntityRef::shipment(package.shipment_id)]
            }
            EntityKind::Cargo => {
                stores.cargos.load(entity.id).await?;
                vec![entity]
            }
            EntityKind::Payment => {
                let payment = stores.payments.load(entity.id).await?.entity;
                vec![EntityRef::order(payment.order_id)]
            }
            EntityKind::OrderReturn => {
                let order_return = stores.returns.load(entity.id).await?.entity;
                vec![EntityRef::order(order_return.order_id)]
            }
        };
        Ok(primaries)
    }

    pub async fn retry_failed_side_effects(&self, ctx: CommandContext) -> RetryReport {
        self.coordinator.retry_failed_side_effects(ctx).await
    }

    pub async fn pending_side_effects(&self) -> Vec<FailedSideEffect> {
        self.coordinator.side_effects().pending().await
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub async fn order(&self, id: Uuid) -> EngineResult<Order> {
        Ok(self.ctx().stores.orders.load(id).await?.entity)
    }

    pub async fn delivery(&self, id: Uuid) -> EngineResult<Delivery> {
        Ok(self.ctx().stores.deliveries.load(id).await?.entity)
    }

    pub async fn shipment(&self, id: Uuid) -> EngineResult<Shipment> {
        Ok(self.ctx().stores.shipments.load(id).await?.entity)
    }

    pub async fn cargo(&self, id: Uuid) -> EngineResult<Cargo> {
        Ok(self.ctx().stores.cargos.load(id).await?.entity)
    }

    pub async fn package(&self, id: Uuid) -> EngineResult<Package> {
        Ok(self.ctx().stores.packages.load(id).await?.entity)
    }

    pub async fn deliveries_of_order(&self, order_id: Uuid) -> EngineResult<Vec<Delivery>> {
        Ok(self.ctx().stores.deliveries_of_order(order_id).await?)
    }

    pub async fn shipments_of_delivery(&self, delivery_id: Uuid) -> EngineResult<Vec<Shipment>> {
        Ok(self.ctx().stores.shipments_of_delivery(delivery_id).await?)
    }

    pub async fn packages_of_shipment(&self, shipment_id: Uuid) -> EngineResult<Vec<Package>> {
        Ok(self.ctx().stores.packages_of_shipment(shipment_id).await?)
    }

    pub async fn returns_of_order(&self, order_id: Uuid) -> EngineResult<Vec<OrderReturn>> {
        Ok(self.ctx().stores.returns_of_order(order_id).await?)
    }
}
