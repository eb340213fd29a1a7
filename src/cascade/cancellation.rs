use serde::Serialize;
use uuid::Uuid;

use super::coordinator::CascadeCoordinator;
use super::side_effects::SideEffect;
use crate::domain::cargo::{Cargo, CargoCommand};
use crate::domain::delivery::DeliveryCommand;
use crate::domain::order::OrderCommand;
use crate::domain::order_return::{OrderReturn, OrderReturnEvent};
use crate::domain::shipment::ShipmentCommand;
use crate::error::EngineResult;
use crate::lifecycle::{CommandContext, EntityRef};

// ============================================================================
// Cancellation Cascade
// ============================================================================
//
// Order -> its deliveries -> their shipments. Every level is canceled in its
// own commit and records its own return. A failing branch is logged and
// reported; it never stops siblings or parents, and nothing is rolled back.
// Only the root's own cancel decides whether the request fails.
//
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct CancellationFailure {
    pub entity: EntityRef,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CancellationReport {
    /// Root plus every descendant a cancel was sent to
    pub attempted: usize,
    pub canceled: Vec<EntityRef>,
    /// Descendants that were canceled before this request
    pub already_canceled: Vec<EntityRef>,
    pub failures: Vec<CancellationFailure>,
    /// Returns recorded by this cascade
    pub returns: Vec<Uuid>,
}

impl CancellationReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Result of canceling a cargo: members are detached best-effort
#[derive(Debug, Clone)]
pub struct CargoCancellation {
    pub cargo: Cargo,
    pub detached: Vec<Uuid>,
    /// Detachments that failed and wait for the corrective pass
    pub pending: Vec<Uuid>,
}

impl CascadeCoordinator {
    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        return_reason_id: Uuid,
        ctx: CommandContext,
    ) -> EngineResult<CancellationReport> {
        let committed = self
            .ctx
            .orders
            .handle(order_id, OrderCommand::Cancel { return_reason_id }, ctx)
            .await?;
        let root = EntityRef::order(order_id);
        let mut report = CancellationReport {
            attempted: 1,
            ..Default::default()
        };

        self.after_order(&committed).await;
        let root_return = self
            .create_return(OrderReturn::for_order(&committed.entity, return_reason_id), ctx)
            .await;
        self.settle(&mut report, root, root_return.map(|order_return| order_return.id));

        match self.ctx.stores.deliveries_of_order(order_id).await {
            Ok(deliveries) => {
                for delivery in deliveries {
                    self.cancel_delivery_branch(delivery.id, return_reason_id, ctx, &mut report)
                        .await;
                }
            }
            Err(e) => self.settle(&mut report, root, Err(e.into())),
        }

        self.log_report(root, &report);
        Ok(report)
    }

    pub async fn cancel_delivery(
        &self,
        delivery_id: Uuid,
        return_reason_id: Uuid,
        ctx: CommandContext,
    ) -> EngineResult<CancellationReport> {
        let root = EntityRef::delivery(delivery_id);
        let mut report = CancellationReport {
            attempted: 1,
            ..Default::default()
        };

        let return_id = self.cancel_delivery_only(delivery_id, return_reason_id, ctx).await?;
        self.settle(&mut report, root, Ok(return_id));
        self.cancel_shipments_of(delivery_id, return_reason_id, ctx, &mut report)
            .await;

        self.log_report(root, &report);
        Ok(report)
    }

    pub async fn cancel_shipment(
        &self,
        shipment_id: Uuid,
        return_reason_id: Uuid,
        ctx: CommandContext,
    ) -> EngineResult<CancellationReport> {
        let return_id = self.cancel_shipment_only(shipment_id, return_reason_id, ctx).await?;
        let mut report = CancellationReport {
            attempted: 1,
            ..Default::default()
        };
        self.settle(&mut report, EntityRef::shipment(shipment_id), Ok(return_id));
        Ok(report)
    }

    /// Cancel the cargo, then detach each member shipment independently
    pub async fn cancel_cargo(
        &self,
        cargo_id: Uuid,
        reason: Option<String>,
        ctx: CommandContext,
    ) -> EngineResult<CargoCancellation> {
        let committed = self
            .ctx
            .cargos
            .handle(cargo_id, CargoCommand::Cancel { reason }, ctx)
            .await?;
        self.after_cargo(&committed).await;

        let mut detached = Vec::new();
        let mut pending = Vec::new();
        for shipment in self.ctx.stores.shipments_in_cargo(cargo_id).await? {
            let effect = SideEffect::CargoDetachment {
                shipment_id: shipment.id,
                cargo_id,
            };
            if self.run_side_effect(effect, ctx).await {
                detached.push(shipment.id);
            } else {
                pending.push(shipment.id);
            }
        }

        Ok(CargoCancellation {
            cargo: committed.entity,
            detached,
            pending,
        })
    }

    async fn cancel_delivery_branch(
        &self,
        delivery_id: Uuid,
        return_reason_id: Uuid,
        ctx: CommandContext,
        report: &mut CancellationReport,
    ) {
        report.attempted += 1;
        let outcome = self.cancel_delivery_only(delivery_id, return_reason_id, ctx).await;
        self.settle(report, EntityRef::delivery(delivery_id), outcome);

        // Shipments are canceled even if their delivery failed
        self.cancel_shipments_of(delivery_id, return_reason_id, ctx, report)
            .await;
    }

    async fn cancel_shipments_of(
        &self,
        delivery_id: Uuid,
        return_reason_id: Uuid,
        ctx: CommandContext,
        report: &mut CancellationReport,
    ) {
        let shipments = match self.ctx.stores.shipments_of_delivery(delivery_id).await {
            Ok(shipments) => shipments,
            Err(e) => {
                self.settle(report, EntityRef::delivery(delivery_id), Err(e.into()));
                return;
            }
        };

        for shipment in shipments {
            report.attempted += 1;
            let outcome = self.cancel_shipment_only(shipment.id, return_reason_id, ctx).await;
            self.settle(report, EntityRef::shipment(shipment.id), outcome);
        }
    }

    async fn cancel_delivery_only(&self, delivery_id: Uuid, return_reason_id: Uuid, ctx: CommandContext) -> EngineResult<Uuid> {
        let committed = self
            .ctx
            .deliveries
            .handle(delivery_id, DeliveryCommand::Cancel { return_reason_id }, ctx)
            .await?;
        self.after_delivery(&committed).await;

        let order_return = self
            .create_return(OrderReturn::for_delivery(&committed.entity, return_reason_id), ctx)
            .await?;
        Ok(order_return.id)
    }

    async fn cancel_shipment_only(&self, shipment_id: Uuid, return_reason_id: Uuid, ctx: CommandContext) -> EngineResult<Uuid> {
        let committed = self
            .ctx
            .shipments
            .handle(shipment_id, ShipmentCommand::Cancel { return_reason_id }, ctx)
            .await?;

        // The return is recorded even if the follow-up rollup fails
        let hooks = self.after_shipment(&committed, ctx).await;
        let order_return = self
            .create_return(OrderReturn::for_shipment(&committed.entity, return_reason_id), ctx)
            .await;
        hooks?;
        Ok(order_return?.id)
    }

    pub(crate) async fn create_return(
        &self,
        (order_return, event): (OrderReturn, OrderReturnEvent),
        ctx: CommandContext,
    ) -> EngineResult<OrderReturn> {
        let committed = self.ctx.returns.create(order_return, vec![event], ctx).await?;
        let order_return = committed.entity;
        self.ctx
            .history
            .record_envelopes(&committed.events, &[EntityRef::order(order_return.order_id)])
            .await;

        tracing::info!(
            return_id = %order_return.id,
            scope = %order_return.scope.entity_ref(),
            price = order_return.price,
            commission = order_return.commission,
            "Order return recorded"
        );
        Ok(order_return)
    }

    fn settle(&self, report: &mut CancellationReport, entity: EntityRef, outcome: EngineResult<Uuid>) {
        match outcome {
            Ok(return_id) => {
                report.canceled.push(entity);
                report.returns.push(return_id);
            }
            Err(e) if e.is_already_canceled() => {
                tracing::debug!(entity = %entity, "Already canceled");
                report.already_canceled.push(entity);
            }
            Err(e) => {
                self.ctx.metrics.record_cancellation_failure(entity.kind.as_str());
                tracing::error!(entity = %entity, error = %e, "Cancellation branch failed");
                report.failures.push(CancellationFailure {
                    entity,
                    error: e.to_string(),
                });
            }
        }
    }

    fn log_report(&self, root: EntityRef, report: &CancellationReport) {
        tracing::info!(
            root = %root,
            attempted = report.attempted,
            canceled = report.canceled.len(),
            already_canceled = report.already_canceled.len(),
            failures = report.failures.len(),
            "Cancellation cascade finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::delivery::Delivery;
    use crate::domain::order::Order;
    use crate::domain::payment::GatewayId;
    use crate::domain::shipment::{Shipment, ShipmentError};
    use crate::error::EngineError;
    use crate::testing::{delivery_draft, order_draft, shipment_item, Harness};

    struct Tree {
        order: Order,
        deliveries: Vec<Delivery>,
        shipments: Vec<Shipment>,
    }

    /// One order, two deliveries, two shipments each
    async fn tree(harness: &Harness) -> Tree {
        let service = &harness.engine.fulfillment;
        let ctx = CommandContext::system();
        let order = service.create_order(order_draft(GatewayId::Local), ctx).await.unwrap();

        let mut deliveries = Vec::new();
        let mut shipments = Vec::new();
        for _ in 0..2 {
            let delivery = service.add_delivery(order.id, delivery_draft(), ctx).await.unwrap();
            for _ in 0..2 {
                shipments.push(
                    service
                        .add_shipment(delivery.id, vec![shipment_item(300, 2, 1_500)], ctx)
                        .await
                        .unwrap(),
                );
            }
            deliveries.push(delivery);
        }
        Tree {
            order,
            deliveries,
            shipments,
        }
    }

    #[tokio::test]
    async fn test_order_cancel_reaches_every_descendant() {
        let harness = Harness::new();
        let tree = tree(&harness).await;
        let reason = Uuid::now_v7();

        let report = harness
            .engine
            .fulfillment
            .cancel_order(tree.order.id, reason, CommandContext::system())
            .await
            .unwrap();

        assert_eq!(report.attempted, 1 + 2 + 4);
        assert_eq!(report.canceled.len(), 7);
        assert!(report.is_complete());

        let returns = harness.engine.fulfillment.returns_of_order(tree.order.id).await.unwrap();
        assert_eq!(returns.len(), 7);
        assert!(returns.iter().all(|r| r.return_reason_id == reason));

        for shipment in &tree.shipments {
            let stored = harness.engine.fulfillment.shipment(shipment.id).await.unwrap();
            assert!(stored.is_canceled);
            assert_eq!(stored.return_reason_id, Some(reason));
        }
        for delivery in &tree.deliveries {
            assert!(harness.engine.fulfillment.delivery(delivery.id).await.unwrap().is_canceled);
        }
    }

    #[tokio::test]
    async fn test_failing_branch_does_not_stop_siblings() {
        let harness = Harness::new();
        let tree = tree(&harness).await;
        let broken = tree.shipments[1].id;
        harness.shipments.fail_saves_for(broken).await;

        let report = harness
            .engine
            .fulfillment
            .cancel_order(tree.order.id, Uuid::now_v7(), CommandContext::system())
            .await
            .unwrap();

        assert_eq!(report.attempted, 7);
        assert_eq!(report.canceled.len(), 6);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].entity, EntityRef::shipment(broken));

        let service = &harness.engine.fulfillment;
        assert!(service.order(tree.order.id).await.unwrap().is_canceled);
        assert!(!service.shipment(broken).await.unwrap().is_canceled);
        for shipment in tree.shipments.iter().filter(|s| s.id != broken) {
            assert!(service.shipment(shipment.id).await.unwrap().is_canceled);
        }
    }

    #[tokio::test]
    async fn test_already_canceled_descendants_are_reported() {
        let harness = Harness::new();
        let tree = tree(&harness).await;
        let service = &harness.engine.fulfillment;
        let ctx = CommandContext::system();

        service.cancel_shipment(tree.shipments[0].id, Uuid::now_v7(), ctx).await.unwrap();
        let report = service.cancel_order(tree.order.id, Uuid::now_v7(), ctx).await.unwrap();

        assert_eq!(report.already_canceled, vec![EntityRef::shipment(tree.shipments[0].id)]);
        assert_eq!(report.canceled.len(), 6);
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn test_canceling_a_canceled_root_fails() {
        let harness = Harness::new();
        let tree = tree(&harness).await;
        let service = &harness.engine.fulfillment;
        let ctx = CommandContext::system();

        service.cancel_shipment(tree.shipments[0].id, Uuid::now_v7(), ctx).await.unwrap();
        let again = service.cancel_shipment(tree.shipments[0].id, Uuid::now_v7(), ctx).await;
        assert!(matches!(again, Err(EngineError::Shipment(ShipmentError::AlreadyCanceled))));
    }

    #[tokio::test]
    async fn test_returns_carry_value_of_their_scope() {
        let harness = Harness::new();
        let tree = tree(&harness).await;
        let service = &harness.engine.fulfillment;
        let ctx = CommandContext::system();

        let shipment_report = service.cancel_shipment(tree.shipments[0].id, Uuid::now_v7(), ctx).await.unwrap();
        let delivery_report = service
            .cancel_delivery(tree.deliveries[1].id, Uuid::now_v7(), ctx)
            .await
            .unwrap();
        assert_eq!(delivery_report.attempted, 3);

        let returns = service.returns_of_order(tree.order.id).await.unwrap();
        let shipment_return = returns.iter().find(|r| r.id == shipment_report.returns[0]).unwrap();
        assert_eq!(shipment_return.price, 2 * 1_500);
        assert_eq!(shipment_return.commission, 2 * 150);

        let delivery_return = returns.iter().find(|r| r.id == delivery_report.returns[0]).unwrap();
        assert_eq!(delivery_return.price, tree.deliveries[1].delivery_cost);
    }

    #[tokio::test]
    async fn test_canceled_shipment_leaves_delivery_rollup() {
        let harness = Harness::new();
        let tree = tree(&harness).await;
        let service = &harness.engine.fulfillment;

        service
            .cancel_shipment(tree.shipments[0].id, Uuid::now_v7(), CommandContext::system())
            .await
            .unwrap();

        let delivery = service.delivery(tree.deliveries[0].id).await.unwrap();
        assert_eq!(delivery.measurements.weight, tree.shipments[1].measurements.weight);
        assert_eq!(delivery.cost, tree.shipments[1].cost);
    }

    #[tokio::test]
    async fn test_cargo_cancel_detaches_members_independently() {
        let harness = Harness::new();
        let tree = tree(&harness).await;
        let service = &harness.engine.fulfillment;
        let ctx = CommandContext::system();

        let cargo = service.create_cargo(Uuid::now_v7(), ctx).await.unwrap();
        for shipment in &tree.shipments[..2] {
            service.assign_shipment_to_cargo(shipment.id, Some(cargo.id), ctx).await.unwrap();
        }
        let stuck = tree.shipments[0].id;
        harness.shipments.fail_saves_for(stuck).await;

        let canceled = service.cancel_cargo(cargo.id, Some("truck broke down".into()), ctx).await.unwrap();
        assert!(canceled.cargo.is_canceled);
        assert_eq!(canceled.detached, vec![tree.shipments[1].id]);
        assert_eq!(canceled.pending, vec![stuck]);
        assert_eq!(service.shipment(tree.shipments[1].id).await.unwrap().cargo_id, None);

        harness.shipments.heal(stuck).await;
        let report = service.retry_failed_side_effects(ctx).await;
        assert_eq!(report.succeeded, 1);
        assert_eq!(service.shipment(stuck).await.unwrap().cargo_id, None);
        assert_eq!(service.cargo(cargo.id).await.unwrap().measurements.weight, 0);
    }
}
