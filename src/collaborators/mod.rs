use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::delivery::Delivery;
use crate::domain::package::Package;
use crate::domain::shipment::Shipment;
use crate::lifecycle::{EntityKind, EntityRef};

// ============================================================================
// External Collaborators
// ============================================================================
//
// Narrow contracts for systems the engine calls but does not own: packing
// state, carrier delivery orders, cargo assignment policy and notification
// delivery. Everything is injected at construction; the defaults here are
// the behavior when no integration is configured.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("Collaborator rejected the request: {0}")]
    Rejected(String),
}

/// Answers whether every item of a shipment sits in one of its packages
#[async_trait]
pub trait PackingService: Send + Sync {
    async fn all_items_packed(&self, shipment: &Shipment, packages: &[Package]) -> Result<bool, CollaboratorError>;
}

/// Create-or-update the carrier's delivery order; returns the carrier's id.
/// Must be idempotent: the engine may replay it after failures.
#[async_trait]
pub trait CarrierOrderService: Send + Sync {
    async fn upsert_carrier_order(&self, delivery: &Delivery, shipments: &[Shipment]) -> Result<String, CollaboratorError>;
}

/// Picks a cargo for an assembled shipment, if any fits
#[async_trait]
pub trait CargoAssignmentPolicy: Send + Sync {
    async fn try_assign(&self, shipment: &Shipment) -> Result<Option<Uuid>, CollaboratorError>;
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), CollaboratorError>;
}

// ============================================================================
// Notifications
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    StatusChanged,
    ProblemRaised,
    Canceled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub event: NotificationEvent,
    /// Entity whose audience is notified (the order for shipment changes)
    pub primary: EntityRef,
    /// Entity that changed
    pub entity: EntityRef,
    /// Status label after the change
    pub status: String,
}

/// Transport for rendered notification messages
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, recipient: EntityRef, message: String) -> Result<(), CollaboratorError>;
}

pub struct LogSink;

#[async_trait]
impl MessageSink for LogSink {
    async fn send(&self, recipient: EntityRef, message: String) -> Result<(), CollaboratorError> {
        tracing::info!(recipient = %recipient, message = %message, "📨 Notification");
        Ok(())
    }
}

/// Looks up a message template by entity kind, event and status label, with
/// `*` matching any status. No template means nothing is sent.
pub struct TemplateNotifier {
    templates: HashMap<(EntityKind, NotificationEvent, String), String>,
    sink: Arc<dyn MessageSink>,
}

impl TemplateNotifier {
    pub const ANY_STATUS: &'static str = "*";

    pub fn new(sink: Arc<dyn MessageSink>) -> Self {
        Self {
            templates: HashMap::new(),
            sink,
        }
    }

    /// Templates may use `{id}` and `{status}` placeholders
    pub fn with_template(mut self, kind: EntityKind, event: NotificationEvent, status: &str, template: &str) -> Self {
        self.templates
            .insert((kind, event, status.to_string()), template.to_string());
        self
    }

    /// Order and shipment messages sent when nothing else is configured
    pub fn with_default_templates(self) -> Self {
        self.with_template(
            EntityKind::Order,
            NotificationEvent::StatusChanged,
            Self::ANY_STATUS,
            "Order {id} is now {status}",
        )
        .with_template(
            EntityKind::Order,
            NotificationEvent::Canceled,
            Self::ANY_STATUS,
            "Order {id} was canceled",
        )
        .with_template(
            EntityKind::Shipment,
            NotificationEvent::StatusChanged,
            "shipped",
            "Shipment {id} has left the warehouse",
        )
        .with_template(
            EntityKind::Shipment,
            NotificationEvent::ProblemRaised,
            Self::ANY_STATUS,
            "Shipment {id} needs attention",
        )
    }

    fn template_for(&self, notification: &Notification) -> Option<&String> {
        let kind = notification.entity.kind;
        self.templates
            .get(&(kind, notification.event, notification.status.clone()))
            .or_else(|| {
                self.templates
                    .get(&(kind, notification.event, Self::ANY_STATUS.to_string()))
            })
    }
}

#[async_trait]
impl NotificationDispatcher for TemplateNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), CollaboratorError> {
        let Some(template) = self.template_for(&notification) else {
            tracing::trace!(entity = %notification.entity, "No notification template, skipping");
            return Ok(());
        };

        let message = template
            .replace("{id}", &notification.entity.id.to_string())
            .replace("{status}", &notification.status);
        self.sink.send(notification.primary, message).await
    }
}

// ============================================================================
// Defaults
// ============================================================================

/// Compares item quantities in the shipment with what its packages hold
pub struct PackageBasedPacking;

#[async_trait]
impl PackingService for PackageBasedPacking {
    async fn all_items_packed(&self, shipment: &Shipment, packages: &[Package]) -> Result<bool, CollaboratorError> {
        let mut required: BTreeMap<Uuid, u32> = BTreeMap::new();
        for item in &shipment.items {
            *required.entry(item.offer_id).or_default() += item.quantity;
        }

        Ok(required.iter().all(|(offer_id, quantity)| {
            let packed: u32 = packages.iter().map(|p| p.packed_quantity(*offer_id)).sum();
            packed >= *quantity
        }))
    }
}

/// Used until a carrier integration is wired in; every upsert fails and is
/// kept for the corrective pass.
pub struct UnconfiguredCarrier;

#[async_trait]
impl CarrierOrderService for UnconfiguredCarrier {
    async fn upsert_carrier_order(&self, delivery: &Delivery, _shipments: &[Shipment]) -> Result<String, CollaboratorError> {
        Err(CollaboratorError::Unavailable(format!(
            "no carrier integration for service {}",
            delivery.carrier_service_id
        )))
    }
}

pub struct NoCargoAssignment;

#[async_trait]
impl CargoAssignmentPolicy for NoCargoAssignment {
    async fn try_assign(&self, _shipment: &Shipment) -> Result<Option<Uuid>, CollaboratorError> {
        Ok(None)
    }
}

/// Injected collaborator handles
#[derive(Clone)]
pub struct Collaborators {
    pub packing: Arc<dyn PackingService>,
    pub carrier: Arc<dyn CarrierOrderService>,
    pub cargo_policy: Arc<dyn CargoAssignmentPolicy>,
    pub notifier: Arc<dyn NotificationDispatcher>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            packing: Arc::new(PackageBasedPacking),
            carrier: Arc::new(UnconfiguredCarrier),
            cargo_policy: Arc::new(NoCargoAssignment),
            notifier: Arc::new(TemplateNotifier::new(Arc::new(LogSink)).with_default_templates()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::measurements::Measurements;
    use crate::domain::package::PackageItem;
    use crate::domain::shipment::ShipmentItem;
    use crate::rollup::{Rollup, RollupRules};
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<(EntityRef, String)>>,
    }

    #[async_trait]
    impl MessageSink for RecordingSink {
        async fn send(&self, recipient: EntityRef, message: String) -> Result<(), CollaboratorError> {
            self.sent.lock().await.push((recipient, message));
            Ok(())
        }
    }

    fn shipment(offer_id: Uuid, quantity: u32) -> Shipment {
        let item = ShipmentItem {
            basket_item_id: Uuid::now_v7(),
            offer_id,
            quantity,
            unit: Measurements::weight_only(100),
            unit_cost: 100,
            unit_commission: 0,
        };
        Shipment::create(Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7(), vec![item], Rollup::default())
            .unwrap()
            .0
    }

    fn package(shipment: &Shipment, offer_id: Uuid, quantity: u32) -> Package {
        let item = PackageItem {
            offer_id,
            quantity,
            unit: Measurements::weight_only(100),
            unit_cost: 100,
        };
        Package::create(
            Uuid::now_v7(),
            shipment.id,
            shipment.order_id,
            Measurements::default(),
            vec![item],
            RollupRules::PHYSICAL,
        )
        .unwrap()
        .0
    }

    #[tokio::test]
    async fn test_packing_counts_quantities_across_packages() {
        let offer = Uuid::now_v7();
        let shipment = shipment(offer, 3);
        let first = package(&shipment, offer, 2);
        let second = package(&shipment, offer, 1);

        let partial = PackageBasedPacking
            .all_items_packed(&shipment, &[first.clone()])
            .await
            .unwrap();
        assert!(!partial);

        let complete = PackageBasedPacking
            .all_items_packed(&shipment, &[first, second])
            .await
            .unwrap();
        assert!(complete);
    }

    #[tokio::test]
    async fn test_template_lookup_falls_back_to_wildcard() {
        let sink = Arc::new(RecordingSink::default());
        let notifier = TemplateNotifier::new(sink.clone())
            .with_template(EntityKind::Order, NotificationEvent::StatusChanged, "*", "any {status}")
            .with_template(EntityKind::Order, NotificationEvent::StatusChanged, "done", "done!");
        let order = EntityRef::order(Uuid::now_v7());

        for status in ["confirmed", "done"] {
            notifier
                .notify(Notification {
                    event: NotificationEvent::StatusChanged,
                    primary: order,
                    entity: order,
                    status: status.into(),
                })
                .await
                .unwrap();
        }

        let sent = sink.sent.lock().await;
        assert_eq!(sent[0].1, "any confirmed");
        assert_eq!(sent[1].1, "done!");
    }

    #[tokio::test]
    async fn test_missing_template_is_noop() {
        let sink = Arc::new(RecordingSink::default());
        let notifier = TemplateNotifier::new(sink.clone());
        let shipment = EntityRef::shipment(Uuid::now_v7());

        notifier
            .notify(Notification {
                event: NotificationEvent::Canceled,
                primary: EntityRef::order(Uuid::now_v7()),
                entity: shipment,
                status: "canceled".into(),
            })
            .await
            .unwrap();

        assert!(sink.sent.lock().await.is_empty());
    }
}
