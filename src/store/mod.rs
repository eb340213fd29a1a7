// ============================================================================
// Entity Storage
// ============================================================================
//
// `Repository<A>` is the persistence seam; `Stores` bundles one repository per
// entity type together with the child queries the cascade relies on. Parents
// never hold authoritative child lists: children are always queried by their
// foreign key, so every recompute sees the committed set.
//
// ============================================================================

pub mod memory;
pub mod repository;

pub use memory::InMemoryRepository;
pub use repository::{EntityFilter, Repository, StoreError, Versioned};

use std::sync::Arc;
use uuid::Uuid;

use crate::domain::cargo::Cargo;
use crate::domain::delivery::Delivery;
use crate::domain::order::Order;
use crate::domain::order_return::OrderReturn;
use crate::domain::package::Package;
use crate::domain::payment::{GatewayId, Payment};
use crate::domain::shipment::Shipment;

#[derive(Clone)]
pub struct Stores {
    pub orders: Arc<dyn Repository<Order>>,
    pub deliveries: Arc<dyn Repository<Delivery>>,
    pub shipments: Arc<dyn Repository<Shipment>>,
    pub cargos: Arc<dyn Repository<Cargo>>,
    pub packages: Arc<dyn Repository<Package>>,
    pub payments: Arc<dyn Repository<Payment>>,
    pub returns: Arc<dyn Repository<OrderReturn>>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            orders: Arc::new(InMemoryRepository::new()),
            deliveries: Arc::new(InMemoryRepository::new()),
            shipments: Arc::new(InMemoryRepository::new()),
            cargos: Arc::new(InMemoryRepository::new()),
            packages: Arc::new(InMemoryRepository::new()),
            payments: Arc::new(InMemoryRepository::new()),
            returns: Arc::new(InMemoryRepository::new()),
        }
    }

    pub async fn deliveries_of_order(&self, order_id: Uuid) -> Result<Vec<Delivery>, StoreError> {
        self.deliveries
            .find(&move |delivery: &Delivery| delivery.order_id == order_id)
            .await
    }

    pub async fn shipments_of_delivery(&self, delivery_id: Uuid) -> Result<Vec<Shipment>, StoreError> {
        self.shipments
            .find(&move |shipment: &Shipment| shipment.delivery_id == delivery_id)
            .await
    }

    pub async fn shipments_of_order(&self, order_id: Uuid) -> Result<Vec<Shipment>, StoreError> {
        self.shipments
            .find(&move |shipment: &Shipment| shipment.order_id == order_id)
            .await
    }

    /// Cargo membership is the shipment's back-reference; cargo keeps no list
    pub async fn shipments_in_cargo(&self, cargo_id: Uuid) -> Result<Vec<Shipment>, StoreError> {
        self.shipments
            .find(&move |shipment: &Shipment| shipment.cargo_id == Some(cargo_id))
            .await
    }

    pub async fn packages_of_shipment(&self, shipment_id: Uuid) -> Result<Vec<Package>, StoreError> {
        self.packages
            .find(&move |package: &Package| package.shipment_id == shipment_id)
            .await
    }

    pub async fn payments_of_order(&self, order_id: Uuid) -> Result<Vec<Payment>, StoreError> {
        self.payments
            .find(&move |payment: &Payment| payment.order_id == order_id)
            .await
    }

    pub async fn returns_of_order(&self, order_id: Uuid) -> Result<Vec<OrderReturn>, StoreError> {
        self.returns
            .find(&move |order_return: &OrderReturn| order_return.order_id == order_id)
            .await
    }

    /// Gateway notifications are keyed by the provider's own payment id
    pub async fn payment_by_external_id(
        &self,
        gateway: GatewayId,
        external_id: &str,
    ) -> Result<Option<Payment>, StoreError> {
        let external_id = external_id.to_string();
        let found = self
            .payments
            .find(&move |payment: &Payment| {
                payment.gateway == gateway && payment.external_id.as_deref() == Some(external_id.as_str())
            })
            .await?;
        Ok(found.into_iter().next())
    }
}
