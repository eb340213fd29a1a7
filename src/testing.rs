//! Fakes and fixtures shared by the unit tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::collaborators::{
    CargoAssignmentPolicy, CarrierOrderService, CollaboratorError, Collaborators, Notification,
    NotificationDispatcher, PackageBasedPacking,
};
use crate::domain::cargo::Cargo;
use crate::domain::delivery::{Delivery, DeliveryDraft, DeliveryMethod};
use crate::domain::measurements::{Measurements, Money};
use crate::domain::order::OrderDraft;
use crate::domain::package::{Package, PackageItem};
use crate::domain::payment::{GatewayId, Payment, PaymentStatus};
use crate::domain::shipment::{Shipment, ShipmentItem};
use crate::engine::{Engine, EngineBuilder};
use crate::gateway::{GatewayError, GatewayRequest, GatewayTransport, LocalGateway};
use crate::history::InMemoryHistoryLedger;
use crate::lifecycle::Entity;
use crate::reconciliation::ReconcilerSettings;
use crate::store::{EntityFilter, InMemoryRepository, Repository, StoreError, Stores, Versioned};
use crate::utils::{CircuitBreakerConfig, RetryConfig};

// ============================================================================
// Gateway transport
// ============================================================================

/// Replays queued JSON responses and keeps every request it was sent
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Value>>,
    requests: Mutex<Vec<GatewayRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn respond(&self, response: Value) {
        self.responses.lock().await.push_back(response);
    }

    pub async fn requests(&self) -> Vec<GatewayRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl GatewayTransport for ScriptedTransport {
    async fn send(&self, request: GatewayRequest) -> Result<Value, GatewayError> {
        let path = request.path.clone();
        self.requests.lock().await.push(request);
        self.responses
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| GatewayError::Transport(format!("no scripted response for {path}")))
    }
}

// ============================================================================
// Collaborators
// ============================================================================

/// Carrier double; `set_failing(true)` makes every upsert fail
#[derive(Default)]
pub struct RecordingCarrier {
    failing: AtomicBool,
    calls: Mutex<Vec<(Uuid, Vec<Uuid>)>>,
}

impl RecordingCarrier {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// (delivery id, shipment ids in the payload) per successful call
    pub async fn calls(&self) -> Vec<(Uuid, Vec<Uuid>)> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl CarrierOrderService for RecordingCarrier {
    async fn upsert_carrier_order(&self, delivery: &Delivery, shipments: &[Shipment]) -> Result<String, CollaboratorError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Unavailable("carrier offline".to_string()));
        }
        let ids = shipments.iter().map(|s| s.id).collect();
        self.calls.lock().await.push((delivery.id, ids));
        Ok(format!("carrier-{}", delivery.id))
    }
}

/// Sends every assembled shipment to one configured cargo
#[derive(Default)]
pub struct FixedCargoPolicy {
    cargo_id: RwLock<Option<Uuid>>,
}

impl FixedCargoPolicy {
    pub async fn set(&self, cargo_id: Option<Uuid>) {
        *self.cargo_id.write().await = cargo_id;
    }
}

#[async_trait]
impl CargoAssignmentPolicy for FixedCargoPolicy {
    async fn try_assign(&self, _shipment: &Shipment) -> Result<Option<Uuid>, CollaboratorError> {
        Ok(*self.cargo_id.read().await)
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), CollaboratorError> {
        self.sent.lock().await.push(notification);
        Ok(())
    }
}

// ============================================================================
// Storage
// ============================================================================

/// In-memory repository whose writes fail for chosen ids, and which can
/// hand out an outdated snapshot to the next reader
pub struct FlakyRepository<A: Entity> {
    inner: InMemoryRepository<A>,
    failing: RwLock<HashSet<Uuid>>,
    failing_deletes: RwLock<HashSet<Uuid>>,
    stale: Mutex<HashMap<Uuid, Versioned<A>>>,
}

impl<A: Entity> FlakyRepository<A> {
    pub fn new() -> Self {
        Self {
            inner: InMemoryRepository::new(),
            failing: RwLock::new(HashSet::new()),
            failing_deletes: RwLock::new(HashSet::new()),
            stale: Mutex::new(HashMap::new()),
        }
    }

    pub async fn fail_saves_for(&self, id: Uuid) {
        self.failing.write().await.insert(id);
    }

    pub async fn fail_deletes_for(&self, id: Uuid) {
        self.failing_deletes.write().await.insert(id);
    }

    pub async fn heal(&self, id: Uuid) {
        self.failing.write().await.remove(&id);
        self.failing_deletes.write().await.remove(&id);
    }

    /// The next `get` of this id returns `snapshot` instead of the stored state
    pub async fn serve_once(&self, snapshot: Versioned<A>) {
        self.stale.lock().await.insert(snapshot.entity.id(), snapshot);
    }
}

#[async_trait]
impl<A: Entity> Repository<A> for FlakyRepository<A> {
    async fn get(&self, id: Uuid) -> Result<Option<Versioned<A>>, StoreError> {
        if let Some(snapshot) = self.stale.lock().await.remove(&id) {
            return Ok(Some(snapshot));
        }
        self.inner.get(id).await
    }

    async fn insert(&self, entity: A) -> Result<i64, StoreError> {
        self.inner.insert(entity).await
    }

    async fn save(&self, entity: A, expected_version: i64) -> Result<i64, StoreError> {
        if self.failing.read().await.contains(&entity.id()) {
            return Err(StoreError::Backend(format!("write to {} refused", entity.entity_ref())));
        }
        self.inner.save(entity, expected_version).await
    }

    async fn delete(&self, id: Uuid, expected_version: i64) -> Result<(), StoreError> {
        if self.failing_deletes.read().await.contains(&id) {
            return Err(StoreError::Backend(format!("delete of {id} refused")));
        }
        self.inner.delete(id, expected_version).await
    }

    async fn find(&self, filter: EntityFilter<'_, A>) -> Result<Vec<A>, StoreError> {
        self.inner.find(filter).await
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Engine over in-memory stores with recording collaborators
pub struct Harness {
    pub engine: Engine,
    pub ledger: Arc<InMemoryHistoryLedger>,
    pub local: Arc<LocalGateway>,
    pub carrier: Arc<RecordingCarrier>,
    pub cargo_policy: Arc<FixedCargoPolicy>,
    pub notifier: Arc<RecordingNotifier>,
    pub shipments: Arc<FlakyRepository<Shipment>>,
    pub cargos: Arc<FlakyRepository<Cargo>>,
    pub packages: Arc<FlakyRepository<Package>>,
    pub timeout_reason_id: Uuid,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_breaker(CircuitBreakerConfig::default())
    }

    pub fn with_breaker(breaker: CircuitBreakerConfig) -> Self {
        let ledger = Arc::new(InMemoryHistoryLedger::new());
        let local = Arc::new(LocalGateway::new(chrono::Duration::hours(1)));
        let carrier = Arc::new(RecordingCarrier::default());
        let cargo_policy = Arc::new(FixedCargoPolicy::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let shipments = Arc::new(FlakyRepository::new());
        let cargos = Arc::new(FlakyRepository::new());
        let packages = Arc::new(FlakyRepository::new());
        let timeout_reason_id = Uuid::now_v7();

        let stores = Stores {
            shipments: shipments.clone(),
            cargos: cargos.clone(),
            packages: packages.clone(),
            ..Stores::in_memory()
        };
        let collaborators = Collaborators {
            packing: Arc::new(PackageBasedPacking),
            carrier: carrier.clone(),
            cargo_policy: cargo_policy.clone(),
            notifier: notifier.clone(),
        };

        let engine = EngineBuilder::new()
            .stores(stores)
            .history_ledger(ledger.clone())
            .collaborators(collaborators)
            .gateway(local.clone())
            .retry(RetryConfig {
                max_attempts: 100,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(10),
                multiplier: 1.5,
            })
            .carrier_breaker(breaker)
            .reconciler(ReconcilerSettings {
                default_return_url: None,
                timeout_reason_id,
            })
            .build()
            .expect("test engine");

        Self {
            engine,
            ledger,
            local,
            carrier,
            cargo_policy,
            notifier,
            shipments,
            cargos,
            packages,
            timeout_reason_id,
        }
    }

    pub async fn shipment_version(&self, id: Uuid) -> i64 {
        self.shipments.load(id).await.unwrap().version
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn order_draft(gateway: GatewayId) -> OrderDraft {
    OrderDraft {
        customer_id: Uuid::now_v7(),
        basket_id: Uuid::now_v7(),
        cost: 12_000,
        price: 10_000,
        delivery_cost: 500,
        payment_gateway: gateway,
    }
}

pub fn delivery_draft() -> DeliveryDraft {
    DeliveryDraft {
        method: DeliveryMethod::Courier,
        carrier_service_id: Uuid::now_v7(),
        delivery_cost: 500,
    }
}

/// Basket item with a fresh offer; weight in grams, cost per unit
pub fn shipment_item(unit_weight: u64, quantity: u32, unit_cost: Money) -> ShipmentItem {
    ShipmentItem {
        basket_item_id: Uuid::now_v7(),
        offer_id: Uuid::now_v7(),
        quantity,
        unit: Measurements::new(unit_weight, 100, 50, 200),
        unit_cost,
        unit_commission: unit_cost / 10,
    }
}

/// Packs the whole quantity of a shipment item
pub fn package_item_for(item: &ShipmentItem) -> PackageItem {
    PackageItem {
        offer_id: item.offer_id,
        quantity: item.quantity,
        unit: item.unit,
        unit_cost: item.unit_cost,
    }
}

/// Push body understood by the local gateway
pub fn local_push(payment: &Payment, status: PaymentStatus) -> Vec<u8> {
    serde_json::json!({
        "external_id": payment.external_id,
        "status": status,
    })
    .to_string()
    .into_bytes()
}
