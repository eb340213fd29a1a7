use std::sync::Arc;

use crate::cascade::CascadeCoordinator;
use crate::collaborators::Collaborators;
use crate::domain::cargo::Cargo;
use crate::domain::delivery::Delivery;
use crate::domain::order::Order;
use crate::domain::order_return::OrderReturn;
use crate::domain::package::Package;
use crate::domain::payment::Payment;
use crate::domain::shipment::Shipment;
use crate::fulfillment::FulfillmentService;
use crate::gateway::{GatewayRegistry, LocalGateway, PaymentGateway};
use crate::history::{HistoryLedger, HistoryRecorder, InMemoryHistoryLedger};
use crate::lifecycle::CommandHandler;
use crate::metrics::Metrics;
use crate::reconciliation::{PaymentReconciler, ReconcilerSettings};
use crate::rollup::RollupRules;
use crate::store::Stores;
use crate::utils::{CircuitBreakerConfig, RetryConfig};

// ============================================================================
// Engine Wiring
// ============================================================================
//
// Everything the services need is constructed here and passed down
// explicitly. There is no global registry: stores, collaborators and
// gateways are handed to the builder.
//
// ============================================================================

/// Shared handles used by every service and by the cascade
pub struct EngineContext {
    pub stores: Stores,
    pub orders: CommandHandler<Order>,
    pub deliveries: CommandHandler<Delivery>,
    pub shipments: CommandHandler<Shipment>,
    pub cargos: CommandHandler<Cargo>,
    pub packages: CommandHandler<Package>,
    pub payments: CommandHandler<Payment>,
    pub returns: CommandHandler<OrderReturn>,
    pub history: HistoryRecorder,
    pub metrics: Arc<Metrics>,
    pub collaborators: Collaborators,
    pub rules: RollupRules,
}

impl EngineContext {
    pub fn new(
        stores: Stores,
        history: HistoryRecorder,
        metrics: Arc<Metrics>,
        collaborators: Collaborators,
        retry: RetryConfig,
    ) -> Self {
        Self {
            orders: CommandHandler::new(stores.orders.clone(), retry.clone(), metrics.clone()),
            deliveries: CommandHandler::new(stores.deliveries.clone(), retry.clone(), metrics.clone()),
            shipments: CommandHandler::new(stores.shipments.clone(), retry.clone(), metrics.clone()),
            cargos: CommandHandler::new(stores.cargos.clone(), retry.clone(), metrics.clone()),
            packages: CommandHandler::new(stores.packages.clone(), retry.clone(), metrics.clone()),
            payments: CommandHandler::new(stores.payments.clone(), retry.clone(), metrics.clone()),
            returns: CommandHandler::new(stores.returns.clone(), retry, metrics.clone()),
            stores,
            history,
            metrics,
            collaborators,
            rules: RollupRules::PHYSICAL,
        }
    }
}

pub struct Engine {
    pub fulfillment: FulfillmentService,
    pub payments: PaymentReconciler,
    coordinator: Arc<CascadeCoordinator>,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        self.coordinator.context()
    }

    pub fn coordinator(&self) -> &Arc<CascadeCoordinator> {
        &self.coordinator
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.context().metrics
    }
}

pub struct EngineBuilder {
    stores: Stores,
    ledger: Arc<dyn HistoryLedger>,
    metrics: Option<Arc<Metrics>>,
    collaborators: Collaborators,
    gateways: GatewayRegistry,
    retry: RetryConfig,
    carrier_breaker: CircuitBreakerConfig,
    reconciler: ReconcilerSettings,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    /// In-memory stores and ledger, default collaborators, local gateway only
    pub fn new() -> Self {
        Self {
            stores: Stores::in_memory(),
            ledger: Arc::new(InMemoryHistoryLedger::new()),
            metrics: None,
            collaborators: Collaborators::default(),
            gateways: GatewayRegistry::new().with(Arc::new(LocalGateway::default())),
            retry: RetryConfig::default(),
            carrier_breaker: CircuitBreakerConfig::default(),
            reconciler: ReconcilerSettings::default(),
        }
    }

    pub fn stores(mut self, stores: Stores) -> Self {
        self.stores = stores;
        self
    }

    pub fn history_ledger(mut self, ledger: Arc<dyn HistoryLedger>) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn collaborators(mut self, collaborators: Collaborators) -> Self {
        self.collaborators = collaborators;
        self
    }

    pub fn gateways(mut self, gateways: GatewayRegistry) -> Self {
        self.gateways = gateways;
        self
    }

    pub fn gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateways.register(gateway);
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn carrier_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.carrier_breaker = config;
        self
    }

    pub fn reconciler(mut self, settings: ReconcilerSettings) -> Self {
        self.reconciler = settings;
        self
    }

    pub fn build(self) -> anyhow::Result<Engine> {
        if self.gateways.ids().is_empty() {
            anyhow::bail!("at least one payment gateway must be registered");
        }

        let metrics = match self.metrics {
            Some(metrics) => metrics,
            None => Arc::new(Metrics::new()?),
        };
        let history = HistoryRecorder::new(self.ledger, metrics.clone());
        let context = Arc::new(EngineContext::new(
            self.stores,
            history,
            metrics,
            self.collaborators,
            self.retry,
        ));
        let coordinator = Arc::new(CascadeCoordinator::new(context, self.carrier_breaker));

        tracing::info!(
            gateways = ?self.gateways.ids(),
            "Fulfillment engine assembled"
        );

        Ok(Engine {
            fulfillment: FulfillmentService::new(coordinator.clone()),
            payments: PaymentReconciler::new(coordinator.clone(), self.gateways, self.reconciler),
            coordinator,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_requires_a_gateway() {
        let result = EngineBuilder::new().gateways(GatewayRegistry::new()).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_default_engine_has_local_gateway() {
        let engine = Engine::builder().build().unwrap();
        assert_eq!(engine.payments.gateways().ids(), vec![crate::domain::payment::GatewayId::Local]);
    }
}
