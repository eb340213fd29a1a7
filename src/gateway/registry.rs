use std::collections::HashMap;
use std::sync::Arc;

use super::{GatewayError, PaymentGateway};
use crate::domain::payment::GatewayId;

/// Adapters by provider tag
#[derive(Clone, Default)]
pub struct GatewayRegistry {
    gateways: HashMap<GatewayId, Arc<dyn PaymentGateway>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers under the adapter's own id, replacing any previous adapter
    pub fn register(&mut self, gateway: Arc<dyn PaymentGateway>) {
        if self.gateways.insert(gateway.id(), gateway.clone()).is_some() {
            tracing::warn!(gateway = %gateway.id(), "Payment gateway re-registered");
        }
    }

    pub fn with(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.register(gateway);
        self
    }

    pub fn get(&self, id: GatewayId) -> Result<Arc<dyn PaymentGateway>, GatewayError> {
        self.gateways
            .get(&id)
            .cloned()
            .ok_or(GatewayError::NotRegistered(id))
    }

    pub fn ids(&self) -> Vec<GatewayId> {
        let mut ids: Vec<_> = self.gateways.keys().copied().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::LocalGateway;

    #[test]
    fn test_lookup_by_provider_tag() {
        let registry = GatewayRegistry::new().with(Arc::new(LocalGateway::default()));

        assert_eq!(registry.ids(), vec![GatewayId::Local]);
        assert_eq!(registry.get(GatewayId::Local).unwrap().id(), GatewayId::Local);
        assert!(matches!(
            registry.get(GatewayId::TerminalCard),
            Err(GatewayError::NotRegistered(GatewayId::TerminalCard))
        ));
    }
}
