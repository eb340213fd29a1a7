use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{external_id_of, ExternalPayment, GatewayError, GatewayPush, PaymentGateway};
use crate::domain::measurements::Money;
use crate::domain::payment::{GatewayId, Payment, PaymentStatus};

// ============================================================================
// Local gateway
// ============================================================================
//
// In-process provider for development and tests. Payments are "created" by
// recording them locally; statuses change only through `set_status` or a
// push of `{"external_id": .., "status": ..}`.
//
// ============================================================================

#[derive(Debug, Clone, Default)]
struct LocalPayment {
    status: Option<PaymentStatus>,
    refunded: Money,
    refund_ids: HashSet<Uuid>,
    captured: bool,
}

pub struct LocalGateway {
    duration: chrono::Duration,
    payments: RwLock<HashMap<String, LocalPayment>>,
}

#[derive(Debug, Deserialize)]
struct LocalPush {
    external_id: String,
    status: PaymentStatus,
}

impl LocalGateway {
    pub fn new(duration: chrono::Duration) -> Self {
        Self {
            duration,
            payments: RwLock::new(HashMap::new()),
        }
    }

    fn external_id(payment: &Payment) -> String {
        format!("local-{}", payment.id)
    }

    /// Status the next poll will report
    pub async fn set_status(&self, external_id: &str, status: PaymentStatus) {
        self.payments
            .write()
            .await
            .entry(external_id.to_string())
            .or_default()
            .status = Some(status);
    }

    pub async fn refunded(&self, external_id: &str) -> Money {
        self.payments
            .read()
            .await
            .get(external_id)
            .map(|p| p.refunded)
            .unwrap_or(0)
    }

    pub async fn captured(&self, external_id: &str) -> bool {
        self.payments
            .read()
            .await
            .get(external_id)
            .is_some_and(|p| p.captured)
    }
}

impl Default for LocalGateway {
    fn default() -> Self {
        Self::new(chrono::Duration::hours(1))
    }
}

#[async_trait]
impl PaymentGateway for LocalGateway {
    fn id(&self) -> GatewayId {
        GatewayId::Local
    }

    fn duration(&self) -> chrono::Duration {
        self.duration
    }

    async fn create_external_payment(
        &self,
        payment: &Payment,
        return_url: Option<&str>,
    ) -> Result<ExternalPayment, GatewayError> {
        let external_id = Self::external_id(payment);
        self.payments
            .write()
            .await
            .insert(external_id.clone(), LocalPayment::default());

        let mut data = BTreeMap::new();
        if let Some(url) = return_url {
            data.insert("return_url".to_string(), url.to_string());
        }

        Ok(ExternalPayment {
            payment_link: Some(format!("local://pay/{external_id}")),
            external_id,
            data,
        })
    }

    fn parse_push(&self, payload: &[u8]) -> Result<GatewayPush, GatewayError> {
        let push: LocalPush = serde_json::from_slice(payload)?;
        Ok(GatewayPush {
            raw_status: push.status.as_str().to_string(),
            external_id: push.external_id,
            status: push.status,
        })
    }

    async fn fetch_status(&self, payment: &Payment) -> Result<PaymentStatus, GatewayError> {
        let external_id = external_id_of(payment)?;
        let payments = self.payments.read().await;
        let local = payments
            .get(external_id)
            .ok_or_else(|| GatewayError::Rejected(format!("unknown local payment {external_id}")))?;
        Ok(local.status.unwrap_or(payment.status))
    }

    async fn refund(&self, payment: &Payment, amount: Money, refund_id: Uuid) -> Result<(), GatewayError> {
        let external_id = external_id_of(payment)?;
        let mut payments = self.payments.write().await;
        let local = payments
            .get_mut(external_id)
            .ok_or_else(|| GatewayError::Rejected(format!("unknown local payment {external_id}")))?;
        if local.refund_ids.insert(refund_id) {
            local.refunded += amount;
        }
        Ok(())
    }

    async fn commit_held_payment(&self, payment: &Payment) -> Result<(), GatewayError> {
        let external_id = external_id_of(payment)?;
        let mut payments = self.payments.write().await;
        let local = payments
            .get_mut(external_id)
            .ok_or_else(|| GatewayError::Rejected(format!("unknown local payment {external_id}")))?;
        local.captured = true;
        local.status = Some(PaymentStatus::Paid);
        Ok(())
    }
}
