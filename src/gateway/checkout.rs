use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use super::http::{GatewayRequest, GatewayTransport};
use super::{external_id_of, format_amount, ExternalPayment, GatewayError, GatewayPush, PaymentGateway};
use crate::domain::measurements::Money;
use crate::domain::payment::{GatewayId, Payment, PaymentStatus};

// ============================================================================
// Checkout card gateway
// ============================================================================
//
// Redirect checkout: the customer pays on the provider's confirmation page
// and the provider posts JSON event notifications. Every mutating call
// carries an `Idempotence-Key` derived from local ids, so a replayed call
// cannot charge or refund twice.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    pub shop_id: String,
    pub secret_key: String,
    pub currency: String,
    pub duration: chrono::Duration,
}

pub struct CheckoutGateway {
    config: CheckoutConfig,
    transport: Arc<dyn GatewayTransport>,
}

#[derive(Debug, Deserialize)]
struct Notification {
    event: String,
    object: PaymentObject,
}

#[derive(Debug, Deserialize)]
struct PaymentObject {
    id: String,
    #[serde(default)]
    status: Option<String>,
}

impl CheckoutGateway {
    pub fn new(config: CheckoutConfig, transport: Arc<dyn GatewayTransport>) -> Self {
        Self { config, transport }
    }

    fn authorized(&self, request: GatewayRequest) -> GatewayRequest {
        request.basic_auth(&self.config.shop_id, &self.config.secret_key)
    }

    fn amount(&self, amount: Money) -> serde_json::Value {
        json!({ "value": format_amount(amount), "currency": self.config.currency })
    }
}

/// Provider payment status -> local status
fn map_status(status: &str) -> Option<PaymentStatus> {
    match status {
        "succeeded" => Some(PaymentStatus::Paid),
        "waiting_for_capture" => Some(PaymentStatus::Hold),
        "canceled" => Some(PaymentStatus::Timeout),
        "pending" => Some(PaymentStatus::Waiting),
        _ => None,
    }
}

fn required_str<'a>(value: &'a serde_json::Value, field: &str) -> Result<&'a str, GatewayError> {
    value[field]
        .as_str()
        .ok_or_else(|| GatewayError::InvalidPayload(format!("missing `{field}` in {value}")))
}

#[async_trait]
impl PaymentGateway for CheckoutGateway {
    fn id(&self) -> GatewayId {
        GatewayId::CheckoutCard
    }

    fn duration(&self) -> chrono::Duration {
        self.config.duration
    }

    async fn create_external_payment(
        &self,
        payment: &Payment,
        return_url: Option<&str>,
    ) -> Result<ExternalPayment, GatewayError> {
        let body = json!({
            "amount": self.amount(payment.sum),
            "capture": false,
            "confirmation": { "type": "redirect", "return_url": return_url },
            "description": format!("Order {}", payment.order_id),
            "metadata": {
                "payment_id": payment.id.to_string(),
                "order_id": payment.order_id.to_string(),
            },
        });
        let request = self
            .authorized(GatewayRequest::post("payments", body))
            .header("Idempotence-Key", payment.id.to_string());

        let response = self.transport.send(request).await?;
        let external_id = required_str(&response, "id")?.to_string();
        let payment_link = response["confirmation"]["confirmation_url"]
            .as_str()
            .map(str::to_string);

        let mut data = BTreeMap::new();
        if let Some(status) = response["status"].as_str() {
            data.insert("status".to_string(), status.to_string());
        }
        data.insert("shop_id".to_string(), self.config.shop_id.clone());

        Ok(ExternalPayment {
            external_id,
            payment_link,
            data,
        })
    }

    fn parse_push(&self, payload: &[u8]) -> Result<GatewayPush, GatewayError> {
        let notification: Notification = serde_json::from_slice(payload)?;

        let status = match notification.event.as_str() {
            "payment.succeeded" => Some(PaymentStatus::Paid),
            "payment.waiting_for_capture" => Some(PaymentStatus::Hold),
            "payment.canceled" => Some(PaymentStatus::Timeout),
            _ => notification.object.status.as_deref().and_then(map_status),
        }
        .ok_or_else(|| GatewayError::InvalidPayload(format!("unknown event `{}`", notification.event)))?;

        Ok(GatewayPush {
            external_id: notification.object.id,
            status,
            raw_status: notification.event,
        })
    }

    async fn fetch_status(&self, payment: &Payment) -> Result<PaymentStatus, GatewayError> {
        let external_id = external_id_of(payment)?;
        let request = self.authorized(GatewayRequest::get(format!("payments/{external_id}")));

        let response = self.transport.send(request).await?;
        let raw = required_str(&response, "status")?;
        map_status(raw).ok_or_else(|| GatewayError::InvalidPayload(format!("unknown status `{raw}`")))
    }

    async fn refund(&self, payment: &Payment, amount: Money, refund_id: Uuid) -> Result<(), GatewayError> {
        let external_id = external_id_of(payment)?;
        let body = json!({ "payment_id": external_id, "amount": self.amount(amount) });
        let key = format!("{}-refund-{}", payment.id, refund_id);
        let request = self
            .authorized(GatewayRequest::post("refunds", body))
            .header("Idempotence-Key", key);

        let response = self.transport.send(request).await?;
        match response["status"].as_str() {
            Some("canceled") => Err(GatewayError::Rejected(format!("refund canceled for {external_id}"))),
            _ => Ok(()),
        }
    }

    async fn commit_held_payment(&self, payment: &Payment) -> Result<(), GatewayError> {
        let external_id = external_id_of(payment)?;
        let body = json!({ "amount": self.amount(payment.sum) });
        let request = self
            .authorized(GatewayRequest::post(format!("payments/{external_id}/capture"), body))
            .header("Idempotence-Key", format!("{}-capture", payment.id));

        let response = self.transport.send(request).await?;
        match response["status"].as_str() {
            Some("succeeded") => Ok(()),
            other => Err(GatewayError::Rejected(format!(
                "capture of {external_id} ended as {}",
                other.unwrap_or("unknown")
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;
    use uuid::Uuid;

    fn gateway(transport: Arc<ScriptedTransport>) -> CheckoutGateway {
        CheckoutGateway::new(
            CheckoutConfig {
                shop_id: "shop-1".into(),
                secret_key: "secret".into(),
                currency: "USD".into(),
                duration: chrono::Duration::hours(1),
            },
            transport,
        )
    }

    fn payment() -> Payment {
        Payment::create(Uuid::now_v7(), Uuid::now_v7(), 12_500, GatewayId::CheckoutCard)
            .unwrap()
            .0
    }

    #[test]
    fn test_push_event_mapping() {
        let gateway = gateway(Arc::new(ScriptedTransport::new()));
        let cases = [
            ("payment.succeeded", PaymentStatus::Paid),
            ("payment.waiting_for_capture", PaymentStatus::Hold),
            ("payment.canceled", PaymentStatus::Timeout),
        ];

        for (event, expected) in cases {
            let payload = json!({
                "type": "notification",
                "event": event,
                "object": { "id": "ext-1", "status": "whatever" },
            });
            let push = gateway.parse_push(payload.to_string().as_bytes()).unwrap();
            assert_eq!(push.external_id, "ext-1");
            assert_eq!(push.status, expected, "{event}");
        }
    }

    #[test]
    fn test_malformed_push_is_rejected() {
        let gateway = gateway(Arc::new(ScriptedTransport::new()));
        assert!(matches!(
            gateway.parse_push(b"{not json"),
            Err(GatewayError::InvalidPayload(_))
        ));

        let unknown = json!({ "event": "refund.succeeded", "object": { "id": "r-1" } });
        assert!(gateway.parse_push(unknown.to_string().as_bytes()).is_err());
    }

    #[tokio::test]
    async fn test_create_sends_idempotence_key_and_reads_link() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .respond(json!({
                "id": "ext-42",
                "status": "pending",
                "confirmation": { "confirmation_url": "https://pay.example.com/c/42" },
            }))
            .await;
        let gateway = gateway(transport.clone());
        let payment = payment();

        let external = gateway
            .create_external_payment(&payment, Some("https://shop.example.com/back"))
            .await
            .unwrap();

        assert_eq!(external.external_id, "ext-42");
        assert_eq!(external.payment_link.as_deref(), Some("https://pay.example.com/c/42"));
        assert_eq!(external.data["status"], "pending");

        let sent = transport.requests().await;
        assert_eq!(sent[0].path, "payments");
        assert!(sent[0]
            .headers
            .contains(&("Idempotence-Key".to_string(), payment.id.to_string())));
        assert_eq!(sent[0].body.as_ref().unwrap()["amount"]["value"], "125.00");
    }

    #[tokio::test]
    async fn test_refund_key_follows_refund_id() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(json!({ "status": "succeeded" })).await;
        transport.respond(json!({ "status": "succeeded" })).await;
        let gateway = gateway(transport.clone());
        let mut payment = payment();
        payment.external_id = Some("ext-7".into());

        let (first, second) = (Uuid::now_v7(), Uuid::now_v7());
        gateway.refund(&payment, 500, first).await.unwrap();
        gateway.refund(&payment, 500, second).await.unwrap();

        let keys: Vec<String> = transport
            .requests()
            .await
            .iter()
            .flat_map(|r| r.headers.iter())
            .filter(|(name, _)| name == "Idempotence-Key")
            .map(|(_, value)| value.clone())
            .collect();
        assert_eq!(
            keys,
            vec![
                format!("{}-refund-{first}", payment.id),
                format!("{}-refund-{second}", payment.id)
            ]
        );
    }

    #[tokio::test]
    async fn test_fetch_status_requires_external_id() {
        let gateway = gateway(Arc::new(ScriptedTransport::new()));
        let result = gateway.fetch_status(&payment()).await;
        assert!(matches!(result, Err(GatewayError::InvalidPayload(_))));
    }
}
