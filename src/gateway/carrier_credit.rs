use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use super::http::{GatewayRequest, GatewayTransport};
use super::{external_id_of, format_amount, ExternalPayment, GatewayError, GatewayPush, PaymentGateway};
use crate::domain::measurements::Money;
use crate::domain::payment::{GatewayId, Payment, PaymentStatus};

// ============================================================================
// Carrier credit gateway
// ============================================================================
//
// Point-of-sale credit: the customer files a credit application, the lender
// approves it (held) and the payment completes once the contract is signed.
// Callbacks carry `signature = hex(sha256(application_id + status + api_key))`.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct CarrierCreditConfig {
    pub partner_id: String,
    pub api_key: String,
    pub duration: chrono::Duration,
}

impl CarrierCreditConfig {
    /// Credit decisions take days rather than minutes
    pub const DEFAULT_DURATION_HOURS: i64 = 72;
}

pub struct CarrierCreditGateway {
    config: CarrierCreditConfig,
    transport: Arc<dyn GatewayTransport>,
}

#[derive(Debug, Deserialize)]
struct Callback {
    application_id: String,
    status: String,
    signature: String,
}

fn signature(application_id: &str, status: &str, api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(application_id.as_bytes());
    hasher.update(status.as_bytes());
    hasher.update(api_key.as_bytes());
    hex::encode(hasher.finalize())
}

fn map_status(status: &str) -> Option<PaymentStatus> {
    match status {
        "signed" => Some(PaymentStatus::Paid),
        "approved" => Some(PaymentStatus::Hold),
        "rejected" => Some(PaymentStatus::Timeout),
        "pending" | "new" => Some(PaymentStatus::Waiting),
        "canceled" => Some(PaymentStatus::Canceled),
        _ => None,
    }
}

impl CarrierCreditGateway {
    pub fn new(config: CarrierCreditConfig, transport: Arc<dyn GatewayTransport>) -> Self {
        Self { config, transport }
    }

    fn authorized(&self, request: GatewayRequest) -> GatewayRequest {
        request
            .header("X-Partner-Id", self.config.partner_id.clone())
            .header("X-Api-Key", self.config.api_key.clone())
    }
}

#[async_trait]
impl PaymentGateway for CarrierCreditGateway {
    fn id(&self) -> GatewayId {
        GatewayId::CarrierCredit
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
            "partner_order_id": payment.id.to_string(),
            "order_id": payment.order_id.to_string(),
            "amount": format_amount(payment.sum),
            "return_url": return_url,
        });
        let response = self
            .transport
            .send(self.authorized(GatewayRequest::post("applications", body)))
            .await?;

        let external_id = response["application_id"]
            .as_str()
            .ok_or_else(|| GatewayError::InvalidPayload(format!("missing `application_id` in {response}")))?
            .to_string();

        let mut data = BTreeMap::new();
        data.insert("partner_id".to_string(), self.config.partner_id.clone());
        if let Some(status) = response["status"].as_str() {
            data.insert("status".to_string(), status.to_string());
        }

        Ok(ExternalPayment {
            external_id,
            payment_link: response["form_url"].as_str().map(str::to_string),
            data,
        })
    }

    fn parse_push(&self, payload: &[u8]) -> Result<GatewayPush, GatewayError> {
        let callback: Callback = serde_json::from_slice(payload)?;

        let expected = signature(&callback.application_id, &callback.status, &self.config.api_key);
        if !callback.signature.eq_ignore_ascii_case(&expected) {
            return Err(GatewayError::InvalidSignature);
        }

        let status = map_status(&callback.status)
            .ok_or_else(|| GatewayError::InvalidPayload(format!("unknown status `{}`", callback.status)))?;

        Ok(GatewayPush {
            external_id: callback.application_id,
            status,
            raw_status: callback.status,
        })
    }

    async fn fetch_status(&self, payment: &Payment) -> Result<PaymentStatus, GatewayError> {
        let external_id = external_id_of(payment)?;
        let response = self
            .transport
            .send(self.authorized(GatewayRequest::get(format!("applications/{external_id}"))))
            .await?;

        let raw = response["status"]
            .as_str()
            .ok_or_else(|| GatewayError::InvalidPayload(format!("missing `status` in {response}")))?;
        map_status(raw).ok_or_else(|| GatewayError::InvalidPayload(format!("unknown status `{raw}`")))
    }

    async fn refund(&self, payment: &Payment, amount: Money, refund_id: Uuid) -> Result<(), GatewayError> {
        let external_id = external_id_of(payment)?;
        let body = json!({
            "application_id": external_id,
            "amount": format_amount(amount),
            "partner_return_id": refund_id.to_string(),
        });
        self.transport
            .send(self.authorized(GatewayRequest::post("returns", body)))
            .await?;
        Ok(())
    }

    async fn commit_held_payment(&self, payment: &Payment) -> Result<(), GatewayError> {
        let external_id = external_id_of(payment)?;
        let response = self
            .transport
            .send(self.authorized(GatewayRequest::post(
                format!("applications/{external_id}/issue"),
                json!({}),
            )))
            .await?;

        match response["status"].as_str() {
            Some("signed") | Some("issued") => Ok(()),
            other => Err(GatewayError::Rejected(format!(
                "credit {external_id} not issued: {}",
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

    fn gateway(transport: Arc<ScriptedTransport>) -> CarrierCreditGateway {
        CarrierCreditGateway::new(
            CarrierCreditConfig {
                partner_id: "partner-7".into(),
                api_key: "key".into(),
                duration: chrono::Duration::hours(CarrierCreditConfig::DEFAULT_DURATION_HOURS),
            },
            transport,
        )
    }

    fn callback(status: &str, api_key: &str) -> Vec<u8> {
        json!({
            "application_id": "app-9",
            "status": status,
            "signature": signature("app-9", status, api_key),
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn test_signed_callback_maps_status() {
        let gateway = gateway(Arc::new(ScriptedTransport::new()));
        for (raw, expected) in [
            ("signed", PaymentStatus::Paid),
            ("approved", PaymentStatus::Hold),
            ("rejected", PaymentStatus::Timeout),
            ("pending", PaymentStatus::Waiting),
            ("canceled", PaymentStatus::Canceled),
        ] {
            let push = gateway.parse_push(&callback(raw, "key")).unwrap();
            assert_eq!(push.external_id, "app-9");
            assert_eq!(push.status, expected, "{raw}");
        }
    }

    #[test]
    fn test_callback_with_wrong_key_is_rejected() {
        let gateway = gateway(Arc::new(ScriptedTransport::new()));
        assert!(matches!(
            gateway.parse_push(&callback("signed", "other")),
            Err(GatewayError::InvalidSignature)
        ));
    }

    #[tokio::test]
    async fn test_issue_requires_signed_contract() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(json!({ "status": "approved" })).await;
        let gateway = gateway(transport.clone());

        let mut payment = Payment::create(Uuid::now_v7(), Uuid::now_v7(), 50_000, GatewayId::CarrierCredit)
            .unwrap()
            .0;
        payment.external_id = Some("app-9".into());

        let result = gateway.commit_held_payment(&payment).await;
        assert!(matches!(result, Err(GatewayError::Rejected(_))));

        let sent = transport.requests().await;
        assert_eq!(sent[0].path, "applications/app-9/issue");
        assert!(sent[0]
            .headers
            .contains(&("X-Partner-Id".to_string(), "partner-7".to_string())));
    }
}
