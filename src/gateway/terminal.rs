use async_trait::async_trait;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use super::http::{GatewayRequest, GatewayTransport};
use super::{external_id_of, ExternalPayment, GatewayError, GatewayPush, PaymentGateway};
use crate::domain::measurements::Money;
use crate::domain::payment::{GatewayId, Payment, PaymentStatus};

// ============================================================================
// Terminal card gateway
// ============================================================================
//
// Every request and notification is signed with a `Token`: SHA-256 (hex) of
// the root-level scalar values plus the terminal password, concatenated in
// key order. Nested objects and arrays are not signed.
//
// ============================================================================

const TOKEN_FIELD: &str = "Token";
const PASSWORD_FIELD: &str = "Password";

#[derive(Debug, Clone)]
pub struct TerminalConfig {
    pub terminal_key: String,
    pub password: String,
    pub duration: chrono::Duration,
}

pub struct TerminalGateway {
    config: TerminalConfig,
    transport: Arc<dyn GatewayTransport>,
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Token over the root scalar fields of `params`, ignoring any `Token`
pub fn sign(params: &Map<String, Value>, password: &str) -> String {
    let mut fields: BTreeMap<&str, String> = params
        .iter()
        .filter(|(key, _)| key.as_str() != TOKEN_FIELD)
        .filter_map(|(key, value)| scalar_text(value).map(|text| (key.as_str(), text)))
        .collect();
    fields.insert(PASSWORD_FIELD, password.to_string());

    let mut hasher = Sha256::new();
    for value in fields.values() {
        hasher.update(value.as_bytes());
    }
    hex::encode(hasher.finalize())
}

fn map_status(status: &str) -> Option<PaymentStatus> {
    match status {
        "CONFIRMED" => Some(PaymentStatus::Paid),
        "AUTHORIZED" => Some(PaymentStatus::Hold),
        "REJECTED" | "CANCELED" | "DEADLINE_EXPIRED" | "AUTH_FAIL" => Some(PaymentStatus::Timeout),
        "NEW" | "FORM_SHOWED" | "AUTHORIZING" | "CONFIRMING" => Some(PaymentStatus::Waiting),
        "REVERSED" | "REFUNDED" => Some(PaymentStatus::Canceled),
        _ => None,
    }
}

impl TerminalGateway {
    pub fn new(config: TerminalConfig, transport: Arc<dyn GatewayTransport>) -> Self {
        Self { config, transport }
    }

    /// Sign and send; a response with `Success: false` is a rejection
    async fn call(&self, path: &str, mut params: Map<String, Value>) -> Result<Value, GatewayError> {
        params.insert("TerminalKey".into(), Value::String(self.config.terminal_key.clone()));
        let token = sign(&params, &self.config.password);
        params.insert(TOKEN_FIELD.into(), Value::String(token));

        let response = self
            .transport
            .send(GatewayRequest::post(path, Value::Object(params)))
            .await?;

        if response["Success"].as_bool() != Some(true) {
            return Err(GatewayError::Rejected(format!(
                "{} ({})",
                response["Message"].as_str().unwrap_or("request failed"),
                response["ErrorCode"].as_str().unwrap_or("?")
            )));
        }
        Ok(response)
    }

    fn payment_params(payment: &Payment) -> Result<Map<String, Value>, GatewayError> {
        let mut params = Map::new();
        params.insert("PaymentId".into(), Value::String(external_id_of(payment)?.to_string()));
        Ok(params)
    }
}

#[async_trait]
impl PaymentGateway for TerminalGateway {
    fn id(&self) -> GatewayId {
        GatewayId::TerminalCard
    }

    fn duration(&self) -> chrono::Duration {
        self.config.duration
    }

    async fn create_external_payment(
        &self,
        payment: &Payment,
        return_url: Option<&str>,
    ) -> Result<ExternalPayment, GatewayError> {
        let mut params = Map::new();
        params.insert("Amount".into(), json!(payment.sum));
        params.insert("OrderId".into(), json!(payment.id.to_string()));
        params.insert("Description".into(), json!(format!("Order {}", payment.order_id)));
        params.insert("PayType".into(), json!("T"));
        if let Some(url) = return_url {
            params.insert("SuccessURL".into(), json!(url));
            params.insert("FailURL".into(), json!(url));
        }

        let response = self.call("Init", params).await?;
        let external_id = response["PaymentId"]
            .as_str()
            .map(str::to_string)
            .or_else(|| response["PaymentId"].as_u64().map(|id| id.to_string()))
            .ok_or_else(|| GatewayError::InvalidPayload("Init response without PaymentId".into()))?;

        let mut data = BTreeMap::new();
        data.insert("terminal_key".to_string(), self.config.terminal_key.clone());
        if let Some(status) = response["Status"].as_str() {
            data.insert("status".to_string(), status.to_string());
        }

        Ok(ExternalPayment {
            external_id,
            payment_link: response["PaymentURL"].as_str().map(str::to_string),
            data,
        })
    }

    fn parse_push(&self, payload: &[u8]) -> Result<GatewayPush, GatewayError> {
        let value: Value = serde_json::from_slice(payload)?;
        let Value::Object(params) = value else {
            return Err(GatewayError::InvalidPayload("notification is not an object".into()));
        };

        let token = params
            .get(TOKEN_FIELD)
            .and_then(Value::as_str)
            .ok_or(GatewayError::InvalidSignature)?;
        if !token.eq_ignore_ascii_case(&sign(&params, &self.config.password)) {
            return Err(GatewayError::InvalidSignature);
        }
        if params.get("TerminalKey").and_then(Value::as_str) != Some(self.config.terminal_key.as_str()) {
            return Err(GatewayError::InvalidPayload("notification for another terminal".into()));
        }

        let external_id = params
            .get("PaymentId")
            .and_then(scalar_text)
            .ok_or_else(|| GatewayError::InvalidPayload("missing PaymentId".into()))?;
        let raw_status = params
            .get("Status")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::InvalidPayload("missing Status".into()))?
            .to_string();
        let status = map_status(&raw_status)
            .ok_or_else(|| GatewayError::InvalidPayload(format!("unknown status `{raw_status}`")))?;

        Ok(GatewayPush {
            external_id,
            status,
            raw_status,
        })
    }

    async fn fetch_status(&self, payment: &Payment) -> Result<PaymentStatus, GatewayError> {
        let response = self.call("GetState", Self::payment_params(payment)?).await?;
        let raw = response["Status"]
            .as_str()
            .ok_or_else(|| GatewayError::InvalidPayload("GetState response without Status".into()))?;
        map_status(raw).ok_or_else(|| GatewayError::InvalidPayload(format!("unknown status `{raw}`")))
    }

    async fn refund(&self, payment: &Payment, amount: Money, refund_id: Uuid) -> Result<(), GatewayError> {
        let mut params = Self::payment_params(payment)?;
        params.insert("Amount".into(), json!(amount));
        params.insert("ExternalRequestId".into(), json!(refund_id.to_string()));
        self.call("Cancel", params).await?;
        Ok(())
    }

    async fn commit_held_payment(&self, payment: &Payment) -> Result<(), GatewayError> {
        self.call("Confirm", Self::payment_params(payment)?).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;

    fn gateway() -> TerminalGateway {
        TerminalGateway::new(
            TerminalConfig {
                terminal_key: "TK-1".into(),
                password: "pw".into(),
                duration: chrono::Duration::hours(1),
            },
            Arc::new(ScriptedTransport::new()),
        )
    }

    fn signed_notification(status: &str, password: &str) -> Vec<u8> {
        let mut params = Map::new();
        params.insert("TerminalKey".into(), json!("TK-1"));
        params.insert("PaymentId".into(), json!(700_100));
        params.insert("Status".into(), json!(status));
        params.insert("Success".into(), json!(true));
        params.insert("Amount".into(), json!(12_500));
        params.insert("Data".into(), json!({ "nested": "ignored" }));
        let token = sign(&params, password);
        params.insert("Token".into(), json!(token));
        serde_json::to_vec(&Value::Object(params)).unwrap()
    }

    #[test]
    fn test_token_ignores_nested_values_and_token_field() {
        let mut params = Map::new();
        params.insert("b".into(), json!("2"));
        params.insert("a".into(), json!(1));
        params.insert("Receipt".into(), json!({ "x": 1 }));
        let plain = sign(&params, "pw");

        params.insert("Token".into(), json!("anything"));
        assert_eq!(sign(&params, "pw"), plain);

        // a=1, b=2, Password=pw in key order: "Password" < "a" < "b"
        let expected = hex::encode(Sha256::digest(b"pw12"));
        assert_eq!(plain, expected);
    }

    #[test]
    fn test_push_status_mapping() {
        let gateway = gateway();
        for (raw, expected) in [
            ("CONFIRMED", PaymentStatus::Paid),
            ("AUTHORIZED", PaymentStatus::Hold),
            ("REJECTED", PaymentStatus::Timeout),
            ("FORM_SHOWED", PaymentStatus::Waiting),
            ("REVERSED", PaymentStatus::Canceled),
        ] {
            let push = gateway.parse_push(&signed_notification(raw, "pw")).unwrap();
            assert_eq!(push.external_id, "700100");
            assert_eq!(push.status, expected, "{raw}");
        }
    }

    #[test]
    fn test_forged_push_is_rejected() {
        let result = gateway().parse_push(&signed_notification("CONFIRMED", "wrong"));
        assert!(matches!(result, Err(GatewayError::InvalidSignature)));
    }

    #[tokio::test]
    async fn test_unsuccessful_response_is_rejection() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .respond(json!({ "Success": false, "ErrorCode": "204", "Message": "Invalid amount" }))
            .await;
        let gateway = TerminalGateway::new(
            TerminalConfig {
                terminal_key: "TK-1".into(),
                password: "pw".into(),
                duration: chrono::Duration::hours(1),
            },
            transport.clone(),
        );
        let payment = Payment::create(uuid::Uuid::now_v7(), uuid::Uuid::now_v7(), 100, GatewayId::TerminalCard)
            .unwrap()
            .0;

        let result = gateway.create_external_payment(&payment, None).await;
        assert!(matches!(result, Err(GatewayError::Rejected(message)) if message.contains("Invalid amount")));

        let sent = transport.requests().await;
        let body = sent[0].body.as_ref().unwrap();
        assert_eq!(body["TerminalKey"], "TK-1");
        assert!(body["Token"].is_string());
    }
}
