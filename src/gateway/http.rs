use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use super::GatewayError;

// ============================================================================
// Gateway HTTP Transport
// ============================================================================
//
// Adapters describe requests; the transport executes them. Tests swap in a
// scripted transport, production uses reqwest.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayRequest {
    pub method: HttpMethod,
    /// Path relative to the gateway base URL
    pub path: String,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
    pub basic_auth: Option<(String, String)>,
}

impl GatewayRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            path: path.into(),
            body: None,
            headers: Vec::new(),
            basic_auth: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: HttpMethod::Post,
            path: path.into(),
            body: Some(body),
            headers: Vec::new(),
            basic_auth: None,
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn basic_auth(mut self, user: &str, password: &str) -> Self {
        self.basic_auth = Some((user.to_string(), password.to_string()));
        self
    }
}

#[async_trait]
pub trait GatewayTransport: Send + Sync {
    /// Execute the request and decode the JSON response body
    async fn send(&self, request: GatewayRequest) -> Result<Value, GatewayError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl GatewayTransport for HttpTransport {
    async fn send(&self, request: GatewayRequest) -> Result<Value, GatewayError> {
        let url = self.url(&request.path);
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&url),
            HttpMethod::Post => self.client.post(&url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some((user, password)) = &request.basic_auth {
            builder = builder.basic_auth(user, Some(password));
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        tracing::debug!(url = %url, status = status.as_u16(), "Gateway responded");

        if status.is_server_error() {
            return Err(GatewayError::Transport(format!("{status}: {body}")));
        }
        if !status.is_success() {
            return Err(GatewayError::Rejected(format!("{status}: {body}")));
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_without_double_slash() {
        let transport = HttpTransport::new("https://pay.example.com/v3/", Duration::from_secs(5)).unwrap();
        assert_eq!(transport.url("/payments"), "https://pay.example.com/v3/payments");
        assert_eq!(transport.url("refunds"), "https://pay.example.com/v3/refunds");
    }

    #[test]
    fn test_request_builder() {
        let request = GatewayRequest::post("payments", serde_json::json!({ "a": 1 }))
            .header("Idempotence-Key", "k-1")
            .basic_auth("shop", "secret");

        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.headers, vec![("Idempotence-Key".to_string(), "k-1".to_string())]);
        assert_eq!(request.basic_auth, Some(("shop".into(), "secret".into())));
    }
}
