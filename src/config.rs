use anyhow::Context;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::gateway::{
    CarrierCreditConfig, CarrierCreditGateway, CheckoutConfig, CheckoutGateway, GatewayRegistry, HttpTransport,
    LocalGateway, TerminalConfig, TerminalGateway,
};
use crate::reconciliation::{ReconcilerSettings, PAYMENT_TIMEOUT_REASON};
use crate::utils::{CircuitBreakerConfig, RetryConfig};

// ============================================================================
// Engine Configuration
// ============================================================================
//
// Read from FULFILLMENT_* environment variables, after an optional `.env`
// file. Every setting has a compiled-in default; a remote gateway is only
// configured when its credentials are present.
//
// ============================================================================

const PREFIX: &str = "FULFILLMENT_";

/// Timeout for every call to a payment provider
const GATEWAY_HTTP_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct ScyllaConfig {
    pub node: String,
    pub keyspace: String,
}

#[derive(Debug, Clone)]
pub struct RemoteGateway<C> {
    pub base_url: String,
    pub settings: C,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub retry: RetryConfig,
    pub carrier_breaker: CircuitBreakerConfig,
    pub default_return_url: Option<String>,
    pub timeout_reason_id: Uuid,
    pub log_json: bool,
    /// History goes to ScyllaDB when set, in memory otherwise
    pub scylla: Option<ScyllaConfig>,
    pub local_duration: chrono::Duration,
    pub checkout: Option<RemoteGateway<CheckoutConfig>>,
    pub terminal: Option<RemoteGateway<TerminalConfig>>,
    pub carrier_credit: Option<RemoteGateway<CarrierCreditConfig>>,
}

impl EngineConfig {
    /// Load `.env` if present, then read the process environment
    pub fn from_env() -> anyhow::Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env file");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; keys are given without the prefix
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };
        let retry_defaults = RetryConfig::default();
        let breaker_defaults = CircuitBreakerConfig::default();

        let retry = RetryConfig {
            max_attempts: vars.parse("RETRY_MAX_ATTEMPTS")?.unwrap_or(retry_defaults.max_attempts),
            initial_delay: vars
                .millis("RETRY_INITIAL_DELAY_MS")?
                .unwrap_or(retry_defaults.initial_delay),
            max_delay: vars.millis("RETRY_MAX_DELAY_MS")?.unwrap_or(retry_defaults.max_delay),
            multiplier: retry_defaults.multiplier,
        };
        if retry.max_attempts == 0 {
            anyhow::bail!("{PREFIX}RETRY_MAX_ATTEMPTS must be at least 1");
        }

        let carrier_breaker = CircuitBreakerConfig {
            failure_threshold: vars
                .parse("CARRIER_FAILURE_THRESHOLD")?
                .unwrap_or(breaker_defaults.failure_threshold),
            timeout: vars
                .parse::<u64>("CARRIER_OPEN_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(breaker_defaults.timeout),
            success_threshold: vars
                .parse("CARRIER_SUCCESS_THRESHOLD")?
                .unwrap_or(breaker_defaults.success_threshold),
        };

        let scylla = vars.get("SCYLLA_NODE").map(|node| ScyllaConfig {
            node,
            keyspace: vars
                .get("SCYLLA_KEYSPACE")
                .unwrap_or_else(|| "fulfillment".to_string()),
        });

        let checkout = match (vars.get("CHECKOUT_SHOP_ID"), vars.get("CHECKOUT_SECRET_KEY")) {
            (Some(shop_id), Some(secret_key)) => Some(RemoteGateway {
                base_url: vars.required("CHECKOUT_BASE_URL")?,
                settings: CheckoutConfig {
                    shop_id,
                    secret_key,
                    currency: vars.get("CHECKOUT_CURRENCY").unwrap_or_else(|| "RUB".to_string()),
                    duration: vars.hours("CHECKOUT_DURATION_HOURS")?.unwrap_or(chrono::Duration::hours(1)),
                },
            }),
            _ => None,
        };

        let terminal = match (vars.get("TERMINAL_KEY"), vars.get("TERMINAL_PASSWORD")) {
            (Some(terminal_key), Some(password)) => Some(RemoteGateway {
                base_url: vars.required("TERMINAL_BASE_URL")?,
                settings: TerminalConfig {
                    terminal_key,
                    password,
                    duration: vars.hours("TERMINAL_DURATION_HOURS")?.unwrap_or(chrono::Duration::hours(1)),
                },
            }),
            _ => None,
        };

        let carrier_credit = match (vars.get("CARRIER_CREDIT_PARTNER_ID"), vars.get("CARRIER_CREDIT_API_KEY")) {
            (Some(partner_id), Some(api_key)) => Some(RemoteGateway {
                base_url: vars.required("CARRIER_CREDIT_BASE_URL")?,
                settings: CarrierCreditConfig {
                    partner_id,
                    api_key,
                    duration: vars
                        .hours("CARRIER_CREDIT_DURATION_HOURS")?
                        .unwrap_or(chrono::Duration::hours(CarrierCreditConfig::DEFAULT_DURATION_HOURS)),
                },
            }),
            _ => None,
        };

        Ok(Self {
            retry,
            carrier_breaker,
            default_return_url: vars.get("RETURN_URL"),
            timeout_reason_id: vars.parse("TIMEOUT_REASON_ID")?.unwrap_or(PAYMENT_TIMEOUT_REASON),
            log_json: vars.parse("LOG_JSON")?.unwrap_or(false),
            scylla,
            local_duration: vars.hours("LOCAL_DURATION_HOURS")?.unwrap_or(chrono::Duration::hours(1)),
            checkout,
            terminal,
            carrier_credit,
        })
    }

    pub fn reconciler_settings(&self) -> ReconcilerSettings {
        ReconcilerSettings {
            default_return_url: self.default_return_url.clone(),
            timeout_reason_id: self.timeout_reason_id,
        }
    }

    /// Local gateway plus every remote gateway that has credentials
    pub fn gateway_registry(&self) -> anyhow::Result<GatewayRegistry> {
        let mut registry = GatewayRegistry::new().with(Arc::new(LocalGateway::new(self.local_duration)));

        if let Some(checkout) = &self.checkout {
            let transport = HttpTransport::new(&checkout.base_url, GATEWAY_HTTP_TIMEOUT)
                .context("checkout gateway transport")?;
            registry.register(Arc::new(CheckoutGateway::new(checkout.settings.clone(), Arc::new(transport))));
        }
        if let Some(terminal) = &self.terminal {
            let transport = HttpTransport::new(&terminal.base_url, GATEWAY_HTTP_TIMEOUT)
                .context("terminal gateway transport")?;
            registry.register(Arc::new(TerminalGateway::new(terminal.settings.clone(), Arc::new(transport))));
        }
        if let Some(credit) = &self.carrier_credit {
            let transport = HttpTransport::new(&credit.base_url, GATEWAY_HTTP_TIMEOUT)
                .context("carrier credit gateway transport")?;
            registry.register(Arc::new(CarrierCreditGateway::new(credit.settings.clone(), Arc::new(transport))));
        }
        Ok(registry)
    }
}

struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(&format!("{PREFIX}{key}"))
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, key: &str) -> anyhow::Result<String> {
        self.get(key)
            .with_context(|| format!("{PREFIX}{key} must be set"))
    }

    fn parse<T>(&self, key: &str) -> anyhow::Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(key)
            .map(|raw| {
                raw.parse::<T>()
                    .map_err(|e| anyhow::anyhow!("{PREFIX}{key}={raw:?}: {e}"))
            })
            .transpose()
    }

    fn millis(&self, key: &str) -> anyhow::Result<Option<Duration>> {
        Ok(self.parse::<u64>(key)?.map(Duration::from_millis))
    }

    fn hours(&self, key: &str) -> anyhow::Result<Option<chrono::Duration>> {
        Ok(self.parse::<i64>(key)?.map(chrono::Duration::hours))
    }
}
