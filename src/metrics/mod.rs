use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Counters for:
// - State machine transitions and rollups
// - Side-effect failures (carrier orders, cargo assignment, notifications)
// - Gateway push outcomes
// - Cancellation branch failures
// - Concurrency conflicts and history ledger failures
// - Carrier circuit breaker state
//
// The engine only renders the text exposition format; serving it belongs to
// the hosting web layer.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // State Machines
    pub transitions_total: IntCounterVec,
    pub rollups_total: IntCounterVec,

    // Side Effects
    pub side_effect_failures_total: IntCounterVec,
    pub side_effect_retries_total: IntCounterVec,

    // Payments
    pub gateway_push_total: IntCounterVec,

    // Cancellation
    pub cancellation_failures_total: IntCounterVec,

    // Storage
    pub concurrency_conflicts_total: IntCounterVec,
    pub history_append_failures_total: IntCounter,

    // Circuit Breaker
    pub carrier_circuit_state: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let transitions_total = IntCounterVec::new(
            Opts::new("fulfillment_transitions_total", "Committed status transitions"),
            &["entity", "status"],
        )?;
        registry.register(Box::new(transitions_total.clone()))?;

        let rollups_total = IntCounterVec::new(
            Opts::new("fulfillment_rollups_total", "Measurement recomputations by level"),
            &["level"],
        )?;
        registry.register(Box::new(rollups_total.clone()))?;

        let side_effect_failures_total = IntCounterVec::new(
            Opts::new(
                "fulfillment_side_effect_failures_total",
                "Best-effort side effects that failed after the primary commit",
            ),
            &["effect"],
        )?;
        registry.register(Box::new(side_effect_failures_total.clone()))?;

        let side_effect_retries_total = IntCounterVec::new(
            Opts::new(
                "fulfillment_side_effect_retries_total",
                "Corrective replays of failed side effects",
            ),
            &["effect", "outcome"],
        )?;
        registry.register(Box::new(side_effect_retries_total.clone()))?;

        let gateway_push_total = IntCounterVec::new(
            Opts::new("payment_gateway_push_total", "Gateway notifications by outcome"),
            &["gateway", "outcome"],
        )?;
        registry.register(Box::new(gateway_push_total.clone()))?;

        let cancellation_failures_total = IntCounterVec::new(
            Opts::new(
                "fulfillment_cancellation_failures_total",
                "Cancellation cascade branches that failed",
            ),
            &["entity"],
        )?;
        registry.register(Box::new(cancellation_failures_total.clone()))?;

        let concurrency_conflicts_total = IntCounterVec::new(
            Opts::new(
                "fulfillment_concurrency_conflicts_total",
                "Optimistic concurrency conflicts seen on save",
            ),
            &["entity"],
        )?;
        registry.register(Box::new(concurrency_conflicts_total.clone()))?;

        let history_append_failures_total = IntCounter::new(
            "history_append_failures_total",
            "History ledger appends that failed",
        )?;
        registry.register(Box::new(history_append_failures_total.clone()))?;

        let carrier_circuit_state = IntGauge::new(
            "carrier_circuit_breaker_state",
            "Carrier circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)",
        )?;
        registry.register(Box::new(carrier_circuit_state.clone()))?;

        Ok(Self {
            registry,
            transitions_total,
            rollups_total,
            side_effect_failures_total,
            side_effect_retries_total,
            gateway_push_total,
            cancellation_failures_total,
            concurrency_conflicts_total,
            history_append_failures_total,
            carrier_circuit_state,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_transition(&self, entity: &str, status: &str) {
        self.transitions_total.with_label_values(&[entity, status]).inc();
    }

    pub fn record_rollup(&self, level: &str) {
        self.rollups_total.with_label_values(&[level]).inc();
    }

    pub fn record_side_effect_failure(&self, effect: &str) {
        self.side_effect_failures_total.with_label_values(&[effect]).inc();
    }

    pub fn record_side_effect_retry(&self, effect: &str, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.side_effect_retries_total.with_label_values(&[effect, outcome]).inc();
    }

    pub fn record_gateway_push(&self, gateway: &str, outcome: &str) {
        self.gateway_push_total.with_label_values(&[gateway, outcome]).inc();
    }

    pub fn record_cancellation_failure(&self, entity: &str) {
        self.cancellation_failures_total.with_label_values(&[entity]).inc();
    }

    pub fn record_conflict(&self, entity: &str) {
        self.concurrency_conflicts_total.with_label_values(&[entity]).inc();
    }

    pub fn record_history_failure(&self) {
        self.history_append_failures_total.inc();
    }

    pub fn update_carrier_circuit_state(&self, state: i64) {
        self.carrier_circuit_state.set(state);
    }

    /// Render every registered metric in the Prometheus text format
    pub fn encode_text(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        metrics.record_history_failure();
        assert!(metrics.registry.gather().len() > 0);
    }

    #[test]
    fn test_record_transition() {
        let metrics = Metrics::new().unwrap();
        metrics.record_transition("shipment", "assembled");
        metrics.record_transition("shipment", "assembled");

        let gathered = metrics.registry.gather();
        let transitions = gathered
            .iter()
            .find(|m| m.name() == "fulfillment_transitions_total")
            .unwrap();
        assert_eq!(transitions.metric[0].counter.value, Some(2.0));
    }

    #[test]
    fn test_record_gateway_push_outcomes() {
        let metrics = Metrics::new().unwrap();
        metrics.record_gateway_push("checkout_card", "applied");
        metrics.record_gateway_push("checkout_card", "duplicate");

        let gathered = metrics.registry.gather();
        let pushes = gathered
            .iter()
            .find(|m| m.name() == "payment_gateway_push_total")
            .unwrap();
        assert_eq!(pushes.metric.len(), 2);
    }

    #[test]
    fn test_circuit_state_gauge() {
        let metrics = Metrics::new().unwrap();
        metrics.update_carrier_circuit_state(1);

        let gathered = metrics.registry.gather();
        let state = gathered
            .iter()
            .find(|m| m.name() == "carrier_circuit_breaker_state")
            .unwrap();
        assert_eq!(state.metric[0].gauge.value, Some(1.0));
    }

    #[test]
    fn test_encode_text() {
        let metrics = Metrics::new().unwrap();
        metrics.record_side_effect_failure("carrier_order");

        let text = metrics.encode_text().unwrap();
        assert!(text.contains("fulfillment_side_effect_failures_total"));
    }
}
