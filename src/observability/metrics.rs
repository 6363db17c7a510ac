use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub orders_created_total: IntCounterVec,
    pub claims_total: IntCounterVec,
    pub withdrawal_requests_total: IntCounterVec,
    pub events_published_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let orders_created_total = IntCounterVec::new(
            Opts::new("orders_created_total", "Orders created by order type"),
            &["order_type"],
        )
        .expect("valid orders_created_total metric");

        let claims_total = IntCounterVec::new(
            Opts::new("claims_total", "Dispatch claim attempts by outcome"),
            &["outcome"],
        )
        .expect("valid claims_total metric");

        let withdrawal_requests_total = IntCounterVec::new(
            Opts::new(
                "withdrawal_requests_total",
                "Withdrawal creation attempts by outcome",
            ),
            &["outcome"],
        )
        .expect("valid withdrawal_requests_total metric");

        let events_published_total = IntCounter::new(
            "events_published_total",
            "Envelopes published to the event bus",
        )
        .expect("valid events_published_total metric");

        registry
            .register(Box::new(orders_created_total.clone()))
            .expect("register orders_created_total");
        registry
            .register(Box::new(claims_total.clone()))
            .expect("register claims_total");
        registry
            .register(Box::new(withdrawal_requests_total.clone()))
            .expect("register withdrawal_requests_total");
        registry
            .register(Box::new(events_published_total.clone()))
            .expect("register events_published_total");

        Self {
            registry,
            orders_created_total,
            claims_total,
            withdrawal_requests_total,
            events_published_total,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
