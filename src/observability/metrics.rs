use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub allocation_requests_total: IntCounterVec,
    pub allocation_commits_total: IntCounterVec,
    pub deallocations_total: IntCounter,
    pub evictions_total: IntCounter,
    pub recalculations_total: IntCounterVec,
    pub recalculation_latency_seconds: HistogramVec,
    pub recalculations_in_queue: IntGauge,
    pub active_sessions: IntGauge,
    pub protocol_errors_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let allocation_requests_total = IntCounterVec::new(
            Opts::new(
                "allocation_requests_total",
                "Parking requests handled, by outcome",
            ),
            &["outcome"],
        )
        .expect("valid allocation_requests_total metric");

        let allocation_commits_total = IntCounterVec::new(
            Opts::new(
                "allocation_commits_total",
                "Acceptance commits against lot capacity, by outcome",
            ),
            &["outcome"],
        )
        .expect("valid allocation_commits_total metric");

        let deallocations_total = IntCounter::new(
            "deallocations_total",
            "Allocations released for any reason",
        )
        .expect("valid deallocations_total metric");

        let evictions_total = IntCounter::new(
            "evictions_total",
            "Allocations evicted by overflow recalculation",
        )
        .expect("valid evictions_total metric");

        let recalculations_total = IntCounterVec::new(
            Opts::new(
                "recalculations_total",
                "Overflow recalculations run, by outcome",
            ),
            &["outcome"],
        )
        .expect("valid recalculations_total metric");

        let recalculation_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "recalculation_latency_seconds",
                "Latency of overflow recalculation in seconds",
            ),
            &["outcome"],
        )
        .expect("valid recalculation_latency_seconds metric");

        let recalculations_in_queue = IntGauge::new(
            "recalculations_in_queue",
            "Recalculations waiting for the worker",
        )
        .expect("valid recalculations_in_queue metric");

        let active_sessions = IntGauge::new(
            "active_sessions",
            "Currently connected user sessions",
        )
        .expect("valid active_sessions metric");

        let protocol_errors_total = IntCounter::new(
            "protocol_errors_total",
            "Inbound frames dropped as undecodable or invalid",
        )
        .expect("valid protocol_errors_total metric");

        registry
            .register(Box::new(allocation_requests_total.clone()))
            .expect("register allocation_requests_total");
        registry
            .register(Box::new(allocation_commits_total.clone()))
            .expect("register allocation_commits_total");
        registry
            .register(Box::new(deallocations_total.clone()))
            .expect("register deallocations_total");
        registry
            .register(Box::new(evictions_total.clone()))
            .expect("register evictions_total");
        registry
            .register(Box::new(recalculations_total.clone()))
            .expect("register recalculations_total");
        registry
            .register(Box::new(recalculation_latency_seconds.clone()))
            .expect("register recalculation_latency_seconds");
        registry
            .register(Box::new(recalculations_in_queue.clone()))
            .expect("register recalculations_in_queue");
        registry
            .register(Box::new(active_sessions.clone()))
            .expect("register active_sessions");
        registry
            .register(Box::new(protocol_errors_total.clone()))
            .expect("register protocol_errors_total");

        Self {
            registry,
            allocation_requests_total,
            allocation_commits_total,
            deallocations_total,
            evictions_total,
            recalculations_total,
            recalculation_latency_seconds,
            recalculations_in_queue,
            active_sessions,
            protocol_errors_total,
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
