//! Prometheus metrics for the API server and worker

use prometheus::{
    Counter, Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};

pub struct Metrics {
    registry: Registry,

    pub http_requests_total: Counter,
    pub http_request_duration_seconds: Histogram,
    pub http_requests_in_flight: Gauge,

    pub database_connected: Gauge,
    pub cache_connected: Gauge,

    /// Served candidates, labelled by source
    pub suggestions_served_total: IntCounterVec,
    pub suggestion_duration_seconds: Histogram,
    /// Routing outcomes: heuristic, shadow, model, fallback
    pub route_decisions_total: IntCounterVec,
    pub model_fallbacks_total: IntCounter,
    /// Shadow prediction comparisons, labelled by basis and outcome
    pub shadow_agreement_total: IntCounterVec,

    pub feedback_recorded_total: IntCounterVec,
    pub feedback_failures_total: IntCounter,

    pub promotion_runs_total: IntCounterVec,
    pub hints_promoted_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_requests_total =
            Counter::with_opts(Opts::new("http_requests_total", "Total HTTP requests"))?;
        let http_request_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request latency in seconds",
        ))?;
        let http_requests_in_flight = Gauge::with_opts(Opts::new(
            "http_requests_in_flight",
            "HTTP requests currently being served",
        ))?;
        let database_connected = Gauge::with_opts(Opts::new(
            "database_connected",
            "1 when the database connection is up",
        ))?;
        let cache_connected = Gauge::with_opts(Opts::new(
            "cache_connected",
            "1 when the Redis cache is up",
        ))?;
        let suggestions_served_total = IntCounterVec::new(
            Opts::new("suggestions_served_total", "Suggestion candidates served"),
            &["source"],
        )?;
        let suggestion_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "suggestion_duration_seconds",
                "Time to score one suggestion batch",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
        )?;
        let route_decisions_total = IntCounterVec::new(
            Opts::new("route_decisions_total", "Canary routing outcomes"),
            &["route"],
        )?;
        let model_fallbacks_total = IntCounter::with_opts(Opts::new(
            "model_fallbacks_total",
            "Requests that fell back to heuristics because the model was unavailable",
        ))?;
        let shadow_agreement_total = IntCounterVec::new(
            Opts::new(
                "shadow_agreement_total",
                "Shadow model predictions compared against a reference outcome",
            ),
            &["basis", "outcome"],
        )?;
        let feedback_recorded_total = IntCounterVec::new(
            Opts::new("feedback_recorded_total", "Feedback events recorded"),
            &["action"],
        )?;
        let feedback_failures_total = IntCounter::with_opts(Opts::new(
            "feedback_failures_total",
            "Feedback events that could not be recorded",
        ))?;
        let promotion_runs_total = IntCounterVec::new(
            Opts::new("promotion_runs_total", "Promotion batch runs"),
            &["mode", "status"],
        )?;
        let hints_promoted_total = IntCounter::with_opts(Opts::new(
            "hints_promoted_total",
            "Merchant hints created or updated by promotion",
        ))?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;
        registry.register(Box::new(http_requests_in_flight.clone()))?;
        registry.register(Box::new(database_connected.clone()))?;
        registry.register(Box::new(cache_connected.clone()))?;
        registry.register(Box::new(suggestions_served_total.clone()))?;
        registry.register(Box::new(suggestion_duration_seconds.clone()))?;
        registry.register(Box::new(route_decisions_total.clone()))?;
        registry.register(Box::new(model_fallbacks_total.clone()))?;
        registry.register(Box::new(shadow_agreement_total.clone()))?;
        registry.register(Box::new(feedback_recorded_total.clone()))?;
        registry.register(Box::new(feedback_failures_total.clone()))?;
        registry.register(Box::new(promotion_runs_total.clone()))?;
        registry.register(Box::new(hints_promoted_total.clone()))?;

        Ok(Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            http_requests_in_flight,
            database_connected,
            cache_connected,
            suggestions_served_total,
            suggestion_duration_seconds,
            route_decisions_total,
            model_fallbacks_total,
            shadow_agreement_total,
            feedback_recorded_total,
            feedback_failures_total,
            promotion_runs_total,
            hints_promoted_total,
        })
    }

    /// Render the registry in the Prometheus text format
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
