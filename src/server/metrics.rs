use axum::{extract::State, http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

use super::state::GuardedRelay;

/// Metric name prefix for all relay metrics
const PREFIX: &str = "signaling_relay";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Room Metrics
    pub static ref ROOMS_CREATED_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_rooms_created_total"),
        "Total rooms created"
    ).expect("Failed to create rooms_created_total metric");

    pub static ref ROOMS_EVICTED_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_rooms_evicted_total"),
        "Total idle rooms evicted"
    ).expect("Failed to create rooms_evicted_total metric");

    pub static ref ROOMS_ACTIVE: Gauge = Gauge::new(
        format!("{PREFIX}_rooms_active"),
        "Rooms currently registered"
    ).expect("Failed to create rooms_active metric");

    pub static ref PARTICIPANTS_ACTIVE: Gauge = Gauge::new(
        format!("{PREFIX}_participants_active"),
        "Participants currently joined to a room"
    ).expect("Failed to create participants_active metric");

    // Session Metrics
    pub static ref SESSIONS_ACTIVE: Gauge = Gauge::new(
        format!("{PREFIX}_sessions_active"),
        "Sessions currently relaying messages"
    ).expect("Failed to create sessions_active metric");

    pub static ref MALFORMED_PAYLOADS_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_malformed_payloads_total"),
        "Inbound messages dropped because they were not a JSON object"
    ).expect("Failed to create malformed_payloads_total metric");

    // Dispatch Metrics
    pub static ref MESSAGES_DELIVERED_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_messages_delivered_total"),
        "Payloads handed to recipients"
    ).expect("Failed to create messages_delivered_total metric");

    pub static ref DELIVERY_FAILURES_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_delivery_failures_total"),
        "Recipients dropped because a payload could not be handed to them"
    ).expect("Failed to create delivery_failures_total metric");

    pub static ref BROADCAST_FANOUT: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            format!("{PREFIX}_broadcast_fanout"),
            "Recipients per broadcast"
        )
        .buckets(vec![0.0, 1.0, 2.0, 4.0, 8.0, 16.0, 32.0])
    ).expect("Failed to create broadcast_fanout metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(ROOMS_CREATED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(ROOMS_EVICTED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(ROOMS_ACTIVE.clone()));
    let _ = REGISTRY.register(Box::new(PARTICIPANTS_ACTIVE.clone()));
    let _ = REGISTRY.register(Box::new(SESSIONS_ACTIVE.clone()));
    let _ = REGISTRY.register(Box::new(MALFORMED_PAYLOADS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(MESSAGES_DELIVERED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(DELIVERY_FAILURES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(BROADCAST_FANOUT.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// Collapse room ids out of a path so label cardinality stays bounded.
pub fn categorize_endpoint(path: &str) -> &'static str {
    match path {
        "/" => "home",
        "/create" | "/v1/rooms" => "create_room",
        "/join" => "join_room",
        p if p.starts_with("/v1/rooms/") && p.ends_with("/ws") => "join_room",
        p if p.starts_with("/v1/rooms/") => "room_info",
        _ => "other",
    }
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    let endpoint = categorize_endpoint(path);
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, endpoint, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, endpoint])
        .observe(duration.as_secs_f64());
}

pub fn record_room_created() {
    ROOMS_CREATED_TOTAL.inc();
}

pub fn record_rooms_evicted(count: usize) {
    ROOMS_EVICTED_TOTAL.inc_by(count as f64);
}

pub fn record_session_started() {
    SESSIONS_ACTIVE.inc();
}

pub fn record_session_ended() {
    SESSIONS_ACTIVE.dec();
}

pub fn record_malformed_payload() {
    MALFORMED_PAYLOADS_TOTAL.inc();
}

/// Record the outcome of one broadcast
pub fn record_broadcast(delivered: usize, failed: usize) {
    MESSAGES_DELIVERED_TOTAL.inc_by(delivered as f64);
    DELIVERY_FAILURES_TOTAL.inc_by(failed as f64);
    BROADCAST_FANOUT.observe((delivered + failed) as f64);
}

/// Refresh the room gauges from the live registry
pub fn update_room_gauges(rooms: usize, participants: usize) {
    ROOMS_ACTIVE.set(rooms as f64);
    PARTICIPANTS_ACTIVE.set(participants as f64);
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler(State(relay): State<GuardedRelay>) -> impl IntoResponse {
    update_room_gauges(
        relay.registry().room_count(),
        relay.registry().participant_count(),
    );

    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_else(|_| String::from(""));
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}
