use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"]
    ).expect("metric can be created");

    pub static ref HTTP_REQUEST_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("http_request_duration_seconds", "HTTP request duration in seconds")
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]),
        &["method", "path"]
    ).expect("metric can be created");

    // Business metrics
    pub static ref SHIPMENTS_CREATED: IntCounter = IntCounter::new(
        "shipments_created_total",
        "Total shipments booked"
    ).expect("metric can be created");

    pub static ref CAPACITY_REJECTIONS: IntCounter = IntCounter::new(
        "capacity_rejections_total",
        "Bookings rejected for exceeding flight capacity"
    ).expect("metric can be created");

    pub static ref DELIVERIES_CONFIRMED: IntCounter = IntCounter::new(
        "deliveries_confirmed_total",
        "Deliveries confirmed and settled"
    ).expect("metric can be created");

    pub static ref DUPLICATE_CONFIRMATIONS: IntCounter = IntCounter::new(
        "duplicate_confirmations_total",
        "Confirmation attempts on already delivered shipments"
    ).expect("metric can be created");

    pub static ref PAYMENTS_INITIALIZED: IntCounter = IntCounter::new(
        "payments_initialized_total",
        "Gateway checkouts opened"
    ).expect("metric can be created");

    pub static ref PAYMENTS_VERIFIED: IntCounter = IntCounter::new(
        "payments_verified_total",
        "Payments confirmed by the gateway"
    ).expect("metric can be created");

    // Outbound integration metrics
    pub static ref GATEWAY_ERRORS: IntCounterVec = IntCounterVec::new(
        Opts::new("gateway_errors_total", "Payment gateway failures"),
        &["operation"]
    ).expect("metric can be created");

    pub static ref NOTIFICATION_FAILURES: IntCounter = IntCounter::new(
        "notification_failures_total",
        "SMS notifications that could not be delivered"
    ).expect("metric can be created");
}

/// Register all metrics with the given registry
pub fn register_metrics(registry: &Registry) -> Result<(), Box<dyn std::error::Error>> {
    // HTTP metrics
    registry.register(Box::new(HTTP_REQUESTS_TOTAL.clone()))?;
    registry.register(Box::new(HTTP_REQUEST_DURATION.clone()))?;

    // Business metrics
    registry.register(Box::new(SHIPMENTS_CREATED.clone()))?;
    registry.register(Box::new(CAPACITY_REJECTIONS.clone()))?;
    registry.register(Box::new(DELIVERIES_CONFIRMED.clone()))?;
    registry.register(Box::new(DUPLICATE_CONFIRMATIONS.clone()))?;
    registry.register(Box::new(PAYMENTS_INITIALIZED.clone()))?;
    registry.register(Box::new(PAYMENTS_VERIFIED.clone()))?;

    // Integration metrics
    registry.register(Box::new(GATEWAY_ERRORS.clone()))?;
    registry.register(Box::new(NOTIFICATION_FAILURES.clone()))?;

    Ok(())
}

/// Register with the service registry. Safe to call more than once.
pub fn init() {
    static ONCE: std::sync::Once = std::sync::Once::new();
    ONCE.call_once(|| {
        if let Err(e) = register_metrics(&REGISTRY) {
            tracing::error!(error = %e, "failed to register metrics");
        }
    });
}

/// Generate metrics output in Prometheus text format
pub fn metrics_handler() -> Result<String, Box<dyn std::error::Error>> {
    init();
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
