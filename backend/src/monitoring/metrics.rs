use actix_web::{HttpResponse, Responder};
use once_cell::sync::Lazy;
use prometheus::{Counter, CounterVec, Encoder, Gauge, IntGaugeVec, Opts, Registry, TextEncoder};
use shared::{PoolStats, ReleaseOutcome};

static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

static WALLETS_BY_STATUS: Lazy<IntGaugeVec> = Lazy::new(|| {
    let gauge = IntGaugeVec::new(
        Opts::new("wallet_pool_wallets", "Wallets in the pool by status"),
        &["status"],
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});
static POOL_UTILIZATION: Lazy<Gauge> = Lazy::new(|| {
    let gauge = Gauge::new("wallet_pool_utilization", "Share of usable wallets currently reserved").unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});
static ORPHANED_WALLETS: Lazy<Gauge> = Lazy::new(|| {
    let gauge = Gauge::new(
        "wallet_pool_orphaned_wallets",
        "Wallets reserved without a pending reservation",
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});
static RESERVATIONS_GRANTED: Lazy<Counter> = Lazy::new(|| {
    let counter = Counter::new("wallet_pool_reservations_granted_total", "Reservations granted").unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});
static RESERVATIONS_RELEASED: Lazy<CounterVec> = Lazy::new(|| {
    let counter = CounterVec::new(
        Opts::new("wallet_pool_reservations_released_total", "Reservations released by outcome"),
        &["outcome"],
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});
static NO_WALLET_AVAILABLE: Lazy<Counter> = Lazy::new(|| {
    let counter = Counter::new(
        "wallet_pool_exhausted_total",
        "Reserve calls that found no wallet available",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});
static PERSISTENCE_FAILURES: Lazy<Counter> = Lazy::new(|| {
    let counter = Counter::new(
        "wallet_pool_persistence_failures_total",
        "Write-behind operations that exhausted their attempts",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});
static API_REQUESTS: Lazy<Counter> = Lazy::new(|| {
    let counter = Counter::new("api_requests_total", "Total API Requests").unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

pub fn increment_api_requests() {
    API_REQUESTS.inc();
}
pub fn inc_reservations_granted() {
    RESERVATIONS_GRANTED.inc();
}
pub fn inc_reservations_released(outcome: ReleaseOutcome) {
    let label = match outcome {
        ReleaseOutcome::Confirmed => "confirmed",
        ReleaseOutcome::Rejected => "rejected",
        ReleaseOutcome::Expired => "expired",
    };
    RESERVATIONS_RELEASED.with_label_values(&[label]).inc();
}
pub fn inc_no_wallet_available() {
    NO_WALLET_AVAILABLE.inc();
}
pub fn inc_persistence_failures() {
    PERSISTENCE_FAILURES.inc();
}
pub fn set_orphaned_wallets(count: usize) {
    ORPHANED_WALLETS.set(count as f64);
}
pub fn set_pool_gauges(stats: &PoolStats) {
    WALLETS_BY_STATUS.with_label_values(&["available"]).set(stats.available);
    WALLETS_BY_STATUS.with_label_values(&["reserved"]).set(stats.reserved);
    WALLETS_BY_STATUS.with_label_values(&["maintenance"]).set(stats.maintenance);
    WALLETS_BY_STATUS.with_label_values(&["disabled"]).set(stats.disabled);
    POOL_UTILIZATION.set(stats.utilization);
}
pub async fn metrics() -> impl Responder {
    let encoder = TextEncoder::new();
    let metrics_families = REGISTRY.gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metrics_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}
