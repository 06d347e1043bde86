use actix_web::{web, HttpResponse, Responder};
use serde::Serialize;

use crate::{cache::CacheStats, services::AppState};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub wallets: usize,
    pub pending_reservations: usize,
    pub open_orders: usize,
    pub cache: CacheStats,
}

static START_TIME: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();

/// Liveness only; the database is checked by the pool monitor.
pub async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let start_time = START_TIME.get_or_init(std::time::Instant::now);
    let uptime = start_time.elapsed().as_secs();

    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
        wallets: state.allocator.wallet_count(),
        pending_reservations: state.allocator.pending_count(),
        open_orders: state.orders.open_orders(),
        cache: state.cache.get_stats(),
    })
}
