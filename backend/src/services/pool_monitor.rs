use std::{collections::HashSet, time::Duration};

use actix_web::web::Data;
use chrono::Utc;
use shared::{AlertSeverity, PoolStats, WalletId};
use tokio::time;

use crate::{monitoring::metrics, services::AppState};

const HIGH_UTILIZATION: f64 = 90.0;

/// Alert de-duplication across cycles.
#[derive(Debug, Default)]
pub struct MonitorState {
    reported_orphans: HashSet<WalletId>,
    high_utilization: bool,
}

#[derive(Debug, Default)]
pub struct MonitorReport {
    pub stats: PoolStats,
    pub orphans: Vec<WalletId>,
    pub new_orphans: Vec<WalletId>,
    pub evicted_orders: usize,
    pub pruned_limiters: usize,
}

pub async fn run_monitor(state: Data<AppState>) {
    let interval_secs = state.config.monitoring_interval_seconds;
    let mut interval = time::interval(Duration::from_secs(interval_secs));
    let mut monitor = MonitorState::default();
    tracing::info!("Pool Monitor started (interval: {}s)", interval_secs);
    loop {
        interval.tick().await;
        check_pool(&state, &mut monitor).await;
        if let Err(e) = check_database(&state).await {
            tracing::error!("Monitor cycle error: {}", e);
        }
    }
}

pub async fn check_pool(state: &AppState, monitor: &mut MonitorState) -> MonitorReport {
    tracing::debug!("Running monitoring cycle...");

    let stats = state.allocator.stats();
    metrics::set_pool_gauges(&stats);
    state.cache.set_pool_stats(stats.clone()).await;

    let orphans = state.allocator.integrity_violations();
    metrics::set_orphaned_wallets(orphans.len());
    let new_orphans: Vec<WalletId> = orphans
        .iter()
        .copied()
        .filter(|id| !monitor.reported_orphans.contains(id))
        .collect();
    for wallet_id in &new_orphans {
        tracing::error!(
            "Integrity violation: wallet {} is RESERVED without a pending reservation",
            wallet_id
        );
        state.journal.alert(
            "orphaned_wallet",
            AlertSeverity::Critical,
            Some(*wallet_id),
            format!("Wallet {} is reserved without a pending reservation", wallet_id),
            None,
        );
    }
    monitor.reported_orphans = orphans.iter().copied().collect();

    let high = stats.utilization > HIGH_UTILIZATION;
    if high && !monitor.high_utilization {
        tracing::warn!("High pool utilization: {:.2}%", stats.utilization);
        state.journal.alert(
            "high_utilization",
            AlertSeverity::Warning,
            None,
            format!("Pool utilization at {:.2}%", stats.utilization),
            Some(serde_json::json!({
                "available": stats.available,
                "reserved": stats.reserved,
            })),
        );
    }
    monitor.high_utilization = high;

    let retention = chrono::Duration::seconds(state.config.resolved_retention_seconds as i64);
    let evicted_orders = state.orders.evict_resolved(Utc::now() - retention);
    if evicted_orders > 0 {
        tracing::debug!("Evicted {} resolved orders from memory", evicted_orders);
    }

    let pruned_limiters = state.orders.prune_rate_limits();
    if pruned_limiters > 0 {
        tracing::debug!("Pruned {} idle rate limit entries", pruned_limiters);
    }

    tracing::debug!(
        "Pool: {} wallets, {} available, {} reserved, {:.2}% utilized",
        stats.total_wallets,
        stats.available,
        stats.reserved,
        stats.utilization
    );

    MonitorReport {
        stats,
        orphans,
        new_orphans,
        evicted_orders,
        pruned_limiters,
    }
}

async fn check_database(state: &AppState) -> Result<(), MonitorError> {
    state
        .database
        .ping()
        .await
        .map_err(|e| MonitorError::DatabaseError(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("Database error: {0}")]
    DatabaseError(String),
}
