use std::time::Duration;

use actix_web::web::Data;
use chrono::{DateTime, Utc};
use shared::ReleaseOutcome;
use tokio::time;

use crate::services::{allocator::Allocator, AppState};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub expired: usize,
    pub raced: usize,
}

pub async fn run_sweeper(state: Data<AppState>) {
    let interval_secs = state.config.sweep_interval_seconds;
    let mut interval = time::interval(Duration::from_secs(interval_secs));
    tracing::info!("Reservation sweeper started (interval: {}s)", interval_secs);
    loop {
        interval.tick().await;
        let report = sweep_expired(&state.allocator, Utc::now());
        if report.expired > 0 {
            tracing::info!(
                "Sweep expired {} of {} overdue reservations ({} already resolved)",
                report.expired,
                report.scanned,
                report.raced
            );
        }
    }
}

/// Releases every pending reservation whose deadline passed before `now`.
/// Losing a race against a confirmation is expected and only counted.
pub fn sweep_expired(allocator: &Allocator, now: DateTime<Utc>) -> SweepReport {
    let overdue = allocator.expired_pending(now);
    let mut report = SweepReport {
        scanned: overdue.len(),
        ..Default::default()
    };

    for token in overdue {
        match allocator.release_at(token, ReleaseOutcome::Expired, now) {
            Ok(reservation) => {
                report.expired += 1;
                tracing::info!(
                    "Reservation {} on wallet {} expired (order {})",
                    token,
                    reservation.wallet_id,
                    reservation.purchase_order_id
                );
            }
            Err(e) if e.is_benign_race() => {
                report.raced += 1;
                tracing::debug!("Skipping reservation {}: {}", token, e);
            }
            Err(e) => {
                tracing::error!("Failed to expire reservation {}: {}", token, e);
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{allocator::AllocatorConfig, persistence::Journal};
    use shared::{CreateWalletRequest, Currency, Network, PoolError, ReservationOutcome, WalletStatus};
    use uuid::Uuid;

    fn allocator_with_wallets(count: u32) -> Allocator {
        let (journal, _receiver) = Journal::channel();
        let allocator = Allocator::new(AllocatorConfig::default(), journal);
        for n in 1..=count {
            allocator
                .add_wallet(
                    CreateWalletRequest {
                        address: format!("0x{:040x}", n),
                        network: Network::Erc20,
                        currency: Currency::Usdt,
                        label: None,
                        notes: None,
                    },
                    Utc::now(),
                )
                .unwrap();
        }
        allocator
    }

    #[test]
    fn overdue_reservation_is_reclaimed_in_one_sweep() {
        let allocator = allocator_with_wallets(1);
        let t0 = Utc::now();
        let grant = allocator.reserve_at(Uuid::new_v4(), 10, t0).unwrap();
        assert_eq!(
            allocator.reserve_at(Uuid::new_v4(), 10, t0).unwrap_err(),
            PoolError::NoWalletAvailable
        );

        let before_deadline = sweep_expired(&allocator, t0 + chrono::Duration::minutes(29));
        assert_eq!(before_deadline, SweepReport::default());

        let after = t0 + chrono::Duration::minutes(31);
        let report = sweep_expired(&allocator, after);
        assert_eq!(report.scanned, 1);
        assert_eq!(report.expired, 1);

        let wallet = allocator.wallet(grant.wallet.id).unwrap();
        assert_eq!(wallet.status, WalletStatus::Available);
        assert_eq!(wallet.failed_transactions, 1);
        assert_eq!(
            allocator.reservation(grant.reservation.token).unwrap().outcome,
            ReservationOutcome::Expired
        );
        assert!(allocator.reserve_at(Uuid::new_v4(), 10, after).is_ok());
    }

    #[test]
    fn sweep_leaves_live_reservations_alone() {
        let allocator = allocator_with_wallets(2);
        let t0 = Utc::now();
        let old = allocator.reserve_at(Uuid::new_v4(), 1, t0).unwrap();
        let fresh = allocator
            .reserve_at(Uuid::new_v4(), 1, t0 + chrono::Duration::minutes(20))
            .unwrap();

        let report = sweep_expired(&allocator, t0 + chrono::Duration::minutes(35));
        assert_eq!(report.expired, 1);
        assert_eq!(
            allocator.reservation(old.reservation.token).unwrap().outcome,
            ReservationOutcome::Expired
        );
        assert_eq!(
            allocator.reservation(fresh.reservation.token).unwrap().outcome,
            ReservationOutcome::Pending
        );
    }

    #[test]
    fn confirmation_that_wins_the_race_is_kept() {
        let allocator = allocator_with_wallets(1);
        let t0 = Utc::now();
        let grant = allocator.reserve_at(Uuid::new_v4(), 25, t0).unwrap();
        let late = t0 + chrono::Duration::hours(1);

        // Snapshot taken by the sweeper before the confirmation lands.
        let overdue = allocator.expired_pending(late);
        assert_eq!(overdue, vec![grant.reservation.token]);
        allocator
            .release_at(grant.reservation.token, ReleaseOutcome::Confirmed, late)
            .unwrap();

        let report = sweep_expired(&allocator, late);
        assert_eq!(report.expired, 0);
        let wallet = allocator.wallet(grant.wallet.id).unwrap();
        assert_eq!(wallet.total_received, 25);
        assert_eq!(wallet.failed_transactions, 0);
    }

    #[test]
    fn release_racing_a_captured_snapshot_counts_as_raced() {
        let allocator = allocator_with_wallets(1);
        let t0 = Utc::now();
        let grant = allocator.reserve_at(Uuid::new_v4(), 1, t0).unwrap();
        allocator
            .release_at(grant.reservation.token, ReleaseOutcome::Rejected, t0)
            .unwrap();

        let err = allocator
            .release_at(grant.reservation.token, ReleaseOutcome::Expired, t0)
            .unwrap_err();
        assert!(err.is_benign_race());
    }
}
