use chrono::Utc;
use serde::Serialize;
use shared::{
    Alert, CreateWalletRequest, EditWalletRequest, ExcludeWalletRequest, PaginatedResponse,
    PaginationParams, PoolError, PoolResult, PoolStats, Reservation, WalletId, WalletListQuery,
    WalletRecord,
};

use crate::services::AppState;

const MAX_HISTORY_PAGE: i64 = 200;

#[derive(Debug, Clone, Serialize)]
pub struct ExclusionResult {
    pub wallet: WalletRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expired_reservation: Option<Reservation>,
}

pub struct WalletAdmin;

impl WalletAdmin {
    pub async fn create_wallet(state: &AppState, req: CreateWalletRequest) -> PoolResult<WalletRecord> {
        let wallet = state.allocator.add_wallet(req, Utc::now())?;
        state.cache.invalidate_pool_stats().await;
        Ok(wallet)
    }

    pub async fn edit_wallet(
        state: &AppState,
        wallet_id: WalletId,
        req: EditWalletRequest,
    ) -> PoolResult<WalletRecord> {
        state.allocator.edit_wallet(wallet_id, req, Utc::now())
    }

    /// Parks a wallet in MAINTENANCE or DISABLED. With `force`, an in-flight
    /// reservation is expired first; without it a reserved wallet is refused.
    pub async fn exclude_wallet(
        state: &AppState,
        wallet_id: WalletId,
        req: ExcludeWalletRequest,
    ) -> PoolResult<ExclusionResult> {
        let now = Utc::now();
        let result = if req.force {
            let (wallet, expired_reservation) =
                state
                    .allocator
                    .admin_exclude_with_override(wallet_id, req.status, now)?;
            if let Some(ref reservation) = expired_reservation {
                tracing::warn!(
                    "Forced exclusion of wallet {} expired order {}",
                    wallet_id,
                    reservation.purchase_order_id
                );
            }
            ExclusionResult {
                wallet,
                expired_reservation,
            }
        } else {
            ExclusionResult {
                wallet: state.allocator.admin_exclude(wallet_id, req.status, now)?,
                expired_reservation: None,
            }
        };

        state.cache.invalidate_pool_stats().await;
        Ok(result)
    }

    pub async fn reactivate_wallet(state: &AppState, wallet_id: WalletId) -> PoolResult<WalletRecord> {
        let wallet = state.allocator.reactivate(wallet_id, Utc::now())?;
        state.cache.invalidate_pool_stats().await;
        Ok(wallet)
    }

    pub async fn remove_wallet(state: &AppState, wallet_id: WalletId) -> PoolResult<WalletRecord> {
        let wallet = state.allocator.remove_wallet(wallet_id)?;
        state.cache.invalidate_pool_stats().await;
        Ok(wallet)
    }

    pub async fn repair_wallet(
        state: &AppState,
        wallet_id: WalletId,
        operator_confirmed: bool,
    ) -> PoolResult<WalletRecord> {
        let wallet = state
            .allocator
            .repair_orphan(wallet_id, operator_confirmed, Utc::now())?;
        state.cache.invalidate_pool_stats().await;
        Ok(wallet)
    }

    pub async fn get_wallet(state: &AppState, wallet_id: WalletId) -> PoolResult<WalletRecord> {
        state
            .allocator
            .wallet(wallet_id)
            .ok_or(PoolError::WalletNotFound(wallet_id))
    }

    pub async fn list_wallets(
        state: &AppState,
        query: &WalletListQuery,
    ) -> PoolResult<PaginatedResponse<WalletRecord>> {
        Ok(state.allocator.list_wallets(query))
    }

    /// Resolved and pending reservations as persisted, newest first.
    pub async fn wallet_history(
        state: &AppState,
        wallet_id: WalletId,
        params: &PaginationParams,
    ) -> PoolResult<PaginatedResponse<Reservation>> {
        if state.allocator.wallet(wallet_id).is_none() {
            return Err(PoolError::WalletNotFound(wallet_id));
        }
        let limit = params.limit.clamp(1, MAX_HISTORY_PAGE);
        let offset = params.offset.max(0);

        if let Some(page) = state.cache.get_wallet_history(wallet_id, limit, offset).await {
            tracing::debug!("Cache HIT for wallet {} history", wallet_id);
            return Ok(page);
        }

        let items = state
            .database
            .get_wallet_reservations(wallet_id, limit, offset)
            .await
            .map_err(|e| PoolError::PersistenceFailure(e.to_string()))?;
        let total = state
            .database
            .count_wallet_reservations(wallet_id)
            .await
            .map_err(|e| PoolError::PersistenceFailure(e.to_string()))?;

        let page = PaginatedResponse::new(items, total, limit, offset);
        state
            .cache
            .set_wallet_history(wallet_id, limit, offset, page.clone())
            .await;
        Ok(page)
    }

    pub async fn pool_stats(state: &AppState) -> PoolResult<PoolStats> {
        if let Some(stats) = state.cache.get_pool_stats().await {
            return Ok(stats);
        }

        let stats = state.allocator.stats();
        state.cache.set_pool_stats(stats.clone()).await;
        Ok(stats)
    }

    pub async fn active_alerts(state: &AppState, limit: i64) -> PoolResult<Vec<Alert>> {
        state
            .database
            .get_active_alerts(limit.clamp(1, 500))
            .await
            .map_err(|e| PoolError::PersistenceFailure(e.to_string()))
    }

    pub async fn acknowledge_alert(state: &AppState, alert_id: i64) -> PoolResult<bool> {
        state
            .database
            .acknowledge_alert(alert_id)
            .await
            .map_err(|e| PoolError::PersistenceFailure(e.to_string()))
    }
}
