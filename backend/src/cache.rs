use std::time::Duration;

use moka::future::Cache as MokaCache;
use shared::{PaginatedResponse, PoolStats, Reservation, WalletId};

type HistoryKey = (WalletId, i64, i64);

#[derive(Clone)]
pub struct Cache {
    pub pool_stats: MokaCache<String, PoolStats>,
    pub wallet_history: MokaCache<HistoryKey, PaginatedResponse<Reservation>>,
}

impl Cache {
    pub fn new(max_capacity: u64) -> Self {
        Self {
            pool_stats: MokaCache::builder()
                .max_capacity(1)
                .time_to_live(Duration::from_secs(5))
                .build(),

            wallet_history: MokaCache::builder()
                .max_capacity(max_capacity)
                .time_to_live(Duration::from_secs(30))
                .time_to_idle(Duration::from_secs(10))
                .build(),
        }
    }

    pub async fn get_pool_stats(&self) -> Option<PoolStats> {
        self.pool_stats.get("pool").await
    }

    pub async fn set_pool_stats(&self, stats: PoolStats) {
        self.pool_stats.insert("pool".to_string(), stats).await;
    }

    pub async fn invalidate_pool_stats(&self) {
        self.pool_stats.invalidate("pool").await;
    }

    pub async fn get_wallet_history(
        &self,
        wallet_id: WalletId,
        limit: i64,
        offset: i64,
    ) -> Option<PaginatedResponse<Reservation>> {
        self.wallet_history.get(&(wallet_id, limit, offset)).await
    }

    pub async fn set_wallet_history(
        &self,
        wallet_id: WalletId,
        limit: i64,
        offset: i64,
        page: PaginatedResponse<Reservation>,
    ) {
        self.wallet_history.insert((wallet_id, limit, offset), page).await;
    }

    pub fn get_stats(&self) -> CacheStats {
        CacheStats {
            pool_stats_entries: self.pool_stats.entry_count(),
            history_entries: self.wallet_history.entry_count(),
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct CacheStats {
    pub pool_stats_entries: u64,
    pub history_entries: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pool_stats_round_trip_and_invalidate() {
        let cache = Cache::new(100);
        assert!(cache.get_pool_stats().await.is_none());

        let stats = PoolStats {
            total_wallets: 3,
            available: 3,
            ..Default::default()
        };
        cache.set_pool_stats(stats.clone()).await;
        assert_eq!(cache.get_pool_stats().await, Some(stats));

        cache.invalidate_pool_stats().await;
        assert!(cache.get_pool_stats().await.is_none());
    }

    #[tokio::test]
    async fn history_pages_are_keyed_by_window() {
        let cache = Cache::new(100);
        cache
            .set_wallet_history(1, 10, 0, PaginatedResponse::new(vec![], 0, 10, 0))
            .await;

        assert!(cache.get_wallet_history(1, 10, 0).await.is_some());
        assert!(cache.get_wallet_history(1, 10, 10).await.is_none());
        assert!(cache.get_wallet_history(2, 10, 0).await.is_none());
    }
}
