//! Purchase order lifecycle: pending -> hash_submitted -> confirmed | rejected.
//!
//! Each order sits behind its own mutex. An order lock may be held while
//! calling into the allocator, never the other way round.

use std::{num::NonZeroU32, sync::Arc};

use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use parking_lot::Mutex;
use shared::{
    format_usdt, validate_amount, validate_tx_hash, AssignedWallet, OrderStatus, OrderView, PoolError,
    PoolResult, PurchaseOrder, Reservation, Verdict,
};
use uuid::Uuid;

use crate::{
    config::Config,
    services::{
        allocator::{Allocator, Grant},
        persistence::{Journal, PersistOp},
    },
};

#[derive(Debug, Clone)]
pub struct OrderBookConfig {
    pub hash_review_ttl: chrono::Duration,
    pub retry_after_seconds: u64,
    pub orders_per_minute: u32,
}

impl Default for OrderBookConfig {
    fn default() -> Self {
        Self {
            hash_review_ttl: chrono::Duration::hours(24),
            retry_after_seconds: 10,
            orders_per_minute: 10,
        }
    }
}

impl From<&Config> for OrderBookConfig {
    fn from(config: &Config) -> Self {
        Self {
            hash_review_ttl: chrono::Duration::seconds(config.hash_review_ttl_seconds as i64),
            retry_after_seconds: config.retry_after_seconds,
            orders_per_minute: config.order_rate_limit_per_minute,
        }
    }
}

pub struct OrderBook {
    config: OrderBookConfig,
    orders: DashMap<Uuid, Arc<Mutex<PurchaseOrder>>>,
    payment_hashes: DashMap<String, Uuid>,
    limiter: DefaultKeyedRateLimiter<String>,
    allocator: Arc<Allocator>,
    journal: Journal,
}

impl OrderBook {
    pub fn new(config: OrderBookConfig, allocator: Arc<Allocator>, journal: Journal) -> Self {
        let per_minute = NonZeroU32::new(config.orders_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: RateLimiter::keyed(Quota::per_minute(per_minute)),
            config,
            orders: DashMap::new(),
            payment_hashes: DashMap::new(),
            allocator,
            journal,
        }
    }

    pub fn retry_after_seconds(&self) -> u64 {
        self.config.retry_after_seconds
    }

    fn order(&self, order_id: Uuid) -> PoolResult<Arc<Mutex<PurchaseOrder>>> {
        self.orders
            .get(&order_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(PoolError::OrderNotFound(order_id))
    }

    fn live_reservation(&self, order: &PurchaseOrder) -> Option<Reservation> {
        order
            .reservation_token
            .and_then(|token| self.allocator.reservation(token))
            .filter(Reservation::is_pending)
    }

    fn assign(&self, order: &mut PurchaseOrder, now: DateTime<Utc>) -> PoolResult<Grant> {
        let grant = self.allocator.reserve_at(order.id, order.amount, now)?;
        order.assigned_wallet = Some(AssignedWallet::from(&grant.wallet));
        order.reservation_token = Some(grant.reservation.token);
        order.updated_at = now;
        Ok(grant)
    }

    pub fn view(&self, order: &PurchaseOrder, now: DateTime<Utc>) -> OrderView {
        let reservation = order
            .reservation_token
            .and_then(|token| self.allocator.reservation(token));
        let seconds_remaining = reservation
            .as_ref()
            .map_or(0, |r| r.seconds_remaining(now));
        let awaiting_wallet = order.status == OrderStatus::Pending
            && !reservation.as_ref().is_some_and(Reservation::is_pending);

        OrderView {
            order: order.clone(),
            reservation,
            seconds_remaining,
            retry_after_seconds: awaiting_wallet.then_some(self.config.retry_after_seconds),
        }
    }

    /// Creates a pending order and tries to bind a wallet to it. An exhausted
    /// pool still yields the order, with a retry hint instead of a wallet.
    pub fn create_order(
        &self,
        user_id: &str,
        package_id: &str,
        amount: i64,
        now: DateTime<Utc>,
    ) -> PoolResult<OrderView> {
        let user_id = user_id.trim();
        let package_id = package_id.trim();
        if user_id.is_empty() || package_id.is_empty() {
            return Err(PoolError::InvalidRequest(
                "user_id and package_id are required".to_string(),
            ));
        }
        validate_amount(amount)?;

        if self.limiter.check_key(&user_id.to_string()).is_err() {
            tracing::warn!("Order rate limit hit for user {}", user_id);
            return Err(PoolError::RateLimited(user_id.to_string()));
        }

        let mut order = PurchaseOrder {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            package_id: package_id.to_string(),
            amount,
            status: OrderStatus::Pending,
            assigned_wallet: None,
            reservation_token: None,
            payment_hash: None,
            created_at: now,
            hash_submitted_at: None,
            resolved_at: None,
            updated_at: now,
        };

        match self.assign(&mut order, now) {
            Ok(grant) => tracing::info!(
                "Order {} for user {} ({}) assigned wallet {}",
                order.id,
                user_id,
                format_usdt(amount),
                grant.wallet.id
            ),
            Err(PoolError::NoWalletAvailable) => tracing::warn!(
                "Order {} for user {} created without a wallet; pool exhausted",
                order.id,
                user_id
            ),
            Err(e) => return Err(e),
        }

        self.journal.record(PersistOp::UpsertOrder(order.clone()));
        let view = self.view(&order, now);
        self.orders.insert(order.id, Arc::new(Mutex::new(order)));
        Ok(view)
    }

    /// Binds a fresh wallet to a pending order whose reservation lapsed or
    /// that never got one. A live reservation is returned unchanged.
    pub fn retry_assignment(&self, order_id: Uuid, now: DateTime<Utc>) -> PoolResult<OrderView> {
        let order = self.order(order_id)?;
        let mut order = order.lock();

        if order.status != OrderStatus::Pending {
            return Err(PoolError::InvalidTransition {
                from: order.status.as_str().to_string(),
                to: OrderStatus::Pending.as_str().to_string(),
            });
        }

        if self.live_reservation(&order).is_none() {
            let grant = self.assign(&mut order, now)?;
            tracing::info!("Order {} re-assigned wallet {}", order_id, grant.wallet.id);
            self.journal.record(PersistOp::UpsertOrder(order.clone()));
        }

        Ok(self.view(&order, now))
    }

    pub fn submit_hash(&self, order_id: Uuid, tx_hash: &str, now: DateTime<Utc>) -> PoolResult<OrderView> {
        let order = self.order(order_id)?;
        let mut order = order.lock();
        let next = order.status.transition(OrderStatus::HashSubmitted)?;

        // A lapsed reservation is replaced before the hash is checked, since
        // the new wallet decides which network format applies.
        let mut token = match self.live_reservation(&order) {
            Some(reservation) => reservation.token,
            None => {
                let grant = self.assign(&mut order, now)?;
                tracing::info!(
                    "Order {} reservation lapsed before hash submission; re-assigned wallet {}",
                    order_id,
                    grant.wallet.id
                );
                self.journal.record(PersistOp::UpsertOrder(order.clone()));
                grant.reservation.token
            }
        };

        let network = order
            .assigned_wallet
            .as_ref()
            .map(|w| w.network)
            .ok_or(PoolError::NoWalletAvailable)?;
        let mut payment_hash = validate_tx_hash(network, tx_hash)?;
        self.claim_hash(&payment_hash, order_id)?;

        let deadline = now + self.config.hash_review_ttl;
        if let Err(e) = self.allocator.extend_for_review(token, deadline) {
            self.payment_hashes.remove(&payment_hash);
            if !e.is_benign_race() {
                return Err(e);
            }

            // Expired between the check and the extension.
            tracing::warn!("Reservation {} for order {} lapsed mid-submission", token, order_id);
            let grant = self.assign(&mut order, now)?;
            self.journal.record(PersistOp::UpsertOrder(order.clone()));
            payment_hash = validate_tx_hash(grant.wallet.network, tx_hash)?;
            self.claim_hash(&payment_hash, order_id)?;
            token = grant.reservation.token;
            if let Err(e) = self.allocator.extend_for_review(token, deadline) {
                self.payment_hashes.remove(&payment_hash);
                return Err(e);
            }
        }

        order.status = next;
        order.payment_hash = Some(payment_hash);
        order.hash_submitted_at = Some(now);
        order.updated_at = now;
        self.journal.record(PersistOp::UpsertOrder(order.clone()));
        tracing::info!(
            "Order {} hash submitted; reservation {} held until {}",
            order_id,
            token,
            deadline
        );

        Ok(self.view(&order, now))
    }

    fn claim_hash(&self, payment_hash: &str, order_id: Uuid) -> PoolResult<()> {
        match self.payment_hashes.entry(payment_hash.to_string()) {
            Entry::Occupied(existing) if *existing.get() != order_id => {
                tracing::warn!(
                    "Payment hash {} already used by order {}",
                    payment_hash,
                    existing.get()
                );
                Err(PoolError::DuplicatePaymentHash(*existing.get()))
            }
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(vacant) => {
                vacant.insert(order_id);
                Ok(())
            }
        }
    }

    /// Applies the confirmation collaborator's verdict.
    pub fn resolve_order(&self, order_id: Uuid, verdict: Verdict, now: DateTime<Utc>) -> PoolResult<OrderView> {
        let order = self.order(order_id)?;
        let mut order = order.lock();
        let next = order.status.transition(verdict.into())?;

        if let Some(token) = order.reservation_token {
            match self.allocator.release_at(token, verdict.into(), now) {
                Ok(_) => {}
                Err(e) if e.is_benign_race() => tracing::warn!(
                    "Verdict for order {} arrived after reservation {} was resolved: {}",
                    order_id,
                    token,
                    e
                ),
                Err(e) => return Err(e),
            }
        }

        order.status = next;
        order.resolved_at = Some(now);
        order.updated_at = now;
        self.journal.record(PersistOp::UpsertOrder(order.clone()));
        tracing::info!("Order {} resolved as {}", order_id, next.as_str());

        Ok(self.view(&order, now))
    }

    pub fn get_order(&self, order_id: Uuid, now: DateTime<Utc>) -> PoolResult<OrderView> {
        let order = self.order(order_id)?;
        let order = order.lock();
        Ok(self.view(&order, now))
    }

    pub fn restore(&self, open_orders: Vec<PurchaseOrder>, payment_hashes: Vec<(String, Uuid)>) -> usize {
        for (hash, order_id) in payment_hashes {
            self.payment_hashes.insert(hash, order_id);
        }
        let restored = open_orders.len();
        for order in open_orders {
            self.orders.insert(order.id, Arc::new(Mutex::new(order)));
        }
        tracing::info!("Restored {} open orders", restored);
        restored
    }

    /// Drops resolved orders from memory; their payment hashes stay claimed.
    pub fn evict_resolved(&self, resolved_before: DateTime<Utc>) -> usize {
        let before = self.orders.len();
        self.orders.retain(|_, order| {
            let order = order.lock();
            !(order.status.is_terminal() && order.resolved_at.is_some_and(|at| at < resolved_before))
        });
        before.saturating_sub(self.orders.len())
    }

    /// Drops limiter state for users whose quota has fully replenished.
    pub fn prune_rate_limits(&self) -> usize {
        let before = self.limiter.len();
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
        before.saturating_sub(self.limiter.len())
    }

    pub fn rate_limited_users(&self) -> usize {
        self.limiter.len()
    }

    pub fn open_orders(&self) -> usize {
        self.orders
            .iter()
            .filter(|entry| !entry.value().lock().status.is_terminal())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{allocator::AllocatorConfig, sweeper::sweep_expired};
    use shared::{CreateWalletRequest, Currency, Network, ReservationOutcome, WalletStatus};

    const TRON_ADDRESS: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";

    fn evm_hash(n: u8) -> String {
        format!("0x{}", format!("{:02x}", n).repeat(32))
    }

    fn book(config: OrderBookConfig, wallets: &[(Network, &str)]) -> OrderBook {
        let (journal, _receiver) = Journal::channel();
        let allocator = Arc::new(Allocator::new(AllocatorConfig::default(), journal.clone()));
        for (network, address) in wallets {
            allocator
                .add_wallet(
                    CreateWalletRequest {
                        address: address.to_string(),
                        network: *network,
                        currency: Currency::Usdt,
                        label: None,
                        notes: None,
                    },
                    Utc::now(),
                )
                .unwrap();
        }
        OrderBook::new(config, allocator, journal)
    }

    fn bep20(n: u32) -> String {
        format!("0x{:040x}", n)
    }

    #[test]
    fn full_lifecycle_confirms_and_frees_wallet() {
        let address = bep20(1);
        let book = book(OrderBookConfig::default(), &[(Network::Bep20, &address)]);
        let now = Utc::now();

        let created = book.create_order("user-1", "starter", 100_000_000, now).unwrap();
        assert_eq!(created.order.status, OrderStatus::Pending);
        assert_eq!(created.seconds_remaining, 1800);
        assert!(created.retry_after_seconds.is_none());
        let order_id = created.order.id;
        let wallet_id = created.order.assigned_wallet.as_ref().unwrap().wallet_id;

        let submitted = book.submit_hash(order_id, &evm_hash(0xAB).to_uppercase().replacen("0X", "0x", 1), now).unwrap();
        assert_eq!(submitted.order.status, OrderStatus::HashSubmitted);
        assert_eq!(submitted.order.payment_hash.as_deref(), Some(evm_hash(0xab).as_str()));
        assert_eq!(submitted.seconds_remaining, 86_400);

        let resolved = book.resolve_order(order_id, Verdict::Confirmed, now).unwrap();
        assert_eq!(resolved.order.status, OrderStatus::Confirmed);
        assert_eq!(resolved.reservation.unwrap().outcome, ReservationOutcome::Confirmed);

        let wallet = book.allocator.wallet(wallet_id).unwrap();
        assert_eq!(wallet.status, WalletStatus::Available);
        assert_eq!(wallet.total_received, 100_000_000);
    }

    #[test]
    fn exhausted_pool_keeps_order_pending_with_retry_hint() {
        let address = bep20(1);
        let book = book(OrderBookConfig::default(), &[(Network::Bep20, &address)]);
        let now = Utc::now();

        let first = book.create_order("user-1", "starter", 10, now).unwrap();
        let second = book.create_order("user-2", "starter", 10, now).unwrap();
        assert!(second.order.assigned_wallet.is_none());
        assert_eq!(second.retry_after_seconds, Some(10));
        assert_eq!(
            book.retry_assignment(second.order.id, now).unwrap_err(),
            PoolError::NoWalletAvailable
        );

        book.submit_hash(first.order.id, &evm_hash(1), now).unwrap();
        book.resolve_order(first.order.id, Verdict::Rejected, now).unwrap();

        let retried = book.retry_assignment(second.order.id, now).unwrap();
        assert!(retried.order.assigned_wallet.is_some());
        assert!(retried.retry_after_seconds.is_none());
    }

    #[test]
    fn hash_after_expiry_reserves_again() {
        let (a, b) = (bep20(1), bep20(2));
        let book = book(OrderBookConfig::default(), &[(Network::Bep20, &a), (Network::Bep20, &b)]);
        let t0 = Utc::now();

        let order = book.create_order("user-1", "pro", 10, t0).unwrap();
        let first_token = order.order.reservation_token.unwrap();
        let later = t0 + chrono::Duration::minutes(45);
        assert_eq!(sweep_expired(&book.allocator, later).expired, 1);

        let view = book.get_order(order.order.id, later).unwrap();
        assert_eq!(view.seconds_remaining, 0);
        assert_eq!(view.retry_after_seconds, Some(10));

        let submitted = book.submit_hash(order.order.id, &evm_hash(2), later).unwrap();
        assert_ne!(submitted.order.reservation_token, Some(first_token));
        assert_eq!(submitted.reservation.unwrap().outcome, ReservationOutcome::Pending);
        // Never-used wallet B is preferred over A.
        assert_eq!(submitted.order.assigned_wallet.unwrap().address, b);
    }

    #[test]
    fn hash_review_outlives_the_sweeper() {
        let address = bep20(1);
        let book = book(OrderBookConfig::default(), &[(Network::Bep20, &address)]);
        let t0 = Utc::now();
        let order = book.create_order("user-1", "pro", 10, t0).unwrap();

        book.submit_hash(order.order.id, &evm_hash(3), t0 + chrono::Duration::minutes(5))
            .unwrap();
        assert_eq!(sweep_expired(&book.allocator, t0 + chrono::Duration::hours(2)).expired, 0);

        let resolved = book
            .resolve_order(order.order.id, Verdict::Confirmed, t0 + chrono::Duration::hours(3))
            .unwrap();
        assert_eq!(resolved.order.status, OrderStatus::Confirmed);
    }

    #[test]
    fn duplicate_payment_hash_is_rejected() {
        let (a, b) = (bep20(1), bep20(2));
        let book = book(OrderBookConfig::default(), &[(Network::Bep20, &a), (Network::Bep20, &b)]);
        let now = Utc::now();
        let first = book.create_order("user-1", "pro", 10, now).unwrap();
        let second = book.create_order("user-2", "pro", 10, now).unwrap();

        book.submit_hash(first.order.id, &evm_hash(7), now).unwrap();
        assert_eq!(
            book.submit_hash(second.order.id, &evm_hash(7), now).unwrap_err(),
            PoolError::DuplicatePaymentHash(first.order.id)
        );
        assert_eq!(book.get_order(second.order.id, now).unwrap().order.status, OrderStatus::Pending);
    }

    #[test]
    fn hash_format_follows_the_assigned_network() {
        let book = book(OrderBookConfig::default(), &[(Network::Trc20, TRON_ADDRESS)]);
        let now = Utc::now();
        let order = book.create_order("user-1", "pro", 10, now).unwrap();

        assert!(matches!(
            book.submit_hash(order.order.id, &evm_hash(4), now),
            Err(PoolError::InvalidTxHash(_))
        ));
        let bare = "ab".repeat(32);
        let submitted = book.submit_hash(order.order.id, &bare, now).unwrap();
        assert_eq!(submitted.order.payment_hash.as_deref(), Some(bare.as_str()));
    }

    #[test]
    fn transitions_are_enforced() {
        let address = bep20(1);
        let book = book(OrderBookConfig::default(), &[(Network::Bep20, &address)]);
        let now = Utc::now();
        let order = book.create_order("user-1", "pro", 10, now).unwrap();

        assert!(matches!(
            book.resolve_order(order.order.id, Verdict::Confirmed, now),
            Err(PoolError::InvalidTransition { .. })
        ));
        book.submit_hash(order.order.id, &evm_hash(5), now).unwrap();
        book.resolve_order(order.order.id, Verdict::Rejected, now).unwrap();
        assert!(matches!(
            book.resolve_order(order.order.id, Verdict::Confirmed, now),
            Err(PoolError::InvalidTransition { .. })
        ));
        assert_eq!(
            book.get_order(Uuid::nil(), now).unwrap_err(),
            PoolError::OrderNotFound(Uuid::nil())
        );
    }

    #[test]
    fn late_verdict_after_admin_override_still_transitions() {
        let address = bep20(1);
        let book = book(OrderBookConfig::default(), &[(Network::Bep20, &address)]);
        let now = Utc::now();
        let order = book.create_order("user-1", "pro", 10, now).unwrap();
        book.submit_hash(order.order.id, &evm_hash(6), now).unwrap();

        let wallet_id = order.order.assigned_wallet.unwrap().wallet_id;
        book.allocator
            .admin_exclude_with_override(wallet_id, shared::ExclusionStatus::Maintenance, now)
            .unwrap();

        let resolved = book.resolve_order(order.order.id, Verdict::Confirmed, now).unwrap();
        assert_eq!(resolved.order.status, OrderStatus::Confirmed);
        assert_eq!(book.allocator.wallet(wallet_id).unwrap().total_received, 0);
    }

    #[test]
    fn order_creation_is_rate_limited_per_user() {
        let address = bep20(1);
        let config = OrderBookConfig {
            orders_per_minute: 2,
            ..Default::default()
        };
        let book = book(config, &[(Network::Bep20, &address)]);
        let now = Utc::now();

        book.create_order("user-1", "pro", 10, now).unwrap();
        book.create_order("user-1", "pro", 10, now).unwrap();
        assert_eq!(
            book.create_order("user-1", "pro", 10, now).unwrap_err(),
            PoolError::RateLimited("user-1".to_string())
        );
        assert!(book.create_order("user-2", "pro", 10, now).is_ok());
    }

    #[test]
    fn idle_rate_limit_entries_are_pruned() {
        let address = bep20(1);
        let config = OrderBookConfig {
            orders_per_minute: 60_000,
            ..Default::default()
        };
        let book = book(config, &[(Network::Bep20, &address)]);
        let now = Utc::now();

        for user in 0..100 {
            book.create_order(&format!("user-{}", user), "pro", 10, now).unwrap();
        }
        assert_eq!(book.rate_limited_users(), 100);

        // One cell replenishes every millisecond at this quota.
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert_eq!(book.prune_rate_limits(), 100);
        assert_eq!(book.rate_limited_users(), 0);

        book.create_order("user-0", "pro", 10, now).unwrap();
        assert_eq!(book.rate_limited_users(), 1);
    }

    #[test]
    fn invalid_input_is_rejected_before_reserving() {
        let address = bep20(1);
        let book = book(OrderBookConfig::default(), &[(Network::Bep20, &address)]);
        let now = Utc::now();

        assert!(matches!(
            book.create_order("", "pro", 10, now),
            Err(PoolError::InvalidRequest(_))
        ));
        assert!(matches!(
            book.create_order("user-1", "pro", 0, now),
            Err(PoolError::InvalidAmount(_))
        ));
        assert_eq!(book.allocator.pending_count(), 0);
    }

    #[test]
    fn eviction_keeps_hashes_claimed() {
        let (a, b) = (bep20(1), bep20(2));
        let book = book(OrderBookConfig::default(), &[(Network::Bep20, &a), (Network::Bep20, &b)]);
        let now = Utc::now();
        let done = book.create_order("user-1", "pro", 10, now).unwrap();
        let open = book.create_order("user-2", "pro", 10, now).unwrap();
        book.submit_hash(done.order.id, &evm_hash(9), now).unwrap();
        book.resolve_order(done.order.id, Verdict::Confirmed, now).unwrap();

        assert_eq!(book.evict_resolved(now + chrono::Duration::seconds(1)), 1);
        assert_eq!(book.open_orders(), 1);
        assert_eq!(
            book.submit_hash(open.order.id, &evm_hash(9), now).unwrap_err(),
            PoolError::DuplicatePaymentHash(done.order.id)
        );
    }
}
