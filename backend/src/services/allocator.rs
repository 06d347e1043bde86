//! # Wallet Allocator
//!
//! The only writer of wallet reservation state.
//!
//! ## Invariants
//!
//! - A wallet has at most one pending reservation at any instant.
//! - A reservation is granted only on a wallet that is AVAILABLE at commit time.
//! - Candidates are chosen least-recently-used first; never-used wallets come
//!   before any used one and ties go to the lowest wallet id.
//!
//! ## Locking
//!
//! Every wallet lives behind its own mutex, so reservations on different
//! wallets never contend. Lock order is `wallets` shard, then wallet mutex,
//! then the `pending` index. Nothing locks a wallet and then touches the
//! `wallets` map.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use moka::sync::Cache as MokaSyncCache;
use parking_lot::Mutex;
use shared::{
    validate_address, validate_amount, AlertSeverity, CreateWalletRequest, EditWalletRequest,
    ExclusionStatus, PaginatedResponse, PoolError, PoolResult, PoolStats, ReleaseOutcome,
    Reservation, ReservationOutcome, WalletId, WalletListQuery, WalletRecord, WalletStatus,
};
use uuid::Uuid;

use crate::{
    config::Config,
    monitoring::metrics,
    services::persistence::{Journal, PersistOp},
};

const MAX_PAGE_SIZE: i64 = 500;
const RESOLVED_CAPACITY: u64 = 200_000;

#[derive(Debug, Clone)]
pub struct AllocatorConfig {
    pub reservation_ttl: chrono::Duration,
    pub max_reserve_retries: u32,
    /// How long a resolved token still answers `AlreadyResolved`.
    pub resolved_retention: Duration,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            reservation_ttl: chrono::Duration::minutes(30),
            max_reserve_retries: 5,
            resolved_retention: Duration::from_secs(86_400),
        }
    }
}

impl From<&Config> for AllocatorConfig {
    fn from(config: &Config) -> Self {
        Self {
            reservation_ttl: chrono::Duration::seconds(config.reservation_ttl_seconds as i64),
            max_reserve_retries: config.reserve_max_retries,
            resolved_retention: config.resolved_retention(),
        }
    }
}

struct WalletSlot {
    record: WalletRecord,
    active: Option<Reservation>,
    /// Set when the wallet is removed so a racing reserve cannot claim it.
    retired: bool,
}

impl WalletSlot {
    fn new(record: WalletRecord) -> Self {
        Self {
            record,
            active: None,
            retired: false,
        }
    }

    fn is_orphaned(&self) -> bool {
        self.record.is_reserved() && self.active.is_none()
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingEntry {
    wallet_id: WalletId,
    expires_at: DateTime<Utc>,
}

/// A successful reservation: the wallet as it looked at grant time.
#[derive(Debug, Clone)]
pub struct Grant {
    pub wallet: WalletRecord,
    pub reservation: Reservation,
}

#[derive(Debug, Default, Clone)]
pub struct RestoreReport {
    pub wallets: usize,
    pub pending: usize,
    pub orphans: Vec<WalletId>,
    pub stray_reservations: Vec<Uuid>,
}

pub struct Allocator {
    config: AllocatorConfig,
    wallets: DashMap<WalletId, Arc<Mutex<WalletSlot>>>,
    addresses: DashMap<(shared::Network, String), WalletId>,
    pending: DashMap<Uuid, PendingEntry>,
    resolved: MokaSyncCache<Uuid, Reservation>,
    next_wallet_id: AtomicI64,
    journal: Journal,
}

fn address_key(network: shared::Network, address: &str) -> (shared::Network, String) {
    if network.is_evm() {
        (network, address.to_lowercase())
    } else {
        (network, address.to_string())
    }
}

impl Allocator {
    pub fn new(config: AllocatorConfig, journal: Journal) -> Self {
        let resolved = MokaSyncCache::builder()
            .max_capacity(RESOLVED_CAPACITY)
            .time_to_live(config.resolved_retention)
            .build();

        Self {
            config,
            wallets: DashMap::new(),
            addresses: DashMap::new(),
            pending: DashMap::new(),
            resolved,
            next_wallet_id: AtomicI64::new(1),
            journal,
        }
    }

    fn slot(&self, wallet_id: WalletId) -> Option<Arc<Mutex<WalletSlot>>> {
        self.wallets.get(&wallet_id).map(|entry| Arc::clone(entry.value()))
    }

    // ------------------------------------------------------------------
    // Reserve / release
    // ------------------------------------------------------------------

    pub fn reserve(&self, order_id: Uuid, amount: i64) -> PoolResult<Grant> {
        self.reserve_at(order_id, amount, Utc::now())
    }

    pub fn reserve_at(&self, order_id: Uuid, amount: i64, now: DateTime<Utc>) -> PoolResult<Grant> {
        validate_amount(amount)?;
        let attempts = self.config.max_reserve_retries.max(1);

        for attempt in 1..=attempts {
            let Some((wallet_id, slot)) = self.select_candidate() else {
                metrics::inc_no_wallet_available();
                tracing::debug!("No available wallet for order {}", order_id);
                return Err(PoolError::NoWalletAvailable);
            };

            if let Some(grant) = self.try_commit(&slot, order_id, amount, now) {
                tracing::info!(
                    "Reserved wallet {} for order {} until {} (token {})",
                    wallet_id,
                    order_id,
                    grant.reservation.expires_at,
                    grant.reservation.token
                );
                return Ok(grant);
            }

            tracing::debug!(
                "Lost race for wallet {} on order {} (attempt {}/{})",
                wallet_id,
                order_id,
                attempt,
                attempts
            );
            std::thread::yield_now();
        }

        metrics::inc_no_wallet_available();
        tracing::warn!(
            "Giving up reservation for order {} after {} contended attempts",
            order_id,
            attempts
        );
        Err(PoolError::NoWalletAvailable)
    }

    /// Snapshot of the best AVAILABLE wallet. The choice is re-checked at commit.
    fn select_candidate(&self) -> Option<(WalletId, Arc<Mutex<WalletSlot>>)> {
        let mut best: Option<(Option<DateTime<Utc>>, WalletId, Arc<Mutex<WalletSlot>>)> = None;

        for entry in self.wallets.iter() {
            let key = {
                let slot = entry.value().lock();
                if !slot.record.is_available() || slot.retired {
                    continue;
                }
                (slot.record.last_used_at, slot.record.id)
            };

            let better = match &best {
                None => true,
                Some((last_used, id, _)) => key < (*last_used, *id),
            };
            if better {
                best = Some((key.0, key.1, Arc::clone(entry.value())));
            }
        }

        best.map(|(_, id, slot)| (id, slot))
    }

    fn try_commit(
        &self,
        slot: &Mutex<WalletSlot>,
        order_id: Uuid,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Option<Grant> {
        let mut slot = slot.lock();
        if slot.retired || !slot.record.is_available() {
            return None;
        }
        slot.record.status = slot.record.status.transition(WalletStatus::Reserved).ok()?;

        let reservation = Reservation {
            token: Uuid::new_v4(),
            wallet_id: slot.record.id,
            purchase_order_id: order_id,
            amount,
            reserved_at: now,
            expires_at: now + self.config.reservation_ttl,
            resolved_at: None,
            outcome: ReservationOutcome::Pending,
        };

        slot.record.last_used_at = Some(now);
        slot.record.current_reservation = Some(reservation.token);
        slot.record.total_assigned = slot.record.total_assigned.saturating_add(1);
        slot.record.updated_at = now;
        slot.active = Some(reservation.clone());

        self.pending.insert(
            reservation.token,
            PendingEntry {
                wallet_id: slot.record.id,
                expires_at: reservation.expires_at,
            },
        );
        self.journal.record(PersistOp::UpsertReservation(reservation.clone()));
        self.journal.record(PersistOp::UpsertWallet(slot.record.clone()));
        metrics::inc_reservations_granted();

        Some(Grant {
            wallet: slot.record.clone(),
            reservation,
        })
    }

    pub fn release(&self, token: Uuid, outcome: ReleaseOutcome) -> PoolResult<Reservation> {
        self.release_at(token, outcome, Utc::now())
    }

    pub fn release_at(
        &self,
        token: Uuid,
        outcome: ReleaseOutcome,
        now: DateTime<Utc>,
    ) -> PoolResult<Reservation> {
        let wallet_id = match self.pending.get(&token) {
            Some(entry) => entry.wallet_id,
            None => return Err(self.unresolvable(token)),
        };
        let slot = self.slot(wallet_id).ok_or_else(|| self.unresolvable(token))?;
        let mut slot = slot.lock();

        let reservation = match slot.active.take() {
            Some(r) if r.token == token => r,
            other => {
                slot.active = other;
                return Err(self.unresolvable(token));
            }
        };

        let resolved = self.settle(&mut slot, reservation, outcome, now);
        self.journal.record(PersistOp::UpsertWallet(slot.record.clone()));
        Ok(resolved)
    }

    fn unresolvable(&self, token: Uuid) -> PoolError {
        if self.resolved.contains_key(&token) {
            PoolError::AlreadyResolved(token)
        } else {
            PoolError::UnknownReservation(token)
        }
    }

    /// Resolves the wallet's active reservation. Caller holds the wallet lock
    /// and has already detached `reservation` from the slot.
    fn settle(
        &self,
        slot: &mut WalletSlot,
        mut reservation: Reservation,
        outcome: ReleaseOutcome,
        now: DateTime<Utc>,
    ) -> Reservation {
        reservation.outcome = outcome.into();
        reservation.resolved_at = Some(now);

        let record = &mut slot.record;
        match outcome {
            ReleaseOutcome::Confirmed => {
                record.total_received = record.total_received.saturating_add(reservation.amount);
                record.successful_transactions = record.successful_transactions.saturating_add(1);
            }
            ReleaseOutcome::Rejected | ReleaseOutcome::Expired => {
                record.failed_transactions = record.failed_transactions.saturating_add(1);
            }
        }
        record.status = WalletStatus::Available;
        record.current_reservation = None;
        record.updated_at = now;

        self.resolved.insert(reservation.token, reservation.clone());
        self.pending.remove(&reservation.token);
        self.journal.record(PersistOp::UpsertReservation(reservation.clone()));
        metrics::inc_reservations_released(outcome);

        tracing::info!(
            "Released wallet {} from reservation {} ({})",
            record.id,
            reservation.token,
            reservation.outcome.as_str()
        );

        reservation
    }

    /// Pushes a pending reservation's deadline out to at least `until`.
    pub fn extend_for_review(&self, token: Uuid, until: DateTime<Utc>) -> PoolResult<Reservation> {
        let wallet_id = match self.pending.get(&token) {
            Some(entry) => entry.wallet_id,
            None => return Err(self.unresolvable(token)),
        };
        let slot = self.slot(wallet_id).ok_or_else(|| self.unresolvable(token))?;
        let mut slot = slot.lock();

        let Some(active) = slot.active.as_mut().filter(|r| r.token == token) else {
            return Err(self.unresolvable(token));
        };
        if until > active.expires_at {
            active.expires_at = until;
            if let Some(mut entry) = self.pending.get_mut(&token) {
                entry.expires_at = until;
            }
            self.journal.record(PersistOp::UpsertReservation(active.clone()));
            tracing::debug!("Extended reservation {} until {}", token, until);
        }

        Ok(active.clone())
    }

    /// Tokens of pending reservations whose deadline is before `now`.
    pub fn expired_pending(&self, now: DateTime<Utc>) -> Vec<Uuid> {
        self.pending
            .iter()
            .filter(|entry| entry.expires_at < now)
            .map(|entry| *entry.key())
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn wallet_count(&self) -> usize {
        self.wallets.len()
    }

    pub fn reservation(&self, token: Uuid) -> Option<Reservation> {
        let pending_wallet = self.pending.get(&token).map(|entry| entry.wallet_id);
        if let Some(wallet_id) = pending_wallet {
            let slot = self.slot(wallet_id)?;
            let slot = slot.lock();
            if let Some(active) = slot.active.as_ref().filter(|r| r.token == token) {
                return Some(active.clone());
            }
        }
        self.resolved.get(&token)
    }

    // ------------------------------------------------------------------
    // Admin mutations
    // ------------------------------------------------------------------

    pub fn add_wallet(&self, request: CreateWalletRequest, now: DateTime<Utc>) -> PoolResult<WalletRecord> {
        let address = request.address.trim().to_string();
        validate_address(request.network, &address)?;

        let wallet_id = match self.addresses.entry(address_key(request.network, &address)) {
            Entry::Occupied(_) => return Err(PoolError::DuplicateAddress(address)),
            Entry::Vacant(vacant) => {
                let id = self.next_wallet_id.fetch_add(1, Ordering::SeqCst);
                vacant.insert(id);
                id
            }
        };

        let record = WalletRecord {
            id: wallet_id,
            address,
            network: request.network,
            currency: request.currency,
            status: WalletStatus::Available,
            last_used_at: None,
            current_reservation: None,
            total_received: 0,
            total_assigned: 0,
            successful_transactions: 0,
            failed_transactions: 0,
            label: non_empty(request.label),
            notes: non_empty(request.notes),
            created_at: now,
            updated_at: now,
        };

        self.wallets
            .insert(wallet_id, Arc::new(Mutex::new(WalletSlot::new(record.clone()))));
        self.journal.record(PersistOp::UpsertWallet(record.clone()));
        tracing::info!(
            "Added wallet {} ({} {}) to the pool",
            wallet_id,
            record.network,
            record.address
        );

        Ok(record)
    }

    /// Label and notes are always editable; currency only while not reserved.
    pub fn edit_wallet(
        &self,
        wallet_id: WalletId,
        edit: EditWalletRequest,
        now: DateTime<Utc>,
    ) -> PoolResult<WalletRecord> {
        let slot = self.slot(wallet_id).ok_or(PoolError::WalletNotFound(wallet_id))?;
        let mut slot = slot.lock();

        if let Some(currency) = edit.currency {
            if slot.record.is_reserved() && currency != slot.record.currency {
                return Err(PoolError::WalletCurrentlyReserved(wallet_id));
            }
            slot.record.currency = currency;
        }
        if let Some(label) = edit.label {
            slot.record.label = non_empty(Some(label));
        }
        if let Some(notes) = edit.notes {
            slot.record.notes = non_empty(Some(notes));
        }
        slot.record.updated_at = now;

        self.journal.record(PersistOp::UpsertWallet(slot.record.clone()));
        Ok(slot.record.clone())
    }

    pub fn admin_exclude(
        &self,
        wallet_id: WalletId,
        status: ExclusionStatus,
        now: DateTime<Utc>,
    ) -> PoolResult<WalletRecord> {
        let slot = self.slot(wallet_id).ok_or(PoolError::WalletNotFound(wallet_id))?;
        let mut slot = slot.lock();

        if slot.record.is_reserved() {
            tracing::warn!(
                "Refusing to move reserved wallet {} to {}",
                wallet_id,
                WalletStatus::from(status).as_str()
            );
            return Err(PoolError::WalletCurrentlyReserved(wallet_id));
        }

        self.apply_exclusion(&mut slot, status, now)
    }

    /// Explicit override: expires the in-flight reservation and parks the
    /// wallet in the same critical section.
    pub fn admin_exclude_with_override(
        &self,
        wallet_id: WalletId,
        status: ExclusionStatus,
        now: DateTime<Utc>,
    ) -> PoolResult<(WalletRecord, Option<Reservation>)> {
        let slot = self.slot(wallet_id).ok_or(PoolError::WalletNotFound(wallet_id))?;
        let mut slot = slot.lock();

        if slot.is_orphaned() {
            return Err(PoolError::InvariantViolation { wallet_id });
        }

        let expired = match slot.active.take() {
            Some(reservation) => {
                tracing::warn!(
                    "Admin override: force-expiring reservation {} on wallet {}",
                    reservation.token,
                    wallet_id
                );
                Some(self.settle(&mut slot, reservation, ReleaseOutcome::Expired, now))
            }
            None => None,
        };

        let record = self.apply_exclusion(&mut slot, status, now)?;
        Ok((record, expired))
    }

    fn apply_exclusion(
        &self,
        slot: &mut WalletSlot,
        status: ExclusionStatus,
        now: DateTime<Utc>,
    ) -> PoolResult<WalletRecord> {
        let target = WalletStatus::from(status);
        if slot.record.status != target {
            slot.record.status = slot.record.status.transition(target)?;
            slot.record.updated_at = now;
            self.journal.record(PersistOp::UpsertWallet(slot.record.clone()));
            tracing::info!("Wallet {} moved to {}", slot.record.id, target.as_str());
        }
        Ok(slot.record.clone())
    }

    pub fn reactivate(&self, wallet_id: WalletId, now: DateTime<Utc>) -> PoolResult<WalletRecord> {
        let slot = self.slot(wallet_id).ok_or(PoolError::WalletNotFound(wallet_id))?;
        let mut slot = slot.lock();

        if slot.record.is_reserved() {
            return Err(PoolError::WalletCurrentlyReserved(wallet_id));
        }
        slot.record.status = slot.record.status.transition(WalletStatus::Available)?;
        slot.record.updated_at = now;

        self.journal.record(PersistOp::UpsertWallet(slot.record.clone()));
        tracing::info!("Wallet {} reactivated", wallet_id);
        Ok(slot.record.clone())
    }

    pub fn remove_wallet(&self, wallet_id: WalletId) -> PoolResult<WalletRecord> {
        let removed = self.wallets.remove_if(&wallet_id, |_, slot| {
            let mut slot = slot.lock();
            if slot.record.is_reserved() {
                false
            } else {
                slot.retired = true;
                true
            }
        });

        match removed {
            Some((_, slot)) => {
                let record = slot.lock().record.clone();
                self.addresses.remove(&address_key(record.network, &record.address));
                self.journal.record(PersistOp::DeleteWallet(record.clone()));
                tracing::info!("Removed wallet {} from the pool", wallet_id);
                Ok(record)
            }
            None if self.wallets.contains_key(&wallet_id) => {
                Err(PoolError::WalletCurrentlyReserved(wallet_id))
            }
            None => Err(PoolError::WalletNotFound(wallet_id)),
        }
    }

    /// Clears a RESERVED wallet that has no pending reservation. Requires an
    /// operator's explicit confirmation.
    pub fn repair_orphan(
        &self,
        wallet_id: WalletId,
        operator_confirmed: bool,
        now: DateTime<Utc>,
    ) -> PoolResult<WalletRecord> {
        if !operator_confirmed {
            return Err(PoolError::OperatorConfirmationRequired(wallet_id));
        }
        let slot = self.slot(wallet_id).ok_or(PoolError::WalletNotFound(wallet_id))?;
        let mut slot = slot.lock();

        if !slot.is_orphaned() {
            return Err(PoolError::InvalidTransition {
                from: slot.record.status.as_str().to_string(),
                to: WalletStatus::Available.as_str().to_string(),
            });
        }

        slot.record.status = WalletStatus::Available;
        slot.record.current_reservation = None;
        slot.record.updated_at = now;
        self.journal.record(PersistOp::UpsertWallet(slot.record.clone()));
        self.journal.alert(
            "orphan_repaired",
            AlertSeverity::Info,
            Some(wallet_id),
            format!("Operator returned orphaned wallet {} to the pool", wallet_id),
            None,
        );
        tracing::warn!("Operator repaired orphaned wallet {}", wallet_id);

        Ok(slot.record.clone())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn wallet(&self, wallet_id: WalletId) -> Option<WalletRecord> {
        self.slot(wallet_id).map(|slot| slot.lock().record.clone())
    }

    fn snapshot(&self) -> Vec<WalletRecord> {
        self.wallets
            .iter()
            .map(|entry| entry.value().lock().record.clone())
            .collect()
    }

    pub fn list_wallets(&self, query: &WalletListQuery) -> PaginatedResponse<WalletRecord> {
        let limit = query.limit.clamp(1, MAX_PAGE_SIZE);
        let offset = query.offset.max(0);
        let search = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty());

        let mut matching: Vec<WalletRecord> = self
            .snapshot()
            .into_iter()
            .filter(|w| query.status.map_or(true, |s| w.status == s))
            .filter(|w| query.network.map_or(true, |n| w.network == n))
            .filter(|w| search.map_or(true, |needle| w.matches_search(needle)))
            .collect();
        matching.sort_by_key(|w| w.id);

        let total = matching.len() as i64;
        let items = matching
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();

        PaginatedResponse::new(items, total, limit, offset)
    }

    pub fn stats(&self) -> PoolStats {
        let mut stats = PoolStats::default();
        for wallet in self.snapshot() {
            stats.total_wallets += 1;
            match wallet.status {
                WalletStatus::Available => stats.available += 1,
                WalletStatus::Reserved => stats.reserved += 1,
                WalletStatus::Maintenance => stats.maintenance += 1,
                WalletStatus::Disabled => stats.disabled += 1,
            }
            stats.total_received = stats.total_received.saturating_add(wallet.total_received);
            stats.total_assigned += wallet.total_assigned;
            stats.successful_transactions += wallet.successful_transactions;
            stats.failed_transactions += wallet.failed_transactions;
        }
        stats.pending_reservations = self.pending.len() as i64;

        let usable = stats.available + stats.reserved;
        stats.utilization = if usable == 0 {
            0.0
        } else {
            (stats.reserved as f64 / usable as f64) * 100.0
        };
        stats
    }

    /// Wallets that are RESERVED without a pending reservation.
    pub fn integrity_violations(&self) -> Vec<WalletId> {
        let mut orphans: Vec<WalletId> = self
            .wallets
            .iter()
            .filter(|entry| entry.value().lock().is_orphaned())
            .map(|entry| *entry.key())
            .collect();
        orphans.sort_unstable();
        orphans
    }

    // ------------------------------------------------------------------
    // Startup
    // ------------------------------------------------------------------

    /// Loads persisted state. Orphaned wallets stay RESERVED until an
    /// operator repairs them.
    pub fn restore(&self, wallets: Vec<WalletRecord>, pending: Vec<Reservation>) -> RestoreReport {
        let mut report = RestoreReport::default();
        let mut by_wallet: HashMap<WalletId, Reservation> = HashMap::new();
        for reservation in pending.into_iter().filter(Reservation::is_pending) {
            if let Some(previous) = by_wallet.insert(reservation.wallet_id, reservation) {
                report.stray_reservations.push(previous.token);
            }
        }

        let mut max_id = 0;
        for mut record in wallets {
            max_id = max_id.max(record.id);
            let mut slot_active = None;
            if !record.is_reserved() && !record.verify_invariant() {
                tracing::warn!(
                    "Wallet {} is {} but still points at reservation {:?}; clearing",
                    record.id,
                    record.status.as_str(),
                    record.current_reservation
                );
                record.current_reservation = None;
            }

            match by_wallet.remove(&record.id) {
                Some(reservation) if record.is_reserved() => {
                    record.current_reservation = Some(reservation.token);
                    self.pending.insert(
                        reservation.token,
                        PendingEntry {
                            wallet_id: record.id,
                            expires_at: reservation.expires_at,
                        },
                    );
                    slot_active = Some(reservation);
                    report.pending += 1;
                }
                Some(reservation) => report.stray_reservations.push(reservation.token),
                None if record.is_reserved() => {
                    tracing::error!(
                        "Wallet {} is RESERVED with no pending reservation; holding it out of rotation until an operator repairs it",
                        record.id
                    );
                    self.journal.alert(
                        "orphaned_wallet",
                        AlertSeverity::Critical,
                        Some(record.id),
                        format!("Wallet {} is reserved without a pending reservation", record.id),
                        None,
                    );
                    report.orphans.push(record.id);
                }
                None => {}
            }

            self.addresses
                .insert(address_key(record.network, &record.address), record.id);
            self.wallets.insert(
                record.id,
                Arc::new(Mutex::new(WalletSlot {
                    record,
                    active: slot_active,
                    retired: false,
                })),
            );
            report.wallets += 1;
        }
        report.stray_reservations.extend(by_wallet.into_values().map(|r| r.token));

        for token in &report.stray_reservations {
            tracing::error!(
                "Pending reservation {} does not match a reserved wallet; discarding",
                token
            );
        }

        self.next_wallet_id.fetch_max(max_id + 1, Ordering::SeqCst);
        tracing::info!(
            "Restored {} wallets, {} pending reservations, {} orphans",
            report.wallets,
            report.pending,
            report.orphans.len()
        );
        report
    }

    /// Keeps new ids above every id the durable store has issued, removed
    /// wallets included.
    pub fn skip_wallet_ids_through(&self, max_id: WalletId) {
        self.next_wallet_id.fetch_max(max_id + 1, Ordering::SeqCst);
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
