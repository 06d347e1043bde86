use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::{PoolError, PoolResult};

pub type WalletId = i64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Network {
  #[serde(rename = "BEP20")]
  Bep20,
  #[serde(rename = "ERC20")]
  Erc20,
  #[serde(rename = "TRC20")]
  Trc20,
}

impl Network {
  pub fn as_str(&self) -> &'static str {
    match self {
      Network::Bep20 => "BEP20",
      Network::Erc20 => "ERC20",
      Network::Trc20 => "TRC20",
    }
  }

  /// EVM networks share the 0x-prefixed hex address and hash format.
  pub fn is_evm(&self) -> bool {
    matches!(self, Network::Bep20 | Network::Erc20)
  }
}

impl FromStr for Network {
  type Err = PoolError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_uppercase().as_str() {
      "BEP20" => Ok(Network::Bep20),
      "ERC20" => Ok(Network::Erc20),
      "TRC20" => Ok(Network::Trc20),
      other => Err(PoolError::CorruptRecord(format!("unknown network {}", other))),
    }
  }
}

impl fmt::Display for Network {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
  Usdt,
  Usdc,
  Busd,
}

impl Currency {
  pub fn as_str(&self) -> &'static str {
    match self {
      Currency::Usdt => "USDT",
      Currency::Usdc => "USDC",
      Currency::Busd => "BUSD",
    }
  }
}

impl FromStr for Currency {
  type Err = PoolError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_uppercase().as_str() {
      "USDT" => Ok(Currency::Usdt),
      "USDC" => Ok(Currency::Usdc),
      "BUSD" => Ok(Currency::Busd),
      other => Err(PoolError::CorruptRecord(format!("unknown currency {}", other))),
    }
  }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WalletStatus {
  Available,
  Reserved,
  Maintenance,
  Disabled,
}

impl WalletStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      WalletStatus::Available => "AVAILABLE",
      WalletStatus::Reserved => "RESERVED",
      WalletStatus::Maintenance => "MAINTENANCE",
      WalletStatus::Disabled => "DISABLED",
    }
  }

  /// RESERVED is entered and left only through the allocator; the admin
  /// statuses are reachable only from a wallet that is not reserved.
  pub fn can_transition_to(&self, next: WalletStatus) -> bool {
    use WalletStatus::*;
    matches!(
      (self, next),
      (Available, Reserved)
        | (Reserved, Available)
        | (Available, Maintenance)
        | (Available, Disabled)
        | (Maintenance, Disabled)
        | (Disabled, Maintenance)
        | (Maintenance, Available)
        | (Disabled, Available)
    )
  }

  pub fn transition(self, next: WalletStatus) -> PoolResult<WalletStatus> {
    if self.can_transition_to(next) {
      Ok(next)
    } else {
      Err(PoolError::InvalidTransition {
        from: self.as_str().to_string(),
        to: next.as_str().to_string(),
      })
    }
  }
}

impl FromStr for WalletStatus {
  type Err = PoolError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_uppercase().as_str() {
      "AVAILABLE" => Ok(WalletStatus::Available),
      "RESERVED" => Ok(WalletStatus::Reserved),
      "MAINTENANCE" => Ok(WalletStatus::Maintenance),
      "DISABLED" => Ok(WalletStatus::Disabled),
      other => Err(PoolError::CorruptRecord(format!("unknown wallet status {}", other))),
    }
  }
}

/// Statuses an admin may park a wallet in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExclusionStatus {
  Maintenance,
  Disabled,
}

impl From<ExclusionStatus> for WalletStatus {
  fn from(status: ExclusionStatus) -> Self {
    match status {
      ExclusionStatus::Maintenance => WalletStatus::Maintenance,
      ExclusionStatus::Disabled => WalletStatus::Disabled,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WalletRecord {
  pub id: WalletId,
  pub address: String,
  pub network: Network,
  pub currency: Currency,
  pub status: WalletStatus,
  pub last_used_at: Option<DateTime<Utc>>,
  pub current_reservation: Option<Uuid>,
  pub total_received: i64,
  pub total_assigned: i64,
  pub successful_transactions: i64,
  pub failed_transactions: i64,
  pub label: Option<String>,
  pub notes: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl WalletRecord {
  #[inline]
  pub fn is_available(&self) -> bool {
    self.status == WalletStatus::Available
  }
  #[inline]
  pub fn is_reserved(&self) -> bool {
    self.status == WalletStatus::Reserved
  }
  #[inline]
  pub fn verify_invariant(&self) -> bool {
    self.is_reserved() == self.current_reservation.is_some()
  }

  pub fn matches_search(&self, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    self.address.to_lowercase().contains(&needle)
      || self
        .label
        .as_deref()
        .is_some_and(|l| l.to_lowercase().contains(&needle))
      || self
        .notes
        .as_deref()
        .is_some_and(|n| n.to_lowercase().contains(&needle))
  }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReservationOutcome {
  Pending,
  Confirmed,
  Rejected,
  Expired,
}

impl ReservationOutcome {
  pub fn as_str(&self) -> &'static str {
    match self {
      ReservationOutcome::Pending => "pending",
      ReservationOutcome::Confirmed => "confirmed",
      ReservationOutcome::Rejected => "rejected",
      ReservationOutcome::Expired => "expired",
    }
  }
}

impl FromStr for ReservationOutcome {
  type Err = PoolError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "pending" => Ok(ReservationOutcome::Pending),
      "confirmed" => Ok(ReservationOutcome::Confirmed),
      "rejected" => Ok(ReservationOutcome::Rejected),
      "expired" => Ok(ReservationOutcome::Expired),
      other => Err(PoolError::CorruptRecord(format!("unknown outcome {}", other))),
    }
  }
}

/// Terminal outcomes a pending reservation can be released with.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseOutcome {
  Confirmed,
  Rejected,
  Expired,
}

impl From<ReleaseOutcome> for ReservationOutcome {
  fn from(outcome: ReleaseOutcome) -> Self {
    match outcome {
      ReleaseOutcome::Confirmed => ReservationOutcome::Confirmed,
      ReleaseOutcome::Rejected => ReservationOutcome::Rejected,
      ReleaseOutcome::Expired => ReservationOutcome::Expired,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reservation {
  pub token: Uuid,
  pub wallet_id: WalletId,
  pub purchase_order_id: Uuid,
  pub amount: i64,
  pub reserved_at: DateTime<Utc>,
  pub expires_at: DateTime<Utc>,
  pub resolved_at: Option<DateTime<Utc>>,
  pub outcome: ReservationOutcome,
}

impl Reservation {
  #[inline]
  pub fn is_pending(&self) -> bool {
    self.outcome == ReservationOutcome::Pending
  }
  #[inline]
  pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
    self.is_pending() && self.expires_at < now
  }
  /// Display-only countdown; expiry is decided by the sweeper.
  pub fn seconds_remaining(&self, now: DateTime<Utc>) -> i64 {
    if !self.is_pending() {
      return 0;
    }
    (self.expires_at - now).num_seconds().max(0)
  }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
  Pending,
  HashSubmitted,
  Confirmed,
  Rejected,
}

impl OrderStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      OrderStatus::Pending => "pending",
      OrderStatus::HashSubmitted => "hash_submitted",
      OrderStatus::Confirmed => "confirmed",
      OrderStatus::Rejected => "rejected",
    }
  }

  pub fn is_terminal(&self) -> bool {
    matches!(self, OrderStatus::Confirmed | OrderStatus::Rejected)
  }

  pub fn transition(self, next: OrderStatus) -> PoolResult<OrderStatus> {
    use OrderStatus::*;
    match (self, next) {
      (Pending, HashSubmitted) | (HashSubmitted, Confirmed) | (HashSubmitted, Rejected) => Ok(next),
      _ => Err(PoolError::InvalidTransition {
        from: self.as_str().to_string(),
        to: next.as_str().to_string(),
      }),
    }
  }
}

impl FromStr for OrderStatus {
  type Err = PoolError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "pending" => Ok(OrderStatus::Pending),
      "hash_submitted" => Ok(OrderStatus::HashSubmitted),
      "confirmed" => Ok(OrderStatus::Confirmed),
      "rejected" => Ok(OrderStatus::Rejected),
      other => Err(PoolError::CorruptRecord(format!("unknown order status {}", other))),
    }
  }
}

/// Verdict from the confirmation collaborator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
  Confirmed,
  Rejected,
}

impl From<Verdict> for ReleaseOutcome {
  fn from(verdict: Verdict) -> Self {
    match verdict {
      Verdict::Confirmed => ReleaseOutcome::Confirmed,
      Verdict::Rejected => ReleaseOutcome::Rejected,
    }
  }
}

impl From<Verdict> for OrderStatus {
  fn from(verdict: Verdict) -> Self {
    match verdict {
      Verdict::Confirmed => OrderStatus::Confirmed,
      Verdict::Rejected => OrderStatus::Rejected,
    }
  }
}

/// Wallet details as shown to the buyer, frozen at reservation time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssignedWallet {
  pub wallet_id: WalletId,
  pub address: String,
  pub network: Network,
  pub currency: Currency,
}

impl From<&WalletRecord> for AssignedWallet {
  fn from(wallet: &WalletRecord) -> Self {
    Self {
      wallet_id: wallet.id,
      address: wallet.address.clone(),
      network: wallet.network,
      currency: wallet.currency,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PurchaseOrder {
  pub id: Uuid,
  pub user_id: String,
  pub package_id: String,
  pub amount: i64,
  pub status: OrderStatus,
  pub assigned_wallet: Option<AssignedWallet>,
  pub reservation_token: Option<Uuid>,
  pub payment_hash: Option<String>,
  pub created_at: DateTime<Utc>,
  pub hash_submitted_at: Option<DateTime<Utc>>,
  pub resolved_at: Option<DateTime<Utc>>,
  pub updated_at: DateTime<Utc>,
}

/// Order plus the live state of its current reservation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderView {
  pub order: PurchaseOrder,
  pub reservation: Option<Reservation>,
  pub seconds_remaining: i64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub retry_after_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
  pub id: i64,
  pub alert_type: String,
  pub severity: String,
  pub wallet_id: Option<WalletId>,
  pub message: String,
  pub details: Option<JsonValue>,
  pub status: String,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
  Info,
  Warning,
  Critical,
}

impl AlertSeverity {
  pub fn as_str(&self) -> &'static str {
    match self {
      AlertSeverity::Info => "info",
      AlertSeverity::Warning => "warning",
      AlertSeverity::Critical => "critical",
    }
  }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PoolStats {
  pub total_wallets: i64,
  pub available: i64,
  pub reserved: i64,
  pub maintenance: i64,
  pub disabled: i64,
  pub pending_reservations: i64,
  pub total_received: i64,
  pub total_assigned: i64,
  pub successful_transactions: i64,
  pub failed_transactions: i64,
  pub utilization: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateWalletRequest {
  pub address: String,
  pub network: Network,
  #[serde(default = "default_currency")]
  pub currency: Currency,
  pub label: Option<String>,
  pub notes: Option<String>,
}

fn default_currency() -> Currency {
  Currency::Usdt
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EditWalletRequest {
  pub label: Option<String>,
  pub notes: Option<String>,
  pub currency: Option<Currency>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExcludeWalletRequest {
  pub status: ExclusionStatus,
  #[serde(default)]
  pub force: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairWalletRequest {
  #[serde(default)]
  pub confirm: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
  pub user_id: String,
  pub package_id: String,
  pub amount: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitHashRequest {
  pub tx_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveOrderRequest {
  pub outcome: Verdict,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletListQuery {
  pub status: Option<WalletStatus>,
  pub network: Option<Network>,
  pub search: Option<String>,
  #[serde(default = "default_limit")]
  pub limit: i64,
  #[serde(default)]
  pub offset: i64,
}

#[derive(Debug , Clone , Serialize ,Deserialize)]
pub struct ApiResponse<T>{
  pub success : bool ,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub data : Option<T>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error : Option<String>,
}

impl<T> ApiResponse<T>{
    pub fn success(data: T) -> Self {
      Self { success: true, data: Some(data), error: None }
    }

    pub fn error(error : String) -> Self{
      Self { success: false, data: None, error: Some(error) }
    }
}

#[derive(Debug , Clone , Serialize , Deserialize)]
pub struct PaginationParams{
  #[serde(default = "default_limit")]
  pub limit : i64,
  #[serde(default)]
  pub offset : i64
}

fn default_limit() -> i64 {
  100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub has_more: bool,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: i64, limit: i64, offset: i64) -> Self {
        let has_more = (offset + items.len() as i64) < total;
        Self {
            items,
            total,
            limit,
            offset,
            has_more,
        }
    }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn reserved_cannot_be_parked_by_admin() {
    assert!(WalletStatus::Reserved.transition(WalletStatus::Maintenance).is_err());
    assert!(WalletStatus::Reserved.transition(WalletStatus::Disabled).is_err());
    assert_eq!(
      WalletStatus::Maintenance.transition(WalletStatus::Available),
      Ok(WalletStatus::Available)
    );
  }

  #[test]
  fn admin_statuses_never_jump_straight_to_reserved() {
    assert!(!WalletStatus::Maintenance.can_transition_to(WalletStatus::Reserved));
    assert!(!WalletStatus::Disabled.can_transition_to(WalletStatus::Reserved));
  }

  #[test]
  fn order_lifecycle_is_linear() {
    assert_eq!(
      OrderStatus::Pending.transition(OrderStatus::HashSubmitted),
      Ok(OrderStatus::HashSubmitted)
    );
    assert!(OrderStatus::Pending.transition(OrderStatus::Confirmed).is_err());
    assert!(OrderStatus::Confirmed.transition(OrderStatus::Rejected).is_err());
    assert!(OrderStatus::Rejected.is_terminal());
  }

  #[test]
  fn status_strings_round_trip_through_storage_form() {
    for status in [
      WalletStatus::Available,
      WalletStatus::Reserved,
      WalletStatus::Maintenance,
      WalletStatus::Disabled,
    ] {
      assert_eq!(status.as_str().parse::<WalletStatus>(), Ok(status));
    }
    assert!("TAINTED".parse::<WalletStatus>().is_err());
  }

  #[test]
  fn countdown_stops_at_zero_and_after_resolution() {
    let now = Utc::now();
    let mut reservation = Reservation {
      token: Uuid::new_v4(),
      wallet_id: 1,
      purchase_order_id: Uuid::new_v4(),
      amount: 10,
      reserved_at: now,
      expires_at: now + chrono::Duration::seconds(30),
      resolved_at: None,
      outcome: ReservationOutcome::Pending,
    };
    assert_eq!(reservation.seconds_remaining(now), 30);
    assert_eq!(reservation.seconds_remaining(now + chrono::Duration::minutes(5)), 0);
    assert!(reservation.is_overdue(now + chrono::Duration::minutes(5)));

    reservation.outcome = ReservationOutcome::Confirmed;
    assert_eq!(reservation.seconds_remaining(now), 0);
    assert!(!reservation.is_overdue(now + chrono::Duration::minutes(5)));
  }

  #[test]
  fn search_covers_address_label_and_notes() {
    let now = Utc::now();
    let wallet = WalletRecord {
      id: 7,
      address: "0xAbC0000000000000000000000000000000000001".to_string(),
      network: Network::Bep20,
      currency: Currency::Usdt,
      status: WalletStatus::Available,
      last_used_at: None,
      current_reservation: None,
      total_received: 0,
      total_assigned: 0,
      successful_transactions: 0,
      failed_transactions: 0,
      label: Some("Hot wallet".to_string()),
      notes: Some("treasury rotation".to_string()),
      created_at: now,
      updated_at: now,
    };
    assert!(wallet.matches_search("abc0"));
    assert!(wallet.matches_search("HOT"));
    assert!(wallet.matches_search("treasury"));
    assert!(!wallet.matches_search("cold"));
  }
}
