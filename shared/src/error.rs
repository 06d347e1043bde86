use thiserror::Error;
use uuid::Uuid;

use crate::WalletId;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PoolError {
  #[error("No wallet available, all wallets are busy")]
  NoWalletAvailable,
  #[error("Unknown reservation: {0}")]
  UnknownReservation(Uuid),
  #[error("Reservation already resolved: {0}")]
  AlreadyResolved(Uuid),
  #[error("Wallet {0} is currently reserved")]
  WalletCurrentlyReserved(WalletId),
  #[error("Wallet not found: {0}")]
  WalletNotFound(WalletId),
  #[error("Purchase order not found: {0}")]
  OrderNotFound(Uuid),
  #[error("Invalid status transition: {from} -> {to}")]
  InvalidTransition { from: String, to: String },
  #[error("Invalid address: {0}")]
  InvalidAddress(String),
  #[error("Invalid transaction hash: {0}")]
  InvalidTxHash(String),
  #[error("Invalid amount: {0}")]
  InvalidAmount(String),
  #[error("Invalid request: {0}")]
  InvalidRequest(String),
  #[error("Wallet address already registered: {0}")]
  DuplicateAddress(String),
  #[error("Payment hash already submitted for order {0}")]
  DuplicatePaymentHash(Uuid),
  #[error("Too many requests for user {0}")]
  RateLimited(String),
  #[error("Operator confirmation required to repair wallet {0}")]
  OperatorConfirmationRequired(WalletId),
  #[error("Wallet {wallet_id} is reserved without a pending reservation")]
  InvariantViolation { wallet_id: WalletId },
  #[error("Persistence failure: {0}")]
  PersistenceFailure(String),
  #[error("Corrupt record: {0}")]
  CorruptRecord(String),
}

impl PoolError {
  /// Conditions the caller may retry after a short backoff.
  pub fn is_retryable(&self) -> bool {
    matches!(self, PoolError::NoWalletAvailable | PoolError::RateLimited(_))
  }

  /// Resolution races between the sweeper and a confirmation; expected, not alarming.
  pub fn is_benign_race(&self) -> bool {
    matches!(
      self,
      PoolError::AlreadyResolved(_) | PoolError::UnknownReservation(_)
    )
  }
}

pub type PoolResult<T> = Result<T, PoolError>;
