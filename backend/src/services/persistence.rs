//! Write-behind persistence.
//!
//! In-memory state is authoritative for exclusivity; every transition is
//! recorded here and written to Postgres by a background task with retry.
//! A failed write is never a reason to roll the in-memory state back.

use std::time::Duration;

use shared::{AlertSeverity, PoolError, PurchaseOrder, Reservation, WalletId, WalletRecord};
use tokio::sync::mpsc;

use crate::{database::Database, monitoring::metrics};

const BASE_BACKOFF: Duration = Duration::from_millis(200);
const MAX_BACKOFF: Duration = Duration::from_secs(10);
const REQUEUE_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub enum PersistOp {
    UpsertWallet(WalletRecord),
    /// Final snapshot of a removed wallet.
    DeleteWallet(WalletRecord),
    UpsertReservation(Reservation),
    UpsertOrder(PurchaseOrder),
    RaiseAlert {
        alert_type: String,
        severity: AlertSeverity,
        wallet_id: Option<WalletId>,
        message: String,
        details: Option<serde_json::Value>,
    },
}

impl PersistOp {
    pub fn describe(&self) -> String {
        match self {
            PersistOp::UpsertWallet(w) => format!("upsert wallet {}", w.id),
            PersistOp::DeleteWallet(w) => format!("delete wallet {}", w.id),
            PersistOp::UpsertReservation(r) => format!("upsert reservation {}", r.token),
            PersistOp::UpsertOrder(o) => format!("upsert order {}", o.id),
            PersistOp::RaiseAlert { alert_type, .. } => format!("raise alert {}", alert_type),
        }
    }
}

#[derive(Clone)]
pub struct Journal {
    sender: mpsc::UnboundedSender<PersistOp>,
}

impl Journal {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PersistOp>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Never blocks; safe to call while holding a wallet lock.
    pub fn record(&self, op: PersistOp) {
        if let Err(e) = self.sender.send(op) {
            tracing::trace!("Journal closed, dropping {}", e.0.describe());
        }
    }

    pub fn alert(
        &self,
        alert_type: &str,
        severity: AlertSeverity,
        wallet_id: Option<WalletId>,
        message: String,
        details: Option<serde_json::Value>,
    ) {
        self.record(PersistOp::RaiseAlert {
            alert_type: alert_type.to_string(),
            severity,
            wallet_id,
            message,
            details,
        });
    }
}

pub async fn run_persistence_writer(
    database: Database,
    journal: Journal,
    mut receiver: mpsc::UnboundedReceiver<PersistOp>,
    max_attempts: u32,
) {
    tracing::info!("Persistence writer started (max attempts: {})", max_attempts);

    while let Some(op) = receiver.recv().await {
        if let Err(e) = apply_with_retry(&database, &op, max_attempts).await {
            metrics::inc_persistence_failures();
            tracing::error!("{}; requeueing {} in {:?}", e, op.describe(), REQUEUE_DELAY);

            let journal = journal.clone();
            tokio::spawn(async move {
                tokio::time::sleep(REQUEUE_DELAY).await;
                journal.record(op);
            });
        }
    }

    tracing::warn!("Persistence writer stopped: journal closed");
}

async fn apply_with_retry(
    database: &Database,
    op: &PersistOp,
    max_attempts: u32,
) -> Result<(), PoolError> {
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        match apply(database, op).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                last_error = e.to_string();
                tracing::warn!(
                    "Persist attempt {}/{} for {} failed: {}",
                    attempt,
                    max_attempts,
                    op.describe(),
                    e
                );
                if attempt < max_attempts {
                    tokio::time::sleep(backoff(attempt)).await;
                }
            }
        }
    }

    Err(PoolError::PersistenceFailure(format!(
        "{} after {} attempts: {}",
        op.describe(),
        max_attempts,
        last_error
    )))
}

async fn apply(database: &Database, op: &PersistOp) -> Result<(), sqlx::Error> {
    match op {
        PersistOp::UpsertWallet(wallet) => database.upsert_wallet(wallet).await,
        PersistOp::DeleteWallet(wallet) => database.delete_wallet(wallet).await,
        PersistOp::UpsertReservation(reservation) => database.upsert_reservation(reservation).await,
        PersistOp::UpsertOrder(order) => database.upsert_order(order).await,
        PersistOp::RaiseAlert {
            alert_type,
            severity,
            wallet_id,
            message,
            details,
        } => database
            .create_alert(alert_type, severity.as_str(), *wallet_id, message, details.clone())
            .await
            .map(|_| ()),
    }
}

fn backoff(attempt: u32) -> Duration {
    let factor = 1u32 << attempt.saturating_sub(1).min(16);
    BASE_BACKOFF.saturating_mul(factor).min(MAX_BACKOFF)
}
