use chrono::{DateTime, Utc};
use shared::{
    Alert, AssignedWallet, PoolError, PurchaseOrder, Reservation, WalletId, WalletRecord,
};
use sqlx::{postgres::PgPoolOptions, prelude::FromRow, types::JsonValue, PgPool, Row};
use std::time::Duration;
use uuid::Uuid;

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

#[derive(Debug, FromRow)]
struct WalletRow {
    id: i64,
    address: String,
    network: String,
    currency: String,
    status: String,
    last_used_at: Option<DateTime<Utc>>,
    current_reservation: Option<Uuid>,
    total_received: i64,
    total_assigned: i64,
    successful_transactions: i64,
    failed_transactions: i64,
    label: Option<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<WalletRow> for WalletRecord {
    type Error = PoolError;

    fn try_from(row: WalletRow) -> Result<Self, Self::Error> {
        Ok(WalletRecord {
            id: row.id,
            address: row.address,
            network: row.network.parse()?,
            currency: row.currency.parse()?,
            status: row.status.parse()?,
            last_used_at: row.last_used_at,
            current_reservation: row.current_reservation,
            total_received: row.total_received,
            total_assigned: row.total_assigned,
            successful_transactions: row.successful_transactions,
            failed_transactions: row.failed_transactions,
            label: row.label,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ReservationRow {
    token: Uuid,
    wallet_id: i64,
    purchase_order_id: Uuid,
    amount: i64,
    reserved_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
    outcome: String,
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = PoolError;

    fn try_from(row: ReservationRow) -> Result<Self, Self::Error> {
        Ok(Reservation {
            token: row.token,
            wallet_id: row.wallet_id,
            purchase_order_id: row.purchase_order_id,
            amount: row.amount,
            reserved_at: row.reserved_at,
            expires_at: row.expires_at,
            resolved_at: row.resolved_at,
            outcome: row.outcome.parse()?,
        })
    }
}

#[derive(Debug, FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: String,
    package_id: String,
    amount: i64,
    status: String,
    assigned_wallet_id: Option<i64>,
    assigned_address: Option<String>,
    assigned_network: Option<String>,
    assigned_currency: Option<String>,
    reservation_token: Option<Uuid>,
    payment_hash: Option<String>,
    created_at: DateTime<Utc>,
    hash_submitted_at: Option<DateTime<Utc>>,
    resolved_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for PurchaseOrder {
    type Error = PoolError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let assigned_wallet = match (
            row.assigned_wallet_id,
            row.assigned_address,
            row.assigned_network,
            row.assigned_currency,
        ) {
            (Some(wallet_id), Some(address), Some(network), Some(currency)) => {
                Some(AssignedWallet {
                    wallet_id,
                    address,
                    network: network.parse()?,
                    currency: currency.parse()?,
                })
            }
            _ => None,
        };

        Ok(PurchaseOrder {
            id: row.id,
            user_id: row.user_id,
            package_id: row.package_id,
            amount: row.amount,
            status: row.status.parse()?,
            assigned_wallet,
            reservation_token: row.reservation_token,
            payment_hash: row.payment_hash,
            created_at: row.created_at,
            hash_submitted_at: row.hash_submitted_at,
            resolved_at: row.resolved_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct AlertRow {
    id: i64,
    alert_type: String,
    severity: String,
    wallet_id: Option<i64>,
    message: String,
    details: Option<JsonValue>,
    status: String,
    created_at: DateTime<Utc>,
}

impl From<AlertRow> for Alert {
    fn from(row: AlertRow) -> Self {
        Alert {
            id: row.id,
            alert_type: row.alert_type,
            severity: row.severity,
            wallet_id: row.wallet_id,
            message: row.message,
            details: row.details,
            status: row.status,
            created_at: row.created_at,
        }
    }
}

fn decode_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, sqlx::Error>
where
    T: TryFrom<R, Error = PoolError>,
{
    rows.into_iter()
        .map(|row| T::try_from(row).map_err(|e| sqlx::Error::Decode(Box::new(e))))
        .collect()
}

impl Database {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(max_connections.min(5))
            .acquire_timeout(Duration::from_secs(3))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Pool that opens connections on first use.
    pub fn connect_lazy(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(1))
            .connect_lazy(database_url)?;

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Older snapshots never overwrite newer ones and removed wallets stay
    /// removed, so requeued writes are safe.
    pub async fn upsert_wallet(&self, wallet: &WalletRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
        INSERT INTO wallets(
          id, address, network, currency, status, last_used_at, current_reservation,
          total_received, total_assigned, successful_transactions, failed_transactions,
          label, notes, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
         ON CONFLICT (id)
         DO UPDATE SET
                currency = EXCLUDED.currency,
                status = EXCLUDED.status,
                last_used_at = EXCLUDED.last_used_at,
                current_reservation = EXCLUDED.current_reservation,
                total_received = EXCLUDED.total_received,
                total_assigned = EXCLUDED.total_assigned,
                successful_transactions = EXCLUDED.successful_transactions,
                failed_transactions = EXCLUDED.failed_transactions,
                label = EXCLUDED.label,
                notes = EXCLUDED.notes,
                updated_at = EXCLUDED.updated_at
         WHERE wallets.updated_at <= EXCLUDED.updated_at
           AND wallets.deleted_at IS NULL
      "#,
        )
        .bind(wallet.id)
        .bind(&wallet.address)
        .bind(wallet.network.as_str())
        .bind(wallet.currency.as_str())
        .bind(wallet.status.as_str())
        .bind(wallet.last_used_at)
        .bind(wallet.current_reservation)
        .bind(wallet.total_received)
        .bind(wallet.total_assigned)
        .bind(wallet.successful_transactions)
        .bind(wallet.failed_transactions)
        .bind(&wallet.label)
        .bind(&wallet.notes)
        .bind(wallet.created_at)
        .bind(wallet.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Tombstones the wallet. Writes the final snapshot when no row exists yet
    /// so an earlier insert that is still being retried lands on the tombstone.
    pub async fn delete_wallet(&self, wallet: &WalletRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
        INSERT INTO wallets(
          id, address, network, currency, status, last_used_at, current_reservation,
          total_received, total_assigned, successful_transactions, failed_transactions,
          label, notes, created_at, updated_at, deleted_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, NOW())
         ON CONFLICT (id)
         DO UPDATE SET deleted_at = COALESCE(wallets.deleted_at, NOW())
      "#,
        )
        .bind(wallet.id)
        .bind(&wallet.address)
        .bind(wallet.network.as_str())
        .bind(wallet.currency.as_str())
        .bind(wallet.status.as_str())
        .bind(wallet.last_used_at)
        .bind(wallet.current_reservation)
        .bind(wallet.total_received)
        .bind(wallet.total_assigned)
        .bind(wallet.successful_transactions)
        .bind(wallet.failed_transactions)
        .bind(&wallet.label)
        .bind(&wallet.notes)
        .bind(wallet.created_at)
        .bind(wallet.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_wallets(&self) -> Result<Vec<WalletRecord>, sqlx::Error> {
        let rows = sqlx::query_as::<_, WalletRow>(
            "SELECT * FROM wallets WHERE deleted_at IS NULL ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        decode_all(rows)
    }

    /// Highest id ever issued, tombstones included, so ids are never reused.
    pub async fn max_wallet_id(&self) -> Result<WalletId, sqlx::Error> {
        let max_id: Option<i64> = sqlx::query_scalar("SELECT MAX(id) FROM wallets")
            .fetch_one(&self.pool)
            .await?;
        Ok(max_id.unwrap_or(0))
    }

    /// Terminal outcomes are final: a stale pending write cannot reopen them.
    pub async fn upsert_reservation(&self, reservation: &Reservation) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO reservations (
                token, wallet_id, purchase_order_id, amount,
                reserved_at, expires_at, resolved_at, outcome
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (token) DO UPDATE SET
                expires_at = EXCLUDED.expires_at,
                resolved_at = EXCLUDED.resolved_at,
                outcome = EXCLUDED.outcome
            WHERE reservations.outcome = 'pending'
            "#,
        )
        .bind(reservation.token)
        .bind(reservation.wallet_id)
        .bind(reservation.purchase_order_id)
        .bind(reservation.amount)
        .bind(reservation.reserved_at)
        .bind(reservation.expires_at)
        .bind(reservation.resolved_at)
        .bind(reservation.outcome.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn load_pending_reservations(&self) -> Result<Vec<Reservation>, sqlx::Error> {
        let rows = sqlx::query_as::<_, ReservationRow>(
            "SELECT * FROM reservations WHERE outcome = 'pending' ORDER BY reserved_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        decode_all(rows)
    }

    pub async fn get_wallet_reservations(
        &self,
        wallet_id: WalletId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Reservation>, sqlx::Error> {
        let rows = sqlx::query_as::<_, ReservationRow>(
            r#"
            SELECT * FROM reservations
            WHERE wallet_id = $1
            ORDER BY reserved_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(wallet_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        decode_all(rows)
    }

    pub async fn count_wallet_reservations(&self, wallet_id: WalletId) -> Result<i64, sqlx::Error> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM reservations WHERE wallet_id = $1")
            .bind(wallet_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.get("count"))
    }

    pub async fn upsert_order(&self, order: &PurchaseOrder) -> Result<(), sqlx::Error> {
        let wallet = order.assigned_wallet.as_ref();
        sqlx::query(
            r#"
            INSERT INTO purchase_orders (
                id, user_id, package_id, amount, status,
                assigned_wallet_id, assigned_address, assigned_network, assigned_currency,
                reservation_token, payment_hash,
                created_at, hash_submitted_at, resolved_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                assigned_wallet_id = EXCLUDED.assigned_wallet_id,
                assigned_address = EXCLUDED.assigned_address,
                assigned_network = EXCLUDED.assigned_network,
                assigned_currency = EXCLUDED.assigned_currency,
                reservation_token = EXCLUDED.reservation_token,
                payment_hash = EXCLUDED.payment_hash,
                hash_submitted_at = EXCLUDED.hash_submitted_at,
                resolved_at = EXCLUDED.resolved_at,
                updated_at = EXCLUDED.updated_at
            WHERE purchase_orders.updated_at <= EXCLUDED.updated_at
            "#,
        )
        .bind(order.id)
        .bind(&order.user_id)
        .bind(&order.package_id)
        .bind(order.amount)
        .bind(order.status.as_str())
        .bind(wallet.map(|w| w.wallet_id))
        .bind(wallet.map(|w| w.address.clone()))
        .bind(wallet.map(|w| w.network.as_str()))
        .bind(wallet.map(|w| w.currency.as_str()))
        .bind(order.reservation_token)
        .bind(&order.payment_hash)
        .bind(order.created_at)
        .bind(order.hash_submitted_at)
        .bind(order.resolved_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<Option<PurchaseOrder>, sqlx::Error> {
        let row = sqlx::query_as::<_, OrderRow>("SELECT * FROM purchase_orders WHERE id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| PurchaseOrder::try_from(r).map_err(|e| sqlx::Error::Decode(Box::new(e))))
            .transpose()
    }

    pub async fn load_open_orders(&self) -> Result<Vec<PurchaseOrder>, sqlx::Error> {
        let rows = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT * FROM purchase_orders
            WHERE status IN ('pending', 'hash_submitted')
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        decode_all(rows)
    }

    /// Every payment hash ever accepted, including those of resolved orders.
    pub async fn load_payment_hashes(&self) -> Result<Vec<(String, Uuid)>, sqlx::Error> {
        sqlx::query_as::<_, (String, Uuid)>(
            r#"
            SELECT payment_hash, id FROM purchase_orders
            WHERE payment_hash IS NOT NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }

    pub async fn create_alert(
        &self,
        alert_type: &str,
        severity: &str,
        wallet_id: Option<WalletId>,
        message: &str,
        details: Option<serde_json::Value>,
    ) -> Result<i64, sqlx::Error> {
        let alert = sqlx::query(
            r#"
            INSERT INTO alerts (alert_type, severity, wallet_id, message, details)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(alert_type)
        .bind(severity)
        .bind(wallet_id)
        .bind(message)
        .bind(details)
        .fetch_one(&self.pool)
        .await?;

        Ok(alert.get("id"))
    }

    pub async fn get_active_alerts(&self, limit: i64) -> Result<Vec<Alert>, sqlx::Error> {
        let alerts = sqlx::query_as::<_, AlertRow>(
            r#"
            SELECT id, alert_type, severity, wallet_id, message, details, status, created_at
            FROM alerts
            WHERE status = 'active'
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(alerts.into_iter().map(Alert::from).collect())
    }

    pub async fn acknowledge_alert(&self, alert_id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE alerts
            SET status = 'acknowledged', acknowledged_at = NOW()
            WHERE id = $1 AND status = 'active'
            "#,
        )
        .bind(alert_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Currency, Network, WalletStatus};

    fn wallet(id: WalletId, status: WalletStatus, updated_at: DateTime<Utc>) -> WalletRecord {
        WalletRecord {
            id,
            address: format!("0x{:040x}", id),
            network: Network::Bep20,
            currency: Currency::Usdt,
            status,
            last_used_at: None,
            current_reservation: (status == WalletStatus::Reserved).then(Uuid::new_v4),
            total_received: 0,
            total_assigned: 0,
            successful_transactions: 0,
            failed_transactions: 0,
            label: None,
            notes: None,
            created_at: updated_at,
            updated_at,
        }
    }

    async fn database() -> Database {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let database = Database::new(&url, 2).await.unwrap();
        database.run_migrations().await.unwrap();
        database
    }

    #[tokio::test]
    #[ignore = "needs Postgres at DATABASE_URL"]
    async fn requeued_upsert_does_not_resurrect_removed_wallet() {
        let database = database().await;
        let id = database.max_wallet_id().await.unwrap() + 1;
        let created = Utc::now();

        // The insert failed and was requeued; the removal landed first.
        let record = wallet(id, WalletStatus::Available, created);
        database.delete_wallet(&record).await.unwrap();
        database.upsert_wallet(&record).await.unwrap();

        let live = database.load_wallets().await.unwrap();
        assert!(live.iter().all(|w| w.id != id));
        assert_eq!(database.max_wallet_id().await.unwrap(), id);
    }

    #[tokio::test]
    #[ignore = "needs Postgres at DATABASE_URL"]
    async fn delayed_release_does_not_revive_removed_wallet() {
        let database = database().await;
        let id = database.max_wallet_id().await.unwrap() + 1;
        let created = Utc::now();

        database
            .upsert_wallet(&wallet(id, WalletStatus::Reserved, created))
            .await
            .unwrap();
        // Stored row is still RESERVED when the removal arrives.
        let released = wallet(id, WalletStatus::Available, created + chrono::Duration::seconds(1));
        database.delete_wallet(&released).await.unwrap();
        database.upsert_wallet(&released).await.unwrap();

        let live = database.load_wallets().await.unwrap();
        assert!(live.iter().all(|w| w.id != id));

        // The address is free for a new wallet.
        let mut replacement = wallet(id + 1, WalletStatus::Available, Utc::now());
        replacement.address = released.address.clone();
        database.upsert_wallet(&replacement).await.unwrap();
        let live = database.load_wallets().await.unwrap();
        assert!(live.iter().any(|w| w.id == id + 1 && w.address == released.address));
    }
}
