//! # Wallet Pool Backend Server
//!
//! Entry point for the USDT license payment backend. Every purchase order is
//! bound to one receiving wallet from a shared pool; the pool guarantees that
//! no two pending purchases share a wallet, rotates wallets least-recently-used
//! first, and reclaims wallets from stalled purchases.
//!
//! ## Architecture
//!
//! 1. **Configuration**: environment variables via `Config::from_env()`
//! 2. **Database**: PostgreSQL with migrations, written behind memory
//! 3. **Allocator**: restored from the database before serving traffic
//! 4. **Background Services**:
//!    - Persistence writer draining the journal
//!    - Reservation sweeper
//!    - Pool monitor for integrity checks, gauges and alerts
//! 5. **HTTP Server**: Actix-web with CORS, logging, compression
//!
//! ## API Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /metrics` - Prometheus metrics
//! - `/api/v1/orders/*` - Purchase orders
//! - `/api/v1/admin/*` - Wallet administration, pool stats, alerts

use actix_cors::Cors;
use actix_web::{dev::Service, middleware, web, App, HttpServer};
use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod cache;
mod config;
mod database;
mod monitoring;
mod services;

use config::Config;

use crate::{
    cache::Cache,
    database::Database,
    monitoring::metrics,
    services::{persistence, pool_monitor, sweeper, Journal},
};

/// Startup order matters: the allocator must be restored from the database
/// before the sweeper runs or any request is accepted.
#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(" Starting Wallet Pool Backend");

    dotenv::dotenv().ok();

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(
        " Configuration loaded (reservation TTL {:?}, sweep every {}s)",
        config.reservation_ttl(),
        config.sweep_interval_seconds
    );

    let database = Database::new(&config.database_url, config.max_db_connections)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("  Database connected");
    database
        .run_migrations()
        .await
        .context("Failed to run migrations")?;
    tracing::info!(" Database migrations completed");

    let cache = Cache::new(20_000);
    let (journal, journal_receiver) = Journal::channel();
    let app_state = web::Data::new(services::AppState::new(
        config.clone(),
        database.clone(),
        cache,
        journal.clone(),
    ));

    // Restore in-memory state before anything can reserve.
    let wallets = database.load_wallets().await.context("Failed to load wallets")?;
    let pending = database
        .load_pending_reservations()
        .await
        .context("Failed to load pending reservations")?;
    let report = app_state.allocator.restore(wallets, pending);
    let max_wallet_id = database
        .max_wallet_id()
        .await
        .context("Failed to read wallet id sequence")?;
    app_state.allocator.skip_wallet_ids_through(max_wallet_id);
    if !report.orphans.is_empty() {
        tracing::error!(
            "{} orphaned wallets held out of rotation: {:?}",
            report.orphans.len(),
            report.orphans
        );
    }
    let open_orders = database
        .load_open_orders()
        .await
        .context("Failed to load open orders")?;
    let payment_hashes = database
        .load_payment_hashes()
        .await
        .context("Failed to load payment hashes")?;
    app_state.orders.restore(open_orders, payment_hashes);
    tracing::info!(" Pool restored: {} wallets, {} pending", report.wallets, report.pending);

    // Persistence writer - drains the journal into Postgres
    let max_attempts = config.persist_max_attempts;
    tokio::spawn(persistence::run_persistence_writer(
        database.clone(),
        journal,
        journal_receiver,
        max_attempts,
    ));

    // Reservation sweeper - expires overdue reservations
    let sweeper_state = app_state.clone();
    tokio::spawn(async move {
        sweeper::run_sweeper(sweeper_state).await;
    });

    // Pool monitor - integrity checks, gauges and alerts
    let monitor_state = app_state.clone();
    tokio::spawn(async move {
        pool_monitor::run_monitor(monitor_state).await;
    });
    tracing::info!(" Background services started (writer, sweeper, monitor)");

    let bind_address = format!("{}:{}", config.host, config.port);
    tracing::info!(" Server listening on http://{}", bind_address);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(app_state.clone())
            .wrap_fn(|req, srv| {
                metrics::increment_api_requests();
                srv.call(req)
            })
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .wrap(tracing_actix_web::TracingLogger::default())
            .wrap(cors)
            .route("/health", web::get().to(api::health::health_check))
            .route("/metrics", web::get().to(metrics::metrics))
            .service(
                web::scope("/api/v1")
                    .configure(api::orders::configure)
                    .configure(api::wallets::configure),
            )
    })
    .workers(num_cpus::get() * 2)
    .bind(&bind_address)
    .with_context(|| format!("Failed to bind {}", bind_address))?
    .run()
    .await
    .context("HTTP server error")
}
