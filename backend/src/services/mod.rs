pub mod allocator;
pub mod order_machine;
pub mod persistence;
pub mod pool_monitor;
pub mod sweeper;
pub mod wallet_admin;

use std::sync::Arc;

pub use allocator::*;
pub use order_machine::*;
pub use persistence::*;
pub use wallet_admin::*;

use crate::{cache::Cache, config::Config, database::Database};

#[derive(Clone)]
pub struct AppState {
    pub database: Database,
    pub cache: Cache,
    pub config: Config,
    pub allocator: Arc<Allocator>,
    pub orders: Arc<OrderBook>,
    pub journal: Journal,
}

impl AppState {
    pub fn new(config: Config, database: Database, cache: Cache, journal: Journal) -> Self {
        let allocator = Arc::new(Allocator::new(
            AllocatorConfig::from(&config),
            journal.clone(),
        ));
        let orders = Arc::new(OrderBook::new(
            OrderBookConfig::from(&config),
            Arc::clone(&allocator),
            journal.clone(),
        ));

        Self {
            database,
            cache,
            config,
            allocator,
            orders,
            journal,
        }
    }
}
