use crate::config::Config;
use crate::db::DbPool;
use crate::integrations::Integrations;

/// Everything a request handler can reach
pub struct AppState {
    pub pool: DbPool,
    pub config: Config,
    pub integrations: Integrations,
}

impl AppState {
    pub fn new(pool: DbPool, config: Config, integrations: Integrations) -> Self {
        Self { pool, config, integrations }
    }
}
