pub mod auth;
pub mod config;
pub mod db;
pub mod ledger;
pub mod mail;
pub mod models;
pub mod money;
pub mod prices;
pub mod routes;
pub mod scheduler;

use std::sync::Arc;

use sqlx::PgPool;

use config::Config;
use mail::MailService;
use prices::PriceFeed;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub jwt_secret: String,
    pub mail: MailService,
    pub prices: PriceFeed,
    pub admin_emails: Arc<Vec<String>>,
    /// Enables `/auth/dev-login`
    pub dev_mode: bool,
}

impl AppState {
    pub fn new(pool: PgPool, config: &Config, mail: MailService) -> Self {
        Self {
            pool,
            jwt_secret: config.jwt_secret.clone(),
            mail,
            prices: PriceFeed::simulated(config.price_jitter_bps),
            admin_emails: Arc::new(config.admin_emails.clone()),
            dev_mode: config.is_development(),
        }
    }
}
