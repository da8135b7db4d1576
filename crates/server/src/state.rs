use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::Config;
use crate::services::{FeedFetcher, ProxyRelay, RewriteService};
use crate::token::TokenCodec;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<Config>,
    pub codec: TokenCodec,
    pub fetcher: Arc<FeedFetcher>,
    pub rewriter: Arc<RewriteService>,
    pub relay: Arc<ProxyRelay>,
}

impl AppState {
    pub fn new(db: SqlitePool, config: Config) -> Result<Self, reqwest::Error> {
        let config = Arc::new(config);
        let codec = TokenCodec::new(config.token_key.as_bytes());

        let fetcher = Arc::new(FeedFetcher::new()?);
        let rewriter = Arc::new(RewriteService::new(
            db.clone(),
            codec.clone(),
            config.base_url.clone(),
        ));
        let relay = Arc::new(ProxyRelay::new()?);

        Ok(Self {
            db,
            config,
            codec,
            fetcher,
            rewriter,
            relay,
        })
    }
}
