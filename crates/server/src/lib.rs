pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod repositories;
pub mod services;
pub mod state;
pub mod token;

use std::net::SocketAddr;

pub use api::create_router;
pub use config::{default_data_path, Config, FeedDescriptor, FetchStrategy};
pub use db::{create_pool, DatabaseError};
pub use error::{AppError, AppResult};
pub use state::AppState;
pub use token::TokenCodec;

pub async fn run_server(addr: SocketAddr, data_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(data_path).await?;

    if config.feeds.is_empty() {
        tracing::warn!(
            "no feeds configured in {}",
            config.config_path().display()
        );
    } else {
        tracing::info!(
            "serving {} feed(s): {}",
            config.feeds.len(),
            config.feed_ids().join(", ")
        );
    }

    let pool = create_pool(&config.database_url).await?;
    let state = AppState::new(pool, config)?;
    let app = create_router(state);

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
