mod fetch;
mod relay;
mod rewrite;

pub use fetch::FeedFetcher;
pub use relay::ProxyRelay;
pub use rewrite::RewriteService;
