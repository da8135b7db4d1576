use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, Response},
    response::IntoResponse,
};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::repositories::AllowlistRepository;
use crate::state::AppState;

const FEED_CONTENT_TYPE: &str = "application/xml; charset=utf-8";

/// Query parameters accepted on the single-segment route. Feed requests
/// use `items`/`maxsize`, proxy requests use `pp`/`en`.
#[derive(Debug, Default, Deserialize)]
pub struct SlugQuery {
    pub pp: Option<String>,
    pub en: Option<String>,
    pub items: Option<usize>,
    pub maxsize: Option<usize>,
}

pub async fn healthz() -> &'static str {
    "ok"
}

pub async fn dispatch(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<SlugQuery>,
    headers: HeaderMap,
) -> AppResult<Response<Body>> {
    if is_proxy_slug(&slug) {
        relay_media(state, query, headers).await
    } else {
        serve_feed(state, &slug, query).await
    }
}

/// Proxy links come in as `/proxy`, `/proxy.{ext}` or `/proxy_{slug}.{ext}`;
/// the suffix is decorative, only the query parameters route.
fn is_proxy_slug(slug: &str) -> bool {
    slug == "proxy" || slug.starts_with("proxy.") || slug.starts_with("proxy_")
}

/// Fetch a configured feed, bound it, normalize Atom input, rewrite media
/// references through the proxy, and return the serialized XML.
async fn serve_feed(state: AppState, slug: &str, query: SlugQuery) -> AppResult<Response<Body>> {
    let feed_id = slug
        .strip_suffix(".xml")
        .or_else(|| slug.strip_suffix(".rss"))
        .unwrap_or(slug);

    let Some(mut descriptor) = state.config.feed(feed_id) else {
        return Err(AppError::UnknownFeed {
            requested: feed_id.to_string(),
            available: state.config.feed_ids(),
        });
    };
    if let Some(items) = query.items {
        descriptor.max_items = items;
    }
    if let Some(maxsize) = query.maxsize {
        descriptor.max_bytes = maxsize;
    }
    tracing::info!(
        feed = %descriptor.id,
        strategy = ?descriptor.strategy,
        max_items = descriptor.max_items,
        "serving feed"
    );

    let mut root = state.fetcher.fetch_and_bound(&descriptor).await?;
    if feedxml::is_atom(&root) {
        root = feedxml::atom_to_rss(&root);
    }
    state
        .rewriter
        .rewrite_document(&mut root, &descriptor.url)
        .await?;
    let body = feedxml::serialize_document(&root)?;

    Ok((
        [(header::CONTENT_TYPE, FEED_CONTENT_TYPE)],
        body,
    )
        .into_response())
}

/// Stream an allowlisted upstream resource. The allowlist check runs
/// before anything touches the network; an unknown pair is rejected
/// without an upstream fetch.
async fn relay_media(
    state: AppState,
    query: SlugQuery,
    headers: HeaderMap,
) -> AppResult<Response<Body>> {
    let (pp, en) = match (query.pp, query.en) {
        (Some(pp), Some(en)) => (pp, en),
        _ => {
            return Err(AppError::BadRequest(
                "missing pp/en query parameters".to_string(),
            ))
        }
    };

    if !AllowlistRepository::is_allowed(&state.db, &pp, &en).await? {
        tracing::warn!("rejected proxy request for unregistered target");
        return Err(AppError::UnauthorizedProxyTarget);
    }

    let target = state.codec.decode(&en)?;
    state.relay.stream(&target, &headers).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_slug_detection() {
        assert!(is_proxy_slug("proxy"));
        assert!(is_proxy_slug("proxy.mp3"));
        assert!(is_proxy_slug("proxy_hello-world.jpg"));
        // Feed ids that merely start with the word stay feeds.
        assert!(!is_proxy_slug("proxyfeed"));
        assert!(!is_proxy_slug("verge"));
    }
}
