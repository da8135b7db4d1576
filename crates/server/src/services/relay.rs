use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Response};
use futures::StreamExt;
use reqwest::{redirect, Client};
use url::Url;

use crate::error::{AppError, AppResult};

/// Upper bound on manually-followed redirect hops. Upstream chains longer
/// than this are treated as an upstream failure rather than followed
/// forever.
const MAX_REDIRECT_HOPS: usize = 8;

/// Streams an allowlisted upstream resource back to the caller, following
/// redirects by hand so the `Referer` header can be updated per hop.
pub struct ProxyRelay {
    client: Client,
}

impl ProxyRelay {
    pub fn new() -> Result<Self, reqwest::Error> {
        // Redirects are followed manually in `stream`, never by the client.
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .connect_timeout(Duration::from_secs(20))
            .timeout(Duration::from_secs(600))
            .build()?;
        Ok(Self { client })
    }

    /// Fetch `target` with the caller's headers (minus hop-specific ones)
    /// and stream the final response body without buffering it.
    ///
    /// A 3xx response with a `Location` header is never returned: the
    /// request is re-issued against the redirect target with `Referer` set
    /// to the previous URL, until a non-redirect response arrives, the
    /// `Location` header is missing (that response is returned as-is), or
    /// the hop cap trips.
    pub async fn stream(&self, target: &str, inbound: &HeaderMap) -> AppResult<Response<Body>> {
        let mut url = Url::parse(target)
            .map_err(|e| AppError::BadRequest(format!("invalid proxy target: {}", e)))?;
        let mut headers = upstream_request_headers(inbound);
        let mut hops = 0usize;

        loop {
            let response = self
                .client
                .get(url.clone())
                .headers(headers.clone())
                .send()
                .await?;
            let status = response.status();

            if !status.is_redirection() {
                tracing::debug!(%url, %status, hops, "relaying upstream response");
                return Ok(streamed_response(response));
            }

            let location = response
                .headers()
                .get(header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let Some(location) = location else {
                // Redirect status without a target; nothing left to chase.
                return Ok(streamed_response(response));
            };

            hops += 1;
            if hops > MAX_REDIRECT_HOPS {
                return Err(AppError::UpstreamFetch(format!(
                    "redirect chain from {} exceeded {} hops",
                    target, MAX_REDIRECT_HOPS
                )));
            }

            let next = resolve_location(&url, &location)?;
            tracing::debug!(from = %url, to = %next, "following upstream redirect");
            let referer = HeaderValue::from_str(url.as_str())
                .map_err(|e| AppError::Internal(format!("invalid referer value: {}", e)))?;
            headers.insert(header::REFERER, referer);
            url = next;
        }
    }
}

/// The headers forwarded upstream: everything the caller sent except
/// `Host` and hop-by-hop framing headers, which belong to each connection.
fn upstream_request_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in inbound {
        if name == header::HOST
            || name == header::CONNECTION
            || name == header::CONTENT_LENGTH
            || name == header::TRANSFER_ENCODING
        {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Resolve a `Location` value against the URL that produced it; relative
/// redirects are joined onto the current URL.
fn resolve_location(current: &Url, location: &str) -> AppResult<Url> {
    Url::parse(location)
        .or_else(|_| current.join(location))
        .map_err(|e| {
            AppError::UpstreamFetch(format!("invalid redirect target '{}': {}", location, e))
        })
}

/// Hand the upstream response to the caller: status and headers preserved,
/// body streamed chunk by chunk.
fn streamed_response(response: reqwest::Response) -> Response<Body> {
    let status = response.status();
    let mut headers = response.headers().clone();
    // Framing is renegotiated on our side of the connection.
    headers.remove(header::TRANSFER_ENCODING);
    headers.remove(header::CONNECTION);

    let stream = response
        .bytes_stream()
        .map(|chunk| chunk.map_err(std::io::Error::other));

    let mut out = Response::new(Body::from_stream(stream));
    *out.status_mut() = status;
    *out.headers_mut() = headers;
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_headers_drop_hop_specific() {
        let mut inbound = HeaderMap::new();
        inbound.insert(header::HOST, HeaderValue::from_static("gate.example"));
        inbound.insert(header::USER_AGENT, HeaderValue::from_static("podcatcher/1.0"));
        inbound.insert(header::RANGE, HeaderValue::from_static("bytes=0-1023"));
        inbound.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));

        let out = upstream_request_headers(&inbound);
        assert!(out.get(header::HOST).is_none());
        assert!(out.get(header::CONNECTION).is_none());
        assert_eq!(
            out.get(header::USER_AGENT).unwrap(),
            "podcatcher/1.0"
        );
        assert_eq!(out.get(header::RANGE).unwrap(), "bytes=0-1023");
    }

    #[test]
    fn test_resolve_location_absolute() {
        let current = Url::parse("https://cdn.example/a.mp3").unwrap();
        let next = resolve_location(&current, "https://other.example/b.mp3").unwrap();
        assert_eq!(next.as_str(), "https://other.example/b.mp3");
    }

    #[test]
    fn test_resolve_location_relative() {
        let current = Url::parse("https://cdn.example/media/a.mp3").unwrap();
        assert_eq!(
            resolve_location(&current, "/files/b.mp3").unwrap().as_str(),
            "https://cdn.example/files/b.mp3"
        );
        assert_eq!(
            resolve_location(&current, "b.mp3").unwrap().as_str(),
            "https://cdn.example/media/b.mp3"
        );
    }
}
