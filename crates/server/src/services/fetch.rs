use std::time::Duration;

use feedxml::XmlElement;
use reqwest::Client;

use crate::config::{FeedDescriptor, FetchStrategy};
use crate::error::{AppError, AppResult};

/// Fetches a source feed and bounds it to the descriptor's limits,
/// returning a parsed, well-formed document whichever strategy ran.
pub struct FeedFetcher {
    client: Client,
}

impl FeedFetcher {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client })
    }

    pub async fn fetch_and_bound(&self, descriptor: &FeedDescriptor) -> AppResult<XmlElement> {
        match descriptor.strategy {
            FetchStrategy::Full => self.fetch_full(descriptor).await,
            FetchStrategy::TextTruncate => self.fetch_text_bounded(descriptor).await,
            FetchStrategy::StreamTruncate => self.fetch_stream_bounded(descriptor).await,
        }
    }

    async fn get(&self, descriptor: &FeedDescriptor) -> AppResult<reqwest::Response> {
        let response = self.client.get(&descriptor.url).send().await?;
        let status = response.status();
        tracing::debug!(feed = %descriptor.id, %status, "fetched source feed");

        if !status.is_success() {
            return Err(AppError::UpstreamFetch(format!(
                "HTTP {} from {}",
                status, descriptor.url
            )));
        }
        Ok(response)
    }

    /// Buffer the whole response, parse it, and drop surplus items from the
    /// tree. Always structurally valid since the cut works on parsed nodes.
    async fn fetch_full(&self, descriptor: &FeedDescriptor) -> AppResult<XmlElement> {
        let response = self.get(descriptor).await?;
        let bytes = response.bytes().await?;
        let root = feedxml::parse_document(&bytes)?;
        Ok(feedxml::bound_items(&root, descriptor.max_items))
    }

    /// Read up to `max_bytes`, cut the raw text after the `max_items`-th
    /// item close-tag, and re-parse. When the budget truncated the read
    /// before that many items arrived, fall back to the last complete item.
    async fn fetch_text_bounded(&self, descriptor: &FeedDescriptor) -> AppResult<XmlElement> {
        let response = self.get(descriptor).await?;
        let (text, hit_budget) = read_up_to(response, descriptor.max_bytes).await?;

        let bounded = match feedxml::cut_at_item_count(&text, descriptor.max_items) {
            Some(cut) => cut,
            None if hit_budget => feedxml::cut_at_last_item(&text).ok_or_else(|| {
                AppError::MalformedFeed(format!(
                    "no complete item within the first {} bytes of {}",
                    descriptor.max_bytes, descriptor.url
                ))
            })?,
            // Complete document with fewer items than the cap.
            None => text,
        };

        Ok(feedxml::parse_document(bounded.as_bytes())?)
    }

    /// Read chunks until the byte budget is exhausted, then cut at the last
    /// complete item in the prefix. The item count is bounded only by how
    /// many complete items fit the budget, not by `max_items`.
    async fn fetch_stream_bounded(&self, descriptor: &FeedDescriptor) -> AppResult<XmlElement> {
        let response = self.get(descriptor).await?;
        let (text, hit_budget) = read_up_to(response, descriptor.max_bytes).await?;

        let bounded = if hit_budget {
            feedxml::cut_at_last_item(&text).ok_or_else(|| {
                AppError::MalformedFeed(format!(
                    "no complete item within the first {} bytes of {}",
                    descriptor.max_bytes, descriptor.url
                ))
            })?
        } else {
            // The budget outlasted the feed; nothing to cut.
            text
        };

        Ok(feedxml::parse_document(bounded.as_bytes())?)
    }
}

/// Pull the response body chunk by chunk until `budget` bytes are buffered
/// or the stream ends. Returns the (possibly budget-cut) text and whether
/// the budget was the reason reading stopped.
async fn read_up_to(mut response: reqwest::Response, budget: usize) -> AppResult<(String, bool)> {
    let mut buf: Vec<u8> = Vec::new();
    let mut hit_budget = false;

    while let Some(chunk) = response.chunk().await? {
        buf.extend_from_slice(&chunk);
        if buf.len() >= budget {
            buf.truncate(budget);
            hit_budget = true;
            break;
        }
    }

    Ok((String::from_utf8_lossy(&buf).into_owned(), hit_budget))
}
