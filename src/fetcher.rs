use anyhow::Result;
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::error::FetchError;
use crate::limiter::RateLimiter;
use crate::model::{FacilityLink, RawRecord};
use crate::parser::detail::parse_detail;
use crate::settings::{RetryPolicy, Settings};

/// Anything that can return the raw HTML of a page.
pub trait PageSource {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Loads pages through the rendering proxy (`?url=&key=&format=raw`).
pub struct ProxyFetcher {
    client: reqwest::Client,
    proxy_url: String,
    key: String,
}

#[derive(Deserialize)]
struct ProxyEnvelope {
    result: ProxyResult,
}

#[derive(Deserialize)]
struct ProxyResult {
    content: String,
}

impl ProxyFetcher {
    pub fn new(settings: &Settings) -> Result<Self> {
        let key = settings.proxy_key()?.to_string();
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .build()?;
        Ok(Self {
            client,
            proxy_url: settings.proxy_url.clone(),
            key,
        })
    }
}

impl PageSource for ProxyFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(&self.proxy_url)
            .query(&[("url", url), ("key", self.key.as_str()), ("format", "raw")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        content_from_envelope(&body)
    }
}

fn content_from_envelope(body: &str) -> Result<String, FetchError> {
    let envelope: ProxyEnvelope = serde_json::from_str(body)?;
    Ok(envelope.result.content)
}

/// Fetch a page, degrading any failure to empty content.
///
/// Empty content means "unavailable", never "page has no data".
pub async fn fetch_html(source: &impl PageSource, url: &str) -> String {
    match source.fetch(url).await {
        Ok(html) => html,
        Err(e) => {
            error!(url, error = %e, "Failed to fetch page");
            String::new()
        }
    }
}

/// Fetch and parse a facility page, retrying until its title heading reads.
///
/// After `policy.attempts()` failures the "Unknown" sentinel is returned.
pub async fn fetch_detail_page(
    source: &impl PageSource,
    limiter: &impl RateLimiter,
    policy: RetryPolicy,
    link: &FacilityLink,
    url: &str,
) -> RawRecord {
    let attempts = policy.attempts();

    for attempt in 1..=attempts {
        limiter.acquire().await;
        let html = fetch_html(source, url).await;

        match parse_detail(&html, link, url) {
            Ok(record) => {
                info!(url, attempt, name = %record.name, "Extracted details");
                return record;
            }
            Err(e) => warn!(url, attempt, attempts, error = %e, "Detail page unusable"),
        }

        if attempt < attempts {
            tokio::time::sleep(policy.retry_delay).await;
        }
    }

    error!(url, attempts, "Giving up on detail page");
    RawRecord::unavailable(link, url)
}

// ── Tests ──
