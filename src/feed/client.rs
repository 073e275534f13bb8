//! HTTP client creation and request handling for the listing API.

use anyhow::{Context, Result};
use reqwest::header;
use tokio::time::timeout;
use tracing::debug;

use super::types::{REFERER, REQUEST_TIMEOUT, USER_AGENT};
use crate::TARGET_WEB_REQUEST;

pub fn create_http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .gzip(true)
        .redirect(reqwest::redirect::Policy::default())
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))
}

/// Requests one listing page and returns the raw body.
pub async fn fetch_listing_page(
    client: &reqwest::Client,
    api_url: &str,
    page: usize,
    limit: usize,
) -> Result<String> {
    let offset = page.saturating_sub(1) * limit;
    debug!(target: TARGET_WEB_REQUEST, "Requesting {} (limit={}, offset={})", api_url, limit, offset);

    let response = timeout(
        REQUEST_TIMEOUT,
        client
            .get(api_url)
            .query(&[("limit", limit), ("offset", offset)])
            .header(header::USER_AGENT, USER_AGENT)
            .header(header::REFERER, REFERER)
            .header(header::ACCEPT, "application/json")
            .send(),
    )
    .await
    .map_err(|_| {
        anyhow::anyhow!(
            "Request to {} timed out after {} seconds",
            api_url,
            REQUEST_TIMEOUT.as_secs()
        )
    })?
    .with_context(|| format!("Request to {} failed", api_url))?;

    let status = response.status();
    if status != reqwest::StatusCode::OK {
        anyhow::bail!("{} returned {}", api_url, status);
    }

    response
        .text()
        .await
        .with_context(|| format!("Failed to read response body from {}", api_url))
}
