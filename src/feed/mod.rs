//! Feed adapter for the 80.lv article listing API.
//!
//! The adapter never fails: transport and parse errors are logged and reported as an
//! empty page so the reconciler only ever sees well-formed records.

mod client;
mod parser;
mod types;

use async_trait::async_trait;
use tracing::{debug, error};

pub use self::client::{create_http_client, fetch_listing_page};
pub use self::parser::{parse_item, parse_listing};
pub use self::types::*;

use crate::article::ArticleRecord;
use crate::TARGET_WEB_REQUEST;

/// Source of canonical article records.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetches up to `limit` records from page `page` (1-based). Empty on any failure.
    async fn fetch(&self, page: usize, limit: usize) -> Vec<ArticleRecord>;
}

pub struct LvFeed {
    client: reqwest::Client,
    api_url: String,
}

impl LvFeed {
    pub fn new(api_url: impl Into<String>) -> anyhow::Result<Self> {
        Ok(Self {
            client: create_http_client()?,
            api_url: api_url.into(),
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }
}

#[async_trait]
impl FeedSource for LvFeed {
    async fn fetch(&self, page: usize, limit: usize) -> Vec<ArticleRecord> {
        let body = match fetch_listing_page(&self.client, &self.api_url, page, limit).await {
            Ok(body) => body,
            Err(err) => {
                error!(target: TARGET_WEB_REQUEST, "Failed to fetch articles: {:#}", err);
                return Vec::new();
            }
        };

        match parse_listing(&body) {
            Ok(mut records) => {
                records.truncate(limit);
                debug!(target: TARGET_WEB_REQUEST, "Parsed {} articles from {}", records.len(), self.api_url);
                records
            }
            Err(err) => {
                error!(target: TARGET_WEB_REQUEST, "Failed to parse article listing: {}", err);
                Vec::new()
            }
        }
    }
}
