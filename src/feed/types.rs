//! Type definitions and constants for the listing API.

use serde::Deserialize;
use serde_json::Value;
use tokio::time::Duration;

pub const DEFAULT_API_URL: &str = "https://80.lv/api/articles/list";
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
pub const REFERER: &str = "https://80.lv/";

/// Top-level listing response.
#[derive(Debug, Default, Deserialize)]
pub struct ListingResponse {
    #[serde(default)]
    pub items: Vec<Value>,
}

/// One listing item. Nested objects stay as raw JSON because the API is loose about their
/// shape; [`super::parser`] walks them defensively.
#[derive(Debug, Default, Deserialize)]
pub struct RawArticle {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub date: Value,
    #[serde(default)]
    pub image: Value,
    #[serde(default)]
    pub preview: Value,
    #[serde(default)]
    pub author: Value,
    #[serde(default)]
    pub tags: Value,
}
