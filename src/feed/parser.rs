//! Normalizes listing items into [`ArticleRecord`]s.

use serde_json::Value;
use tracing::debug;

use super::types::{ListingResponse, RawArticle};
use crate::article::{normalize_id, ArticleRecord};
use crate::TARGET_WEB_REQUEST;

/// Parses a listing body, dropping every item that lacks an id or slug.
pub fn parse_listing(body: &str) -> anyhow::Result<Vec<ArticleRecord>> {
    let listing: ListingResponse = serde_json::from_str(body)?;
    Ok(listing.items.into_iter().filter_map(parse_item).collect())
}

pub fn parse_item(item: Value) -> Option<ArticleRecord> {
    let raw: RawArticle = match serde_json::from_value(item) {
        Ok(raw) => raw,
        Err(err) => {
            debug!(target: TARGET_WEB_REQUEST, "Skipping malformed listing item: {}", err);
            return None;
        }
    };

    let id = normalize_id(&raw.id)?;
    let slug = raw.slug.filter(|s| !s.trim().is_empty())?;

    let thumbnail = image_url(&raw.image, &["original"])
        .or_else(|| image_url(&raw.preview, &["original"]))
        .or_else(|| image_url(&raw.image, &["src2x", "src"]))
        .unwrap_or_default();

    let (author, author_avatar) = match raw.author.as_object() {
        Some(author) => (
            author
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("Unknown")
                .to_string(),
            author
                .get("avatar")
                .and_then(|avatar| image_url(avatar, &["original", "src2x", "src"]))
                .unwrap_or_default(),
        ),
        None => ("Unknown".to_string(), String::new()),
    };

    let categories = raw
        .tags
        .as_array()
        .map(|tags| {
            tags.iter()
                .filter_map(|tag| tag.get("name").and_then(Value::as_str))
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let date = match raw.date {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    };

    Some(ArticleRecord {
        id,
        title: raw.title.unwrap_or_default(),
        slug,
        author,
        author_avatar,
        date,
        thumbnail,
        excerpt: raw.description.unwrap_or_default(),
        categories,
    })
}

/// First non-empty string among `keys` of an image object.
fn image_url(image: &Value, keys: &[&str]) -> Option<String> {
    let image = image.as_object()?;
    keys.iter()
        .filter_map(|key| image.get(*key).and_then(Value::as_str))
        .find(|url| !url.is_empty())
        .map(str::to_string)
}
