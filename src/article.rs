//! The canonical article record shared by every stage of the pipeline.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const ARTICLE_BASE_URL: &str = "https://80.lv/articles";

/// One article as returned by the listing API, normalized.
///
/// The field names match the persisted known-articles document, so logs written by
/// earlier versions load unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArticleRecord {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default, deserialize_with = "deserialize_lossy_string")]
    pub title: String,
    #[serde(default, deserialize_with = "deserialize_lossy_string")]
    pub slug: String,
    #[serde(default, deserialize_with = "deserialize_lossy_string")]
    pub author: String,
    #[serde(default, deserialize_with = "deserialize_lossy_string")]
    pub author_avatar: String,
    #[serde(default, deserialize_with = "deserialize_lossy_string")]
    pub date: String,
    #[serde(default, deserialize_with = "deserialize_lossy_string")]
    pub thumbnail: String,
    #[serde(default, deserialize_with = "deserialize_lossy_string")]
    pub excerpt: String,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub categories: Vec<String>,
}

impl ArticleRecord {
    /// Records without an id or slug never enter the pipeline.
    pub fn is_valid(&self) -> bool {
        !self.id.is_empty() && !self.slug.is_empty()
    }

    pub fn url(&self) -> String {
        build_article_url(&self.slug)
    }
}

pub fn build_article_url(slug: &str) -> String {
    format!("{}/{}", ARTICLE_BASE_URL, slug)
}

/// Normalizes an identifier that the source may send as a number or a string.
///
/// Returns `None` for anything that cannot serve as an identity (null, empty string,
/// objects, arrays, booleans).
pub fn normalize_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    normalize_id(&value).ok_or_else(|| serde::de::Error::custom("article id must be a string or number"))
}

// Older documents stored `null` for fields the API left out.
fn deserialize_lossy_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn deserialize_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
