//! Render adapter: turns an article into a card image via an HTML-to-image service.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::article::ArticleRecord;
use crate::config::DisplaySettings;
use crate::TARGET_WEB_REQUEST;

pub const CARD_TEMPLATE: &str = include_str!("../templates/card.html");

/// Values substituted into the card template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardData {
    pub title: String,
    pub image: String,
    pub author: String,
    pub author_avatar: String,
    pub excerpt: String,
    pub date: String,
    pub categories: Vec<String>,
}

impl CardData {
    pub fn from_record(article: &ArticleRecord, display: &DisplaySettings) -> Self {
        let title = if article.title.is_empty() {
            "No Title".to_string()
        } else {
            article.title.clone()
        };
        let author = if article.author.is_empty() {
            "80.lv".to_string()
        } else {
            article.author.clone()
        };

        Self {
            title,
            image: if display.show_thumbnail {
                article.thumbnail.clone()
            } else {
                String::new()
            },
            author: if display.show_author { author } else { String::new() },
            author_avatar: if display.show_author {
                article.author_avatar.clone()
            } else {
                String::new()
            },
            excerpt: if display.show_excerpt {
                article.excerpt.trim().to_string()
            } else {
                String::new()
            },
            date: format_date(&article.date),
            categories: article.categories.clone(),
        }
    }
}

/// Rewrites dates like `29 December 2025` as `2025-12-29`; anything else passes through.
pub fn format_date(raw: &str) -> String {
    NaiveDate::parse_from_str(raw.trim(), "%d %B %Y")
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

#[async_trait]
pub trait Renderer: Send + Sync {
    /// Returns a URL (or other handle the messaging host accepts) for the rendered image.
    async fn render(&self, card: &CardData) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: Option<String>,
    data: Option<GenerateData>,
}

#[derive(Debug, Deserialize)]
struct GenerateData {
    id: String,
}

/// Client of a text-to-image service exposing `POST /text2img/generate`.
pub struct HtmlRenderer {
    client: reqwest::Client,
    endpoint: String,
    template: String,
}

impl HtmlRenderer {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            template: CARD_TEMPLATE.to_string(),
        }
    }
}

#[async_trait]
impl Renderer for HtmlRenderer {
    async fn render(&self, card: &CardData) -> Result<String> {
        let url = format!("{}/text2img/generate", self.endpoint);
        let payload = json!({
            "tmpl": self.template,
            "tmpldata": card,
            "json": true,
            "options": { "full_page": true, "type": "jpeg", "quality": 85 },
        });

        debug!(target: TARGET_WEB_REQUEST, "Rendering card for {:?}", card.title);
        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("Render request to {} failed", url))?;
        if !response.status().is_success() {
            anyhow::bail!("Render service returned {}", response.status());
        }

        let body: GenerateResponse = response
            .json()
            .await
            .context("Render service returned an unreadable body")?;
        match body.data {
            Some(data) if body.code == 0 => {
                Ok(format!("{}/text2img/data/{}", self.endpoint, data.id))
            }
            _ => anyhow::bail!(
                "Render service rejected the card (code {}): {}",
                body.code,
                body.message.unwrap_or_default()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    fn record() -> ArticleRecord {
        ArticleRecord {
            id: "1".to_string(),
            slug: "s".to_string(),
            title: "Lighting a Ruined Temple".to_string(),
            author: "Sam".to_string(),
            author_avatar: "https://cdn/avatar.png".to_string(),
            thumbnail: "https://cdn/cover.png".to_string(),
            excerpt: "  An environment breakdown.  ".to_string(),
            date: "29 December 2025".to_string(),
            categories: vec!["Environment Art".to_string()],
        }
    }

    #[test]
    fn test_format_date() {
        assert_eq!(format_date("29 December 2025"), "2025-12-29");
        assert_eq!(format_date(" 3 March 2024 "), "2024-03-03");
        assert_eq!(format_date("yesterday"), "yesterday");
        assert_eq!(format_date(""), "");
    }

    #[test]
    fn test_card_defaults_for_missing_fields() {
        let mut display = Settings::default().display;
        display.show_author = true;
        let card = CardData::from_record(
            &ArticleRecord {
                id: "1".to_string(),
                slug: "s".to_string(),
                ..Default::default()
            },
            &display,
        );
        assert_eq!(card.title, "No Title");
        assert_eq!(card.author, "80.lv");
    }

    #[test]
    fn test_display_toggles_blank_fields() {
        let mut display = Settings::default().display;
        display.show_excerpt = true;
        display.show_author = true;
        let full = CardData::from_record(&record(), &display);
        assert_eq!(full.image, "https://cdn/cover.png");
        assert_eq!(full.excerpt, "An environment breakdown.");
        assert_eq!(full.date, "2025-12-29");

        display.show_thumbnail = false;
        display.show_excerpt = false;
        display.show_author = false;
        let bare = CardData::from_record(&record(), &display);
        assert_eq!(bare.image, "");
        assert_eq!(bare.excerpt, "");
        assert_eq!(bare.author, "");
        assert_eq!(bare.author_avatar, "");
        assert_eq!(bare.title, "Lighting a Ruined Temple");
    }

    #[test]
    fn test_template_references_every_card_field() {
        for field in ["title", "image", "author", "author_avatar", "excerpt", "date", "categories"] {
            assert!(CARD_TEMPLATE.contains(field), "template is missing {}", field);
        }
    }
}
