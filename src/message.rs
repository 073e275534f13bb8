//! Postable artifacts produced per article.

use serde::Serialize;

/// One piece of a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Segment {
    Image { file: String },
    Text { text: String },
}

/// A rendered article ready for delivery. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderedItem {
    /// Rendered card image plus the canonical article link.
    Card { image: String, url: String },
    /// Fallback used when rendering failed.
    Plain { title: String, url: String },
}

impl RenderedItem {
    pub fn url(&self) -> &str {
        match self {
            RenderedItem::Card { url, .. } | RenderedItem::Plain { url, .. } => url,
        }
    }

    pub fn segments(&self) -> Vec<Segment> {
        match self {
            RenderedItem::Card { image, url } => vec![
                Segment::Image {
                    file: image.clone(),
                },
                Segment::Text { text: url.clone() },
            ],
            RenderedItem::Plain { title, url } => vec![Segment::Text {
                text: format!("{}\n{}", title, url),
            }],
        }
    }
}
