//! Chat transports that deliver rendered articles.

mod onebot;
mod slack;

use anyhow::Result;
use async_trait::async_trait;
use std::fmt;

pub use self::onebot::OneBotHost;
pub use self::slack::SlackHost;

use crate::message::RenderedItem;

/// A configured or originating destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DispatchTarget {
    Group(String),
    User(String),
}

impl DispatchTarget {
    pub fn id(&self) -> &str {
        match self {
            DispatchTarget::Group(id) | DispatchTarget::User(id) => id,
        }
    }
}

impl fmt::Display for DispatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchTarget::Group(id) => write!(f, "group:{}", id),
            DispatchTarget::User(id) => write!(f, "user:{}", id),
        }
    }
}

/// Header shown on a grouped (forwarded) message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMetadata {
    pub news: String,
    pub prompt: String,
    pub summary: String,
    pub source: String,
}

impl GroupMetadata {
    pub fn for_batch(count: usize) -> Self {
        Self {
            news: format!("{} new articles in this push", count),
            prompt: "Never stop learning".to_string(),
            summary: "80.lv: exclusive insights from game studios".to_string(),
            source: "New on 80.lv".to_string(),
        }
    }
}

/// Send primitives of a chat platform.
#[async_trait]
pub trait MessagingHost: Send + Sync {
    fn name(&self) -> &str;

    /// Whether [`MessagingHost::send_grouped`] works for this destination.
    fn supports_grouped(&self, destination: &DispatchTarget) -> bool;

    async fn send(&self, destination: &DispatchTarget, item: &RenderedItem) -> Result<()>;

    async fn send_text(&self, destination: &DispatchTarget, text: &str) -> Result<()>;

    /// Delivers every item as one grouped message.
    async fn send_grouped(
        &self,
        destination: &DispatchTarget,
        items: &[RenderedItem],
        metadata: &GroupMetadata,
    ) -> Result<()>;
}
