use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{error, info};

use super::{DispatchTarget, GroupMetadata, MessagingHost};
use crate::message::RenderedItem;
use crate::TARGET_WEB_REQUEST;

const POST_MESSAGE_URL: &str = "https://slack.com/api/chat.postMessage";

/// Slack transport. Channel ids serve as groups, user ids open a direct message.
pub struct SlackHost {
    client: Client,
    token: String,
}

impl SlackHost {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            token: token.into(),
        }
    }

    async fn post_message(&self, channel: &str, text: &str, blocks: Value) -> Result<()> {
        let payload = json!({
            "channel": channel,
            "text": text,
            "blocks": blocks,
            "unfurl_links": false,
            "unfurl_media": false,
        });

        info!(target: TARGET_WEB_REQUEST, "Sending Slack notification with payload: {}", payload);
        let response = self
            .client
            .post(POST_MESSAGE_URL)
            .header("Content-Type", "application/json")
            .bearer_auth(&self.token)
            .body(payload.to_string())
            .send()
            .await
            .context("Error sending Slack notification")?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!(" !! Payload: {}", payload);
            anyhow::bail!("Error sending Slack notification: {}", error_text);
        }

        // Slack reports most failures with a 200 and `ok: false`.
        let body: Value = response.json().await.unwrap_or_default();
        if body.get("ok").and_then(Value::as_bool) == Some(false) {
            anyhow::bail!(
                "Slack rejected the message: {}",
                body.get("error").and_then(Value::as_str).unwrap_or("unknown error")
            );
        }

        info!(" ** Slack notification sent successfully");
        Ok(())
    }
}

fn item_blocks(item: &RenderedItem) -> Value {
    match item {
        RenderedItem::Card { image, url } => json!([
            { "type": "image", "image_url": image, "alt_text": url },
            { "type": "section", "text": { "type": "mrkdwn", "text": url } }
        ]),
        RenderedItem::Plain { title, url } => json!([
            {
                "type": "section",
                "text": { "type": "mrkdwn", "text": format!("*{}*\n{}", title, url) }
            }
        ]),
    }
}

#[async_trait]
impl MessagingHost for SlackHost {
    fn name(&self) -> &str {
        "slack"
    }

    fn supports_grouped(&self, _destination: &DispatchTarget) -> bool {
        false
    }

    async fn send(&self, destination: &DispatchTarget, item: &RenderedItem) -> Result<()> {
        self.post_message(destination.id(), item.url(), item_blocks(item))
            .await
    }

    async fn send_text(&self, destination: &DispatchTarget, text: &str) -> Result<()> {
        let blocks = json!([{ "type": "section", "text": { "type": "mrkdwn", "text": text } }]);
        self.post_message(destination.id(), text, blocks).await
    }

    async fn send_grouped(
        &self,
        destination: &DispatchTarget,
        _items: &[RenderedItem],
        _metadata: &GroupMetadata,
    ) -> Result<()> {
        anyhow::bail!("Slack does not support grouped messages (destination {})", destination)
    }
}
