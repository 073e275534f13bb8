//! OneBot v11 HTTP API transport (NapCat, Lagrange, go-cqhttp).

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{DispatchTarget, GroupMetadata, MessagingHost};
use crate::message::{RenderedItem, Segment};
use crate::TARGET_WEB_REQUEST;

#[derive(Debug, Deserialize)]
struct ActionResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    retcode: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Value,
}

pub struct OneBotHost {
    client: reqwest::Client,
    api_url: String,
    access_token: Option<String>,
}

impl OneBotHost {
    pub fn new(api_url: impl Into<String>, access_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            access_token,
        }
    }

    /// Calls one API action and returns its `data` payload.
    pub async fn call_action(&self, action: &str, payload: Value) -> Result<Value> {
        let url = format!("{}/{}", self.api_url, action);
        debug!(target: TARGET_WEB_REQUEST, "OneBot {} with payload: {}", action, payload);

        let mut request = self.client.post(&url).json(&payload);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("OneBot action {} failed", action))?;
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("OneBot action {} returned {}: {}", action, status, error_text);
        }

        let body: ActionResponse = response
            .json()
            .await
            .with_context(|| format!("OneBot action {} returned an unreadable body", action))?;
        if body.retcode != 0 || (body.status != "ok" && body.status != "async") {
            anyhow::bail!(
                "OneBot action {} rejected (status={}, retcode={}): {}",
                action,
                body.status,
                body.retcode,
                body.message.unwrap_or_default()
            );
        }
        Ok(body.data)
    }

    async fn send_segments(&self, destination: &DispatchTarget, segments: Vec<Segment>) -> Result<()> {
        let (action, payload) = match destination {
            DispatchTarget::Group(id) => (
                "send_group_msg",
                json!({ "group_id": id_value(id), "message": segments }),
            ),
            DispatchTarget::User(id) => (
                "send_private_msg",
                json!({ "user_id": id_value(id), "message": segments }),
            ),
        };
        self.call_action(action, payload).await?;
        Ok(())
    }
}

/// OneBot implementations expect numeric ids as JSON numbers.
fn id_value(id: &str) -> Value {
    id.parse::<i64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::from(id))
}

fn forward_payload(items: &[RenderedItem], metadata: &GroupMetadata) -> Value {
    let messages: Vec<Value> = items
        .iter()
        .map(|item| json!({ "type": "node", "data": { "content": item.segments() } }))
        .collect();
    json!({
        "messages": messages,
        "news": [{ "text": metadata.news }],
        "prompt": metadata.prompt,
        "summary": metadata.summary,
        "source": metadata.source,
    })
}

#[async_trait]
impl MessagingHost for OneBotHost {
    fn name(&self) -> &str {
        "onebot"
    }

    fn supports_grouped(&self, _destination: &DispatchTarget) -> bool {
        true
    }

    async fn send(&self, destination: &DispatchTarget, item: &RenderedItem) -> Result<()> {
        self.send_segments(destination, item.segments()).await
    }

    async fn send_text(&self, destination: &DispatchTarget, text: &str) -> Result<()> {
        self.send_segments(
            destination,
            vec![Segment::Text {
                text: text.to_string(),
            }],
        )
        .await
    }

    async fn send_grouped(
        &self,
        destination: &DispatchTarget,
        items: &[RenderedItem],
        metadata: &GroupMetadata,
    ) -> Result<()> {
        let mut payload = forward_payload(items, metadata);
        let action = match destination {
            DispatchTarget::Group(id) => {
                payload["group_id"] = id_value(id);
                "send_group_forward_msg"
            }
            DispatchTarget::User(id) => {
                payload["user_id"] = id_value(id);
                "send_private_forward_msg"
            }
        };
        self.call_action(action, payload).await?;
        info!(target: TARGET_WEB_REQUEST, "Forwarded {} articles to {}", items.len(), destination);
        Ok(())
    }
}
