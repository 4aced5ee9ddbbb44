//! Instagram Messaging sender (Graph API). The integration's `external_id`
//! is the IG business account id.

use async_trait::async_trait;
use plaza_core::types::Platform;
use plaza_identity::types::BotIntegration;
use serde_json::json;

use crate::error::{ChannelError, Result};
use crate::sender::ChannelSender;
use crate::types::SendReceipt;

const GRAPH_BASE: &str = "https://graph.facebook.com/v19.0";

pub struct InstagramSender {
    client: reqwest::Client,
    base_url: String,
}

impl InstagramSender {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: GRAPH_BASE.to_string(),
        }
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.to_string(),
        }
    }

    async fn post_message(
        &self,
        integration: &BotIntegration,
        to: &str,
        message: serde_json::Value,
    ) -> Result<SendReceipt> {
        let url = format!("{}/{}/messages", self.base_url, integration.external_id);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&integration.access_token)
            .json(&json!({
                "recipient": { "id": to },
                "message": message,
            }))
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ChannelError::Api {
                platform: "instagram".into(),
                status,
                message,
            });
        }
        let parsed: serde_json::Value = resp.json().await?;
        let id = parsed
            .get("message_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ChannelError::Parse("no message_id in response".into()))?;
        Ok(SendReceipt {
            provider_message_id: id.to_string(),
        })
    }
}

impl Default for InstagramSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelSender for InstagramSender {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    async fn send_message(
        &self,
        integration: &BotIntegration,
        to: &str,
        text: &str,
    ) -> Result<SendReceipt> {
        self.post_message(integration, to, json!({ "text": text })).await
    }

    async fn send_image(
        &self,
        integration: &BotIntegration,
        to: &str,
        image_url: &str,
    ) -> Result<SendReceipt> {
        self.post_message(
            integration,
            to,
            json!({
                "attachment": {
                    "type": "image",
                    "payload": { "url": image_url },
                }
            }),
        )
        .await
    }
}
