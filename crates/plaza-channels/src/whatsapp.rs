//! WhatsApp Cloud API sender. The integration's `external_id` is the phone
//! number id; auth is a per-tenant bearer token.

use async_trait::async_trait;
use plaza_core::types::Platform;
use plaza_identity::types::BotIntegration;
use serde_json::json;
use tracing::debug;

use crate::error::{ChannelError, Result};
use crate::sender::ChannelSender;
use crate::types::{OutboundPayload, SendReceipt};

const GRAPH_BASE: &str = "https://graph.facebook.com/v19.0";

pub struct WhatsappSender {
    client: reqwest::Client,
    base_url: String,
}

impl WhatsappSender {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: GRAPH_BASE.to_string(),
        }
    }

    /// Test seam: point at a mock Graph endpoint.
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.to_string(),
        }
    }

    async fn post(
        &self,
        integration: &BotIntegration,
        body: serde_json::Value,
    ) -> Result<SendReceipt> {
        let url = format!("{}/{}/messages", self.base_url, integration.external_id);
        debug!(phone_id = %integration.external_id, "whatsapp send");
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&integration.access_token)
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ChannelError::Api {
                platform: "whatsapp".into(),
                status,
                message,
            });
        }
        let parsed: serde_json::Value = resp.json().await?;
        let id = parsed
            .pointer("/messages/0/id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ChannelError::Parse("no message id in response".into()))?;
        Ok(SendReceipt {
            provider_message_id: id.to_string(),
        })
    }
}

impl Default for WhatsappSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelSender for WhatsappSender {
    fn platform(&self) -> Platform {
        Platform::Whatsapp
    }

    async fn send_message(
        &self,
        integration: &BotIntegration,
        to: &str,
        text: &str,
    ) -> Result<SendReceipt> {
        self.post(
            integration,
            json!({
                "messaging_product": "whatsapp",
                "to": to,
                "type": "text",
                "text": { "body": text },
            }),
        )
        .await
    }

    async fn send_image(
        &self,
        integration: &BotIntegration,
        to: &str,
        image_url: &str,
    ) -> Result<SendReceipt> {
        self.post(
            integration,
            json!({
                "messaging_product": "whatsapp",
                "to": to,
                "type": "image",
                "image": { "link": image_url },
            }),
        )
        .await
    }

    async fn send(
        &self,
        integration: &BotIntegration,
        to: &str,
        payload: &OutboundPayload,
    ) -> Result<SendReceipt> {
        match payload {
            OutboundPayload::Text { text } => self.send_message(integration, to, text).await,
            OutboundPayload::Image { url } => self.send_image(integration, to, url).await,
            // WhatsApp has first-class templates.
            OutboundPayload::Template { name, params } => {
                let components = if params.is_empty() {
                    json!([])
                } else {
                    json!([{
                        "type": "body",
                        "parameters": params.iter().map(|p| json!({
                            "type": "text", "text": p
                        })).collect::<Vec<_>>(),
                    }])
                };
                self.post(
                    integration,
                    json!({
                        "messaging_product": "whatsapp",
                        "to": to,
                        "type": "template",
                        "template": {
                            "name": name,
                            "language": { "code": "en" },
                            "components": components,
                        },
                    }),
                )
                .await
            }
        }
    }
}
