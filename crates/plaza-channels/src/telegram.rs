//! Telegram Bot API sender. The integration's `access_token` is the bot
//! token; `external_id` is unused for sending (chat id comes per message).
//!
//! Telegram caps messages at 4096 characters; longer replies are split on
//! line or word boundaries with a short delay between chunks.

use std::time::Duration;

use async_trait::async_trait;
use plaza_core::types::Platform;
use plaza_identity::types::BotIntegration;
use serde_json::json;
use tracing::debug;

use crate::error::{ChannelError, Result};
use crate::sender::ChannelSender;
use crate::types::SendReceipt;

/// Hard limit is 4096; a little headroom for safety.
const CHUNK_MAX: usize = 4090;
const INTER_CHUNK_DELAY: Duration = Duration::from_millis(100);

pub struct TelegramSender {
    client: reqwest::Client,
    base_url: String,
}

impl TelegramSender {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: "https://api.telegram.org".to_string(),
        }
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.to_string(),
        }
    }

    async fn call(
        &self,
        integration: &BotIntegration,
        method: &str,
        body: serde_json::Value,
    ) -> Result<SendReceipt> {
        let url = format!("{}/bot{}/{}", self.base_url, integration.access_token, method);
        let resp = self.client.post(&url).json(&body).send().await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ChannelError::Api {
                platform: "telegram".into(),
                status,
                message,
            });
        }
        let parsed: serde_json::Value = resp.json().await?;
        let id = parsed
            .pointer("/result/message_id")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| ChannelError::Parse("no message_id in response".into()))?;
        Ok(SendReceipt {
            provider_message_id: id.to_string(),
        })
    }
}

impl Default for TelegramSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelSender for TelegramSender {
    fn platform(&self) -> Platform {
        Platform::Telegram
    }

    async fn send_message(
        &self,
        integration: &BotIntegration,
        to: &str,
        text: &str,
    ) -> Result<SendReceipt> {
        let chunks = split_chunks(text);
        debug!(chat = %to, chunks = chunks.len(), "telegram send");
        let mut last = None;
        for (i, chunk) in chunks.iter().enumerate() {
            let receipt = self
                .call(
                    integration,
                    "sendMessage",
                    json!({ "chat_id": to, "text": chunk }),
                )
                .await?;
            last = Some(receipt);
            if i + 1 < chunks.len() {
                tokio::time::sleep(INTER_CHUNK_DELAY).await;
            }
        }
        last.ok_or_else(|| ChannelError::Parse("empty message".into()))
    }

    async fn send_image(
        &self,
        integration: &BotIntegration,
        to: &str,
        image_url: &str,
    ) -> Result<SendReceipt> {
        self.call(
            integration,
            "sendPhoto",
            json!({ "chat_id": to, "photo": image_url }),
        )
        .await
    }
}

/// Split on line boundaries, then word boundaries, so no chunk exceeds the
/// platform limit.
fn split_chunks(text: &str) -> Vec<String> {
    if text.len() <= CHUNK_MAX {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    for line in text.split('\n') {
        let cost = if current.is_empty() { line.len() } else { line.len() + 1 };
        if !current.is_empty() && current.len() + cost > CHUNK_MAX {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    // A single line longer than the limit still has to split somewhere.
    let mut result = Vec::new();
    for chunk in chunks {
        if chunk.len() <= CHUNK_MAX {
            result.push(chunk);
            continue;
        }
        let mut remaining = chunk.as_str();
        while remaining.len() > CHUNK_MAX {
            let split_at = remaining[..CHUNK_MAX]
                .rfind(' ')
                .unwrap_or(CHUNK_MAX);
            result.push(remaining[..split_at].to_string());
            remaining = remaining[split_at..].trim_start();
        }
        if !remaining.is_empty() {
            result.push(remaining.to_string());
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_single_chunk() {
        let chunks = split_chunks("Your order is confirmed!");
        assert_eq!(chunks, vec!["Your order is confirmed!".to_string()]);
    }

    #[test]
    fn long_text_splits_on_newlines() {
        let line = "x".repeat(2000);
        let text = format!("{line}\n{line}\n{line}");
        let chunks = split_chunks(&text);
        assert!(chunks.len() >= 2);
        for c in &chunks {
            assert!(c.len() <= CHUNK_MAX);
        }
    }

    #[test]
    fn single_giant_line_force_splits() {
        let text = "word ".repeat(2000);
        let chunks = split_chunks(&text);
        assert!(chunks.len() >= 2);
        for c in &chunks {
            assert!(c.len() <= CHUNK_MAX);
        }
    }
}
