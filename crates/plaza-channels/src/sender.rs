use async_trait::async_trait;
use plaza_core::types::Platform;
use plaza_identity::types::BotIntegration;

use crate::error::Result;
use crate::types::{OutboundPayload, SendReceipt};

/// Common interface implemented by every platform sender.
///
/// Implementations are stateless besides a shared HTTP client; per-tenant
/// credentials arrive with each call in the [`BotIntegration`].
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// The platform this sender serves.
    fn platform(&self) -> Platform;

    async fn send_message(
        &self,
        integration: &BotIntegration,
        to: &str,
        text: &str,
    ) -> Result<SendReceipt>;

    async fn send_image(
        &self,
        integration: &BotIntegration,
        to: &str,
        image_url: &str,
    ) -> Result<SendReceipt>;

    /// Deliver any payload. Platforms without native template support render
    /// templates as plain text.
    async fn send(
        &self,
        integration: &BotIntegration,
        to: &str,
        payload: &OutboundPayload,
    ) -> Result<SendReceipt> {
        match payload {
            OutboundPayload::Text { text } => self.send_message(integration, to, text).await,
            OutboundPayload::Image { url } => self.send_image(integration, to, url).await,
            OutboundPayload::Template { name, params } => {
                let rendered = render_template(name, params);
                self.send_message(integration, to, &rendered).await
            }
        }
    }
}

/// Fallback template rendering: "name: p1, p2".
pub(crate) fn render_template(name: &str, params: &[String]) -> String {
    if params.is_empty() {
        name.to_string()
    } else {
        format!("{}: {}", name, params.join(", "))
    }
}
