use std::collections::HashMap;
use std::sync::Arc;

use plaza_core::types::Platform;
use plaza_identity::types::Principal;
use plaza_identity::IdentityStore;
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

use crate::error::{ChannelError, Result};
use crate::sender::ChannelSender;
use crate::types::{OutboundPayload, SendReceipt};

/// Retries after the first attempt for transient failures.
const MAX_RETRIES: u32 = 2;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Channel-agnostic outbound facade.
///
/// Loads the tenant's integration record (branch first, business fallback),
/// picks the platform sender, and retries transient failures with a short
/// linear backoff.
pub struct OutboundDispatcher {
    identity: Arc<IdentityStore>,
    senders: HashMap<Platform, Box<dyn ChannelSender>>,
}

impl OutboundDispatcher {
    pub fn new(identity: Arc<IdentityStore>) -> Self {
        Self {
            identity,
            senders: HashMap::new(),
        }
    }

    /// Standard four-platform setup.
    pub fn with_default_senders(identity: Arc<IdentityStore>) -> Self {
        let mut dispatcher = Self::new(identity);
        dispatcher.register(Box::new(crate::whatsapp::WhatsappSender::new()));
        dispatcher.register(Box::new(crate::telegram::TelegramSender::new()));
        dispatcher.register(Box::new(crate::instagram::InstagramSender::new()));
        dispatcher.register(Box::new(crate::facebook::FacebookSender::new()));
        dispatcher
    }

    /// Register a sender; replaces any existing one for the same platform.
    pub fn register(&mut self, sender: Box<dyn ChannelSender>) {
        self.senders.insert(sender.platform(), sender);
    }

    /// Deliver a payload to `to` on behalf of `owner` over `platform`.
    pub async fn send(
        &self,
        owner: &Principal,
        platform: Platform,
        to: &str,
        payload: &OutboundPayload,
    ) -> Result<SendReceipt> {
        let sender = self
            .senders
            .get(&platform)
            .ok_or_else(|| ChannelError::NoSender(platform.to_string()))?;
        let integration = self
            .identity
            .integration_for(owner, platform)
            .map_err(|e| ChannelError::MissingCredentials(e.to_string()))?;

        let mut attempt = 0;
        loop {
            match sender.send(&integration, to, payload).await {
                Ok(receipt) => {
                    info!(
                        %platform,
                        to,
                        provider_message_id = %receipt.provider_message_id,
                        "outbound delivered"
                    );
                    return Ok(receipt);
                }
                Err(e) if e.is_transient() && attempt < MAX_RETRIES => {
                    attempt += 1;
                    let delay = RETRY_BASE_DELAY * attempt;
                    warn!(
                        %platform,
                        attempt,
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "send failed; retrying"
                    );
                    sleep(delay).await;
                }
                Err(e) => {
                    warn!(%platform, to, error = %e, "outbound send failed");
                    return Err(e);
                }
            }
        }
    }
}
