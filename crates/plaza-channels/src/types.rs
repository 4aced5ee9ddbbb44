use serde::{Deserialize, Serialize};

/// What the dispatcher can deliver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutboundPayload {
    Text { text: String },
    Image { url: String },
    /// Pre-approved template with positional parameters; platforms without
    /// template support render it as plain text.
    Template { name: String, params: Vec<String> },
}

impl OutboundPayload {
    pub fn text(s: impl Into<String>) -> Self {
        OutboundPayload::Text { text: s.into() }
    }
}

/// What a successful send returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendReceipt {
    pub provider_message_id: String,
}
