use plaza_core::types::{Platform, SenderKind, SessionState};
use serde::{Deserialize, Serialize};

/// A conversation between one customer and one business on one platform.
///
/// Sessions are lazy-created on first inbound message and reaped to `closed`
/// after the configured idle interval. Closed sessions are never resumed; a
/// new message opens a fresh session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub business_id: String,
    pub customer_phone: String,
    pub platform: Platform,
    pub state: SessionState,
    /// Set on handover; stays null while the ticket waits in the pickup queue.
    pub assigned_employee_id: Option<String>,
    /// Language the customer last wrote in, for reply generation.
    pub language_hint: Option<String>,
    pub last_activity_at: String,
    pub created_at: String,
}

impl ChatSession {
    pub fn is_locked(&self) -> bool {
        self.state == SessionState::HumanLocked
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub session_id: String,
    pub sender: SenderKind,
    pub content: String,
    pub created_at: String,
}
