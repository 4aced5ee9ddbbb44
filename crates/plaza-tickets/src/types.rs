use plaza_core::types::{SenderKind, TicketPriority, TicketStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub business_id: String,
    pub customer_phone: String,
    pub related_order_id: Option<String>,
    pub related_reservation_id: Option<String>,
    pub session_id: Option<String>,
    pub subject: Option<String>,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    /// Null while the ticket sits in the pickup queue.
    pub assigned_employee_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketMessage {
    pub id: i64,
    pub ticket_id: String,
    pub sender: SenderKind,
    pub content: String,
    pub created_at: String,
}
