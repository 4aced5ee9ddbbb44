use std::sync::{Arc, Mutex};

use chrono::Utc;
use plaza_core::types::{new_id, SenderKind, TicketPriority, TicketStatus};
use rusqlite::{params, Connection};
use tracing::info;

use crate::error::{Result, TicketError};
use crate::types::{Ticket, TicketMessage};

const TICKET_SELECT_COLS: &str =
    "id, business_id, customer_phone, related_order_id, related_reservation_id,
     session_id, subject, status, priority, assigned_employee_id, created_at, updated_at";

/// Links a new ticket to whatever it arose from.
#[derive(Debug, Clone, Default)]
pub struct TicketLinks {
    pub session_id: Option<String>,
    pub order_id: Option<String>,
    pub reservation_id: Option<String>,
}

pub struct TicketManager {
    db: Arc<Mutex<Connection>>,
}

impl TicketManager {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    /// Open a ticket in the pickup queue (no assignee).
    pub fn open(
        &self,
        business_id: &str,
        customer_phone: &str,
        subject: Option<&str>,
        priority: TicketPriority,
        links: TicketLinks,
    ) -> Result<Ticket> {
        let now = Utc::now().to_rfc3339();
        let ticket = Ticket {
            id: new_id(),
            business_id: business_id.to_string(),
            customer_phone: customer_phone.to_string(),
            related_order_id: links.order_id,
            related_reservation_id: links.reservation_id,
            session_id: links.session_id,
            subject: subject.map(String::from),
            status: TicketStatus::Open,
            priority,
            assigned_employee_id: None,
            created_at: now.clone(),
            updated_at: now,
        };
        let conn = self.db.lock().unwrap();
        conn.execute(
            "INSERT INTO support_tickets
                (id, business_id, customer_phone, related_order_id, related_reservation_id,
                 session_id, subject, status, priority, assigned_employee_id,
                 created_at, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,'open',?8,NULL,?9,?9)",
            params![
                ticket.id,
                ticket.business_id,
                ticket.customer_phone,
                ticket.related_order_id,
                ticket.related_reservation_id,
                ticket.session_id,
                ticket.subject,
                ticket.priority.to_string(),
                ticket.created_at,
            ],
        )?;
        info!(ticket = %ticket.id, priority = %priority, "ticket opened");
        Ok(ticket)
    }

    pub fn get(&self, ticket_id: &str) -> Result<Option<Ticket>> {
        let conn = self.db.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TICKET_SELECT_COLS} FROM support_tickets WHERE id = ?1"
        ))?;
        match stmt.query_row(params![ticket_id], row_to_ticket) {
            Ok(t) => Ok(Some(t)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(TicketError::Database(e)),
        }
    }

    /// Append to the ticket thread. Closed tickets reject new messages.
    pub fn append_message(
        &self,
        ticket_id: &str,
        sender: SenderKind,
        content: &str,
    ) -> Result<TicketMessage> {
        let ticket = self
            .get(ticket_id)?
            .ok_or_else(|| TicketError::NotFound(ticket_id.to_string()))?;
        if ticket.status == TicketStatus::Closed {
            return Err(TicketError::Closed(ticket_id.to_string()));
        }
        let now = Utc::now().to_rfc3339();
        let conn = self.db.lock().unwrap();
        conn.execute(
            "INSERT INTO support_ticket_messages (ticket_id, sender, content, created_at)
             VALUES (?1,?2,?3,?4)",
            params![ticket_id, sender.to_string(), content, now],
        )?;
        let id = conn.last_insert_rowid();
        conn.execute(
            "UPDATE support_tickets SET updated_at=?2 WHERE id=?1",
            params![ticket_id, now],
        )?;
        Ok(TicketMessage {
            id,
            ticket_id: ticket_id.to_string(),
            sender,
            content: content.to_string(),
            created_at: now,
        })
    }

    pub fn thread(&self, ticket_id: &str) -> Result<Vec<TicketMessage>> {
        let conn = self.db.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, ticket_id, sender, content, created_at
             FROM support_ticket_messages WHERE ticket_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![ticket_id], |row| {
            use std::str::FromStr;
            let sender = SenderKind::from_str(&row.get::<_, String>(2)?)
                .unwrap_or(SenderKind::System);
            Ok(TicketMessage {
                id: row.get(0)?,
                ticket_id: row.get(1)?,
                sender,
                content: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn set_status(&self, ticket_id: &str, status: TicketStatus) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.db.lock().unwrap();
        let rows = conn.execute(
            "UPDATE support_tickets SET status=?2, updated_at=?3 WHERE id=?1",
            params![ticket_id, status.to_string(), now],
        )?;
        if rows == 0 {
            return Err(TicketError::NotFound(ticket_id.to_string()));
        }
        info!(ticket = %ticket_id, status = %status, "ticket status changed");
        Ok(())
    }

    /// Employee pickup: claim a queued ticket and mark it in progress.
    pub fn assign(&self, ticket_id: &str, employee_id: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.db.lock().unwrap();
        let rows = conn.execute(
            "UPDATE support_tickets
             SET assigned_employee_id=?2, status='in_progress', updated_at=?3
             WHERE id=?1 AND status != 'closed'",
            params![ticket_id, employee_id, now],
        )?;
        if rows == 0 {
            return Err(TicketError::NotFound(ticket_id.to_string()));
        }
        Ok(())
    }

    /// Open tickets for a business, most urgent and oldest first.
    pub fn list_open(&self, business_id: &str, limit: usize) -> Result<Vec<Ticket>> {
        let conn = self.db.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TICKET_SELECT_COLS} FROM support_tickets
             WHERE business_id = ?1 AND status != 'closed'
             ORDER BY CASE priority
                 WHEN 'urgent' THEN 0 WHEN 'high' THEN 1
                 WHEN 'medium' THEN 2 ELSE 3 END,
                 created_at
             LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![business_id, limit as i64], row_to_ticket)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

fn row_to_ticket(row: &rusqlite::Row<'_>) -> rusqlite::Result<Ticket> {
    use std::str::FromStr;
    let status = TicketStatus::from_str(&row.get::<_, String>(7)?)
        .unwrap_or(TicketStatus::Open);
    let priority = TicketPriority::from_str(&row.get::<_, String>(8)?)
        .unwrap_or_default();
    Ok(Ticket {
        id: row.get(0)?,
        business_id: row.get(1)?,
        customer_phone: row.get(2)?,
        related_order_id: row.get(3)?,
        related_reservation_id: row.get(4)?,
        session_id: row.get(5)?,
        subject: row.get(6)?,
        status,
        priority,
        assigned_employee_id: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> TicketManager {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        TicketManager::new(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn handover_ticket_lands_in_queue_unassigned() {
        let m = manager();
        let ticket = m
            .open(
                "biz",
                "+961",
                Some("customer requested human"),
                TicketPriority::High,
                TicketLinks {
                    session_id: Some("sess-1".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(ticket.assigned_employee_id.is_none());
        assert_eq!(ticket.status, TicketStatus::Open);
        assert_eq!(ticket.session_id.as_deref(), Some("sess-1"));
    }

    #[test]
    fn queue_orders_by_priority_then_age() {
        let m = manager();
        m.open("biz", "+1", None, TicketPriority::Low, Default::default())
            .unwrap();
        let urgent = m
            .open("biz", "+2", None, TicketPriority::Urgent, Default::default())
            .unwrap();
        m.open("biz", "+3", None, TicketPriority::High, Default::default())
            .unwrap();

        let queue = m.list_open("biz", 10).unwrap();
        assert_eq!(queue[0].id, urgent.id);
        assert_eq!(queue[0].priority, TicketPriority::Urgent);
        assert_eq!(queue[2].priority, TicketPriority::Low);
    }

    #[test]
    fn closed_ticket_rejects_messages() {
        let m = manager();
        let t = m
            .open("biz", "+961", None, TicketPriority::Medium, Default::default())
            .unwrap();
        m.append_message(&t.id, SenderKind::Customer, "hello").unwrap();
        m.set_status(&t.id, TicketStatus::Closed).unwrap();

        let err = m
            .append_message(&t.id, SenderKind::Customer, "anyone?")
            .unwrap_err();
        assert_eq!(err.code(), "TICKET_CLOSED");
    }

    #[test]
    fn assignment_moves_ticket_in_progress() {
        let m = manager();
        let t = m
            .open("biz", "+961", None, TicketPriority::High, Default::default())
            .unwrap();
        m.assign(&t.id, "emp-1").unwrap();
        let t = m.get(&t.id).unwrap().unwrap();
        assert_eq!(t.status, TicketStatus::InProgress);
        assert_eq!(t.assigned_employee_id.as_deref(), Some("emp-1"));
    }
}
