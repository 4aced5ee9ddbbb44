use rusqlite::{Connection, Result};

/// Initialise ticket tables. Idempotent.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS support_tickets (
            id                     TEXT PRIMARY KEY NOT NULL,
            business_id            TEXT NOT NULL,
            customer_phone         TEXT NOT NULL,
            related_order_id       TEXT,
            related_reservation_id TEXT,
            session_id             TEXT,
            subject                TEXT,
            status                 TEXT NOT NULL DEFAULT 'open',
            priority               TEXT NOT NULL DEFAULT 'medium',
            assigned_employee_id   TEXT,
            created_at             TEXT NOT NULL,
            updated_at             TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_tickets_queue
            ON support_tickets (business_id, status, priority, created_at);

        CREATE TABLE IF NOT EXISTS support_ticket_messages (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            ticket_id  TEXT NOT NULL REFERENCES support_tickets(id),
            sender     TEXT NOT NULL,
            content    TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_ticket_messages
            ON support_ticket_messages (ticket_id, id);",
    )
}
