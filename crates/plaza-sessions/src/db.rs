use rusqlite::{Connection, Result};

/// Initialise the session tables and their indexes. Idempotent.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS chat_sessions (
            id                   TEXT PRIMARY KEY NOT NULL,
            business_id          TEXT NOT NULL,
            customer_phone       TEXT NOT NULL,
            platform             TEXT NOT NULL,
            state                TEXT NOT NULL DEFAULT 'bot_active',
            assigned_employee_id TEXT,
            language_hint        TEXT,
            last_activity_at     TEXT NOT NULL,
            created_at           TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_sessions_lookup
            ON chat_sessions (business_id, customer_phone, platform, state);
        CREATE INDEX IF NOT EXISTS idx_sessions_idle
            ON chat_sessions (state, last_activity_at);

        CREATE TABLE IF NOT EXISTS chat_messages (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL REFERENCES chat_sessions(id),
            sender     TEXT NOT NULL,
            content    TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_messages_session
            ON chat_messages (session_id, id);",
    )
}
