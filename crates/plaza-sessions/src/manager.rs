use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use plaza_core::types::{new_id, Platform, SenderKind, SessionState};
use rusqlite::{params, Connection};
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, SessionError};
use crate::types::{ChatMessage, ChatSession};

const SESSION_SELECT_COLS: &str =
    "id, business_id, customer_phone, platform, state, assigned_employee_id,
     language_hint, last_activity_at, created_at";

/// Thread-safe manager for chat sessions and their message logs.
pub struct SessionManager {
    db: Arc<Mutex<Connection>>,
}

impl SessionManager {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    /// Return the live (non-closed) session for a customer, creating one when
    /// none exists. Closed sessions never come back; a fresh row is made.
    #[instrument(skip(self))]
    pub fn get_or_create(
        &self,
        business_id: &str,
        customer_phone: &str,
        platform: Platform,
    ) -> Result<ChatSession> {
        let conn = self.db.lock().unwrap();
        let existing = query_live_session(&conn, business_id, customer_phone, platform)?;
        if let Some(session) = existing {
            debug!(session = %session.id, "session hit");
            return Ok(session);
        }

        let now = Utc::now().to_rfc3339();
        let id = new_id();
        conn.execute(
            "INSERT INTO chat_sessions
                (id, business_id, customer_phone, platform, state, last_activity_at, created_at)
             VALUES (?1,?2,?3,?4,'bot_active',?5,?5)",
            params![id, business_id, customer_phone, platform.to_string(), now],
        )?;
        info!(session = %id, business_id, "session opened");
        // Read back to cover two tasks racing the insert.
        query_live_session(&conn, business_id, customer_phone, platform)?
            .ok_or(SessionError::NotFound(id))
    }

    pub fn get(&self, session_id: &str) -> Result<Option<ChatSession>> {
        let conn = self.db.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_SELECT_COLS} FROM chat_sessions WHERE id = ?1"
        ))?;
        match stmt.query_row(params![session_id], row_to_session) {
            Ok(s) => Ok(Some(s)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(SessionError::Database(e)),
        }
    }

    /// Append to the message log and refresh `last_activity_at`.
    pub fn append_message(
        &self,
        session_id: &str,
        sender: SenderKind,
        content: &str,
    ) -> Result<ChatMessage> {
        let now = Utc::now().to_rfc3339();
        let conn = self.db.lock().unwrap();
        conn.execute(
            "INSERT INTO chat_messages (session_id, sender, content, created_at)
             VALUES (?1,?2,?3,?4)",
            params![session_id, sender.to_string(), content, now],
        )?;
        let id = conn.last_insert_rowid();
        let rows = conn.execute(
            "UPDATE chat_sessions SET last_activity_at=?2 WHERE id=?1",
            params![session_id, now],
        )?;
        if rows == 0 {
            return Err(SessionError::NotFound(session_id.to_string()));
        }
        Ok(ChatMessage {
            id,
            session_id: session_id.to_string(),
            sender,
            content: content.to_string(),
            created_at: now,
        })
    }

    /// Most recent messages, oldest first, for prompt context.
    pub fn history(&self, session_id: &str, limit: usize) -> Result<Vec<ChatMessage>> {
        let conn = self.db.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, session_id, sender, content, created_at
             FROM chat_messages WHERE session_id = ?1
             ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![session_id, limit as i64], row_to_message)?;
        let mut messages: Vec<ChatMessage> = rows.filter_map(|r| r.ok()).collect();
        messages.reverse();
        Ok(messages)
    }

    pub fn set_language_hint(&self, session_id: &str, language: &str) -> Result<()> {
        let conn = self.db.lock().unwrap();
        conn.execute(
            "UPDATE chat_sessions SET language_hint=?2 WHERE id=?1",
            params![session_id, language],
        )?;
        Ok(())
    }

    /// Handover step: `bot_active -> human_locked`. While locked the engine
    /// must not invoke any tool.
    pub fn lock_for_human(&self, session_id: &str) -> Result<ChatSession> {
        self.transition(session_id, SessionState::BotActive, SessionState::HumanLocked)
    }

    /// Business side hands the conversation back to the bot.
    pub fn unlock(&self, session_id: &str) -> Result<ChatSession> {
        self.transition(session_id, SessionState::HumanLocked, SessionState::BotActive)
    }

    pub fn assign_employee(&self, session_id: &str, employee_id: &str) -> Result<()> {
        let conn = self.db.lock().unwrap();
        let rows = conn.execute(
            "UPDATE chat_sessions SET assigned_employee_id=?2 WHERE id=?1",
            params![session_id, employee_id],
        )?;
        if rows == 0 {
            return Err(SessionError::NotFound(session_id.to_string()));
        }
        Ok(())
    }

    pub fn close(&self, session_id: &str) -> Result<()> {
        let conn = self.db.lock().unwrap();
        let rows = conn.execute(
            "UPDATE chat_sessions SET state='closed' WHERE id=?1 AND state != 'closed'",
            params![session_id],
        )?;
        if rows == 0 {
            return Err(SessionError::NotFound(session_id.to_string()));
        }
        info!(session = %session_id, "session closed");
        Ok(())
    }

    /// Close every session idle past the cutoff. Returns how many were
    /// reaped; called periodically by the scheduler.
    pub fn reap_idle(&self, idle_minutes: i64, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = (now - Duration::minutes(idle_minutes)).to_rfc3339();
        let conn = self.db.lock().unwrap();
        let rows = conn.execute(
            "UPDATE chat_sessions SET state='closed'
             WHERE state != 'closed' AND last_activity_at < ?1",
            params![cutoff],
        )?;
        if rows > 0 {
            info!(count = rows, "idle sessions reaped");
        }
        Ok(rows)
    }

    fn transition(
        &self,
        session_id: &str,
        from: SessionState,
        to: SessionState,
    ) -> Result<ChatSession> {
        let conn = self.db.lock().unwrap();
        let rows = conn.execute(
            "UPDATE chat_sessions SET state=?3 WHERE id=?1 AND state=?2",
            params![session_id, from.to_string(), to.to_string()],
        )?;
        if rows == 0 {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_SELECT_COLS} FROM chat_sessions WHERE id = ?1"
            ))?;
            return match stmt.query_row(params![session_id], row_to_session) {
                Ok(s) => {
                    warn!(session = %session_id, state = %s.state, expected = %from, "state mismatch");
                    Err(SessionError::WrongState {
                        id: session_id.to_string(),
                        expected: from.to_string(),
                    })
                }
                Err(rusqlite::Error::QueryReturnedNoRows) => {
                    Err(SessionError::NotFound(session_id.to_string()))
                }
                Err(e) => Err(SessionError::Database(e)),
            };
        }
        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_SELECT_COLS} FROM chat_sessions WHERE id = ?1"
        ))?;
        let session = stmt.query_row(params![session_id], row_to_session)?;
        info!(session = %session_id, state = %to, "session state changed");
        Ok(session)
    }
}

fn query_live_session(
    conn: &Connection,
    business_id: &str,
    customer_phone: &str,
    platform: Platform,
) -> Result<Option<ChatSession>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SESSION_SELECT_COLS} FROM chat_sessions
         WHERE business_id=?1 AND customer_phone=?2 AND platform=?3 AND state != 'closed'
         ORDER BY created_at DESC LIMIT 1"
    ))?;
    match stmt.query_row(
        params![business_id, customer_phone, platform.to_string()],
        row_to_session,
    ) {
        Ok(s) => Ok(Some(s)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(SessionError::Database(e)),
    }
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatSession> {
    use std::str::FromStr;
    let platform = Platform::from_str(&row.get::<_, String>(3)?)
        .unwrap_or(Platform::Whatsapp);
    let state = SessionState::from_str(&row.get::<_, String>(4)?)
        .unwrap_or(SessionState::Closed);
    Ok(ChatSession {
        id: row.get(0)?,
        business_id: row.get(1)?,
        customer_phone: row.get(2)?,
        platform,
        state,
        assigned_employee_id: row.get(5)?,
        language_hint: row.get(6)?,
        last_activity_at: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatMessage> {
    use std::str::FromStr;
    let sender = SenderKind::from_str(&row.get::<_, String>(2)?)
        .unwrap_or(SenderKind::System);
    Ok(ChatMessage {
        id: row.get(0)?,
        session_id: row.get(1)?,
        sender,
        content: row.get(3)?,
        created_at: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> SessionManager {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        SessionManager::new(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn get_or_create_reuses_live_session() {
        let m = manager();
        let a = m.get_or_create("biz", "+961", Platform::Whatsapp).unwrap();
        let b = m.get_or_create("biz", "+961", Platform::Whatsapp).unwrap();
        assert_eq!(a.id, b.id);

        // Different platform, different session.
        let c = m.get_or_create("biz", "+961", Platform::Telegram).unwrap();
        assert_ne!(a.id, c.id);
    }

    #[test]
    fn closed_session_is_never_resumed() {
        let m = manager();
        let a = m.get_or_create("biz", "+961", Platform::Whatsapp).unwrap();
        m.close(&a.id).unwrap();
        let b = m.get_or_create("biz", "+961", Platform::Whatsapp).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn handover_locks_and_unlocks() {
        let m = manager();
        let s = m.get_or_create("biz", "+961", Platform::Whatsapp).unwrap();
        let locked = m.lock_for_human(&s.id).unwrap();
        assert!(locked.is_locked());

        // A second lock attempt fails: the state is no longer bot_active.
        let err = m.lock_for_human(&s.id).unwrap_err();
        assert_eq!(err.code(), "SESSION_WRONG_STATE");

        let unlocked = m.unlock(&s.id).unwrap();
        assert_eq!(unlocked.state, SessionState::BotActive);
    }

    #[test]
    fn history_is_oldest_first_and_bounded() {
        let m = manager();
        let s = m.get_or_create("biz", "+961", Platform::Whatsapp).unwrap();
        for i in 0..5 {
            m.append_message(&s.id, SenderKind::Customer, &format!("msg {i}"))
                .unwrap();
        }
        let history = m.history(&s.id, 3).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].content, "msg 2");
        assert_eq!(history[2].content, "msg 4");
    }

    #[test]
    fn reaper_closes_only_idle_sessions() {
        let m = manager();
        let s = m.get_or_create("biz", "+961", Platform::Whatsapp).unwrap();
        // Nothing idle yet.
        assert_eq!(m.reap_idle(60, Utc::now()).unwrap(), 0);

        // An hour from now the untouched session is past the cutoff.
        let later = Utc::now() + Duration::minutes(61);
        assert_eq!(m.reap_idle(60, later).unwrap(), 1);
        let reaped = m.get(&s.id).unwrap().unwrap();
        assert_eq!(reaped.state, SessionState::Closed);
    }
}
