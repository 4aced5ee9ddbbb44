use rusqlite::{Connection, Result};

use crate::types::Principal;

/// Initialise all tables for the identity subsystem. Safe to call on every
/// startup; CREATE IF NOT EXISTS makes it idempotent.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            id                   TEXT PRIMARY KEY NOT NULL,
            kind                 TEXT NOT NULL,
            display_name         TEXT NOT NULL,
            parent_user_id       TEXT REFERENCES users(id),
            business_type        TEXT,
            tz_offset_minutes    INTEGER,
            default_cancel_hours INTEGER,
            phone_number         TEXT,
            created_at           TEXT NOT NULL,
            updated_at           TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_users_parent
            ON users (parent_user_id);

        CREATE TABLE IF NOT EXISTS business_addons (
            business_id    TEXT NOT NULL REFERENCES users(id),
            addon_key      TEXT NOT NULL,
            active         INTEGER NOT NULL DEFAULT 0,
            price_override REAL,
            updated_at     TEXT NOT NULL,
            PRIMARY KEY (business_id, addon_key)
        );

        CREATE TABLE IF NOT EXISTS subscriptions (
            id          TEXT PRIMARY KEY NOT NULL,
            business_id TEXT NOT NULL REFERENCES users(id),
            plan_key    TEXT NOT NULL,
            active      INTEGER NOT NULL DEFAULT 1,
            started_at  TEXT NOT NULL,
            expires_at  TEXT
        );

        CREATE TABLE IF NOT EXISTS bot_integrations (
            id            TEXT PRIMARY KEY NOT NULL,
            owner_user_id TEXT NOT NULL REFERENCES users(id),
            platform      TEXT NOT NULL,
            access_token  TEXT NOT NULL,
            external_id   TEXT NOT NULL,
            created_at    TEXT NOT NULL,
            UNIQUE(platform, external_id)
        );",
    )
}

/// Map a SELECT row (column order from PRINCIPAL_SELECT_COLS) to a Principal.
/// Centralised so every query in this crate stays consistent.
pub(crate) fn row_to_principal(row: &rusqlite::Row<'_>) -> rusqlite::Result<Principal> {
    use std::str::FromStr;
    let kind_str: String = row.get(1)?;
    let kind = plaza_core::types::PrincipalKind::from_str(&kind_str).map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            format!("bad principal kind: {kind_str}").into(),
        )
    })?;
    let business_type = row
        .get::<_, Option<String>>(4)?
        .and_then(|s| plaza_core::types::BusinessType::from_str(&s).ok());
    Ok(Principal {
        id: row.get(0)?,
        kind,
        display_name: row.get(2)?,
        parent_user_id: row.get(3)?,
        business_type,
        tz_offset_minutes: row.get(5)?,
        default_cancel_hours: row.get(6)?,
        phone_number: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

pub(crate) const PRINCIPAL_SELECT_COLS: &str =
    "id, kind, display_name, parent_user_id, business_type, tz_offset_minutes,
     default_cancel_hours, phone_number, created_at, updated_at";
