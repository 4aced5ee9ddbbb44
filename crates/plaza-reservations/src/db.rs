use rusqlite::{Connection, Result};

use crate::types::Reservation;

/// Initialise reservation tables. Idempotent.
///
/// The partial unique index is the slot-exclusion invariant: at most one
/// confirmed reservation per `(table_id, date, time)`.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS reservations (
            id                    TEXT PRIMARY KEY NOT NULL,
            business_user_id      TEXT NOT NULL,
            owner_user_id         TEXT NOT NULL,
            table_id              TEXT,
            customer_phone_number TEXT NOT NULL,
            customer_name         TEXT NOT NULL,
            reservation_date      TEXT NOT NULL,
            reservation_time      TEXT NOT NULL,
            number_of_guests      INTEGER,
            reservation_type      TEXT NOT NULL DEFAULT 'table',
            status                TEXT NOT NULL DEFAULT 'confirmed',
            notes                 TEXT,
            created_at            TEXT NOT NULL,
            updated_at            TEXT NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_reservations_slot
            ON reservations (table_id, reservation_date, reservation_time)
            WHERE status = 'confirmed' AND table_id IS NOT NULL;
        CREATE INDEX IF NOT EXISTS idx_reservations_owner_date
            ON reservations (owner_user_id, reservation_date);

        CREATE TABLE IF NOT EXISTS reservation_items (
            id             TEXT PRIMARY KEY NOT NULL,
            reservation_id TEXT NOT NULL REFERENCES reservations(id),
            item_id        TEXT NOT NULL,
            quantity       INTEGER NOT NULL CHECK (quantity >= 1),
            price_at_time  REAL NOT NULL,
            name_at_time   TEXT NOT NULL,
            notes          TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_reservation_items_res
            ON reservation_items (reservation_id);",
    )
}

pub(crate) const RESERVATION_SELECT_COLS: &str =
    "id, business_user_id, owner_user_id, table_id, customer_phone_number, customer_name,
     reservation_date, reservation_time, number_of_guests, reservation_type, status,
     notes, created_at, updated_at";

pub(crate) fn row_to_reservation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Reservation> {
    use std::str::FromStr;
    let rtype = plaza_core::types::ReservationType::from_str(&row.get::<_, String>(9)?)
        .unwrap_or(plaza_core::types::ReservationType::Table);
    let status_str: String = row.get(10)?;
    let status = plaza_core::types::ReservationStatus::from_str(&status_str).map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            10,
            rusqlite::types::Type::Text,
            format!("bad reservation status: {status_str}").into(),
        )
    })?;
    Ok(Reservation {
        id: row.get(0)?,
        business_user_id: row.get(1)?,
        owner_user_id: row.get(2)?,
        table_id: row.get(3)?,
        customer_phone_number: row.get(4)?,
        customer_name: row.get(5)?,
        reservation_date: row.get(6)?,
        reservation_time: row.get(7)?,
        number_of_guests: row.get(8)?,
        reservation_type: rtype,
        status,
        notes: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}
