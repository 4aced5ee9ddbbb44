use rusqlite::{Connection, Result};

use crate::types::Item;

/// Initialise catalog tables. Idempotent.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS service_categories (
            id          TEXT PRIMARY KEY NOT NULL,
            business_id TEXT NOT NULL,
            name        TEXT NOT NULL,
            description TEXT,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS menus (
            id            TEXT PRIMARY KEY NOT NULL,
            business_id   TEXT NOT NULL,
            owner_user_id TEXT,
            name          TEXT NOT NULL,
            is_active     INTEGER NOT NULL DEFAULT 1,
            created_at    TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS items (
            id                      TEXT PRIMARY KEY NOT NULL,
            business_id             TEXT NOT NULL,
            owner_user_id           TEXT,
            menu_id                 TEXT,
            category_id             TEXT,
            name                    TEXT NOT NULL,
            description             TEXT,
            item_type               TEXT NOT NULL DEFAULT 'good',
            price                   REAL NOT NULL,
            cost                    REAL,
            preparation_time_minutes INTEGER,
            duration_minutes        INTEGER,
            is_schedulable          INTEGER NOT NULL DEFAULT 0,
            min_schedule_hours      INTEGER NOT NULL DEFAULT 0,
            cancelable_before_hours INTEGER,
            stock_quantity          INTEGER,
            availability            TEXT NOT NULL DEFAULT 'available',
            availability_status     TEXT,
            days_available          TEXT NOT NULL DEFAULT '[]',  -- JSON array
            available_from          TEXT,
            available_to            TEXT,
            times_ordered           INTEGER NOT NULL DEFAULT 0,
            times_delivered         INTEGER NOT NULL DEFAULT 0,
            deleted_at              TEXT,
            created_at              TEXT NOT NULL,
            updated_at              TEXT NOT NULL,
            CHECK (stock_quantity IS NULL OR stock_quantity >= 0)
        );
        CREATE INDEX IF NOT EXISTS idx_items_business
            ON items (business_id, owner_user_id);

        CREATE TABLE IF NOT EXISTS opening_hours (
            owner_id        TEXT NOT NULL,
            day_of_week     INTEGER NOT NULL,
            open_time       TEXT,
            close_time      TEXT,
            is_closed       INTEGER NOT NULL DEFAULT 0,
            last_order_time TEXT,
            PRIMARY KEY (owner_id, day_of_week)
        );

        CREATE TABLE IF NOT EXISTS tables (
            id             TEXT PRIMARY KEY NOT NULL,
            business_id    TEXT NOT NULL,
            owner_user_id  TEXT NOT NULL,
            table_number   INTEGER NOT NULL,
            min_seats      INTEGER NOT NULL,
            max_seats      INTEGER NOT NULL,
            position_label TEXT,
            is_active      INTEGER NOT NULL DEFAULT 1,
            created_at     TEXT NOT NULL,
            UNIQUE(owner_user_id, table_number),
            CHECK (min_seats <= max_seats)
        );",
    )
}

pub(crate) const ITEM_SELECT_COLS: &str =
    "id, business_id, owner_user_id, menu_id, category_id, name, description,
     item_type, price, cost, preparation_time_minutes, duration_minutes,
     is_schedulable, min_schedule_hours, cancelable_before_hours, stock_quantity,
     availability, availability_status, days_available, available_from, available_to,
     times_ordered, times_delivered, deleted_at, created_at, updated_at";

/// Map a SELECT row (ITEM_SELECT_COLS order) to an Item.
pub(crate) fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<Item> {
    use std::str::FromStr;
    let item_type = plaza_core::types::ItemType::from_str(&row.get::<_, String>(7)?)
        .unwrap_or(plaza_core::types::ItemType::Good);
    let availability =
        plaza_core::types::ItemAvailability::from_str(&row.get::<_, String>(16)?)
            .unwrap_or(plaza_core::types::ItemAvailability::Available);
    let days: Vec<u8> = serde_json::from_str(&row.get::<_, String>(18)?).unwrap_or_default();
    Ok(Item {
        id: row.get(0)?,
        business_id: row.get(1)?,
        owner_user_id: row.get(2)?,
        menu_id: row.get(3)?,
        category_id: row.get(4)?,
        name: row.get(5)?,
        description: row.get(6)?,
        item_type,
        price: row.get(8)?,
        cost: row.get(9)?,
        preparation_time_minutes: row.get(10)?,
        duration_minutes: row.get(11)?,
        is_schedulable: row.get::<_, i64>(12)? != 0,
        min_schedule_hours: row.get(13)?,
        cancelable_before_hours: row.get(14)?,
        stock_quantity: row.get(15)?,
        availability,
        availability_status: row.get(17)?,
        days_available: days,
        available_from: row.get(19)?,
        available_to: row.get(20)?,
        times_ordered: row.get(21)?,
        times_delivered: row.get(22)?,
        deleted_at: row.get(23)?,
        created_at: row.get(24)?,
        updated_at: row.get(25)?,
    })
}
