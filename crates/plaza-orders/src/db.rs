use rusqlite::{Connection, Result};

use crate::types::{Order, OrderItem};

/// Initialise the orders subsystem tables. Idempotent.
///
/// The partial unique index enforces the one-cart-per-customer invariant at
/// the storage level; racing creators collapse onto a single row.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS orders (
            id                    TEXT PRIMARY KEY NOT NULL,
            business_id           TEXT NOT NULL,
            user_id               TEXT NOT NULL,
            customer_phone_number TEXT NOT NULL,
            customer_name         TEXT,
            delivery_type         TEXT,
            status                TEXT NOT NULL,
            request_type          TEXT NOT NULL DEFAULT 'order',
            scheduled_for         TEXT,
            subtotal              REAL NOT NULL DEFAULT 0,
            delivery_price        REAL NOT NULL DEFAULT 0,
            total                 REAL NOT NULL DEFAULT 0,
            payment_method        TEXT,
            payment_status        TEXT NOT NULL DEFAULT 'pending',
            notes                 TEXT,
            location_address      TEXT,
            language_used         TEXT,
            order_source          TEXT NOT NULL,
            first_response_at     TEXT,
            completed_at          TEXT,
            cancelled_at          TEXT,
            created_at            TEXT NOT NULL,
            updated_at            TEXT NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_orders_one_cart
            ON orders (business_id, user_id, customer_phone_number)
            WHERE status = 'cart';
        CREATE INDEX IF NOT EXISTS idx_orders_business_status
            ON orders (business_id, status, updated_at DESC);
        CREATE INDEX IF NOT EXISTS idx_orders_due
            ON orders (status, request_type, scheduled_for);

        CREATE TABLE IF NOT EXISTS order_items (
            id            TEXT PRIMARY KEY NOT NULL,
            order_id      TEXT NOT NULL REFERENCES orders(id),
            item_id       TEXT NOT NULL,
            quantity      INTEGER NOT NULL CHECK (quantity >= 1),
            price_at_time REAL NOT NULL,
            cost_at_time  REAL,
            name_at_time  TEXT NOT NULL,
            notes         TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_order_items_order
            ON order_items (order_id);

        CREATE TABLE IF NOT EXISTS order_status_history (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            order_id   TEXT NOT NULL REFERENCES orders(id),
            status     TEXT NOT NULL,
            changed_by TEXT NOT NULL,
            changed_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_history_order
            ON order_status_history (order_id, id);",
    )
}

pub(crate) const ORDER_SELECT_COLS: &str =
    "id, business_id, user_id, customer_phone_number, customer_name, delivery_type,
     status, request_type, scheduled_for, subtotal, delivery_price, total,
     payment_method, payment_status, notes, location_address, language_used,
     order_source, first_response_at, completed_at, cancelled_at, created_at, updated_at";

/// Map a SELECT row (ORDER_SELECT_COLS order) to an Order.
pub(crate) fn row_to_order(row: &rusqlite::Row<'_>) -> rusqlite::Result<Order> {
    use std::str::FromStr;
    let status_str: String = row.get(6)?;
    let status = plaza_core::types::OrderStatus::from_str(&status_str).map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            6,
            rusqlite::types::Type::Text,
            format!("bad order status: {status_str}").into(),
        )
    })?;
    let delivery_type = row
        .get::<_, Option<String>>(5)?
        .and_then(|s| plaza_core::types::DeliveryType::from_str(&s).ok());
    let request_type = plaza_core::types::RequestType::from_str(&row.get::<_, String>(7)?)
        .unwrap_or(plaza_core::types::RequestType::Order);
    let payment_status = plaza_core::types::PaymentStatus::from_str(&row.get::<_, String>(13)?)
        .unwrap_or_default();
    let order_source = plaza_core::types::Platform::from_str(&row.get::<_, String>(17)?)
        .unwrap_or(plaza_core::types::Platform::Dashboard);
    Ok(Order {
        id: row.get(0)?,
        business_id: row.get(1)?,
        user_id: row.get(2)?,
        customer_phone_number: row.get(3)?,
        customer_name: row.get(4)?,
        delivery_type,
        status,
        request_type,
        scheduled_for: row.get(8)?,
        subtotal: row.get(9)?,
        delivery_price: row.get(10)?,
        total: row.get(11)?,
        payment_method: row.get(12)?,
        payment_status,
        notes: row.get(14)?,
        location_address: row.get(15)?,
        language_used: row.get(16)?,
        order_source,
        first_response_at: row.get(18)?,
        completed_at: row.get(19)?,
        cancelled_at: row.get(20)?,
        created_at: row.get(21)?,
        updated_at: row.get(22)?,
    })
}

pub(crate) fn row_to_order_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<OrderItem> {
    Ok(OrderItem {
        id: row.get(0)?,
        order_id: row.get(1)?,
        item_id: row.get(2)?,
        quantity: row.get(3)?,
        price_at_time: row.get(4)?,
        cost_at_time: row.get(5)?,
        name_at_time: row.get(6)?,
        notes: row.get(7)?,
    })
}

pub(crate) const ORDER_ITEM_SELECT_COLS: &str =
    "id, order_id, item_id, quantity, price_at_time, cost_at_time, name_at_time, notes";
