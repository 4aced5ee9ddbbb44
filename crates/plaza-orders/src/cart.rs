use std::sync::{Arc, Mutex};

use chrono::Utc;
use plaza_core::types::{new_id, DeliveryType, Platform};
use rusqlite::{params, Connection, Transaction};
use tracing::{debug, info};

use crate::db::{row_to_order, row_to_order_item, ORDER_ITEM_SELECT_COLS, ORDER_SELECT_COLS};
use crate::error::{OrderError, Result};
use crate::types::{CartKey, CartSnapshot, Order, OrderItem, CART_SENTINEL};

/// Per-(business, owner, customer) cart operations.
///
/// A cart is an `orders` row in status `cart`; lines live in `order_items`.
/// Totals are recomputed from current catalog prices on every mutation, so a
/// price change between browsing and confirming is always reflected.
pub struct CartManager {
    db: Arc<Mutex<Connection>>,
}

impl CartManager {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    /// Return the existing cart or create an empty one (upsert pattern).
    pub fn get_or_create(&self, key: &CartKey, source: Platform) -> Result<Order> {
        let mut conn = self.db.lock().unwrap();
        let tx = conn.transaction()?;

        if let Some(order) = select_cart(&tx, key)? {
            tx.commit()?;
            return Ok(order);
        }

        let now = Utc::now().to_rfc3339();
        let id = new_id();
        // INSERT OR IGNORE + re-select handles two tasks racing on the
        // partial unique index.
        tx.execute(
            "INSERT OR IGNORE INTO orders
                (id, business_id, user_id, customer_phone_number, status, request_type,
                 notes, order_source, created_at, updated_at)
             VALUES (?1,?2,?3,?4,'cart','order',?5,?6,?7,?7)",
            params![
                id,
                key.business_id,
                key.owner_user_id,
                key.customer_phone,
                CART_SENTINEL,
                source.to_string(),
                now
            ],
        )?;
        let order = select_cart(&tx, key)?.ok_or_else(|| OrderError::NotFound(id))?;
        tx.commit()?;
        debug!(cart = %order.id, customer = %key.customer_phone, "cart ready");
        Ok(order)
    }

    /// Add `quantity` of an item. A line with the same item and notes is
    /// merged by summing quantities, which makes retried tool calls safe.
    pub fn add_line(
        &self,
        key: &CartKey,
        item_id: &str,
        quantity: i64,
        notes: Option<&str>,
    ) -> Result<CartSnapshot> {
        if quantity < 1 {
            return Err(OrderError::InvalidQuantity);
        }
        let cart = self.get_or_create(key, Platform::Dashboard)?;

        let mut conn = self.db.lock().unwrap();
        let tx = conn.transaction()?;

        // Scope check against the catalog inside the same transaction: the
        // item must belong to the tenant, match the cart's owner scope, and
        // be customer-visible.
        let (name, price): (String, f64) = tx
            .query_row(
                "SELECT name, price FROM items
                 WHERE id = ?1 AND business_id = ?2
                   AND (owner_user_id IS NULL OR owner_user_id = ?3)
                   AND deleted_at IS NULL AND availability = 'available'",
                params![item_id, key.business_id, key.owner_user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => OrderError::Catalog(
                    plaza_catalog::CatalogError::ItemNotFound(item_id.to_string()),
                ),
                other => OrderError::Database(other),
            })?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM order_items
                 WHERE order_id = ?1 AND item_id = ?2 AND coalesce(notes,'') = coalesce(?3,'')",
                params![cart.id, item_id, notes],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(ignore_no_rows)?;

        match existing {
            Some(line_id) => {
                tx.execute(
                    "UPDATE order_items SET quantity = quantity + ?2 WHERE id = ?1",
                    params![line_id, quantity],
                )?;
            }
            None => {
                tx.execute(
                    "INSERT INTO order_items
                        (id, order_id, item_id, quantity, price_at_time, name_at_time, notes)
                     VALUES (?1,?2,?3,?4,?5,?6,?7)",
                    params![new_id(), cart.id, item_id, quantity, price, name, notes],
                )?;
            }
        }

        reprice(&tx, &cart.id)?;
        let snapshot = snapshot_in_tx(&tx, &cart.id)?;
        tx.commit()?;
        Ok(snapshot)
    }

    /// Change a line's quantity and/or notes.
    pub fn update_line(
        &self,
        key: &CartKey,
        line_id: &str,
        quantity: Option<i64>,
        notes: Option<&str>,
    ) -> Result<CartSnapshot> {
        if let Some(q) = quantity {
            if q < 1 {
                return Err(OrderError::InvalidQuantity);
            }
        }
        let mut conn = self.db.lock().unwrap();
        let tx = conn.transaction()?;
        let cart = select_cart(&tx, key)?.ok_or(OrderError::EmptyCart)?;

        let rows = match (quantity, notes) {
            (Some(q), Some(n)) => tx.execute(
                "UPDATE order_items SET quantity=?3, notes=?4 WHERE id=?1 AND order_id=?2",
                params![line_id, cart.id, q, n],
            )?,
            (Some(q), None) => tx.execute(
                "UPDATE order_items SET quantity=?3 WHERE id=?1 AND order_id=?2",
                params![line_id, cart.id, q],
            )?,
            (None, Some(n)) => tx.execute(
                "UPDATE order_items SET notes=?3 WHERE id=?1 AND order_id=?2",
                params![line_id, cart.id, n],
            )?,
            (None, None) => 0,
        };
        if rows == 0 {
            return Err(OrderError::LineNotFound(line_id.to_string()));
        }

        reprice(&tx, &cart.id)?;
        let snapshot = snapshot_in_tx(&tx, &cart.id)?;
        tx.commit()?;
        Ok(snapshot)
    }

    pub fn remove_line(&self, key: &CartKey, line_id: &str) -> Result<CartSnapshot> {
        let mut conn = self.db.lock().unwrap();
        let tx = conn.transaction()?;
        let cart = select_cart(&tx, key)?.ok_or(OrderError::EmptyCart)?;

        let rows = tx.execute(
            "DELETE FROM order_items WHERE id=?1 AND order_id=?2",
            params![line_id, cart.id],
        )?;
        if rows == 0 {
            return Err(OrderError::LineNotFound(line_id.to_string()));
        }

        reprice(&tx, &cart.id)?;
        let snapshot = snapshot_in_tx(&tx, &cart.id)?;
        tx.commit()?;
        Ok(snapshot)
    }

    pub fn set_delivery_type(
        &self,
        key: &CartKey,
        delivery_type: DeliveryType,
        address: Option<&str>,
    ) -> Result<CartSnapshot> {
        let mut conn = self.db.lock().unwrap();
        let tx = conn.transaction()?;
        let cart = select_cart(&tx, key)?.ok_or(OrderError::EmptyCart)?;
        let now = Utc::now().to_rfc3339();
        tx.execute(
            "UPDATE orders SET delivery_type=?2, location_address=coalesce(?3, location_address),
                updated_at=?4
             WHERE id=?1",
            params![cart.id, delivery_type.to_string(), address, now],
        )?;
        let snapshot = snapshot_in_tx(&tx, &cart.id)?;
        tx.commit()?;
        Ok(snapshot)
    }

    /// Replace the customer notes (the cart sentinel stays in front).
    pub fn set_notes(&self, key: &CartKey, text: &str) -> Result<CartSnapshot> {
        let mut conn = self.db.lock().unwrap();
        let tx = conn.transaction()?;
        let cart = select_cart(&tx, key)?.ok_or(OrderError::EmptyCart)?;
        let now = Utc::now().to_rfc3339();
        tx.execute(
            "UPDATE orders SET notes=?2, updated_at=?3 WHERE id=?1",
            params![cart.id, format!("{CART_SENTINEL}{text}"), now],
        )?;
        let snapshot = snapshot_in_tx(&tx, &cart.id)?;
        tx.commit()?;
        Ok(snapshot)
    }

    /// Set or clear the requested fulfilment time (RFC 3339 UTC).
    pub fn set_scheduled(&self, key: &CartKey, at: Option<&str>) -> Result<CartSnapshot> {
        let mut conn = self.db.lock().unwrap();
        let tx = conn.transaction()?;
        let cart = select_cart(&tx, key)?.ok_or(OrderError::EmptyCart)?;
        let now = Utc::now().to_rfc3339();
        tx.execute(
            "UPDATE orders SET scheduled_for=?2, updated_at=?3 WHERE id=?1",
            params![cart.id, at, now],
        )?;
        let snapshot = snapshot_in_tx(&tx, &cart.id)?;
        tx.commit()?;
        Ok(snapshot)
    }

    /// Drop the cart and its lines entirely. A later `get_or_create` starts
    /// fresh.
    pub fn clear(&self, key: &CartKey) -> Result<()> {
        let mut conn = self.db.lock().unwrap();
        let tx = conn.transaction()?;
        if let Some(cart) = select_cart(&tx, key)? {
            tx.execute("DELETE FROM order_items WHERE order_id=?1", params![cart.id])?;
            tx.execute("DELETE FROM orders WHERE id=?1", params![cart.id])?;
            info!(cart = %cart.id, "cart cleared");
        }
        tx.commit()?;
        Ok(())
    }

    /// Current cart with lines, or None when the customer has no cart.
    pub fn snapshot(&self, key: &CartKey) -> Result<Option<CartSnapshot>> {
        let mut conn = self.db.lock().unwrap();
        let tx = conn.transaction()?;
        let cart = match select_cart(&tx, key)? {
            Some(c) => c,
            None => return Ok(None),
        };
        let snapshot = snapshot_in_tx(&tx, &cart.id)?;
        tx.commit()?;
        Ok(Some(snapshot))
    }
}

fn select_cart(tx: &Transaction<'_>, key: &CartKey) -> Result<Option<Order>> {
    let mut stmt = tx.prepare(&format!(
        "SELECT {ORDER_SELECT_COLS} FROM orders
         WHERE business_id=?1 AND user_id=?2 AND customer_phone_number=?3 AND status='cart'"
    ))?;
    match stmt.query_row(
        params![key.business_id, key.owner_user_id, key.customer_phone],
        row_to_order,
    ) {
        Ok(o) => Ok(Some(o)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(OrderError::Database(e)),
    }
}

/// Refresh line prices/names from the catalog and recompute order totals.
/// Runs inside the caller's transaction so a concurrent confirm sees either
/// all of it or none of it.
pub(crate) fn reprice(tx: &Transaction<'_>, order_id: &str) -> Result<()> {
    tx.execute(
        "UPDATE order_items SET
            price_at_time = coalesce((SELECT price FROM items WHERE items.id = order_items.item_id), price_at_time),
            name_at_time  = coalesce((SELECT name  FROM items WHERE items.id = order_items.item_id), name_at_time),
            cost_at_time  =          (SELECT cost  FROM items WHERE items.id = order_items.item_id)
         WHERE order_id = ?1",
        params![order_id],
    )?;
    let now = Utc::now().to_rfc3339();
    tx.execute(
        "UPDATE orders SET
            subtotal = (SELECT coalesce(sum(quantity * price_at_time), 0)
                        FROM order_items WHERE order_id = ?1),
            total    = (SELECT coalesce(sum(quantity * price_at_time), 0)
                        FROM order_items WHERE order_id = ?1) + delivery_price,
            updated_at = ?2
         WHERE id = ?1",
        params![order_id, now],
    )?;
    Ok(())
}

pub(crate) fn snapshot_in_tx(tx: &Transaction<'_>, order_id: &str) -> Result<CartSnapshot> {
    let order = {
        let mut stmt = tx.prepare(&format!(
            "SELECT {ORDER_SELECT_COLS} FROM orders WHERE id = ?1"
        ))?;
        stmt.query_row(params![order_id], row_to_order)?
    };
    let lines = lines_in_tx(tx, order_id)?;
    Ok(CartSnapshot { order, lines })
}

pub(crate) fn lines_in_tx(tx: &Transaction<'_>, order_id: &str) -> Result<Vec<OrderItem>> {
    let mut stmt = tx.prepare(&format!(
        "SELECT {ORDER_ITEM_SELECT_COLS} FROM order_items WHERE order_id = ?1 ORDER BY rowid"
    ))?;
    let rows = stmt.query_map(params![order_id], row_to_order_item)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

fn ignore_no_rows<T>(e: rusqlite::Error) -> Result<Option<T>> {
    match e {
        rusqlite::Error::QueryReturnedNoRows => Ok(None),
        other => Err(OrderError::Database(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (CartManager, Arc<Mutex<Connection>>) {
        let conn = Connection::open_in_memory().unwrap();
        plaza_catalog::db::init_db(&conn).unwrap();
        crate::db::init_db(&conn).unwrap();
        let db = Arc::new(Mutex::new(conn));
        (CartManager::new(db.clone()), db)
    }

    fn seed_item(db: &Arc<Mutex<Connection>>, id: &str, name: &str, price: f64) {
        let conn = db.lock().unwrap();
        conn.execute(
            "INSERT INTO items (id, business_id, name, item_type, price, availability,
                days_available, created_at, updated_at)
             VALUES (?1,'biz',?2,'good',?3,'available','[]','2026-01-01','2026-01-01')",
            params![id, name, price],
        )
        .unwrap();
    }

    fn key() -> CartKey {
        CartKey::new("biz", "biz", "+96170000001")
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let (carts, _db) = setup();
        let a = carts.get_or_create(&key(), Platform::Whatsapp).unwrap();
        let b = carts.get_or_create(&key(), Platform::Whatsapp).unwrap();
        assert_eq!(a.id, b.id);
        assert!(a.is_cart());
    }

    #[test]
    fn add_line_merges_same_item_and_notes() {
        let (carts, db) = setup();
        seed_item(&db, "i-1", "Margherita", 10.0);

        carts.add_line(&key(), "i-1", 1, None).unwrap();
        let snap = carts.add_line(&key(), "i-1", 2, None).unwrap();
        assert_eq!(snap.lines.len(), 1);
        assert_eq!(snap.lines[0].quantity, 3);
        assert_eq!(snap.order.subtotal, 30.0);
        assert_eq!(snap.order.total, 30.0);

        // Different notes means a separate line.
        let snap = carts.add_line(&key(), "i-1", 1, Some("no basil")).unwrap();
        assert_eq!(snap.lines.len(), 2);
    }

    #[test]
    fn totals_track_catalog_price_changes() {
        let (carts, db) = setup();
        seed_item(&db, "i-1", "Margherita", 10.0);
        carts.add_line(&key(), "i-1", 2, None).unwrap();

        db.lock()
            .unwrap()
            .execute("UPDATE items SET price = 12.5 WHERE id = 'i-1'", [])
            .unwrap();

        // Any mutation re-prices from the catalog.
        let snap = carts.set_notes(&key(), "ring the bell").unwrap();
        assert_eq!(snap.order.subtotal, 25.0);
        assert_eq!(snap.lines[0].price_at_time, 12.5);
    }

    #[test]
    fn add_then_remove_restores_totals() {
        let (carts, db) = setup();
        seed_item(&db, "i-1", "Margherita", 10.0);
        seed_item(&db, "i-2", "Coke", 2.0);

        carts.add_line(&key(), "i-1", 1, None).unwrap();
        let before = carts.snapshot(&key()).unwrap().unwrap();

        let with_coke = carts.add_line(&key(), "i-2", 3, None).unwrap();
        let line_id = with_coke
            .lines
            .iter()
            .find(|l| l.item_id == "i-2")
            .unwrap()
            .id
            .clone();
        let after = carts.remove_line(&key(), &line_id).unwrap();

        assert_eq!(before.order.subtotal, after.order.subtotal);
        assert_eq!(before.order.total, after.order.total);
    }

    #[test]
    fn hidden_item_is_rejected() {
        let (carts, db) = setup();
        seed_item(&db, "i-1", "Secret", 10.0);
        db.lock()
            .unwrap()
            .execute("UPDATE items SET availability = 'hidden' WHERE id = 'i-1'", [])
            .unwrap();
        let err = carts.add_line(&key(), "i-1", 1, None).unwrap_err();
        assert_eq!(err.code(), "ITEM_NOT_FOUND");
    }

    #[test]
    fn user_notes_strip_sentinel() {
        let (carts, db) = setup();
        seed_item(&db, "i-1", "Margherita", 10.0);
        carts.add_line(&key(), "i-1", 1, None).unwrap();
        let snap = carts.set_notes(&key(), "extra cheese").unwrap();
        assert_eq!(snap.order.user_notes(), Some("extra cheese"));

        let bare = carts.get_or_create(&key(), Platform::Whatsapp).unwrap();
        assert!(bare.notes.as_deref().unwrap().starts_with(CART_SENTINEL));
    }

    #[test]
    fn clear_removes_cart_row() {
        let (carts, db) = setup();
        seed_item(&db, "i-1", "Margherita", 10.0);
        carts.add_line(&key(), "i-1", 1, None).unwrap();
        carts.clear(&key()).unwrap();
        assert!(carts.snapshot(&key()).unwrap().is_none());

        let count: i64 = db
            .lock()
            .unwrap()
            .query_row("SELECT count(*) FROM order_items", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
