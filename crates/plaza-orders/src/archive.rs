//! Archive pipeline: move terminated orders from the operational store into
//! the append-only cold store.
//!
//! The cold store is a separate SQLite database holding one immutable JSON
//! document per order, keyed by `order_id`. Insertion uses INSERT OR IGNORE,
//! so a crash between the cold insert and the operational delete is healed by
//! the next run: the insert becomes a no-op and the delete is retried. In
//! steady state an order lives in exactly one of the two stores.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::{params, Connection};
use tracing::{info, warn};

use crate::error::{OrderError, Result};
use crate::lifecycle::OrderStore;
use crate::types::{ArchivedItem, Order, OrderLog, TimelineEntry};

/// Append-only store of archived order documents.
pub struct OrderLogStore {
    db: Mutex<Connection>,
}

impl OrderLogStore {
    /// Wrap an already-open cold-store connection, initialising the schema.
    pub fn new(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS order_logs (
                order_id    TEXT PRIMARY KEY NOT NULL,
                business_id TEXT NOT NULL,
                user_id     TEXT NOT NULL,
                final_status TEXT NOT NULL,
                document    TEXT NOT NULL,
                archived_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_order_logs_business
                ON order_logs (business_id, archived_at DESC);",
        )?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// Insert a document. Returns true when a row was written, false when the
    /// order was already archived (idempotent re-run).
    pub fn insert(&self, log: &OrderLog) -> Result<bool> {
        let document = serde_json::to_string(log).map_err(|e| {
            OrderError::Database(rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
        })?;
        let conn = self.db.lock().unwrap();
        let rows = conn.execute(
            "INSERT OR IGNORE INTO order_logs
                (order_id, business_id, user_id, final_status, document, archived_at)
             VALUES (?1,?2,?3,?4,?5,?6)",
            params![
                log.order_id,
                log.business_id,
                log.user_id,
                log.final_status.to_string(),
                document,
                log.archived_at
            ],
        )?;
        Ok(rows > 0)
    }

    pub fn get(&self, order_id: &str) -> Result<Option<OrderLog>> {
        let conn = self.db.lock().unwrap();
        let doc: Option<String> = match conn.query_row(
            "SELECT document FROM order_logs WHERE order_id = ?1",
            params![order_id],
            |row| row.get(0),
        ) {
            Ok(d) => Some(d),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => return Err(OrderError::Database(e)),
        };
        match doc {
            Some(d) => Ok(serde_json::from_str(&d).ok()),
            None => Ok(None),
        }
    }

    pub fn count(&self) -> Result<i64> {
        let conn = self.db.lock().unwrap();
        Ok(conn.query_row("SELECT count(*) FROM order_logs", [], |r| r.get(0))?)
    }
}

/// Build the immutable document for an order from its operational rows.
pub fn build_order_log(store: &OrderStore, order: &Order) -> Result<OrderLog> {
    let items = store.items_of(&order.id)?;
    let history = store.history_of(&order.id)?;
    Ok(OrderLog {
        order_id: order.id.clone(),
        business_id: order.business_id.clone(),
        user_id: order.user_id.clone(),
        customer_phone_number: order.customer_phone_number.clone(),
        customer_name: order.customer_name.clone(),
        delivery_type: order.delivery_type,
        final_status: order.status,
        request_type: order.request_type,
        scheduled_for: order.scheduled_for.clone(),
        subtotal: order.subtotal,
        delivery_price: order.delivery_price,
        total: order.total,
        payment_method: order.payment_method.clone(),
        payment_status: order.payment_status,
        notes: order.notes.clone(),
        location_address: order.location_address.clone(),
        language_used: order.language_used.clone(),
        order_source: order.order_source,
        items: items
            .into_iter()
            .map(|i| ArchivedItem {
                item_id: i.item_id,
                name_at_time: i.name_at_time,
                quantity: i.quantity,
                price_at_time: i.price_at_time,
                cost_at_time: i.cost_at_time,
                notes: i.notes,
            })
            .collect(),
        status_timeline: history
            .into_iter()
            .map(|h| TimelineEntry {
                status: h.status,
                changed_by: h.changed_by,
                changed_at: h.changed_at,
            })
            .collect(),
        first_response_at: order.first_response_at.clone(),
        completed_at: order.completed_at.clone(),
        cancelled_at: order.cancelled_at.clone(),
        created_at: order.created_at.clone(),
        archived_at: Utc::now().to_rfc3339(),
    })
}

/// Archive a single order end to end.
///
/// Cold insert happens first; only after it lands does one operational
/// transaction delete history, items, then the order row. A failure at any
/// point leaves the operational rows in place for the next sweep.
pub fn archive_order(
    store: &OrderStore,
    cold: &OrderLogStore,
    operational: &Arc<Mutex<Connection>>,
    order_id: &str,
) -> Result<()> {
    let order = store
        .get(order_id)?
        .ok_or_else(|| OrderError::NotFound(order_id.to_string()))?;
    if !order.status.is_terminal() {
        return Err(OrderError::NotArchivable(order_id.to_string()));
    }

    let log = build_order_log(store, &order)?;
    let inserted = cold.insert(&log)?;
    if !inserted {
        warn!(order = %order_id, "order log already present; retrying operational delete");
    }

    let mut conn = operational.lock().unwrap();
    let tx = conn.transaction()?;
    tx.execute(
        "DELETE FROM order_status_history WHERE order_id = ?1",
        params![order_id],
    )?;
    tx.execute("DELETE FROM order_items WHERE order_id = ?1", params![order_id])?;
    tx.execute("DELETE FROM orders WHERE id = ?1", params![order_id])?;
    tx.commit()?;

    info!(order = %order_id, status = %order.status, "order archived");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::CartManager;
    use crate::types::CartKey;
    use plaza_core::types::{DeliveryType, OrderStatus};

    fn setup() -> (CartManager, OrderStore, OrderLogStore, Arc<Mutex<Connection>>) {
        let conn = Connection::open_in_memory().unwrap();
        plaza_catalog::db::init_db(&conn).unwrap();
        crate::db::init_db(&conn).unwrap();
        let db = Arc::new(Mutex::new(conn));
        let cold = OrderLogStore::new(Connection::open_in_memory().unwrap()).unwrap();
        (
            CartManager::new(db.clone()),
            OrderStore::new(db.clone()),
            cold,
            db,
        )
    }

    fn completed_order(
        carts: &CartManager,
        orders: &OrderStore,
        db: &Arc<Mutex<Connection>>,
    ) -> String {
        db.lock()
            .unwrap()
            .execute(
                "INSERT INTO items (id, business_id, name, item_type, price, availability,
                    days_available, created_at, updated_at)
                 VALUES ('pizza','biz','Pizza','good',10.0,'available','[]','2026-01-01','2026-01-01')",
                [],
            )
            .unwrap();
        let key = CartKey::new("biz", "biz", "+96170000001");
        carts.add_line(&key, "pizza", 2, None).unwrap();
        carts
            .set_delivery_type(&key, DeliveryType::Takeaway, None)
            .unwrap();
        let order = orders.confirm_cart(&key, "bot").unwrap();
        orders
            .update_status(&order.id, OrderStatus::Completed, "owner")
            .unwrap();
        order.id
    }

    #[test]
    fn archive_moves_order_to_cold_store() {
        let (carts, orders, cold, db) = setup();
        let order_id = completed_order(&carts, &orders, &db);

        archive_order(&orders, &cold, &db, &order_id).unwrap();

        // Gone operationally, present in the cold store with the full timeline.
        assert!(orders.get(&order_id).unwrap().is_none());
        assert!(orders.items_of(&order_id).unwrap().is_empty());
        assert!(orders.history_of(&order_id).unwrap().is_empty());

        let log = cold.get(&order_id).unwrap().unwrap();
        assert_eq!(log.final_status, OrderStatus::Completed);
        assert_eq!(log.items.len(), 1);
        assert_eq!(log.items[0].quantity, 2);
        assert_eq!(
            log.status_timeline.last().unwrap().status,
            OrderStatus::Completed
        );
        assert!(log.archived_at >= log.completed_at.clone().unwrap());
    }

    #[test]
    fn archive_is_idempotent() {
        let (carts, orders, cold, db) = setup();
        let order_id = completed_order(&carts, &orders, &db);

        archive_order(&orders, &cold, &db, &order_id).unwrap();
        // Second run: order is gone operationally, so it errors without
        // touching the single cold row.
        let err = archive_order(&orders, &cold, &db, &order_id).unwrap_err();
        assert_eq!(err.code(), "ORDER_NOT_FOUND");
        assert_eq!(cold.count().unwrap(), 1);
    }

    #[test]
    fn interrupted_archive_heals_on_retry() {
        let (carts, orders, cold, db) = setup();
        let order_id = completed_order(&carts, &orders, &db);

        // Simulate a crash after the cold insert but before the delete.
        let order = orders.get(&order_id).unwrap().unwrap();
        let log = build_order_log(&orders, &order).unwrap();
        assert!(cold.insert(&log).unwrap());

        // Full run completes the delete; exactly one cold row remains.
        archive_order(&orders, &cold, &db, &order_id).unwrap();
        assert!(orders.get(&order_id).unwrap().is_none());
        assert_eq!(cold.count().unwrap(), 1);
    }

    #[test]
    fn active_order_is_not_archivable() {
        let (carts, orders, cold, db) = setup();
        db.lock()
            .unwrap()
            .execute(
                "INSERT INTO items (id, business_id, name, item_type, price, availability,
                    days_available, created_at, updated_at)
                 VALUES ('pizza','biz','Pizza','good',10.0,'available','[]','2026-01-01','2026-01-01')",
                [],
            )
            .unwrap();
        let key = CartKey::new("biz", "biz", "+96170000001");
        carts.add_line(&key, "pizza", 1, None).unwrap();
        carts
            .set_delivery_type(&key, DeliveryType::Takeaway, None)
            .unwrap();
        let order = orders.confirm_cart(&key, "bot").unwrap();

        let err = archive_order(&orders, &cold, &db, &order.id).unwrap_err();
        assert_eq!(err.code(), "NOT_ARCHIVABLE");
        assert_eq!(cold.count().unwrap(), 0);
    }
}
