use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use plaza_core::types::{DeliveryType, OrderStatus, RequestType};
use rusqlite::{params, Connection, Transaction};
use tracing::{info, warn};

use crate::cart::{lines_in_tx, reprice};
use crate::db::{row_to_order, row_to_order_item, ORDER_ITEM_SELECT_COLS, ORDER_SELECT_COLS};
use crate::error::{OrderError, Result};
use crate::types::{round_money, CartKey, Order, OrderItem, StatusHistoryEntry};

/// Orders created with `scheduled_for` within this many minutes of now start
/// out `ongoing` instead of `accepted`.
const IMMEDIATE_WINDOW_MINUTES: i64 = 5;

/// The order state machine and its history log.
pub struct OrderStore {
    db: Arc<Mutex<Connection>>,
}

/// Is `from -> to` a legal transition? `has_schedule` gates `ongoing`, which
/// only scheduled requests ever reach. Leaving `cart` happens through
/// `confirm_cart` alone, never through a plain status update.
pub fn transition_allowed(from: OrderStatus, to: OrderStatus, has_schedule: bool) -> bool {
    use OrderStatus::*;
    if from.is_terminal() || from == Cart {
        return false;
    }
    match (from, to) {
        (Accepted, Ongoing) => has_schedule,
        (Accepted, Ready) | (Accepted, Completed) | (Accepted, Cancelled) | (Accepted, Rejected) => {
            true
        }
        (Ongoing, Ready) | (Ongoing, Completed) | (Ongoing, Cancelled) => true,
        (Ready, Completed) | (Ready, Cancelled) => true,
        _ => false,
    }
}

/// Pure cancellation-window check shared by the store and the validator.
///
/// `window_hours` is `max(cancelable_before_hours)` over the order's lines,
/// or the business default when no line carries one. Cancellation at exactly
/// the deadline is allowed; one second past it is not.
pub fn check_cancellation(order: &Order, window_hours: i64, now: DateTime<Utc>) -> Result<()> {
    if order.status.is_terminal() || order.status == OrderStatus::Cart {
        return Err(OrderError::NotCancellable);
    }
    let scheduled_for = order
        .scheduled_for
        .as_deref()
        .ok_or(OrderError::NotCancellable)?;
    let scheduled = DateTime::parse_from_rfc3339(scheduled_for)
        .map_err(|_| OrderError::NotCancellable)?
        .with_timezone(&Utc);
    if scheduled <= now {
        return Err(OrderError::NotCancellable);
    }
    let deadline = scheduled - Duration::hours(window_hours);
    if now > deadline {
        return Err(OrderError::CancelDeadlinePassed);
    }
    Ok(())
}

impl OrderStore {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    /// Convert a cart into a live order. One transaction covers the price
    /// snapshot, status flip, stock decrement, counters, and the first
    /// history row; any failure leaves the cart untouched.
    pub fn confirm_cart(&self, key: &CartKey, changed_by: &str) -> Result<Order> {
        let now = Utc::now();
        self.confirm_cart_at(key, changed_by, now)
    }

    /// Test seam: confirm with an explicit clock.
    pub fn confirm_cart_at(
        &self,
        key: &CartKey,
        changed_by: &str,
        now: DateTime<Utc>,
    ) -> Result<Order> {
        let mut conn = self.db.lock().unwrap();
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let cart = select_cart_row(&tx, key)?.ok_or(OrderError::EmptyCart)?;
        let lines = lines_in_tx(&tx, &cart.id)?;
        if lines.is_empty() {
            return Err(OrderError::EmptyCart);
        }
        let delivery_type = cart.delivery_type.ok_or(OrderError::MissingDeliveryType)?;
        if delivery_type == DeliveryType::Delivery
            && cart
                .location_address
                .as_deref()
                .map(str::trim)
                .unwrap_or("")
                .is_empty()
        {
            return Err(OrderError::MissingAddress);
        }

        // Final price snapshot from the catalog before quantities freeze.
        reprice(&tx, &cart.id)?;
        let lines = lines_in_tx(&tx, &cart.id)?;

        let scheduled = parse_scheduled(cart.scheduled_for.as_deref());
        let (status, request_type) = match scheduled {
            Some(at) if at <= now + Duration::minutes(IMMEDIATE_WINDOW_MINUTES) => {
                (OrderStatus::Ongoing, RequestType::ScheduledRequest)
            }
            Some(_) => (OrderStatus::Accepted, RequestType::ScheduledRequest),
            None => (OrderStatus::Accepted, RequestType::Order),
        };

        for line in &lines {
            decrement_stock(&tx, &line.item_id, line.quantity)?;
        }

        let now_str = now.to_rfc3339();
        let user_notes = cart.user_notes().map(String::from);
        tx.execute(
            "UPDATE orders SET status=?2, request_type=?3, notes=?4, updated_at=?5 WHERE id=?1",
            params![
                cart.id,
                status.to_string(),
                request_type.to_string(),
                user_notes,
                now_str
            ],
        )?;
        append_history(&tx, &cart.id, status, changed_by, &now_str)?;

        let order = select_order(&tx, &cart.id)?.ok_or_else(|| OrderError::NotFound(cart.id.clone()))?;
        tx.commit()?;
        info!(order = %order.id, status = %order.status, total = order.total, "cart confirmed");
        Ok(order)
    }

    /// Apply a status transition, with all side effects in one transaction.
    pub fn update_status(
        &self,
        order_id: &str,
        to: OrderStatus,
        changed_by: &str,
    ) -> Result<Order> {
        let mut conn = self.db.lock().unwrap();
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let order = apply_transition(&tx, order_id, to, changed_by, Utc::now())?;
        tx.commit()?;
        Ok(order)
    }

    /// Customer-initiated cancel, gated by the cancellation window.
    pub fn cancel_by_customer(
        &self,
        order_id: &str,
        business_id: &str,
        customer_phone: &str,
        business_default_hours: i64,
    ) -> Result<Order> {
        let now = Utc::now();
        let mut conn = self.db.lock().unwrap();
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let order = select_order(&tx, order_id)?
            .filter(|o| o.business_id == business_id && o.customer_phone_number == customer_phone)
            .ok_or_else(|| OrderError::NotFound(order_id.to_string()))?;

        let window = cancellation_window_in_tx(&tx, order_id)?.unwrap_or(business_default_hours);
        check_cancellation(&order, window, now)?;

        let order = apply_transition(&tx, order_id, OrderStatus::Cancelled, customer_phone, now)?;
        tx.commit()?;
        Ok(order)
    }

    /// The effective cancellation window (hours) for an order, when any of
    /// its lines carries one.
    pub fn cancellation_window(&self, order_id: &str) -> Result<Option<i64>> {
        let mut conn = self.db.lock().unwrap();
        let tx = conn.transaction()?;
        let window = cancellation_window_in_tx(&tx, order_id)?;
        tx.commit()?;
        Ok(window)
    }

    /// Amend the delivery fee. Legal only while `accepted` with delivery;
    /// the total is recomputed in the same statement.
    pub fn set_delivery_price(&self, order_id: &str, delivery_price: f64) -> Result<Order> {
        let delivery_price = round_money(delivery_price);
        let now = Utc::now().to_rfc3339();
        let mut conn = self.db.lock().unwrap();
        let tx = conn.transaction()?;
        let rows = tx.execute(
            "UPDATE orders SET delivery_price=?2, total=subtotal+?2, updated_at=?3
             WHERE id=?1 AND status='accepted' AND delivery_type='delivery'",
            params![order_id, delivery_price, now],
        )?;
        if rows == 0 {
            return match select_order(&tx, order_id)? {
                Some(_) => Err(OrderError::DeliveryPriceNotAmendable),
                None => Err(OrderError::NotFound(order_id.to_string())),
            };
        }
        let order = select_order(&tx, order_id)?.ok_or_else(|| OrderError::NotFound(order_id.to_string()))?;
        tx.commit()?;
        Ok(order)
    }

    /// Record the conversation language the order was placed in.
    pub fn set_language(&self, order_id: &str, language: &str) -> Result<()> {
        let conn = self.db.lock().unwrap();
        let rows = conn.execute(
            "UPDATE orders SET language_used=?2 WHERE id=?1",
            params![order_id, language],
        )?;
        if rows == 0 {
            return Err(OrderError::NotFound(order_id.to_string()));
        }
        Ok(())
    }

    pub fn get(&self, order_id: &str) -> Result<Option<Order>> {
        let conn = self.db.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ORDER_SELECT_COLS} FROM orders WHERE id = ?1"
        ))?;
        match stmt.query_row(params![order_id], row_to_order) {
            Ok(o) => Ok(Some(o)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(OrderError::Database(e)),
        }
    }

    /// Tenancy-scoped lookup used by customer-facing tools: an order another
    /// customer placed reads as not-found, never as forbidden.
    pub fn get_for_customer(
        &self,
        order_id: &str,
        business_id: &str,
        customer_phone: &str,
    ) -> Result<Order> {
        self.get(order_id)?
            .filter(|o| o.business_id == business_id && o.customer_phone_number == customer_phone)
            .ok_or_else(|| OrderError::NotFound(order_id.to_string()))
    }

    pub fn list_for_customer(
        &self,
        business_id: &str,
        customer_phone: &str,
        limit: usize,
    ) -> Result<Vec<Order>> {
        let conn = self.db.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ORDER_SELECT_COLS} FROM orders
             WHERE business_id=?1 AND customer_phone_number=?2 AND status != 'cart'
             ORDER BY created_at DESC LIMIT ?3"
        ))?;
        let rows = stmt.query_map(
            params![business_id, customer_phone, limit as i64],
            row_to_order,
        )?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn list_for_business(
        &self,
        business_id: &str,
        status: Option<OrderStatus>,
        limit: usize,
    ) -> Result<Vec<Order>> {
        let conn = self.db.lock().unwrap();
        match status {
            Some(s) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ORDER_SELECT_COLS} FROM orders
                     WHERE business_id=?1 AND status=?2
                     ORDER BY updated_at DESC LIMIT ?3"
                ))?;
                let rows = stmt.query_map(
                    params![business_id, s.to_string(), limit as i64],
                    row_to_order,
                )?;
                Ok(rows.filter_map(|r| r.ok()).collect())
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ORDER_SELECT_COLS} FROM orders
                     WHERE business_id=?1 AND status != 'cart'
                     ORDER BY updated_at DESC LIMIT ?2"
                ))?;
                let rows = stmt.query_map(params![business_id, limit as i64], row_to_order)?;
                Ok(rows.filter_map(|r| r.ok()).collect())
            }
        }
    }

    pub fn items_of(&self, order_id: &str) -> Result<Vec<OrderItem>> {
        let conn = self.db.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ORDER_ITEM_SELECT_COLS} FROM order_items WHERE order_id = ?1 ORDER BY rowid"
        ))?;
        let rows = stmt.query_map(params![order_id], row_to_order_item)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn history_of(&self, order_id: &str) -> Result<Vec<StatusHistoryEntry>> {
        let conn = self.db.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, order_id, status, changed_by, changed_at
             FROM order_status_history WHERE order_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![order_id], row_to_history)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Scheduled requests whose fulfilment time has arrived, oldest first.
    /// The completer walks these in 100-row batches.
    pub fn due_scheduled(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Order>> {
        let conn = self.db.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ORDER_SELECT_COLS} FROM orders
             WHERE request_type='scheduled_request' AND status='accepted'
               AND scheduled_for IS NOT NULL AND scheduled_for <= ?1
             ORDER BY scheduled_for LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![now.to_rfc3339(), limit as i64], row_to_order)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Terminated orders older than `cutoff`, candidates for archival.
    pub fn archivable(&self, cutoff: DateTime<Utc>, limit: usize) -> Result<Vec<Order>> {
        let conn = self.db.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ORDER_SELECT_COLS} FROM orders
             WHERE (status='completed' AND completed_at IS NOT NULL AND completed_at < ?1)
                OR (status='cancelled' AND cancelled_at IS NOT NULL AND cancelled_at < ?1)
             ORDER BY updated_at LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![cutoff.to_rfc3339(), limit as i64], row_to_order)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

// ── transaction-scoped helpers ────────────────────────────────────────────────

fn select_cart_row(tx: &Transaction<'_>, key: &CartKey) -> Result<Option<Order>> {
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

pub(crate) fn select_order(tx: &Transaction<'_>, order_id: &str) -> Result<Option<Order>> {
    let mut stmt = tx.prepare(&format!(
        "SELECT {ORDER_SELECT_COLS} FROM orders WHERE id = ?1"
    ))?;
    match stmt.query_row(params![order_id], row_to_order) {
        Ok(o) => Ok(Some(o)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(OrderError::Database(e)),
    }
}

fn append_history(
    tx: &Transaction<'_>,
    order_id: &str,
    status: OrderStatus,
    changed_by: &str,
    changed_at: &str,
) -> Result<()> {
    tx.execute(
        "INSERT INTO order_status_history (order_id, status, changed_by, changed_at)
         VALUES (?1,?2,?3,?4)",
        params![order_id, status.to_string(), changed_by, changed_at],
    )?;
    Ok(())
}

/// Decrement stock for one line. Items with null stock are unlimited and only
/// bump the popularity counter; limited items fail the whole confirmation
/// when the remaining stock cannot cover the quantity.
fn decrement_stock(tx: &Transaction<'_>, item_id: &str, quantity: i64) -> Result<()> {
    let rows = tx.execute(
        "UPDATE items SET stock_quantity = stock_quantity - ?2,
                          times_ordered  = times_ordered + ?2
         WHERE id = ?1 AND stock_quantity IS NOT NULL AND stock_quantity >= ?2",
        params![item_id, quantity],
    )?;
    if rows > 0 {
        return Ok(());
    }
    let rows = tx.execute(
        "UPDATE items SET times_ordered = times_ordered + ?2
         WHERE id = ?1 AND stock_quantity IS NULL",
        params![item_id, quantity],
    )?;
    if rows > 0 {
        return Ok(());
    }
    warn!(item = %item_id, quantity, "stock decrement failed");
    Err(OrderError::InsufficientStock {
        item_id: item_id.to_string(),
    })
}

fn cancellation_window_in_tx(tx: &Transaction<'_>, order_id: &str) -> Result<Option<i64>> {
    let window: Option<i64> = tx.query_row(
        "SELECT max(i.cancelable_before_hours)
         FROM order_items oi JOIN items i ON i.id = oi.item_id
         WHERE oi.order_id = ?1",
        params![order_id],
        |row| row.get(0),
    )?;
    Ok(window)
}

fn apply_transition(
    tx: &Transaction<'_>,
    order_id: &str,
    to: OrderStatus,
    changed_by: &str,
    now: DateTime<Utc>,
) -> Result<Order> {
    let order =
        select_order(tx, order_id)?.ok_or_else(|| OrderError::NotFound(order_id.to_string()))?;
    if !transition_allowed(order.status, to, order.scheduled_for.is_some()) {
        return Err(OrderError::InvalidTransition {
            from: order.status,
            to,
        });
    }

    let now_str = now.to_rfc3339();
    let completed_at = (to == OrderStatus::Completed).then(|| now_str.clone());
    let cancelled_at = (to == OrderStatus::Cancelled).then(|| now_str.clone());
    tx.execute(
        "UPDATE orders SET status=?2,
            completed_at=coalesce(?3, completed_at),
            cancelled_at=coalesce(?4, cancelled_at),
            first_response_at=coalesce(first_response_at, ?5),
            updated_at=?5
         WHERE id=?1",
        params![order_id, to.to_string(), completed_at, cancelled_at, now_str],
    )?;
    append_history(tx, order_id, to, changed_by, &now_str)?;

    if to == OrderStatus::Completed {
        // Delivery counters move with the line quantities.
        let lines = lines_in_tx(tx, order_id)?;
        for line in &lines {
            tx.execute(
                "UPDATE items SET times_delivered = times_delivered + ?2 WHERE id = ?1",
                params![line.item_id, line.quantity],
            )?;
        }
    }

    let order =
        select_order(tx, order_id)?.ok_or_else(|| OrderError::NotFound(order_id.to_string()))?;
    info!(order = %order.id, status = %to, changed_by, "order transitioned");
    Ok(order)
}

fn parse_scheduled(s: Option<&str>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn row_to_history(row: &rusqlite::Row<'_>) -> rusqlite::Result<StatusHistoryEntry> {
    use std::str::FromStr;
    let status = OrderStatus::from_str(&row.get::<_, String>(2)?)
        .unwrap_or(OrderStatus::Cart);
    Ok(StatusHistoryEntry {
        id: row.get(0)?,
        order_id: row.get(1)?,
        status,
        changed_by: row.get(3)?,
        changed_at: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::CartManager;
    use plaza_core::types::Platform;

    fn setup() -> (CartManager, OrderStore, Arc<Mutex<Connection>>) {
        let conn = Connection::open_in_memory().unwrap();
        plaza_catalog::db::init_db(&conn).unwrap();
        crate::db::init_db(&conn).unwrap();
        let db = Arc::new(Mutex::new(conn));
        (
            CartManager::new(db.clone()),
            OrderStore::new(db.clone()),
            db,
        )
    }

    fn seed_item(db: &Arc<Mutex<Connection>>, id: &str, price: f64, stock: Option<i64>) {
        let conn = db.lock().unwrap();
        conn.execute(
            "INSERT INTO items (id, business_id, name, item_type, price, stock_quantity,
                availability, days_available, created_at, updated_at)
             VALUES (?1,'biz',?1,'good',?2,?3,'available','[]','2026-01-01','2026-01-01')",
            params![id, price, stock],
        )
        .unwrap();
    }

    fn key() -> CartKey {
        CartKey::new("biz", "biz", "+96170000001")
    }

    fn build_cart(carts: &CartManager, db: &Arc<Mutex<Connection>>) {
        seed_item(db, "pizza", 10.0, Some(5));
        carts.add_line(&key(), "pizza", 2, None).unwrap();
        carts
            .set_delivery_type(&key(), DeliveryType::Takeaway, None)
            .unwrap();
    }

    #[test]
    fn confirm_freezes_prices_and_decrements_stock() {
        let (carts, orders, db) = setup();
        build_cart(&carts, &db);

        let order = orders.confirm_cart(&key(), "bot").unwrap();
        assert_eq!(order.status, OrderStatus::Accepted);
        assert_eq!(order.request_type, RequestType::Order);
        assert_eq!(order.total, 20.0);
        assert_eq!(order.total, order.subtotal + order.delivery_price);

        let stock: i64 = db
            .lock()
            .unwrap()
            .query_row("SELECT stock_quantity FROM items WHERE id='pizza'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(stock, 3);

        // Catalog price changes no longer affect the confirmed order.
        db.lock()
            .unwrap()
            .execute("UPDATE items SET price = 99.0 WHERE id='pizza'", [])
            .unwrap();
        let items = orders.items_of(&order.id).unwrap();
        assert_eq!(items[0].price_at_time, 10.0);

        // The cart slot is free again.
        assert!(carts.snapshot(&key()).unwrap().is_none());

        let history = orders.history_of(&order.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, OrderStatus::Accepted);
    }

    #[test]
    fn confirm_fails_without_delivery_type() {
        let (carts, orders, db) = setup();
        seed_item(&db, "pizza", 10.0, None);
        carts.add_line(&key(), "pizza", 1, None).unwrap();
        let err = orders.confirm_cart(&key(), "bot").unwrap_err();
        assert_eq!(err.code(), "MISSING_DELIVERY_TYPE");
    }

    #[test]
    fn confirm_delivery_requires_address() {
        let (carts, orders, db) = setup();
        seed_item(&db, "pizza", 10.0, None);
        carts.add_line(&key(), "pizza", 1, None).unwrap();
        carts
            .set_delivery_type(&key(), DeliveryType::Delivery, None)
            .unwrap();
        let err = orders.confirm_cart(&key(), "bot").unwrap_err();
        assert_eq!(err.code(), "MISSING_ADDRESS");

        carts
            .set_delivery_type(&key(), DeliveryType::Delivery, Some("Hamra, main street"))
            .unwrap();
        assert!(orders.confirm_cart(&key(), "bot").is_ok());
    }

    #[test]
    fn insufficient_stock_rolls_back_everything() {
        let (carts, orders, db) = setup();
        seed_item(&db, "pizza", 10.0, Some(1));
        carts.add_line(&key(), "pizza", 3, None).unwrap();
        carts
            .set_delivery_type(&key(), DeliveryType::Takeaway, None)
            .unwrap();

        let err = orders.confirm_cart(&key(), "bot").unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_STOCK");

        // Cart still there, stock untouched, no history row.
        assert!(carts.snapshot(&key()).unwrap().is_some());
        let stock: i64 = db
            .lock()
            .unwrap()
            .query_row("SELECT stock_quantity FROM items WHERE id='pizza'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(stock, 1);
        let count: i64 = db
            .lock()
            .unwrap()
            .query_row("SELECT count(*) FROM order_status_history", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn scheduling_cutoff_picks_initial_status() {
        let (carts, orders, db) = setup();
        let now = Utc::now();

        build_cart(&carts, &db);
        let at_cutoff = (now + Duration::minutes(5)).to_rfc3339();
        carts.set_scheduled(&key(), Some(&at_cutoff)).unwrap();
        let order = orders.confirm_cart_at(&key(), "bot", now).unwrap();
        assert_eq!(order.status, OrderStatus::Ongoing);
        assert_eq!(order.request_type, RequestType::ScheduledRequest);

        // Just past the window the order waits in accepted.
        let key2 = CartKey::new("biz", "biz", "+96170000002");
        carts.add_line(&key2, "pizza", 1, None).unwrap();
        carts
            .set_delivery_type(&key2, DeliveryType::Takeaway, None)
            .unwrap();
        let later = (now + Duration::minutes(5) + Duration::milliseconds(1)).to_rfc3339();
        carts.set_scheduled(&key2, Some(&later)).unwrap();
        let order = orders.confirm_cart_at(&key2, "bot", now).unwrap();
        assert_eq!(order.status, OrderStatus::Accepted);
        assert_eq!(order.request_type, RequestType::ScheduledRequest);
    }

    #[test]
    fn terminal_states_reject_all_transitions() {
        let (carts, orders, db) = setup();
        build_cart(&carts, &db);
        let order = orders.confirm_cart(&key(), "bot").unwrap();

        let done = orders
            .update_status(&order.id, OrderStatus::Completed, "owner")
            .unwrap();
        assert!(done.completed_at.is_some());

        for to in [
            OrderStatus::Accepted,
            OrderStatus::Ongoing,
            OrderStatus::Ready,
            OrderStatus::Completed,
            OrderStatus::Cancelled,
        ] {
            let err = orders.update_status(&order.id, to, "owner").unwrap_err();
            assert_eq!(err.code(), "INVALID_TRANSITION");
        }
    }

    #[test]
    fn ongoing_requires_schedule() {
        let (carts, orders, db) = setup();
        build_cart(&carts, &db);
        let order = orders.confirm_cart(&key(), "bot").unwrap();
        let err = orders
            .update_status(&order.id, OrderStatus::Ongoing, "owner")
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_TRANSITION");
    }

    #[test]
    fn completion_bumps_delivery_counters() {
        let (carts, orders, db) = setup();
        build_cart(&carts, &db);
        let order = orders.confirm_cart(&key(), "bot").unwrap();
        orders
            .update_status(&order.id, OrderStatus::Completed, "owner")
            .unwrap();

        let delivered: i64 = db
            .lock()
            .unwrap()
            .query_row("SELECT times_delivered FROM items WHERE id='pizza'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(delivered, 2);
    }

    #[test]
    fn history_tail_matches_order_status() {
        let (carts, orders, db) = setup();
        build_cart(&carts, &db);
        let order = orders.confirm_cart(&key(), "bot").unwrap();
        orders
            .update_status(&order.id, OrderStatus::Ready, "owner")
            .unwrap();
        let order = orders
            .update_status(&order.id, OrderStatus::Completed, "owner")
            .unwrap();

        let history = orders.history_of(&order.id).unwrap();
        assert_eq!(history.last().unwrap().status, order.status);
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn delivery_price_amendment_rules() {
        let (carts, orders, db) = setup();
        seed_item(&db, "pizza", 10.0, None);
        carts.add_line(&key(), "pizza", 2, None).unwrap();
        carts
            .set_delivery_type(&key(), DeliveryType::Delivery, Some("Hamra"))
            .unwrap();
        let order = orders.confirm_cart(&key(), "bot").unwrap();

        let amended = orders.set_delivery_price(&order.id, 3.5).unwrap();
        assert_eq!(amended.delivery_price, 3.5);
        assert_eq!(amended.total, amended.subtotal + 3.5);

        orders
            .update_status(&order.id, OrderStatus::Completed, "owner")
            .unwrap();
        let err = orders.set_delivery_price(&order.id, 5.0).unwrap_err();
        assert_eq!(err.code(), "DELIVERY_PRICE_NOT_AMENDABLE");
    }

    #[test]
    fn takeaway_order_rejects_delivery_price() {
        let (carts, orders, db) = setup();
        build_cart(&carts, &db);
        let order = orders.confirm_cart(&key(), "bot").unwrap();
        let err = orders.set_delivery_price(&order.id, 2.0).unwrap_err();
        assert_eq!(err.code(), "DELIVERY_PRICE_NOT_AMENDABLE");
    }

    #[test]
    fn cancellation_window_boundary() {
        let now = Utc::now();
        let scheduled = now + Duration::hours(2);
        let order = Order {
            id: "o".into(),
            business_id: "biz".into(),
            user_id: "biz".into(),
            customer_phone_number: "+961".into(),
            customer_name: None,
            delivery_type: Some(DeliveryType::Takeaway),
            status: OrderStatus::Accepted,
            request_type: RequestType::ScheduledRequest,
            scheduled_for: Some(scheduled.to_rfc3339()),
            subtotal: 10.0,
            delivery_price: 0.0,
            total: 10.0,
            payment_method: None,
            payment_status: Default::default(),
            notes: None,
            location_address: None,
            language_used: None,
            order_source: Platform::Whatsapp,
            first_response_at: None,
            completed_at: None,
            cancelled_at: None,
            created_at: now.to_rfc3339(),
            updated_at: now.to_rfc3339(),
        };

        // Deadline is scheduled - 2h == now: exactly at the deadline passes.
        assert!(check_cancellation(&order, 2, now).is_ok());
        // One second later it is denied.
        let late = now + Duration::seconds(1);
        assert!(matches!(
            check_cancellation(&order, 2, late),
            Err(OrderError::CancelDeadlinePassed)
        ));
    }

    #[test]
    fn customer_cancel_requires_ownership() {
        let (carts, orders, db) = setup();
        build_cart(&carts, &db);
        let scheduled = (Utc::now() + Duration::hours(6)).to_rfc3339();
        carts.set_scheduled(&key(), Some(&scheduled)).unwrap();
        let order = orders.confirm_cart(&key(), "bot").unwrap();

        let err = orders
            .cancel_by_customer(&order.id, "biz", "+96170009999", 2)
            .unwrap_err();
        assert_eq!(err.code(), "ORDER_NOT_FOUND");

        let cancelled = orders
            .cancel_by_customer(&order.id, "biz", "+96170000001", 2)
            .unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert!(cancelled.cancelled_at.is_some());
    }
}
