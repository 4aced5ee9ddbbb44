use std::sync::Arc;

use chrono::{DateTime, Utc};
use plaza_core::types::OrderStatus;
use plaza_orders::OrderStore;
use tokio::sync::watch;
use tracing::{error, info};

/// Rows processed per tick; a backlog drains across subsequent ticks.
const BATCH_SIZE: usize = 100;
const TICK_SECS: u64 = 60;

/// Auto-completes scheduled requests whose fulfilment time has arrived.
///
/// Each order transitions in its own transaction; one failure is logged and
/// skipped so it cannot block the rest of the batch.
pub struct ScheduledRequestCompleter {
    orders: Arc<OrderStore>,
}

impl ScheduledRequestCompleter {
    pub fn new(orders: Arc<OrderStore>) -> Self {
        Self { orders }
    }

    /// Main loop: one batch per minute until `shutdown` broadcasts `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("scheduled-request completer started");
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(TICK_SECS));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.run_once(Utc::now());
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("scheduled-request completer shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Process one batch. Returns how many orders completed.
    pub fn run_once(&self, now: DateTime<Utc>) -> usize {
        let due = match self.orders.due_scheduled(now, BATCH_SIZE) {
            Ok(d) => d,
            Err(e) => {
                error!(error = %e, "due-scheduled query failed");
                return 0;
            }
        };
        if due.is_empty() {
            return 0;
        }

        let mut completed = 0;
        for order in due {
            match self
                .orders
                .update_status(&order.id, OrderStatus::Completed, "scheduler")
            {
                Ok(_) => completed += 1,
                Err(e) => {
                    error!(order = %order.id, error = %e, "auto-complete failed; skipping");
                }
            }
        }
        info!(completed, "scheduled requests auto-completed");
        completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plaza_core::types::DeliveryType;
    use plaza_orders::types::CartKey;
    use plaza_orders::CartManager;
    use rusqlite::Connection;
    use std::sync::Mutex;

    fn setup() -> (Arc<OrderStore>, CartManager, Arc<Mutex<Connection>>) {
        let conn = Connection::open_in_memory().unwrap();
        plaza_catalog::db::init_db(&conn).unwrap();
        plaza_orders::db::init_db(&conn).unwrap();
        let db = Arc::new(Mutex::new(conn));
        db.lock()
            .unwrap()
            .execute(
                "INSERT INTO items (id, business_id, name, item_type, price, availability,
                    days_available, created_at, updated_at)
                 VALUES ('pizza','biz','Pizza','good',10.0,'available','[]','2026-01-01','2026-01-01')",
                [],
            )
            .unwrap();
        (
            Arc::new(OrderStore::new(db.clone())),
            CartManager::new(db.clone()),
            db,
        )
    }

    fn scheduled_order(
        carts: &CartManager,
        orders: &OrderStore,
        phone: &str,
        offset_hours: i64,
    ) -> String {
        let key = CartKey::new("biz", "biz", phone);
        carts.add_line(&key, "pizza", 1, None).unwrap();
        carts
            .set_delivery_type(&key, DeliveryType::Takeaway, None)
            .unwrap();
        let at = (Utc::now() + chrono::Duration::hours(offset_hours)).to_rfc3339();
        carts.set_scheduled(&key, Some(&at)).unwrap();
        orders.confirm_cart(&key, "bot").unwrap().id
    }

    #[test]
    fn completes_only_due_orders() {
        let (orders, carts, _db) = setup();
        let due = scheduled_order(&carts, &orders, "+1", 6);
        let not_due = scheduled_order(&carts, &orders, "+2", 48);

        // At +7h the first order is due, the second is not.
        let later = Utc::now() + chrono::Duration::hours(7);
        let completer = ScheduledRequestCompleter::new(orders.clone());
        assert_eq!(completer.run_once(later), 1);

        assert_eq!(
            orders.get(&due).unwrap().unwrap().status,
            OrderStatus::Completed
        );
        assert_eq!(
            orders.get(&not_due).unwrap().unwrap().status,
            OrderStatus::Accepted
        );

        // Idempotent: nothing left to do.
        assert_eq!(completer.run_once(later), 0);
    }

    #[test]
    fn completion_bumps_delivery_counter_and_history() {
        let (orders, carts, db) = setup();
        let id = scheduled_order(&carts, &orders, "+1", 6);
        let later = Utc::now() + chrono::Duration::hours(7);
        ScheduledRequestCompleter::new(orders.clone()).run_once(later);

        let delivered: i64 = db
            .lock()
            .unwrap()
            .query_row("SELECT times_delivered FROM items WHERE id='pizza'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(delivered, 1);

        let history = orders.history_of(&id).unwrap();
        assert_eq!(history.last().unwrap().status, OrderStatus::Completed);
        assert_eq!(history.last().unwrap().changed_by, "scheduler");
    }
}
