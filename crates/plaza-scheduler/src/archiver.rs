use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use tokio::sync::watch;
use tracing::{error, info};

use plaza_orders::archive::archive_order;
use plaza_orders::{OrderLogStore, OrderStore};

use crate::schedule::DailyCron;

const BATCH_SIZE: usize = 100;

/// Daily sweep moving terminated orders into the cold store.
pub struct ArchiveWorker {
    orders: Arc<OrderStore>,
    cold: Arc<OrderLogStore>,
    operational: Arc<Mutex<Connection>>,
    cron: DailyCron,
    age_hours: i64,
    tz_offset_minutes: i32,
}

impl ArchiveWorker {
    pub fn new(
        orders: Arc<OrderStore>,
        cold: Arc<OrderLogStore>,
        operational: Arc<Mutex<Connection>>,
        cron: DailyCron,
        age_hours: i64,
        tz_offset_minutes: i32,
    ) -> Self {
        Self {
            orders,
            cold,
            operational,
            cron,
            age_hours,
            tz_offset_minutes,
        }
    }

    /// Sleep until the next cron firing, run a batch, repeat. Shutdown lets
    /// a running batch finish but starts no new one.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(age_hours = self.age_hours, "archive worker started");
        loop {
            let next = self.cron.next_run(Utc::now(), self.tz_offset_minutes);
            let wait = (next - Utc::now()).to_std().unwrap_or_default();
            info!(next = %next, "archive worker sleeping until next run");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    self.run_once(Utc::now());
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("archive worker shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Archive one batch of old terminated orders. Returns how many moved.
    pub fn run_once(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::hours(self.age_hours);
        let candidates = match self.orders.archivable(cutoff, BATCH_SIZE) {
            Ok(c) => c,
            Err(e) => {
                error!(error = %e, "archivable query failed");
                return 0;
            }
        };
        if candidates.is_empty() {
            return 0;
        }

        let mut archived = 0;
        for order in candidates {
            match archive_order(&self.orders, &self.cold, &self.operational, &order.id) {
                Ok(()) => archived += 1,
                Err(e) => {
                    // Left in place; the next sweep retries it.
                    error!(order = %order.id, error = %e, "archive failed; will retry");
                }
            }
        }
        info!(archived, "orders archived to cold store");
        archived
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plaza_core::types::{DeliveryType, OrderStatus};
    use plaza_orders::types::CartKey;
    use plaza_orders::CartManager;

    fn setup() -> (ArchiveWorker, Arc<OrderStore>, Arc<OrderLogStore>, Arc<Mutex<Connection>>) {
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
        let orders = Arc::new(OrderStore::new(db.clone()));
        let cold = Arc::new(OrderLogStore::new(Connection::open_in_memory().unwrap()).unwrap());
        let worker = ArchiveWorker::new(
            orders.clone(),
            cold.clone(),
            db.clone(),
            DailyCron::parse("0 2 * * *").unwrap(),
            24,
            0,
        );
        (worker, orders, cold, db)
    }

    fn completed_order(db: &Arc<Mutex<Connection>>, orders: &OrderStore, phone: &str) -> String {
        let carts = CartManager::new(db.clone());
        let key = CartKey::new("biz", "biz", phone);
        carts.add_line(&key, "pizza", 1, None).unwrap();
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
    fn archives_only_orders_past_the_age_threshold() {
        let (worker, orders, cold, db) = setup();
        let old = completed_order(&db, &orders, "+1");
        let fresh = completed_order(&db, &orders, "+2");

        // Age the first order's completion stamp past 24 hours.
        let past = (Utc::now() - Duration::hours(30)).to_rfc3339();
        db.lock()
            .unwrap()
            .execute(
                "UPDATE orders SET completed_at=?1 WHERE id=?2",
                rusqlite::params![past, old],
            )
            .unwrap();

        assert_eq!(worker.run_once(Utc::now()), 1);
        assert!(orders.get(&old).unwrap().is_none());
        assert!(orders.get(&fresh).unwrap().is_some());
        assert_eq!(cold.count().unwrap(), 1);

        // Second run is a no-op: steady state has each order in one store.
        assert_eq!(worker.run_once(Utc::now()), 0);
        assert_eq!(cold.count().unwrap(), 1);
    }

    #[test]
    fn cancelled_orders_age_out_too() {
        let (worker, orders, cold, db) = setup();
        let carts = CartManager::new(db.clone());
        let key = CartKey::new("biz", "biz", "+3");
        carts.add_line(&key, "pizza", 1, None).unwrap();
        carts
            .set_delivery_type(&key, DeliveryType::Takeaway, None)
            .unwrap();
        let order = orders.confirm_cart(&key, "bot").unwrap();
        orders
            .update_status(&order.id, OrderStatus::Cancelled, "owner")
            .unwrap();
        let past = (Utc::now() - Duration::hours(30)).to_rfc3339();
        db.lock()
            .unwrap()
            .execute(
                "UPDATE orders SET cancelled_at=?1 WHERE id=?2",
                rusqlite::params![past, order.id],
            )
            .unwrap();

        assert_eq!(worker.run_once(Utc::now()), 1);
        let log = cold.get(&order.id).unwrap().unwrap();
        assert_eq!(log.final_status, OrderStatus::Cancelled);
    }
}
