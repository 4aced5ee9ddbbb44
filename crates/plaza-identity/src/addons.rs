use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use plaza_core::types::new_id;
use rusqlite::{params, Connection};
use tracing::{debug, info};

use crate::error::Result;
use crate::types::{BusinessAddon, Subscription};

/// The single predicate backing every tool-catalog eligibility check.
///
/// An inactive addon removes the corresponding toolset from the LLM's
/// function catalog; the executors keep a hard guard as well so a stale
/// catalog can never mutate state it shouldn't.
pub struct AddonGate {
    db: Arc<Mutex<Connection>>,
    /// (business_id, addon_key) -> active. Invalidated on toggle.
    cache: Mutex<HashMap<(String, String), bool>>,
}

impl AddonGate {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self {
            db,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Is `addon_key` active for `business_id`? Absent rows read as inactive.
    pub fn is_active(&self, business_id: &str, addon_key: &str) -> Result<bool> {
        let cache_key = (business_id.to_string(), addon_key.to_string());
        if let Some(active) = self.cache.lock().unwrap().get(&cache_key) {
            return Ok(*active);
        }

        let conn = self.db.lock().unwrap();
        let active = conn
            .query_row(
                "SELECT active FROM business_addons
                 WHERE business_id = ?1 AND addon_key = ?2",
                params![business_id, addon_key],
                |row| row.get::<_, i64>(0),
            )
            .map(|v| v != 0)
            .unwrap_or(false);
        drop(conn);

        self.cache.lock().unwrap().insert(cache_key, active);
        debug!(business_id, addon_key, active, "addon gate lookup");
        Ok(active)
    }

    /// Toggle an addon. Upserts the row and invalidates the cached flag.
    pub fn set_active(
        &self,
        business_id: &str,
        addon_key: &str,
        active: bool,
        price_override: Option<f64>,
    ) -> Result<BusinessAddon> {
        let now = Utc::now().to_rfc3339();
        let conn = self.db.lock().unwrap();
        conn.execute(
            "INSERT INTO business_addons (business_id, addon_key, active, price_override, updated_at)
             VALUES (?1,?2,?3,?4,?5)
             ON CONFLICT(business_id, addon_key)
             DO UPDATE SET active=?3, price_override=?4, updated_at=?5",
            params![business_id, addon_key, active as i64, price_override, now],
        )?;
        drop(conn);

        self.cache
            .lock()
            .unwrap()
            .remove(&(business_id.to_string(), addon_key.to_string()));
        info!(business_id, addon_key, active, "addon toggled");
        Ok(BusinessAddon {
            business_id: business_id.to_string(),
            addon_key: addon_key.to_string(),
            active,
            price_override,
        })
    }

    pub fn list_for_business(&self, business_id: &str) -> Result<Vec<BusinessAddon>> {
        let conn = self.db.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT business_id, addon_key, active, price_override
             FROM business_addons WHERE business_id = ?1 ORDER BY addon_key",
        )?;
        let rows = stmt.query_map(params![business_id], |row| {
            Ok(BusinessAddon {
                business_id: row.get(0)?,
                addon_key: row.get(1)?,
                active: row.get::<_, i64>(2)? != 0,
                price_override: row.get(3)?,
            })
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn add_subscription(
        &self,
        business_id: &str,
        plan_key: &str,
        expires_at: Option<&str>,
    ) -> Result<Subscription> {
        let now = Utc::now().to_rfc3339();
        let sub = Subscription {
            id: new_id(),
            business_id: business_id.to_string(),
            plan_key: plan_key.to_string(),
            active: true,
            started_at: now.clone(),
            expires_at: expires_at.map(String::from),
        };
        let conn = self.db.lock().unwrap();
        conn.execute(
            "INSERT INTO subscriptions (id, business_id, plan_key, active, started_at, expires_at)
             VALUES (?1,?2,?3,1,?4,?5)",
            params![sub.id, sub.business_id, sub.plan_key, sub.started_at, sub.expires_at],
        )?;
        Ok(sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> AddonGate {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        AddonGate::new(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn absent_addon_is_inactive() {
        let gate = gate();
        assert!(!gate.is_active("biz-1", "table_reservations").unwrap());
    }

    #[test]
    fn toggle_invalidates_cache() {
        let gate = gate();
        assert!(!gate.is_active("biz-1", "base_bot").unwrap());
        gate.set_active("biz-1", "base_bot", true, None).unwrap();
        assert!(gate.is_active("biz-1", "base_bot").unwrap());
        gate.set_active("biz-1", "base_bot", false, None).unwrap();
        assert!(!gate.is_active("biz-1", "base_bot").unwrap());
    }
}
