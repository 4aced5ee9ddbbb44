use std::sync::{Arc, Mutex};

use chrono::Utc;
use plaza_core::types::{new_id, ItemAvailability, ItemType};
use rusqlite::{params, Connection};
use tracing::{debug, info};

use crate::db::{row_to_item, ITEM_SELECT_COLS};
use crate::error::{CatalogError, Result};
use crate::types::{Category, DiningTable, Item, Menu, OpeningHours};

/// Fields supplied when creating an item; everything else gets a default.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub business_id: String,
    pub owner_user_id: Option<String>,
    pub menu_id: Option<String>,
    pub category_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub item_type: ItemType,
    pub price: f64,
    pub cost: Option<f64>,
    pub preparation_time_minutes: Option<i64>,
    pub duration_minutes: Option<i64>,
    pub is_schedulable: bool,
    pub min_schedule_hours: i64,
    pub cancelable_before_hours: Option<i64>,
    pub stock_quantity: Option<i64>,
}

impl NewItem {
    pub fn new(business_id: &str, name: &str, price: f64) -> Self {
        Self {
            business_id: business_id.to_string(),
            owner_user_id: None,
            menu_id: None,
            category_id: None,
            name: name.to_string(),
            description: None,
            item_type: ItemType::Good,
            price,
            cost: None,
            preparation_time_minutes: None,
            duration_minutes: None,
            is_schedulable: false,
            min_schedule_hours: 0,
            cancelable_before_hours: None,
            stock_quantity: None,
        }
    }
}

pub struct CatalogStore {
    db: Arc<Mutex<Connection>>,
}

impl CatalogStore {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    // ── items ─────────────────────────────────────────────────────────────

    pub fn create_item(&self, new: NewItem) -> Result<Item> {
        let now = Utc::now().to_rfc3339();
        let item = Item {
            id: new_id(),
            business_id: new.business_id,
            owner_user_id: new.owner_user_id,
            menu_id: new.menu_id,
            category_id: new.category_id,
            name: new.name,
            description: new.description,
            item_type: new.item_type,
            price: new.price,
            cost: new.cost,
            preparation_time_minutes: new.preparation_time_minutes,
            duration_minutes: new.duration_minutes,
            is_schedulable: new.is_schedulable,
            min_schedule_hours: new.min_schedule_hours,
            cancelable_before_hours: new.cancelable_before_hours,
            stock_quantity: new.stock_quantity,
            availability: ItemAvailability::Available,
            availability_status: None,
            days_available: Vec::new(),
            available_from: None,
            available_to: None,
            times_ordered: 0,
            times_delivered: 0,
            deleted_at: None,
            created_at: now.clone(),
            updated_at: now,
        };
        let days_json = serde_json::to_string(&item.days_available).unwrap_or_else(|_| "[]".into());
        let conn = self.db.lock().unwrap();
        conn.execute(
            "INSERT INTO items (
                id, business_id, owner_user_id, menu_id, category_id, name, description,
                item_type, price, cost, preparation_time_minutes, duration_minutes,
                is_schedulable, min_schedule_hours, cancelable_before_hours, stock_quantity,
                availability, availability_status, days_available, available_from, available_to,
                times_ordered, times_delivered, deleted_at, created_at, updated_at
             ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21,0,0,NULL,?22,?23)",
            params![
                item.id, item.business_id, item.owner_user_id, item.menu_id, item.category_id,
                item.name, item.description, item.item_type.to_string(), item.price, item.cost,
                item.preparation_time_minutes, item.duration_minutes,
                item.is_schedulable as i64, item.min_schedule_hours, item.cancelable_before_hours,
                item.stock_quantity, item.availability.to_string(), item.availability_status,
                days_json, item.available_from, item.available_to,
                item.created_at, item.updated_at,
            ],
        )?;
        info!(item = %item.id, name = %item.name, "item created");
        Ok(item)
    }

    pub fn get_item(&self, id: &str) -> Result<Option<Item>> {
        let conn = self.db.lock().unwrap();
        let mut stmt =
            conn.prepare(&format!("SELECT {ITEM_SELECT_COLS} FROM items WHERE id = ?1"))?;
        match stmt.query_row(params![id], row_to_item) {
            Ok(i) => Ok(Some(i)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CatalogError::Database(e)),
        }
    }

    /// Tenancy + scope check for cart additions: the item must belong to the
    /// business, be business-wide or owned by the cart's owner, and be
    /// customer-visible.
    pub fn get_orderable_item(
        &self,
        business_id: &str,
        owner_user_id: &str,
        item_id: &str,
    ) -> Result<Item> {
        let item = self
            .get_item(item_id)?
            .ok_or_else(|| CatalogError::ItemNotFound(item_id.to_string()))?;
        let scope_ok = item.business_id == business_id
            && item
                .owner_user_id
                .as_deref()
                .map(|o| o == owner_user_id)
                .unwrap_or(true);
        if !scope_ok || !item.is_visible() {
            return Err(CatalogError::ItemNotFound(item_id.to_string()));
        }
        Ok(item)
    }

    /// Customer-facing search: case-insensitive substring over name and
    /// description, hidden and deleted rows excluded, most-ordered first.
    pub fn search_items(
        &self,
        business_id: &str,
        owner_user_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Item>> {
        let pattern = format!("%{}%", query.trim().to_lowercase());
        let conn = self.db.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ITEM_SELECT_COLS} FROM items
             WHERE business_id = ?1
               AND (owner_user_id IS NULL OR owner_user_id = ?2)
               AND deleted_at IS NULL
               AND availability != 'hidden'
               AND (lower(name) LIKE ?3 OR lower(coalesce(description,'')) LIKE ?3)
             ORDER BY times_ordered DESC, name ASC
             LIMIT ?4"
        ))?;
        let rows = stmt.query_map(
            params![business_id, owner_user_id, pattern, limit as i64],
            row_to_item,
        )?;
        let items: Vec<Item> = rows.filter_map(|r| r.ok()).collect();
        debug!(business_id, query, hits = items.len(), "item search");
        Ok(items)
    }

    pub fn list_items(&self, business_id: &str, include_hidden: bool) -> Result<Vec<Item>> {
        let conn = self.db.lock().unwrap();
        let sql = if include_hidden {
            format!(
                "SELECT {ITEM_SELECT_COLS} FROM items
                 WHERE business_id = ?1 AND deleted_at IS NULL ORDER BY name"
            )
        } else {
            format!(
                "SELECT {ITEM_SELECT_COLS} FROM items
                 WHERE business_id = ?1 AND deleted_at IS NULL
                   AND availability != 'hidden' ORDER BY name"
            )
        };
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![business_id], row_to_item)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn set_item_availability(
        &self,
        item_id: &str,
        availability: ItemAvailability,
        status_note: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.db.lock().unwrap();
        let rows = conn.execute(
            "UPDATE items SET availability=?2, availability_status=?3, updated_at=?4
             WHERE id=?1 AND deleted_at IS NULL",
            params![item_id, availability.to_string(), status_note, now],
        )?;
        if rows == 0 {
            return Err(CatalogError::ItemNotFound(item_id.to_string()));
        }
        Ok(())
    }

    pub fn set_item_price(&self, item_id: &str, price: f64) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.db.lock().unwrap();
        let rows = conn.execute(
            "UPDATE items SET price=?2, updated_at=?3 WHERE id=?1 AND deleted_at IS NULL",
            params![item_id, price, now],
        )?;
        if rows == 0 {
            return Err(CatalogError::ItemNotFound(item_id.to_string()));
        }
        Ok(())
    }

    /// Soft delete: the row survives for order history, search skips it.
    pub fn delete_item(&self, item_id: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.db.lock().unwrap();
        let rows = conn.execute(
            "UPDATE items SET deleted_at=?2, updated_at=?2 WHERE id=?1 AND deleted_at IS NULL",
            params![item_id, now],
        )?;
        if rows == 0 {
            return Err(CatalogError::ItemNotFound(item_id.to_string()));
        }
        info!(item = %item_id, "item soft-deleted");
        Ok(())
    }

    // ── menus & categories ────────────────────────────────────────────────

    pub fn create_menu(
        &self,
        business_id: &str,
        owner_user_id: Option<&str>,
        name: &str,
    ) -> Result<Menu> {
        let now = Utc::now().to_rfc3339();
        let menu = Menu {
            id: new_id(),
            business_id: business_id.to_string(),
            owner_user_id: owner_user_id.map(String::from),
            name: name.to_string(),
            is_active: true,
            created_at: now,
        };
        let conn = self.db.lock().unwrap();
        conn.execute(
            "INSERT INTO menus (id, business_id, owner_user_id, name, is_active, created_at)
             VALUES (?1,?2,?3,?4,1,?5)",
            params![menu.id, menu.business_id, menu.owner_user_id, menu.name, menu.created_at],
        )?;
        Ok(menu)
    }

    pub fn list_menus(&self, business_id: &str) -> Result<Vec<Menu>> {
        let conn = self.db.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, business_id, owner_user_id, name, is_active, created_at
             FROM menus WHERE business_id = ?1 ORDER BY name",
        )?;
        let rows = stmt.query_map(params![business_id], |row| {
            Ok(Menu {
                id: row.get(0)?,
                business_id: row.get(1)?,
                owner_user_id: row.get(2)?,
                name: row.get(3)?,
                is_active: row.get::<_, i64>(4)? != 0,
                created_at: row.get(5)?,
            })
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn create_category(
        &self,
        business_id: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<Category> {
        let now = Utc::now().to_rfc3339();
        let cat = Category {
            id: new_id(),
            business_id: business_id.to_string(),
            name: name.to_string(),
            description: description.map(String::from),
            created_at: now,
        };
        let conn = self.db.lock().unwrap();
        conn.execute(
            "INSERT INTO service_categories (id, business_id, name, description, created_at)
             VALUES (?1,?2,?3,?4,?5)",
            params![cat.id, cat.business_id, cat.name, cat.description, cat.created_at],
        )?;
        Ok(cat)
    }

    pub fn list_categories(&self, business_id: &str) -> Result<Vec<Category>> {
        let conn = self.db.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, business_id, name, description, created_at
             FROM service_categories WHERE business_id = ?1 ORDER BY name",
        )?;
        let rows = stmt.query_map(params![business_id], |row| {
            Ok(Category {
                id: row.get(0)?,
                business_id: row.get(1)?,
                name: row.get(2)?,
                description: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    // ── tables ────────────────────────────────────────────────────────────

    pub fn create_table(
        &self,
        business_id: &str,
        owner_user_id: &str,
        table_number: i64,
        min_seats: u32,
        max_seats: u32,
        position_label: Option<&str>,
    ) -> Result<DiningTable> {
        if min_seats > max_seats {
            return Err(CatalogError::InvalidCapacity {
                min: min_seats,
                max: max_seats,
            });
        }
        let now = Utc::now().to_rfc3339();
        let table = DiningTable {
            id: new_id(),
            business_id: business_id.to_string(),
            owner_user_id: owner_user_id.to_string(),
            table_number,
            min_seats,
            max_seats,
            position_label: position_label.map(String::from),
            is_active: true,
            created_at: now,
        };
        let conn = self.db.lock().unwrap();
        conn.execute(
            "INSERT INTO tables (id, business_id, owner_user_id, table_number,
                min_seats, max_seats, position_label, is_active, created_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,1,?8)",
            params![
                table.id, table.business_id, table.owner_user_id, table.table_number,
                table.min_seats, table.max_seats, table.position_label, table.created_at,
            ],
        )?;
        Ok(table)
    }

    pub fn get_table(&self, id: &str) -> Result<Option<DiningTable>> {
        let conn = self.db.lock().unwrap();
        let mut stmt = conn.prepare(&format!("{TABLE_SELECT_SQL} WHERE id = ?1"))?;
        match stmt.query_row(params![id], row_to_table) {
            Ok(t) => Ok(Some(t)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CatalogError::Database(e)),
        }
    }

    /// Active tables for an owner, ordered by table number ascending. That
    /// ordering is also the reservation auto-selection tie-break.
    pub fn list_tables(&self, owner_user_id: &str, active_only: bool) -> Result<Vec<DiningTable>> {
        let conn = self.db.lock().unwrap();
        let sql = if active_only {
            format!("{TABLE_SELECT_SQL} WHERE owner_user_id = ?1 AND is_active = 1 ORDER BY table_number")
        } else {
            format!("{TABLE_SELECT_SQL} WHERE owner_user_id = ?1 ORDER BY table_number")
        };
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![owner_user_id], row_to_table)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn set_table_active(&self, table_id: &str, is_active: bool) -> Result<()> {
        let conn = self.db.lock().unwrap();
        let rows = conn.execute(
            "UPDATE tables SET is_active=?2 WHERE id=?1",
            params![table_id, is_active as i64],
        )?;
        if rows == 0 {
            return Err(CatalogError::TableNotFound(table_id.to_string()));
        }
        Ok(())
    }

    // ── opening hours ─────────────────────────────────────────────────────

    pub fn upsert_opening_hours(&self, hours: &OpeningHours) -> Result<()> {
        let conn = self.db.lock().unwrap();
        conn.execute(
            "INSERT INTO opening_hours
                (owner_id, day_of_week, open_time, close_time, is_closed, last_order_time)
             VALUES (?1,?2,?3,?4,?5,?6)
             ON CONFLICT(owner_id, day_of_week)
             DO UPDATE SET open_time=?3, close_time=?4, is_closed=?5, last_order_time=?6",
            params![
                hours.owner_id,
                hours.day_of_week,
                hours.open_time,
                hours.close_time,
                hours.is_closed as i64,
                hours.last_order_time,
            ],
        )?;
        Ok(())
    }

    pub fn opening_hours_for(&self, owner_id: &str, day_of_week: u8) -> Result<Option<OpeningHours>> {
        let conn = self.db.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT owner_id, day_of_week, open_time, close_time, is_closed, last_order_time
             FROM opening_hours WHERE owner_id = ?1 AND day_of_week = ?2",
        )?;
        match stmt.query_row(params![owner_id, day_of_week], row_to_hours) {
            Ok(h) => Ok(Some(h)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CatalogError::Database(e)),
        }
    }

    pub fn list_opening_hours(&self, owner_id: &str) -> Result<Vec<OpeningHours>> {
        let conn = self.db.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT owner_id, day_of_week, open_time, close_time, is_closed, last_order_time
             FROM opening_hours WHERE owner_id = ?1 ORDER BY day_of_week",
        )?;
        let rows = stmt.query_map(params![owner_id], row_to_hours)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

const TABLE_SELECT_SQL: &str =
    "SELECT id, business_id, owner_user_id, table_number, min_seats, max_seats,
            position_label, is_active, created_at
     FROM tables";

fn row_to_table(row: &rusqlite::Row<'_>) -> rusqlite::Result<DiningTable> {
    Ok(DiningTable {
        id: row.get(0)?,
        business_id: row.get(1)?,
        owner_user_id: row.get(2)?,
        table_number: row.get(3)?,
        min_seats: row.get(4)?,
        max_seats: row.get(5)?,
        position_label: row.get(6)?,
        is_active: row.get::<_, i64>(7)? != 0,
        created_at: row.get(8)?,
    })
}

fn row_to_hours(row: &rusqlite::Row<'_>) -> rusqlite::Result<OpeningHours> {
    Ok(OpeningHours {
        owner_id: row.get(0)?,
        day_of_week: row.get(1)?,
        open_time: row.get(2)?,
        close_time: row.get(3)?,
        is_closed: row.get::<_, i64>(4)? != 0,
        last_order_time: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> CatalogStore {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        CatalogStore::new(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn hidden_items_never_surface_in_search() {
        let store = store();
        let pizza = store
            .create_item(NewItem::new("biz", "Margherita Pizza", 12.0))
            .unwrap();
        let secret = store
            .create_item(NewItem::new("biz", "Secret Margherita", 99.0))
            .unwrap();
        store
            .set_item_availability(&secret.id, ItemAvailability::Hidden, None)
            .unwrap();

        let hits = store.search_items("biz", "owner", "margherita", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, pizza.id);
    }

    #[test]
    fn soft_deleted_items_are_not_orderable() {
        let store = store();
        let item = store.create_item(NewItem::new("biz", "Coke", 2.0)).unwrap();
        store.delete_item(&item.id).unwrap();

        let err = store.get_orderable_item("biz", "biz", &item.id).unwrap_err();
        assert_eq!(err.code(), "ITEM_NOT_FOUND");
        assert!(store.search_items("biz", "biz", "coke", 10).unwrap().is_empty());
    }

    #[test]
    fn owner_scope_is_enforced() {
        let store = store();
        let mut new = NewItem::new("biz", "Branch Special", 8.0);
        new.owner_user_id = Some("branch-a".into());
        let item = store.create_item(new).unwrap();

        assert!(store.get_orderable_item("biz", "branch-a", &item.id).is_ok());
        assert!(store.get_orderable_item("biz", "branch-b", &item.id).is_err());
    }

    #[test]
    fn capacity_check_rejects_min_over_max() {
        let store = store();
        let err = store
            .create_table("biz", "biz", 1, 6, 2, None)
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_CAPACITY");
    }

    #[test]
    fn tables_ordered_by_number() {
        let store = store();
        store.create_table("biz", "biz", 5, 2, 4, None).unwrap();
        store.create_table("biz", "biz", 1, 2, 4, Some("terrace")).unwrap();
        store.create_table("biz", "biz", 3, 4, 8, None).unwrap();

        let tables = store.list_tables("biz", true).unwrap();
        let numbers: Vec<i64> = tables.iter().map(|t| t.table_number).collect();
        assert_eq!(numbers, vec![1, 3, 5]);
    }
}
