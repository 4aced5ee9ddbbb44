use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, Utc};
use plaza_core::types::{new_id, ReservationStatus, ReservationType};
use rusqlite::{params, Connection, Transaction};
use tracing::{debug, info};

use plaza_catalog::hours::{format_hhmm, parse_hhmm};
use plaza_catalog::types::DiningTable;

use crate::db::{row_to_reservation, RESERVATION_SELECT_COLS};
use crate::error::{ReservationError, Result};
use crate::types::{NewReservation, Reservation, ReservationItem};

pub struct ReservationStore {
    db: Arc<Mutex<Connection>>,
}

impl ReservationStore {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    /// Tables free for a slot, capacity- and position-filtered, ordered by
    /// table number ascending (the auto-selection tie-break).
    pub fn available_for_slot(
        &self,
        owner_user_id: &str,
        date: &str,
        time: &str,
        guests: Option<u32>,
        position_pref: Option<&str>,
    ) -> Result<Vec<DiningTable>> {
        let date = normalize_date(date)?;
        let time = normalize_time(time)?;
        let conn = self.db.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT t.id, t.business_id, t.owner_user_id, t.table_number, t.min_seats,
                    t.max_seats, t.position_label, t.is_active, t.created_at
             FROM tables t
             WHERE t.owner_user_id = ?1 AND t.is_active = 1
               AND NOT EXISTS (
                   SELECT 1 FROM reservations r
                   WHERE r.table_id = t.id
                     AND r.reservation_date = ?2 AND r.reservation_time = ?3
                     AND r.status = 'confirmed')
               AND (?4 IS NULL OR (t.min_seats <= ?4 AND t.max_seats >= ?4))
               AND (?5 IS NULL OR instr(lower(coalesce(t.position_label,'')), lower(?5)) > 0)
             ORDER BY t.table_number",
        )?;
        let rows = stmt.query_map(params![owner_user_id, date, time, guests, position_pref], |row| {
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
        })?;
        let tables: Vec<DiningTable> = rows.filter_map(|r| r.ok()).collect();
        debug!(owner_user_id, date, time, candidates = tables.len(), "slot availability");
        Ok(tables)
    }

    /// Create a reservation with status `confirmed`.
    ///
    /// For table reservations the table is resolved (explicit number or
    /// auto-selected) and capacity-checked; the partial unique index decides
    /// slot races, so the loser of two concurrent creates gets `SLOT_TAKEN`.
    pub fn create(&self, req: NewReservation) -> Result<Reservation> {
        let customer_name = req
            .customer_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or(ReservationError::MissingCustomerName)?;
        let date = normalize_date(&req.reservation_date)?;
        let time = normalize_time(&req.reservation_time)?;

        let table_id = match req.reservation_type {
            ReservationType::Appointment => None,
            ReservationType::Table => Some(self.resolve_table(&req, &date, &time)?),
        };

        let now = Utc::now().to_rfc3339();
        let reservation = Reservation {
            id: new_id(),
            business_user_id: req.business_user_id,
            owner_user_id: req.owner_user_id,
            table_id,
            customer_phone_number: req.customer_phone_number,
            customer_name: customer_name.to_string(),
            reservation_date: date,
            reservation_time: time,
            number_of_guests: req.number_of_guests,
            reservation_type: req.reservation_type,
            status: ReservationStatus::Confirmed,
            notes: req.notes,
            created_at: now.clone(),
            updated_at: now,
        };

        let conn = self.db.lock().unwrap();
        conn.execute(
            "INSERT INTO reservations
                (id, business_user_id, owner_user_id, table_id, customer_phone_number,
                 customer_name, reservation_date, reservation_time, number_of_guests,
                 reservation_type, status, notes, created_at, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,'confirmed',?11,?12,?12)",
            params![
                reservation.id,
                reservation.business_user_id,
                reservation.owner_user_id,
                reservation.table_id,
                reservation.customer_phone_number,
                reservation.customer_name,
                reservation.reservation_date,
                reservation.reservation_time,
                reservation.number_of_guests,
                reservation.reservation_type.to_string(),
                reservation.notes,
                reservation.created_at,
            ],
        )
        .map_err(map_slot_conflict)?;

        info!(
            reservation = %reservation.id,
            date = %reservation.reservation_date,
            time = %reservation.reservation_time,
            "reservation confirmed"
        );
        Ok(reservation)
    }

    /// `confirmed -> {cancelled, completed, no_show}`; anything else fails.
    /// Leaving `confirmed` releases the slot automatically since availability
    /// is derived.
    pub fn update_status(&self, reservation_id: &str, to: ReservationStatus) -> Result<Reservation> {
        let mut conn = self.db.lock().unwrap();
        let tx = conn.transaction()?;
        let reservation = select_reservation(&tx, reservation_id)?
            .ok_or_else(|| ReservationError::NotFound(reservation_id.to_string()))?;
        if reservation.status.is_terminal() || to == ReservationStatus::Confirmed {
            return Err(ReservationError::InvalidTransition {
                from: reservation.status,
                to,
            });
        }
        let now = Utc::now().to_rfc3339();
        tx.execute(
            "UPDATE reservations SET status=?2, updated_at=?3 WHERE id=?1",
            params![reservation_id, to.to_string(), now],
        )?;
        let reservation = select_reservation(&tx, reservation_id)?
            .ok_or_else(|| ReservationError::NotFound(reservation_id.to_string()))?;
        tx.commit()?;
        info!(reservation = %reservation_id, status = %to, "reservation transitioned");
        Ok(reservation)
    }

    pub fn cancel(&self, reservation_id: &str) -> Result<Reservation> {
        self.update_status(reservation_id, ReservationStatus::Cancelled)
    }

    pub fn get(&self, reservation_id: &str) -> Result<Option<Reservation>> {
        let conn = self.db.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {RESERVATION_SELECT_COLS} FROM reservations WHERE id = ?1"
        ))?;
        match stmt.query_row(params![reservation_id], row_to_reservation) {
            Ok(r) => Ok(Some(r)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(ReservationError::Database(e)),
        }
    }

    /// Tenancy-scoped lookup: someone else's reservation reads as not-found.
    pub fn get_for_customer(
        &self,
        reservation_id: &str,
        business_user_id: &str,
        customer_phone: &str,
    ) -> Result<Reservation> {
        self.get(reservation_id)?
            .filter(|r| {
                r.business_user_id == business_user_id
                    && r.customer_phone_number == customer_phone
            })
            .ok_or_else(|| ReservationError::NotFound(reservation_id.to_string()))
    }

    pub fn list_for_customer(
        &self,
        business_user_id: &str,
        customer_phone: &str,
        limit: usize,
    ) -> Result<Vec<Reservation>> {
        let conn = self.db.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {RESERVATION_SELECT_COLS} FROM reservations
             WHERE business_user_id=?1 AND customer_phone_number=?2
             ORDER BY reservation_date DESC, reservation_time DESC LIMIT ?3"
        ))?;
        let rows = stmt.query_map(
            params![business_user_id, customer_phone, limit as i64],
            row_to_reservation,
        )?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Reservations in a date range, for the calendar endpoint.
    pub fn list_range(
        &self,
        business_user_id: &str,
        from_date: &str,
        to_date: &str,
    ) -> Result<Vec<Reservation>> {
        let from = normalize_date(from_date)?;
        let to = normalize_date(to_date)?;
        let conn = self.db.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {RESERVATION_SELECT_COLS} FROM reservations
             WHERE business_user_id=?1 AND reservation_date >= ?2 AND reservation_date <= ?3
             ORDER BY reservation_date, reservation_time"
        ))?;
        let rows = stmt.query_map(params![business_user_id, from, to], row_to_reservation)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    // ── pre-ordered items ─────────────────────────────────────────────────

    /// Attach an item while the reservation is still confirmed. The price is
    /// snapshotted here and never re-read.
    pub fn add_item(
        &self,
        reservation_id: &str,
        item_id: &str,
        quantity: i64,
        notes: Option<&str>,
    ) -> Result<ReservationItem> {
        let mut conn = self.db.lock().unwrap();
        let tx = conn.transaction()?;
        let reservation = select_reservation(&tx, reservation_id)?
            .ok_or_else(|| ReservationError::NotFound(reservation_id.to_string()))?;
        if reservation.status != ReservationStatus::Confirmed {
            return Err(ReservationError::NotConfirmed);
        }

        let (name, price): (String, f64) = tx
            .query_row(
                "SELECT name, price FROM items
                 WHERE id = ?1 AND business_id = ?2
                   AND deleted_at IS NULL AND availability = 'available'",
                params![item_id, reservation.business_user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => ReservationError::Catalog(
                    plaza_catalog::CatalogError::ItemNotFound(item_id.to_string()),
                ),
                other => ReservationError::Database(other),
            })?;

        let item = ReservationItem {
            id: new_id(),
            reservation_id: reservation_id.to_string(),
            item_id: item_id.to_string(),
            quantity,
            price_at_time: price,
            name_at_time: name,
            notes: notes.map(String::from),
        };
        tx.execute(
            "INSERT INTO reservation_items
                (id, reservation_id, item_id, quantity, price_at_time, name_at_time, notes)
             VALUES (?1,?2,?3,?4,?5,?6,?7)",
            params![
                item.id,
                item.reservation_id,
                item.item_id,
                item.quantity,
                item.price_at_time,
                item.name_at_time,
                item.notes
            ],
        )?;
        tx.commit()?;
        Ok(item)
    }

    pub fn remove_item(&self, reservation_id: &str, line_id: &str) -> Result<()> {
        let mut conn = self.db.lock().unwrap();
        let tx = conn.transaction()?;
        let reservation = select_reservation(&tx, reservation_id)?
            .ok_or_else(|| ReservationError::NotFound(reservation_id.to_string()))?;
        if reservation.status != ReservationStatus::Confirmed {
            return Err(ReservationError::NotConfirmed);
        }
        let rows = tx.execute(
            "DELETE FROM reservation_items WHERE id=?1 AND reservation_id=?2",
            params![line_id, reservation_id],
        )?;
        tx.commit()?;
        if rows == 0 {
            return Err(ReservationError::NotFound(line_id.to_string()));
        }
        Ok(())
    }

    pub fn list_items(&self, reservation_id: &str) -> Result<Vec<ReservationItem>> {
        let conn = self.db.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, reservation_id, item_id, quantity, price_at_time, name_at_time, notes
             FROM reservation_items WHERE reservation_id = ?1 ORDER BY rowid",
        )?;
        let rows = stmt.query_map(params![reservation_id], |row| {
            Ok(ReservationItem {
                id: row.get(0)?,
                reservation_id: row.get(1)?,
                item_id: row.get(2)?,
                quantity: row.get(3)?,
                price_at_time: row.get(4)?,
                name_at_time: row.get(5)?,
                notes: row.get(6)?,
            })
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    // ── private helpers ───────────────────────────────────────────────────

    /// Pick the table for a new reservation: the explicit table number when
    /// given, otherwise the lowest-numbered free table that fits.
    fn resolve_table(&self, req: &NewReservation, date: &str, time: &str) -> Result<String> {
        if let Some(number) = req.table_number {
            let conn = self.db.lock().unwrap();
            let (id, min_seats, max_seats): (String, u32, u32) = conn
                .query_row(
                    "SELECT id, min_seats, max_seats FROM tables
                     WHERE owner_user_id=?1 AND table_number=?2 AND is_active=1",
                    params![req.owner_user_id, number],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .map_err(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => ReservationError::NoTablesAvailable,
                    other => ReservationError::Database(other),
                })?;
            if let Some(guests) = req.number_of_guests {
                if guests < min_seats || guests > max_seats {
                    return Err(ReservationError::CapacityMismatch {
                        table_number: number,
                        guests,
                    });
                }
            }
            return Ok(id);
        }

        let candidates = self.available_for_slot(
            &req.owner_user_id,
            date,
            time,
            req.number_of_guests,
            req.position_pref.as_deref(),
        )?;
        candidates
            .into_iter()
            .next()
            .map(|t| t.id)
            .ok_or(ReservationError::NoTablesAvailable)
    }
}

fn select_reservation(tx: &Transaction<'_>, id: &str) -> Result<Option<Reservation>> {
    let mut stmt = tx.prepare(&format!(
        "SELECT {RESERVATION_SELECT_COLS} FROM reservations WHERE id = ?1"
    ))?;
    match stmt.query_row(params![id], row_to_reservation) {
        Ok(r) => Ok(Some(r)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(ReservationError::Database(e)),
    }
}

/// "YYYY-MM-DD" or bust.
fn normalize_date(s: &str) -> Result<String> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .map_err(|_| ReservationError::InvalidDateTime(s.to_string()))
}

/// Normalise to zero-padded "HH:MM" so string equality is slot equality.
fn normalize_time(s: &str) -> Result<String> {
    parse_hhmm(s.trim())
        .map(format_hhmm)
        .map_err(|_| ReservationError::InvalidDateTime(s.to_string()))
}

fn map_slot_conflict(e: rusqlite::Error) -> ReservationError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            ReservationError::SlotTaken
        }
        _ => ReservationError::Database(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (ReservationStore, Arc<Mutex<Connection>>) {
        let conn = Connection::open_in_memory().unwrap();
        plaza_catalog::db::init_db(&conn).unwrap();
        crate::db::init_db(&conn).unwrap();
        let db = Arc::new(Mutex::new(conn));
        (ReservationStore::new(db.clone()), db)
    }

    fn seed_table(db: &Arc<Mutex<Connection>>, number: i64, min: u32, max: u32, label: Option<&str>) {
        let conn = db.lock().unwrap();
        conn.execute(
            "INSERT INTO tables (id, business_id, owner_user_id, table_number, min_seats,
                max_seats, position_label, is_active, created_at)
             VALUES (?1,'biz','biz',?2,?3,?4,?5,1,'2026-01-01')",
            params![format!("t-{number}"), number, min, max, label],
        )
        .unwrap();
    }

    fn request(guests: Option<u32>) -> NewReservation {
        NewReservation {
            business_user_id: "biz".into(),
            owner_user_id: "biz".into(),
            customer_phone_number: "+96170000001".into(),
            customer_name: Some("Rania".into()),
            reservation_date: "2026-08-07".into(),
            reservation_time: "20:00".into(),
            number_of_guests: guests,
            reservation_type: ReservationType::Table,
            table_number: None,
            position_pref: None,
            notes: None,
        }
    }

    #[test]
    fn missing_name_is_rejected() {
        let (store, db) = setup();
        seed_table(&db, 1, 2, 4, None);
        let mut req = request(Some(2));
        req.customer_name = Some("   ".into());
        let err = store.create(req).unwrap_err();
        assert_eq!(err.code(), "MISSING_CUSTOMER_NAME");
    }

    #[test]
    fn auto_selection_picks_lowest_table_number() {
        let (store, db) = setup();
        seed_table(&db, 7, 2, 6, Some("terrace"));
        seed_table(&db, 3, 2, 6, Some("terrace"));
        seed_table(&db, 5, 2, 6, Some("terrace"));

        let mut req = request(Some(4));
        req.position_pref = Some("Terrace".into());
        let reservation = store.create(req).unwrap();
        assert_eq!(reservation.table_id.as_deref(), Some("t-3"));
    }

    #[test]
    fn slot_exclusion_allows_exactly_one_confirmed() {
        let (store, db) = setup();
        seed_table(&db, 1, 2, 4, None);

        store.create(request(Some(2))).unwrap();
        // Same slot, same single table: loser gets SLOT_TAKEN via the
        // explicit-table path, NO_TABLES_AVAILABLE via auto-selection.
        let err = store.create(request(Some(2))).unwrap_err();
        assert_eq!(err.code(), "NO_TABLES_AVAILABLE");

        let mut explicit = request(Some(2));
        explicit.table_number = Some(1);
        let err = store.create(explicit).unwrap_err();
        assert_eq!(err.code(), "SLOT_TAKEN");

        // A different time on the same table is free.
        let mut other_time = request(Some(2));
        other_time.reservation_time = "20:15".into();
        assert!(store.create(other_time).is_ok());
    }

    #[test]
    fn capacity_boundaries() {
        let (store, db) = setup();
        seed_table(&db, 1, 2, 4, None);

        // guests == max_seats fits.
        assert!(store.create(request(Some(4))).is_ok());

        // guests == max_seats + 1 does not.
        let mut too_many = request(Some(5));
        too_many.reservation_time = "21:00".into();
        let err = store.create(too_many).unwrap_err();
        assert_eq!(err.code(), "NO_TABLES_AVAILABLE");

        let mut explicit = request(Some(5));
        explicit.reservation_time = "21:00".into();
        explicit.table_number = Some(1);
        let err = store.create(explicit).unwrap_err();
        assert_eq!(err.code(), "CAPACITY_MISMATCH");
    }

    #[test]
    fn cancelling_releases_the_slot() {
        let (store, db) = setup();
        seed_table(&db, 1, 2, 4, None);

        let first = store.create(request(Some(2))).unwrap();
        store.cancel(&first.id).unwrap();
        assert!(store.create(request(Some(2))).is_ok());
    }

    #[test]
    fn terminal_reservations_are_frozen() {
        let (store, db) = setup();
        seed_table(&db, 1, 2, 4, None);
        let reservation = store.create(request(Some(2))).unwrap();
        store
            .update_status(&reservation.id, ReservationStatus::NoShow)
            .unwrap();

        let err = store
            .update_status(&reservation.id, ReservationStatus::Completed)
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_TRANSITION");
    }

    #[test]
    fn time_normalisation_makes_slots_collide() {
        let (store, db) = setup();
        seed_table(&db, 1, 2, 4, None);

        let mut first = request(Some(2));
        first.reservation_time = "8:00".into();
        // 8:00 normalises to 08:00, so these are different slots from 20:00.
        let r = store.create(first).unwrap();
        assert_eq!(r.reservation_time, "08:00");

        let mut clash = request(Some(2));
        clash.reservation_time = "8:00".into();
        clash.table_number = Some(1);
        let err = store.create(clash).unwrap_err();
        assert_eq!(err.code(), "SLOT_TAKEN");
    }

    #[test]
    fn preorder_items_only_while_confirmed() {
        let (store, db) = setup();
        seed_table(&db, 1, 2, 4, None);
        db.lock()
            .unwrap()
            .execute(
                "INSERT INTO items (id, business_id, name, item_type, price, availability,
                    days_available, created_at, updated_at)
                 VALUES ('cake','biz','Cheesecake','good',6.5,'available','[]','2026-01-01','2026-01-01')",
                [],
            )
            .unwrap();

        let reservation = store.create(request(Some(2))).unwrap();
        let line = store.add_item(&reservation.id, "cake", 2, None).unwrap();
        assert_eq!(line.price_at_time, 6.5);

        store
            .update_status(&reservation.id, ReservationStatus::Completed)
            .unwrap();
        let err = store.add_item(&reservation.id, "cake", 1, None).unwrap_err();
        assert_eq!(err.code(), "NOT_CONFIRMED");
    }

    #[test]
    fn appointments_skip_table_allocation() {
        let (store, _db) = setup();
        let mut req = request(None);
        req.reservation_type = ReservationType::Appointment;
        let reservation = store.create(req).unwrap();
        assert!(reservation.table_id.is_none());
    }
}
