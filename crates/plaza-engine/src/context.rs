use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, TimeZone, Utc};
use plaza_catalog::CatalogStore;
use plaza_core::types::{BusinessType, Platform};
use plaza_identity::types::TenantContext;
use plaza_identity::{AddonGate, IdentityStore};
use plaza_orders::types::CartKey;
use plaza_orders::{CartManager, OrderLogStore, OrderStore};
use plaza_reservations::ReservationStore;
use plaza_sessions::SessionManager;
use plaza_tickets::TicketManager;

/// All domain stores, shared between the engine, the scheduler, and the
/// gateway handlers.
#[derive(Clone)]
pub struct Stores {
    pub identity: Arc<IdentityStore>,
    pub addons: Arc<AddonGate>,
    pub catalog: Arc<CatalogStore>,
    pub carts: Arc<CartManager>,
    pub orders: Arc<OrderStore>,
    pub order_logs: Arc<OrderLogStore>,
    pub reservations: Arc<ReservationStore>,
    pub sessions: Arc<SessionManager>,
    pub tickets: Arc<TicketManager>,
}

/// Everything a tool executor may touch during one conversational turn.
///
/// The validation set is turn-local: validators record a pass here, and the
/// dispatcher refuses mutating tools whose validator has not passed within
/// the same turn.
pub struct ToolContext {
    pub tenant: TenantContext,
    pub customer_phone: String,
    pub platform: Platform,
    pub session_id: String,
    pub language_hint: Option<String>,
    pub stores: Stores,
    /// Business-local clock offset from UTC, minutes.
    pub tz_offset_minutes: i32,
    /// Fallback cancellation window (hours) when no line overrides it.
    pub default_cancel_hours: i64,
    deadline: Instant,
    validated: Mutex<HashSet<String>>,
}

impl ToolContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tenant: TenantContext,
        customer_phone: String,
        platform: Platform,
        session_id: String,
        language_hint: Option<String>,
        stores: Stores,
        tz_offset_minutes: i32,
        default_cancel_hours: i64,
        deadline: Instant,
    ) -> Self {
        Self {
            tenant,
            customer_phone,
            platform,
            session_id,
            language_hint,
            stores,
            tz_offset_minutes,
            default_cancel_hours,
            deadline,
            validated: Mutex::new(HashSet::new()),
        }
    }

    pub fn business_id(&self) -> &str {
        self.tenant.business_id()
    }

    pub fn owner_id(&self) -> &str {
        self.tenant.owner_id()
    }

    pub fn business_type(&self) -> Option<BusinessType> {
        self.tenant.business.business_type
    }

    pub fn cart_key(&self) -> CartKey {
        CartKey::new(self.business_id(), self.owner_id(), &self.customer_phone)
    }

    /// The wall clock in the business's local timezone.
    pub fn now_local(&self) -> NaiveDateTime {
        (Utc::now() + ChronoDuration::minutes(self.tz_offset_minutes as i64)).naive_utc()
    }

    /// Convert a business-local datetime back to UTC for storage.
    pub fn local_to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        Utc.from_utc_datetime(&(local - ChronoDuration::minutes(self.tz_offset_minutes as i64)))
    }

    /// Every executor checks this before committing work; the turn budget is
    /// enforced cooperatively.
    pub fn deadline_exceeded(&self) -> bool {
        Instant::now() >= self.deadline
    }

    pub fn addon_active(&self, key: &str) -> bool {
        self.stores
            .addons
            .is_active(self.business_id(), key)
            .unwrap_or(false)
    }

    /// Record a validator pass for this turn.
    pub fn record_validation(&self, validator: &str) {
        self.validated.lock().unwrap().insert(validator.to_string());
    }

    /// Drop a previously recorded pass (a failed re-run invalidates it).
    pub fn clear_validation(&self, validator: &str) {
        self.validated.lock().unwrap().remove(validator);
    }

    pub fn validation_passed(&self, validator: &str) -> bool {
        self.validated.lock().unwrap().contains(validator)
    }
}
