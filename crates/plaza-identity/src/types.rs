use plaza_core::types::{BusinessType, Platform, PrincipalKind};
use serde::{Deserialize, Serialize};

/// A row in the `users` table. One struct covers all four principal kinds;
/// kind-specific fields are optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub kind: PrincipalKind,
    pub display_name: String,
    /// Business this branch/employee belongs to. Null for admins and owners.
    pub parent_user_id: Option<String>,
    /// Set on business owners only.
    pub business_type: Option<BusinessType>,
    /// Tenant-local UTC offset in minutes. Null means "use the global default".
    pub tz_offset_minutes: Option<i32>,
    /// Business-level fallback for the customer cancellation window.
    pub default_cancel_hours: Option<i64>,
    pub phone_number: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Principal {
    /// The business a principal acts for: an owner is its own business,
    /// branches and employees inherit their parent. Admins have none.
    pub fn business_id(&self) -> Option<&str> {
        match self.kind {
            PrincipalKind::Admin => None,
            PrincipalKind::BusinessOwner => Some(&self.id),
            PrincipalKind::Branch | PrincipalKind::Employee => self.parent_user_id.as_deref(),
        }
    }
}

/// Per-(owner, platform) channel credentials. The owner is the business or a
/// branch; the `external_id` is the platform's page/phone identifier that
/// inbound webhooks carry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotIntegration {
    pub id: String,
    pub owner_user_id: String,
    pub platform: Platform,
    pub access_token: String,
    pub external_id: String,
    pub created_at: String,
}

/// Everything the engine needs to know about who an inbound message is for.
#[derive(Debug, Clone)]
pub struct TenantContext {
    /// The business owner principal (tenant root).
    pub business: Principal,
    /// The principal fulfilling orders: the matched branch, or the business
    /// itself when the integration is business-level.
    pub owner: Principal,
    pub branch: Option<Principal>,
}

impl TenantContext {
    pub fn business_id(&self) -> &str {
        &self.business.id
    }

    pub fn owner_id(&self) -> &str {
        &self.owner.id
    }
}

/// A `(business_id, addon_key)` capability flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessAddon {
    pub business_id: String,
    pub addon_key: String,
    pub active: bool,
    pub price_override: Option<f64>,
}

/// A tenant subscription plan record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub business_id: String,
    pub plan_key: String,
    pub active: bool,
    pub started_at: String,
    pub expires_at: Option<String>,
}

/// Tenant-level master switch: without it the engine ignores the tenant.
pub const ADDON_BASE_BOT: &str = "base_bot";
/// Gates the table reservation toolset (F&B businesses only).
pub const ADDON_TABLE_RESERVATIONS: &str = "table_reservations";
