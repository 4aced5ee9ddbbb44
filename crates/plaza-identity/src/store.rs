use std::sync::{Arc, Mutex};

use chrono::Utc;
use plaza_core::types::{new_id, BusinessType, Platform, PrincipalKind};
use rusqlite::{params, Connection};
use tracing::{debug, info};

use crate::db::{row_to_principal, PRINCIPAL_SELECT_COLS};
use crate::error::{IdentityError, Result};
use crate::types::{BotIntegration, Principal, TenantContext};

/// Queries over principals and channel integrations.
///
/// Shares the operational SQLite connection with the other domain stores;
/// the Mutex serialises access across tokio tasks.
pub struct IdentityStore {
    db: Arc<Mutex<Connection>>,
}

impl IdentityStore {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    /// Insert a new principal. The id is generated here so the caller has the
    /// canonical id without a follow-up query.
    pub fn create_principal(
        &self,
        kind: PrincipalKind,
        display_name: &str,
        parent_user_id: Option<&str>,
        business_type: Option<BusinessType>,
    ) -> Result<Principal> {
        let now = Utc::now().to_rfc3339();
        let principal = Principal {
            id: new_id(),
            kind,
            display_name: display_name.to_string(),
            parent_user_id: parent_user_id.map(String::from),
            business_type,
            tz_offset_minutes: None,
            default_cancel_hours: None,
            phone_number: None,
            created_at: now.clone(),
            updated_at: now,
        };
        let conn = self.db.lock().unwrap();
        conn.execute(
            "INSERT INTO users (id, kind, display_name, parent_user_id, business_type,
                tz_offset_minutes, default_cancel_hours, phone_number, created_at, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
            params![
                principal.id,
                principal.kind.to_string(),
                principal.display_name,
                principal.parent_user_id,
                principal.business_type.map(|t| t.to_string()),
                principal.tz_offset_minutes,
                principal.default_cancel_hours,
                principal.phone_number,
                principal.created_at,
                principal.updated_at,
            ],
        )?;
        info!(id = %principal.id, kind = %kind, "principal created");
        Ok(principal)
    }

    /// Load a principal by primary key. Returns None when absent so callers
    /// decide whether missing is exceptional in their context.
    pub fn get(&self, id: &str) -> Result<Option<Principal>> {
        let conn = self.db.lock().unwrap();
        get_principal(&conn, id)
    }

    /// Load a principal, treating absence as an error.
    pub fn require(&self, id: &str) -> Result<Principal> {
        self.get(id)?
            .ok_or_else(|| IdentityError::NotFound(id.to_string()))
    }

    /// Resolve the business owner for any principal, following
    /// `parent_user_id` for branches and employees.
    pub fn business_of(&self, principal: &Principal) -> Result<Principal> {
        let business_id = principal
            .business_id()
            .ok_or_else(|| IdentityError::NoBusiness(principal.id.clone()))?;
        if business_id == principal.id {
            return Ok(principal.clone());
        }
        self.require(business_id)
    }

    pub fn list_branches(&self, business_id: &str) -> Result<Vec<Principal>> {
        let conn = self.db.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PRINCIPAL_SELECT_COLS} FROM users
             WHERE parent_user_id = ?1 AND kind = 'branch'
             ORDER BY created_at"
        ))?;
        let rows = stmt.query_map(params![business_id], row_to_principal)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Update tenant-level settings on a business row.
    pub fn update_business_settings(
        &self,
        business_id: &str,
        tz_offset_minutes: Option<i32>,
        default_cancel_hours: Option<i64>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.db.lock().unwrap();
        let rows = conn.execute(
            "UPDATE users SET tz_offset_minutes=?2, default_cancel_hours=?3, updated_at=?4
             WHERE id=?1",
            params![business_id, tz_offset_minutes, default_cancel_hours, now],
        )?;
        if rows == 0 {
            return Err(IdentityError::NotFound(business_id.to_string()));
        }
        Ok(())
    }

    /// Register or replace the channel credentials for an owner + platform.
    pub fn upsert_integration(
        &self,
        owner_user_id: &str,
        platform: Platform,
        access_token: &str,
        external_id: &str,
    ) -> Result<BotIntegration> {
        let now = Utc::now().to_rfc3339();
        let conn = self.db.lock().unwrap();
        let updated = conn.execute(
            "UPDATE bot_integrations SET access_token=?3, external_id=?4
             WHERE owner_user_id=?1 AND platform=?2",
            params![owner_user_id, platform.to_string(), access_token, external_id],
        )?;
        let id = if updated > 0 {
            conn.query_row(
                "SELECT id FROM bot_integrations WHERE owner_user_id=?1 AND platform=?2",
                params![owner_user_id, platform.to_string()],
                |row| row.get::<_, String>(0),
            )?
        } else {
            let id = new_id();
            conn.execute(
                "INSERT INTO bot_integrations
                    (id, owner_user_id, platform, access_token, external_id, created_at)
                 VALUES (?1,?2,?3,?4,?5,?6)",
                params![id, owner_user_id, platform.to_string(), access_token, external_id, now],
            )?;
            id
        };
        Ok(BotIntegration {
            id,
            owner_user_id: owner_user_id.to_string(),
            platform,
            access_token: access_token.to_string(),
            external_id: external_id.to_string(),
            created_at: now,
        })
    }

    /// Outbound credential lookup for the dispatcher. Falls back from the
    /// requested owner to its parent business when the branch has no
    /// integration of its own.
    pub fn integration_for(
        &self,
        owner: &Principal,
        platform: Platform,
    ) -> Result<BotIntegration> {
        let conn = self.db.lock().unwrap();
        if let Some(row) = integration_by_owner(&conn, &owner.id, platform)? {
            return Ok(row);
        }
        if let Some(parent) = owner.parent_user_id.as_deref() {
            if let Some(row) = integration_by_owner(&conn, parent, platform)? {
                return Ok(row);
            }
        }
        Err(IdentityError::IntegrationNotFound {
            platform: platform.to_string(),
            external_id: owner.id.clone(),
        })
    }

    /// Inbound webhook routing: `(platform, tenant phone id)` to the tenant
    /// context the engine runs under. Hot path, called per message.
    pub fn resolve_inbound(
        &self,
        platform: Platform,
        tenant_external_id: &str,
    ) -> Result<TenantContext> {
        let conn = self.db.lock().unwrap();
        let owner_id: String = conn
            .query_row(
                "SELECT owner_user_id FROM bot_integrations
                 WHERE platform = ?1 AND external_id = ?2",
                params![platform.to_string(), tenant_external_id],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => IdentityError::IntegrationNotFound {
                    platform: platform.to_string(),
                    external_id: tenant_external_id.to_string(),
                },
                other => IdentityError::Database(other),
            })?;

        let owner = get_principal(&conn, &owner_id)?
            .ok_or_else(|| IdentityError::NotFound(owner_id.clone()))?;
        let business = match owner.kind {
            PrincipalKind::BusinessOwner => owner.clone(),
            _ => {
                let business_id = owner
                    .business_id()
                    .ok_or_else(|| IdentityError::NoBusiness(owner.id.clone()))?
                    .to_string();
                get_principal(&conn, &business_id)?
                    .ok_or_else(|| IdentityError::NotFound(business_id))?
            }
        };
        let branch = match owner.kind {
            PrincipalKind::Branch => Some(owner.clone()),
            _ => None,
        };
        debug!(business = %business.id, owner = %owner.id, %platform, "inbound resolved");
        Ok(TenantContext {
            business,
            owner,
            branch,
        })
    }
}

fn get_principal(conn: &Connection, id: &str) -> Result<Option<Principal>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PRINCIPAL_SELECT_COLS} FROM users WHERE id = ?1"
    ))?;
    match stmt.query_row(params![id], row_to_principal) {
        Ok(p) => Ok(Some(p)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(IdentityError::Database(e)),
    }
}

fn integration_by_owner(
    conn: &Connection,
    owner_id: &str,
    platform: Platform,
) -> Result<Option<BotIntegration>> {
    use std::str::FromStr;
    let mut stmt = conn.prepare(
        "SELECT id, owner_user_id, platform, access_token, external_id, created_at
         FROM bot_integrations WHERE owner_user_id = ?1 AND platform = ?2",
    )?;
    match stmt.query_row(params![owner_id, platform.to_string()], |row| {
        let platform_str: String = row.get(2)?;
        Ok(BotIntegration {
            id: row.get(0)?,
            owner_user_id: row.get(1)?,
            platform: Platform::from_str(&platform_str).unwrap_or(platform),
            access_token: row.get(3)?,
            external_id: row.get(4)?,
            created_at: row.get(5)?,
        })
    }) {
        Ok(i) => Ok(Some(i)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(IdentityError::Database(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> IdentityStore {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        IdentityStore::new(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn branch_resolves_to_parent_business() {
        let store = store();
        let business = store
            .create_principal(
                PrincipalKind::BusinessOwner,
                "Mario's Pizza",
                None,
                Some(BusinessType::FoodAndBeverage),
            )
            .unwrap();
        let branch = store
            .create_principal(PrincipalKind::Branch, "Hamra branch", Some(&business.id), None)
            .unwrap();

        assert_eq!(branch.business_id(), Some(business.id.as_str()));
        let resolved = store.business_of(&branch).unwrap();
        assert_eq!(resolved.id, business.id);
    }

    #[test]
    fn resolve_inbound_routes_by_phone_id() {
        let store = store();
        let business = store
            .create_principal(
                PrincipalKind::BusinessOwner,
                "Cut & Go",
                None,
                Some(BusinessType::Salon),
            )
            .unwrap();
        store
            .upsert_integration(&business.id, Platform::Whatsapp, "token-1", "15550001")
            .unwrap();

        let ctx = store.resolve_inbound(Platform::Whatsapp, "15550001").unwrap();
        assert_eq!(ctx.business_id(), business.id);
        assert_eq!(ctx.owner_id(), business.id);
        assert!(ctx.branch.is_none());
    }

    #[test]
    fn resolve_inbound_branch_integration() {
        let store = store();
        let business = store
            .create_principal(
                PrincipalKind::BusinessOwner,
                "Mario's Pizza",
                None,
                Some(BusinessType::FoodAndBeverage),
            )
            .unwrap();
        let branch = store
            .create_principal(PrincipalKind::Branch, "Hamra branch", Some(&business.id), None)
            .unwrap();
        store
            .upsert_integration(&branch.id, Platform::Whatsapp, "token-2", "15550002")
            .unwrap();

        let ctx = store.resolve_inbound(Platform::Whatsapp, "15550002").unwrap();
        assert_eq!(ctx.business_id(), business.id);
        assert_eq!(ctx.owner_id(), branch.id);
        assert!(ctx.branch.is_some());
    }

    #[test]
    fn unknown_phone_id_is_an_error() {
        let store = store();
        let err = store
            .resolve_inbound(Platform::Telegram, "nope")
            .unwrap_err();
        assert_eq!(err.code(), "INTEGRATION_NOT_FOUND");
    }
}
