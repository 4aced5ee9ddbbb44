//! Identity and tenancy: principals (admin, business owner, branch, employee),
//! per-tenant addon/subscription flags, and channel integration records.

pub mod addons;
pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use addons::AddonGate;
pub use error::{IdentityError, Result};
pub use store::IdentityStore;
