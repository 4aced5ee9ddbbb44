//! Table and appointment reservations with slot-level exclusion.
//!
//! Availability is derived by query, never stored on the table row: a table
//! is free for a slot when no confirmed reservation occupies the same
//! `(table_id, date, time)` triple. The exclusion itself is a partial unique
//! index, so racing creators are decided by the storage layer and the loser
//! gets `SLOT_TAKEN`.

pub mod allocator;
pub mod db;
pub mod error;
pub mod types;

pub use allocator::ReservationStore;
pub use error::{ReservationError, Result};
