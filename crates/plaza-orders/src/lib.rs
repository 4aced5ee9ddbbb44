//! Carts, the order state machine, status history, and the archive pipeline
//! that moves terminated orders into the append-only cold store.

pub mod archive;
pub mod cart;
pub mod db;
pub mod error;
pub mod lifecycle;
pub mod types;

pub use archive::OrderLogStore;
pub use cart::CartManager;
pub use error::{OrderError, Result};
pub use lifecycle::OrderStore;
