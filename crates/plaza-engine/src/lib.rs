//! The tool-dispatching conversational engine.
//!
//! One inbound customer message becomes one *turn*: resolve the tenant, open
//! or extend the session, assemble the eligible tool catalog, and run a
//! bounded LLM/tool loop under the per-session lock. Mutating tools must be
//! preceded by their validator within the same turn.

pub mod anthropic;
pub mod context;
pub mod datetime;
pub mod dispatch;
pub mod error;
pub mod prompt;
pub mod provider;
pub mod tools;
pub mod validation;

pub use dispatch::{Engine, InboundMessage, TurnOutcome};
pub use error::{EngineError, Result};
pub use provider::LlmProvider;
