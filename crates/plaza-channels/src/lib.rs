//! Outbound messaging: a channel-agnostic dispatcher over the four platform
//! senders (WhatsApp, Telegram, Instagram, Facebook).
//!
//! The engine never talks to a sender directly; everything goes through
//! [`OutboundDispatcher::send`], which loads the tenant's credentials and
//! retries transient failures.

pub mod dispatcher;
pub mod error;
pub mod facebook;
pub mod instagram;
pub mod sender;
pub mod telegram;
pub mod types;
pub mod whatsapp;

pub use dispatcher::OutboundDispatcher;
pub use error::{ChannelError, Result};
pub use sender::ChannelSender;
pub use types::{OutboundPayload, SendReceipt};
