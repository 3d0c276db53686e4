//! In-process events.
//!
//! Events are wake-up hints only: the durable record is always the database
//! (for notifications, the outbox row). A dropped event delays work until
//! the next periodic sweep; it never loses it.

pub mod channels;
pub mod types;

pub use channels::{DEFAULT_CHANNEL_BUFFER, OrderEventReceiver, OrderEventSender, order_event_channel};
pub use types::OrderEvent;
