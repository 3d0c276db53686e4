//! Order processing and background tasks.
//!
//! - `FulfillmentDispatcher`: places provider orders and applies provider
//!   statuses to the order state machine
//! - `PollingReconciler`: periodic sweep over stuck orders, reusing the
//!   dispatcher's status application
//! - `NotificationSender`: receives `OrderEvent`, drains the outbox to the
//!   chat channel

pub mod fulfillment;
pub mod notification_sender;
pub mod reconciler;

pub use fulfillment::{
    FulfillOrder, FulfillmentDispatcher, FulfillmentError, FulfillmentOutcome, StatusUpdate,
};
pub use notification_sender::{NotificationSender, Notifier, NotifyError, TelegramNotifier};
pub use reconciler::{PollingReconciler, ReconcileReport};
