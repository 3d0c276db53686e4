use super::types::OrderEvent;
use tokio::sync::mpsc;

/// Bursts beyond this are absorbed by the sender's periodic sweep.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

pub type OrderEventSender = mpsc::Sender<OrderEvent>;
pub type OrderEventReceiver = mpsc::Receiver<OrderEvent>;

pub fn order_event_channel() -> (OrderEventSender, OrderEventReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}
