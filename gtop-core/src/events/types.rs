use crate::entities::OrderStatus;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderEvent {
    /// An order reached a terminal status and an outbox row was committed
    /// with it.
    NotificationQueued { order_id: Uuid, status: OrderStatus },
}
