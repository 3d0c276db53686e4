pub mod notification_outbox;
pub mod orders;
pub mod packages;
pub mod product_links;
pub mod users;
pub mod verification_configs;
pub mod wallet_transactions;

use gtop_sdk::objects::OrderStatus as SdkOrderStatus;

/// Order status for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `gtop_sdk::objects::OrderStatus`.
///
/// Orders only ever move forward:
///
/// ```text
/// pending ──► paid ──► processing ──► completed
///    │                   ▲    ├─────► failed
///    └───────────────────┘    └─────► pending_manual
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case", type_name = "order_status")]
pub enum OrderStatus {
    Pending,
    Paid,
    Processing,
    Completed,
    Failed,
    PendingManual,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Paid,
        OrderStatus::Processing,
        OrderStatus::Completed,
        OrderStatus::Failed,
        OrderStatus::PendingManual,
    ];

    /// Whether an order in this status may be claimed by a payment confirmation.
    pub fn is_claimable(self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Paid)
    }

    /// `pending_manual` is terminal for automation; only a human acts on it.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Failed | OrderStatus::PendingManual
        )
    }

    /// Whether `self -> next` is an edge of the order state machine.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Paid)
                | (Pending, Processing)
                | (Paid, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, PendingManual)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Failed => "failed",
            OrderStatus::PendingManual => "pending_manual",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<OrderStatus> for SdkOrderStatus {
    fn from(value: OrderStatus) -> Self {
        match value {
            OrderStatus::Pending => SdkOrderStatus::Pending,
            OrderStatus::Paid => SdkOrderStatus::Paid,
            OrderStatus::Processing => SdkOrderStatus::Processing,
            OrderStatus::Completed => SdkOrderStatus::Completed,
            OrderStatus::Failed => SdkOrderStatus::Failed,
            OrderStatus::PendingManual => SdkOrderStatus::PendingManual,
        }
    }
}

impl From<SdkOrderStatus> for OrderStatus {
    fn from(value: SdkOrderStatus) -> Self {
        match value {
            SdkOrderStatus::Pending => OrderStatus::Pending,
            SdkOrderStatus::Paid => OrderStatus::Paid,
            SdkOrderStatus::Processing => OrderStatus::Processing,
            SdkOrderStatus::Completed => OrderStatus::Completed,
            SdkOrderStatus::Failed => OrderStatus::Failed,
            SdkOrderStatus::PendingManual => OrderStatus::PendingManual,
        }
    }
}

/// Kind of a wallet ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "ledger_entry_type")]
pub enum LedgerEntryType {
    Topup,
    Purchase,
    Refund,
}
