use crate::entities::OrderStatus;
use crate::entities::notification_outbox::OutboxEntry;
use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use rust_decimal::Decimal;
use sqlx::PgConnection;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct OrderRecord {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub package_id: Option<Uuid>,
    pub game_name: String,
    pub package_name: String,
    pub player_id: String,
    pub server_id: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub payment_method: Option<String>,
    pub provider_order_id: Option<String>,
    pub provider_product_id: Option<String>,
    pub provider_type_id: Option<String>,
    pub delivery_items: Option<Vec<String>>,
    pub status: OrderStatus,
    pub status_message: Option<String>,
    pub created_at: time::PrimitiveDateTime,
    pub updated_at: time::PrimitiveDateTime,
}

const ORDER_COLUMNS: &str = "id, user_id, package_id, game_name, package_name, player_id, \
     server_id, amount, currency, payment_method, provider_order_id, provider_product_id, \
     provider_type_id, delivery_items, status, status_message, created_at, updated_at";

/// Data for inserting a new order. Orders always start `pending`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub user_id: Option<Uuid>,
    pub package_id: Option<Uuid>,
    pub game_name: String,
    pub package_name: String,
    pub player_id: String,
    pub server_id: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub payment_method: Option<String>,
    pub provider_product_id: Option<String>,
    pub provider_type_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GetOrderById {
    pub order_id: Uuid,
}

impl Processor<GetOrderById> for DatabaseProcessor {
    type Output = Option<OrderRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetOrderById")]
    async fn process(&self, query: GetOrderById) -> Result<Option<OrderRecord>, sqlx::Error> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        sqlx::query_as::<_, OrderRecord>(&sql)
            .bind(query.order_id)
            .fetch_optional(&self.pool)
            .await
    }
}

impl Processor<NewOrder> for DatabaseProcessor {
    type Output = OrderRecord;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertOrder")]
    async fn process(&self, insert: NewOrder) -> Result<OrderRecord, sqlx::Error> {
        let sql = format!(
            r#"
            INSERT INTO orders (id, user_id, package_id, game_name, package_name, player_id,
                server_id, amount, currency, payment_method, provider_product_id, provider_type_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {ORDER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, OrderRecord>(&sql)
            .bind(Uuid::now_v7())
            .bind(insert.user_id)
            .bind(insert.package_id)
            .bind(insert.game_name)
            .bind(insert.package_name)
            .bind(insert.player_id)
            .bind(insert.server_id)
            .bind(insert.amount)
            .bind(insert.currency)
            .bind(insert.payment_method)
            .bind(insert.provider_product_id)
            .bind(insert.provider_type_id)
            .fetch_one(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
/// Atomically move a `pending`/`paid` order to `processing`.
///
/// This single conditional update is the idempotency guard for payment
/// confirmations: `None` means another delivery already claimed the order
/// (or it never existed).
pub struct ClaimOrderForProcessing {
    pub order_id: Uuid,
    pub payment_method: String,
    pub status_message: String,
}

impl Processor<ClaimOrderForProcessing> for DatabaseProcessor {
    type Output = Option<OrderRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ClaimOrderForProcessing")]
    async fn process(
        &self,
        claim: ClaimOrderForProcessing,
    ) -> Result<Option<OrderRecord>, sqlx::Error> {
        let sql = format!(
            r#"
            UPDATE orders
            SET status = 'processing',
                payment_method = $2,
                status_message = $3,
                updated_at = (now() AT TIME ZONE 'utc')
            WHERE id = $1 AND status IN ('pending', 'paid')
            RETURNING {ORDER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, OrderRecord>(&sql)
            .bind(claim.order_id)
            .bind(claim.payment_method)
            .bind(claim.status_message)
            .fetch_optional(&self.pool)
            .await
    }
}

/// A single edge of the order state machine, applied as a compare-and-set on
/// the current status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTransition {
    pub order_id: Uuid,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub status_message: String,
    /// Replaces the stored delivery items when `Some`.
    pub delivery_items: Option<Vec<String>>,
}

impl OrderRecord {
    /// Apply `transition` inside an open transaction.
    ///
    /// Returns `None` when the order is no longer in `transition.from`.
    /// Terminal transitions also enqueue an outbox notification on the same
    /// connection, so the alert commits or rolls back together with the
    /// status change.
    pub async fn transition_tx(
        conn: &mut PgConnection,
        transition: &OrderTransition,
    ) -> Result<Option<OrderRecord>, sqlx::Error> {
        let sql = format!(
            r#"
            UPDATE orders
            SET status = $3,
                status_message = $4,
                delivery_items = COALESCE($5, delivery_items),
                updated_at = (now() AT TIME ZONE 'utc')
            WHERE id = $1 AND status = $2
            RETURNING {ORDER_COLUMNS}
            "#
        );
        let updated = sqlx::query_as::<_, OrderRecord>(&sql)
            .bind(transition.order_id)
            .bind(transition.from)
            .bind(transition.to)
            .bind(&transition.status_message)
            .bind(&transition.delivery_items)
            .fetch_optional(&mut *conn)
            .await?;

        if let Some(order) = updated.as_ref().filter(|o| o.status.is_terminal()) {
            OutboxEntry::insert_tx(conn, order.id, &order.notification_text()).await?;
        }

        Ok(updated)
    }

    /// Mark a `pending` order owned by `user_id` as `paid`.
    ///
    /// The compound `id AND user_id` filter means a caller can never mark
    /// someone else's order paid. Returns the number of affected rows.
    pub async fn mark_paid_by_wallet_tx(
        conn: &mut PgConnection,
        order_id: Uuid,
        user_id: Uuid,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = 'paid',
                payment_method = 'wallet',
                status_message = 'Paid from wallet balance',
                updated_at = (now() AT TIME ZONE 'utc')
            WHERE id = $1 AND user_id = $2 AND status = 'pending'
            "#,
        )
        .bind(order_id)
        .bind(user_id)
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }

    /// Lock an order row for the rest of the transaction.
    pub async fn get_for_update_tx(
        conn: &mut PgConnection,
        order_id: Uuid,
    ) -> Result<Option<OrderRecord>, sqlx::Error> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, OrderRecord>(&sql)
            .bind(order_id)
            .fetch_optional(conn)
            .await
    }

    /// Human-readable line used for chat alerts.
    pub fn notification_text(&self) -> String {
        let emoji = match self.status {
            OrderStatus::Completed => "✅",
            OrderStatus::Failed => "❌",
            _ => "⚠️",
        };
        let server = self
            .server_id
            .as_deref()
            .map(|s| format!(" ({s})"))
            .unwrap_or_default();
        format!(
            "{emoji} Order {id} {status}\n{game} · {package}\nPlayer: {player}{server}\nAmount: {amount} {currency}\n{message}",
            id = self.id,
            status = self.status,
            game = self.game_name,
            package = self.package_name,
            player = self.player_id,
            amount = self.amount,
            currency = self.currency,
            message = self.status_message.as_deref().unwrap_or_default(),
        )
    }
}

#[derive(Debug, Clone)]
pub struct SetProviderOrderId {
    pub order_id: Uuid,
    pub provider_order_id: String,
}

impl Processor<SetProviderOrderId> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:SetProviderOrderId")]
    async fn process(&self, update: SetProviderOrderId) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE orders
            SET provider_order_id = $2, updated_at = (now() AT TIME ZONE 'utc')
            WHERE id = $1
            "#,
        )
        .bind(update.order_id)
        .bind(update.provider_order_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
/// Store delivery items without changing the status (provider reported codes
/// while the order was already in its final state).
pub struct StoreDeliveryItems {
    pub order_id: Uuid,
    pub delivery_items: Vec<String>,
}

impl Processor<StoreDeliveryItems> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:StoreDeliveryItems")]
    async fn process(&self, update: StoreDeliveryItems) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE orders
            SET delivery_items = $2, updated_at = (now() AT TIME ZONE 'utc')
            WHERE id = $1
            "#,
        )
        .bind(update.order_id)
        .bind(update.delivery_items)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
/// Orders the reconciler should re-check: `pending`/`processing` with a
/// provider order reference, oldest first.
pub struct ListStuckOrders {
    pub limit: i64,
}

impl Processor<ListStuckOrders> for DatabaseProcessor {
    type Output = Vec<OrderRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListStuckOrders")]
    async fn process(&self, query: ListStuckOrders) -> Result<Vec<OrderRecord>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE status IN ('pending', 'processing') AND provider_order_id IS NOT NULL
            ORDER BY created_at ASC
            LIMIT $1
            "#
        );
        sqlx::query_as::<_, OrderRecord>(&sql)
            .bind(query.limit)
            .fetch_all(&self.pool)
            .await
    }
}

/// `processing` orders that never got a provider order id and have not
/// changed since `updated_before`. Left behind when both dispatch and the
/// fallback park failed.
#[derive(Debug, Clone)]
pub struct ListOrphanedOrders {
    pub updated_before: time::PrimitiveDateTime,
    pub limit: i64,
}

impl Processor<ListOrphanedOrders> for DatabaseProcessor {
    type Output = Vec<OrderRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListOrphanedOrders")]
    async fn process(&self, query: ListOrphanedOrders) -> Result<Vec<OrderRecord>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE status = 'processing' AND provider_order_id IS NULL AND updated_at < $1
            ORDER BY updated_at ASC
            LIMIT $2
            "#
        );
        sqlx::query_as::<_, OrderRecord>(&sql)
            .bind(query.updated_before)
            .bind(query.limit)
            .fetch_all(&self.pool)
            .await
    }
}
