use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use sqlx::PgConnection;
use uuid::Uuid;

/// A chat alert waiting to be delivered.
///
/// Rows are written in the same transaction as the order status change they
/// describe and drained later by the `NotificationSender`.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct OutboxEntry {
    pub id: i64,
    pub order_id: Uuid,
    pub message: String,
    pub attempts: i32,
    pub next_attempt_at: time::PrimitiveDateTime,
    pub delivered_at: Option<time::PrimitiveDateTime>,
    pub last_error: Option<String>,
    pub created_at: time::PrimitiveDateTime,
}

impl OutboxEntry {
    pub async fn insert_tx(
        conn: &mut PgConnection,
        order_id: Uuid,
        message: &str,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO notification_outbox (order_id, message) VALUES ($1, $2) RETURNING id",
        )
        .bind(order_id)
        .bind(message)
        .fetch_one(conn)
        .await
    }
}

#[derive(Debug, Clone)]
/// Undelivered rows whose next attempt is due and that still have attempts left.
pub struct ListDueNotifications {
    pub limit: i64,
    pub max_attempts: i32,
}

impl Processor<ListDueNotifications> for DatabaseProcessor {
    type Output = Vec<OutboxEntry>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListDueNotifications")]
    async fn process(&self, query: ListDueNotifications) -> Result<Vec<OutboxEntry>, sqlx::Error> {
        sqlx::query_as::<_, OutboxEntry>(
            r#"
            SELECT id, order_id, message, attempts, next_attempt_at, delivered_at, last_error, created_at
            FROM notification_outbox
            WHERE delivered_at IS NULL
              AND attempts < $2
              AND next_attempt_at <= (now() AT TIME ZONE 'utc')
            ORDER BY id ASC
            LIMIT $1
            "#,
        )
        .bind(query.limit)
        .bind(query.max_attempts)
        .fetch_all(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
pub struct MarkNotificationDelivered {
    pub id: i64,
}

impl Processor<MarkNotificationDelivered> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:MarkNotificationDelivered")]
    async fn process(&self, update: MarkNotificationDelivered) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE notification_outbox
            SET delivered_at = (now() AT TIME ZONE 'utc'), attempts = attempts + 1
            WHERE id = $1
            "#,
        )
        .bind(update.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
/// Record a failed attempt and push the next one `delay_secs` into the future.
pub struct RescheduleNotification {
    pub id: i64,
    pub delay_secs: i64,
    pub error: String,
}

impl Processor<RescheduleNotification> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:RescheduleNotification")]
    async fn process(&self, update: RescheduleNotification) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE notification_outbox
            SET attempts = attempts + 1,
                last_error = $3,
                next_attempt_at = (now() AT TIME ZONE 'utc') + make_interval(secs => $2)
            WHERE id = $1
            "#,
        )
        .bind(update.id)
        .bind(update.delay_secs as f64)
        .bind(update.error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
