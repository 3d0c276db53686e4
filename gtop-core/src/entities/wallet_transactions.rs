use crate::entities::LedgerEntryType;
use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use rust_decimal::Decimal;
use sqlx::PgConnection;
use uuid::Uuid;

/// One row of the append-only wallet ledger.
///
/// `balance_after == balance_before + amount` holds for every row (also a
/// table CHECK), and a user's balance is the `balance_after` of their newest
/// row.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct WalletTransaction {
    pub id: i64,
    pub user_id: Uuid,
    pub entry_type: LedgerEntryType,
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub order_id: Option<Uuid>,
    pub reference_id: Option<String>,
    pub description: String,
    pub created_at: time::PrimitiveDateTime,
}

/// A ledger entry requested by a caller, before the current balance is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWalletEntry {
    pub user_id: Uuid,
    pub entry_type: LedgerEntryType,
    /// Signed amount: positive credits, negative debits.
    pub amount: Decimal,
    pub order_id: Option<Uuid>,
    pub reference_id: Option<String>,
    pub description: String,
}

impl NewWalletEntry {
    /// Chain this entry onto `balance_before`.
    ///
    /// Returns `None` when the entry would take the balance below zero.
    pub fn draft(&self, balance_before: Decimal) -> Option<LedgerDraft> {
        let balance_after = balance_before + self.amount;
        if balance_after < Decimal::ZERO {
            return None;
        }
        Some(LedgerDraft {
            user_id: self.user_id,
            entry_type: self.entry_type,
            amount: self.amount,
            balance_before,
            balance_after,
            order_id: self.order_id,
            reference_id: self.reference_id.clone(),
            description: self.description.clone(),
        })
    }
}

/// A ledger row that has been validated but not yet written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerDraft {
    pub user_id: Uuid,
    pub entry_type: LedgerEntryType,
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub order_id: Option<Uuid>,
    pub reference_id: Option<String>,
    pub description: String,
}

/// A user with their derived balance, for the admin listing.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct UserBalance {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub balance: Decimal,
    pub created_at: time::PrimitiveDateTime,
}

impl WalletTransaction {
    /// Serialize all ledger writes of one user until the transaction ends.
    pub async fn lock_user_tx(conn: &mut PgConnection, user_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
            .bind(user_id)
            .execute(conn)
            .await?;
        Ok(())
    }

    pub async fn latest_balance_tx(
        conn: &mut PgConnection,
        user_id: Uuid,
    ) -> Result<Decimal, sqlx::Error> {
        latest_balance(conn, user_id).await
    }

    /// Insert a drafted row.
    ///
    /// Returns `None` when `reference_id` was already used, which makes
    /// replayed top-up webhooks and admin actions no-ops.
    pub async fn insert_tx(
        conn: &mut PgConnection,
        draft: &LedgerDraft,
    ) -> Result<Option<WalletTransaction>, sqlx::Error> {
        sqlx::query_as::<_, WalletTransaction>(
            r#"
            INSERT INTO wallet_transactions (user_id, entry_type, amount, balance_before,
                balance_after, order_id, reference_id, description)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (reference_id) DO NOTHING
            RETURNING id, user_id, entry_type, amount, balance_before, balance_after,
                order_id, reference_id, description, created_at
            "#,
        )
        .bind(draft.user_id)
        .bind(draft.entry_type)
        .bind(draft.amount)
        .bind(draft.balance_before)
        .bind(draft.balance_after)
        .bind(draft.order_id)
        .bind(&draft.reference_id)
        .bind(&draft.description)
        .fetch_optional(conn)
        .await
    }
}

async fn latest_balance<'e, E>(executor: E, user_id: Uuid) -> Result<Decimal, sqlx::Error>
where
    E: sqlx::PgExecutor<'e>,
{
    let balance = sqlx::query_scalar::<_, Decimal>(
        r#"
        SELECT balance_after FROM wallet_transactions
        WHERE user_id = $1
        ORDER BY id DESC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .fetch_optional(executor)
    .await?;
    Ok(balance.unwrap_or(Decimal::ZERO))
}

#[derive(Debug, Clone)]
pub struct GetWalletBalance {
    pub user_id: Uuid,
}

impl Processor<GetWalletBalance> for DatabaseProcessor {
    type Output = Decimal;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetWalletBalance")]
    async fn process(&self, query: GetWalletBalance) -> Result<Decimal, sqlx::Error> {
        latest_balance(&self.pool, query.user_id).await
    }
}

#[derive(Debug, Clone)]
pub struct ListUserBalances {
    pub limit: i64,
    pub offset: i64,
}

impl Processor<ListUserBalances> for DatabaseProcessor {
    type Output = Vec<UserBalance>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListUserBalances")]
    async fn process(&self, query: ListUserBalances) -> Result<Vec<UserBalance>, sqlx::Error> {
        sqlx::query_as::<_, UserBalance>(
            r#"
            SELECT u.id AS user_id,
                   u.email,
                   COALESCE(latest.balance_after, 0) AS balance,
                   u.created_at
            FROM users u
            LEFT JOIN LATERAL (
                SELECT balance_after FROM wallet_transactions w
                WHERE w.user_id = u.id
                ORDER BY w.id DESC
                LIMIT 1
            ) latest ON true
            ORDER BY u.created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(query.limit)
        .bind(query.offset)
        .fetch_all(&self.pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn entry(amount: Decimal) -> NewWalletEntry {
        NewWalletEntry {
            user_id: Uuid::nil(),
            entry_type: LedgerEntryType::Purchase,
            amount,
            order_id: None,
            reference_id: None,
            description: "test".to_string(),
        }
    }

    #[test]
    fn test_draft_chains_balance() {
        let draft = entry(d("-3.50")).draft(d("10.00")).unwrap();
        assert_eq!(draft.balance_before, d("10.00"));
        assert_eq!(draft.balance_after, d("6.50"));
        assert_eq!(draft.balance_after, draft.balance_before + draft.amount);
    }

    #[test]
    fn test_draft_rejects_negative_balance() {
        assert!(entry(d("-10.01")).draft(d("10.00")).is_none());
        assert_eq!(
            entry(d("-10.00")).draft(d("10.00")).unwrap().balance_after,
            Decimal::ZERO
        );
    }
}
