use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use uuid::Uuid;

/// Role name granting access to the admin endpoints.
pub const ADMIN_ROLE: &str = "admin";

/// The user behind a valid, unexpired session token.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct SessionUser {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub is_admin: bool,
}

#[derive(Debug, Clone)]
/// Resolve a session by the SHA-256 digest of its bearer token.
pub struct FindSession {
    pub token_hash: Vec<u8>,
}

impl Processor<FindSession> for DatabaseProcessor {
    type Output = Option<SessionUser>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:FindSession")]
    async fn process(&self, query: FindSession) -> Result<Option<SessionUser>, sqlx::Error> {
        sqlx::query_as::<_, SessionUser>(
            r#"
            SELECT u.id AS user_id,
                   u.email,
                   EXISTS (
                       SELECT 1 FROM user_roles r WHERE r.user_id = u.id AND r.role = $2
                   ) AS is_admin
            FROM user_sessions s
            JOIN users u ON u.id = s.user_id
            WHERE s.token_hash = $1 AND s.expires_at > (now() AT TIME ZONE 'utc')
            "#,
        )
        .bind(query.token_hash)
        .bind(ADMIN_ROLE)
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Users whose id starts with `prefix` (case-insensitive). At most two rows
/// are returned, which is enough to tell "unique" from "ambiguous".
pub struct FindUsersByIdPrefix {
    pub prefix: String,
}

impl Processor<FindUsersByIdPrefix> for DatabaseProcessor {
    type Output = Vec<Uuid>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:FindUsersByIdPrefix")]
    async fn process(&self, query: FindUsersByIdPrefix) -> Result<Vec<Uuid>, sqlx::Error> {
        let pattern = format!("{}%", query.prefix.to_lowercase());
        sqlx::query_scalar::<_, Uuid>("SELECT id FROM users WHERE id::text LIKE $1 LIMIT 2")
            .bind(pattern)
            .fetch_all(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
pub struct UserExists {
    pub user_id: Uuid,
}

impl Processor<UserExists> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:UserExists")]
    async fn process(&self, query: UserExists) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
            .bind(query.user_id)
            .fetch_one(&self.pool)
            .await
    }
}
