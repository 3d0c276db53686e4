use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;

/// How to validate a player id for one game before checkout.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct VerificationConfig {
    pub game_name: String,
    /// G2Bulk game codes tried in order.
    pub provider_game_codes: Vec<String>,
    pub requires_zone: bool,
    pub default_zone: Option<String>,
    pub enabled: bool,
}

#[derive(Debug, Clone)]
pub struct GetVerificationConfig {
    pub game_name: String,
}

impl Processor<GetVerificationConfig> for DatabaseProcessor {
    type Output = Option<VerificationConfig>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetVerificationConfig")]
    async fn process(
        &self,
        query: GetVerificationConfig,
    ) -> Result<Option<VerificationConfig>, sqlx::Error> {
        sqlx::query_as::<_, VerificationConfig>(
            r#"
            SELECT game_name, provider_game_codes, requires_zone, default_zone, enabled
            FROM verification_configs
            WHERE lower(game_name) = lower($1)
            "#,
        )
        .bind(query.game_name)
        .fetch_optional(&self.pool)
        .await
    }
}
