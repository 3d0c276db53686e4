use sqlx::PgPool;

/// Executes `kanau` query processors against the connection pool.
///
/// Every SQL statement of the gateway is a query struct with an
/// `impl Processor<Query> for DatabaseProcessor`; multi-statement units of
/// work open a transaction from [`DatabaseProcessor::begin`] and use the
/// `*_tx` helpers on the entity types instead.
#[derive(Debug, Clone)]
pub struct DatabaseProcessor {
    pub pool: PgPool,
}

impl DatabaseProcessor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn begin(&self) -> Result<sqlx::Transaction<'static, sqlx::Postgres>, sqlx::Error> {
        self.pool.begin().await
    }
}
