use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use rust_decimal::Decimal;
use uuid::Uuid;

/// A purchasable catalog package. The catalog itself is managed elsewhere;
/// the gateway only reads prices from it.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Package {
    pub id: Uuid,
    pub game_name: String,
    pub name: String,
    pub price: Decimal,
    pub currency: String,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct GetPackageById {
    pub package_id: Uuid,
}

impl Processor<GetPackageById> for DatabaseProcessor {
    type Output = Option<Package>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetPackageById")]
    async fn process(&self, query: GetPackageById) -> Result<Option<Package>, sqlx::Error> {
        sqlx::query_as::<_, Package>(
            "SELECT id, game_name, name, price, currency, active FROM packages WHERE id = $1",
        )
        .bind(query.package_id)
        .fetch_optional(&self.pool)
        .await
    }
}
