use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use uuid::Uuid;

/// Associates an internal package with a G2Bulk catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ProductLink {
    pub package_id: Uuid,
    pub provider_product_id: String,
    pub provider_type_id: String,
    pub created_at: time::PrimitiveDateTime,
}

#[derive(Debug, Clone)]
pub struct GetProductLink {
    pub package_id: Uuid,
}

impl Processor<GetProductLink> for DatabaseProcessor {
    type Output = Option<ProductLink>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetProductLink")]
    async fn process(&self, query: GetProductLink) -> Result<Option<ProductLink>, sqlx::Error> {
        sqlx::query_as::<_, ProductLink>(
            r#"
            SELECT package_id, provider_product_id, provider_type_id, created_at
            FROM provider_product_links
            WHERE package_id = $1
            "#,
        )
        .bind(query.package_id)
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Create or replace the link for a package.
pub struct UpsertProductLink {
    pub package_id: Uuid,
    pub provider_product_id: String,
    pub provider_type_id: String,
}

impl Processor<UpsertProductLink> for DatabaseProcessor {
    type Output = ProductLink;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:UpsertProductLink")]
    async fn process(&self, upsert: UpsertProductLink) -> Result<ProductLink, sqlx::Error> {
        sqlx::query_as::<_, ProductLink>(
            r#"
            INSERT INTO provider_product_links (package_id, provider_product_id, provider_type_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (package_id) DO UPDATE
            SET provider_product_id = EXCLUDED.provider_product_id,
                provider_type_id = EXCLUDED.provider_type_id
            RETURNING package_id, provider_product_id, provider_type_id, created_at
            "#,
        )
        .bind(upsert.package_id)
        .bind(upsert.provider_product_id)
        .bind(upsert.provider_type_id)
        .fetch_one(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
pub struct ListProductLinks;

impl Processor<ListProductLinks> for DatabaseProcessor {
    type Output = Vec<ProductLink>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListProductLinks")]
    async fn process(&self, _query: ListProductLinks) -> Result<Vec<ProductLink>, sqlx::Error> {
        sqlx::query_as::<_, ProductLink>(
            r#"
            SELECT package_id, provider_product_id, provider_type_id, created_at
            FROM provider_product_links
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }
}
