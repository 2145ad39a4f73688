//! Scale directory behind the gated scale routes

use async_trait::async_trait;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::ApiResult;

/// A published measurement scale
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Scale {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub abbreviation: Option<String>,
    pub domain: String,
    pub item_count: i32,
    pub description: Option<String>,
}

#[async_trait]
pub trait ScaleDirectory: Send + Sync {
    /// Case-insensitive match on name or abbreviation
    async fn search(&self, query: &str, limit: i64) -> ApiResult<Vec<Scale>>;

    async fn get_by_slug(&self, slug: &str) -> ApiResult<Option<Scale>>;

    /// Every scale, ordered by name
    async fn all(&self) -> ApiResult<Vec<Scale>>;
}

pub struct PgScaleDirectory {
    pool: PgPool,
}

impl PgScaleDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScaleDirectory for PgScaleDirectory {
    async fn search(&self, query: &str, limit: i64) -> ApiResult<Vec<Scale>> {
        let pattern = format!("%{}%", escape_like(&query.to_lowercase()));
        let scales = sqlx::query_as::<_, Scale>(
            r#"
            SELECT id, slug, name, abbreviation, domain, item_count, description
            FROM scales
            WHERE LOWER(name) LIKE $1 OR LOWER(abbreviation) LIKE $1
            ORDER BY name
            LIMIT $2
            "#,
        )
        .bind(pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(scales)
    }

    async fn get_by_slug(&self, slug: &str) -> ApiResult<Option<Scale>> {
        let scale = sqlx::query_as::<_, Scale>(
            r#"
            SELECT id, slug, name, abbreviation, domain, item_count, description
            FROM scales
            WHERE slug = $1
            "#,
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        Ok(scale)
    }

    async fn all(&self) -> ApiResult<Vec<Scale>> {
        let scales = sqlx::query_as::<_, Scale>(
            r#"
            SELECT id, slug, name, abbreviation, domain, item_count, description
            FROM scales
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(scales)
    }
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Fixed list of scales for tests and local development
#[derive(Default)]
pub struct InMemoryScaleDirectory {
    scales: Vec<Scale>,
}

impl InMemoryScaleDirectory {
    pub fn new(mut scales: Vec<Scale>) -> Self {
        scales.sort_by(|a, b| a.name.cmp(&b.name));
        Self { scales }
    }
}

#[async_trait]
impl ScaleDirectory for InMemoryScaleDirectory {
    async fn search(&self, query: &str, limit: i64) -> ApiResult<Vec<Scale>> {
        let query = query.to_lowercase();
        Ok(self
            .scales
            .iter()
            .filter(|scale| {
                scale.name.to_lowercase().contains(&query)
                    || scale
                        .abbreviation
                        .as_deref()
                        .is_some_and(|abbr| abbr.to_lowercase().contains(&query))
            })
            .take(usize::try_from(limit).unwrap_or(0))
            .cloned()
            .collect())
    }

    async fn get_by_slug(&self, slug: &str) -> ApiResult<Option<Scale>> {
        Ok(self.scales.iter().find(|scale| scale.slug == slug).cloned())
    }

    async fn all(&self) -> ApiResult<Vec<Scale>> {
        Ok(self.scales.clone())
    }
}
