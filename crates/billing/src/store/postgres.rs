//! Postgres-backed stores

use async_trait::async_trait;
use scalehub_shared::{TeamId, UserId};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{BillingApply, BillingStore, TeamBilling, TeamBillingUpdate, UsageKey, UsageStore};
use crate::error::{BillingError, BillingResult};

/// Store over the `teams`, `team_members` and `usage_counters` tables
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl BillingStore for PgStore {
    async fn active_memberships(&self, user_id: UserId) -> BillingResult<Vec<TeamBilling>> {
        let rows: Vec<(Uuid, String, Option<OffsetDateTime>, Option<String>, OffsetDateTime)> =
            sqlx::query_as(
                r#"
                SELECT
                    t.id,
                    t.plan_id,
                    t.plan_expires_at,
                    t.billing_customer_id,
                    m.joined_at
                FROM team_members m
                JOIN teams t ON t.id = m.team_id
                WHERE m.user_id = $1
                  AND m.is_active
                ORDER BY m.joined_at ASC
                "#,
            )
            .bind(user_id.0)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(
                |(team_id, plan_id, plan_expires_at, billing_customer_id, joined_at)| TeamBilling {
                    team_id: TeamId(team_id),
                    plan_id,
                    plan_expires_at,
                    billing_customer_id,
                    joined_at,
                },
            )
            .collect())
    }

    async fn apply_team_billing(
        &self,
        customer_id: &str,
        update: &TeamBillingUpdate,
    ) -> BillingResult<BillingApply> {
        let result = sqlx::query(
            r#"
            UPDATE teams
            SET plan_id = $1,
                plan_expires_at = $2,
                billing_event_at = COALESCE($3, billing_event_at),
                updated_at = NOW()
            WHERE billing_customer_id = $4
              AND ($3::TIMESTAMPTZ IS NULL
                   OR billing_event_at IS NULL
                   OR billing_event_at <= $3::TIMESTAMPTZ)
            "#,
        )
        .bind(update.plan_id.as_str())
        .bind(update.plan_expires_at)
        .bind(update.event_at)
        .bind(customer_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(BillingApply::Applied);
        }

        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS (SELECT 1 FROM teams WHERE billing_customer_id = $1)")
                .bind(customer_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(if exists {
            BillingApply::Stale
        } else {
            BillingApply::UnknownCustomer
        })
    }

    async fn record_webhook_event(&self, event_id: &str, event_type: &str) -> BillingResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO processed_webhook_events (event_id, event_type)
            VALUES ($1, $2)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(event_type)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn release_webhook_event(&self, event_id: &str) -> BillingResult<()> {
        sqlx::query("DELETE FROM processed_webhook_events WHERE event_id = $1")
            .bind(event_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn ping(&self) -> BillingResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl UsageStore for PgStore {
    async fn count(&self, key: &UsageKey) -> BillingResult<u64> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT count FROM usage_counters
            WHERE user_id = $1 AND feature = $2 AND period_key = $3
            "#,
        )
        .bind(key.user_id.0)
        .bind(key.feature.as_str())
        .bind(&key.period_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(count,)| count.max(0) as u64).unwrap_or(0))
    }

    async fn increment(&self, key: &UsageKey, cap: Option<u64>) -> BillingResult<Option<u64>> {
        // A fresh row starts at 1, which a zero cap must reject before touching the table
        if cap == Some(0) {
            return Ok(None);
        }

        let cap = cap
            .map(i64::try_from)
            .transpose()
            .map_err(|_| BillingError::InvalidInput("usage cap out of range".to_string()))?;

        // Single statement: concurrent callers serialize on the row lock, and the
        // conditional DO UPDATE skips the write once the cap is reached.
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            INSERT INTO usage_counters (user_id, feature, period_key, count, updated_at)
            VALUES ($1, $2, $3, 1, NOW())
            ON CONFLICT (user_id, feature, period_key) DO UPDATE
                SET count = usage_counters.count + 1,
                    updated_at = NOW()
                WHERE $4::BIGINT IS NULL OR usage_counters.count < $4::BIGINT
            RETURNING count
            "#,
        )
        .bind(key.user_id.0)
        .bind(key.feature.as_str())
        .bind(&key.period_key)
        .bind(cap)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(count,)| count.max(0) as u64))
    }

    async fn decrement(&self, key: &UsageKey) -> BillingResult<()> {
        sqlx::query(
            r#"
            UPDATE usage_counters
            SET count = count - 1, updated_at = NOW()
            WHERE user_id = $1 AND feature = $2 AND period_key = $3 AND count > 0
            "#,
        )
        .bind(key.user_id.0)
        .bind(key.feature.as_str())
        .bind(&key.period_key)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scalehub_shared::Feature;

    async fn setup() -> PgStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = scalehub_shared::create_pool(&url, 5)
            .await
            .expect("Failed to create pool");
        scalehub_shared::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        PgStore::new(pool)
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_capped_increment_stops_at_cap() {
        let store = setup().await;
        let key = UsageKey {
            user_id: UserId::new(),
            feature: Feature::Search,
            period_key: "2026-10".to_string(),
        };

        assert_eq!(store.increment(&key, Some(2)).await.unwrap(), Some(1));
        assert_eq!(store.increment(&key, Some(2)).await.unwrap(), Some(2));
        assert_eq!(store.increment(&key, Some(2)).await.unwrap(), None);
        assert_eq!(store.count(&key).await.unwrap(), 2);
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_concurrent_increments_are_not_lost() {
        let store = setup().await;
        let key = UsageKey {
            user_id: UserId::new(),
            feature: Feature::ApiCall,
            period_key: "2026-10".to_string(),
        };

        let tasks: Vec<_> = (0..25)
            .map(|_| {
                let store = store.clone();
                let key = key.clone();
                tokio::spawn(async move { store.increment(&key, None).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(store.count(&key).await.unwrap(), 25);
    }
}
