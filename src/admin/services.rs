use serde::Serialize;
use sqlx::PgPool;
use time::{OffsetDateTime, Time};

#[derive(Debug, Serialize)]
pub struct ServiceStats {
    pub total_users: i64,
    pub active_subscriptions: i64,
    pub total_payments: i64,
    pub total_stars_earned: i64,
    pub total_meals: i64,
    pub total_analyses: i64,
    pub today_users: i64,
    pub today_meals: i64,
}

pub async fn service_stats(db: &PgPool, now: OffsetDateTime) -> anyhow::Result<ServiceStats> {
    let today_start = now.replace_time(Time::MIDNIGHT);

    let (total_users,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(db)
        .await?;
    let (active_subscriptions,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM users WHERE subscription_expires_at > $1")
            .bind(now)
            .fetch_one(db)
            .await?;
    let (total_payments, total_stars_earned): (i64, i64) =
        sqlx::query_as("SELECT COUNT(*), COALESCE(SUM(stars), 0)::BIGINT FROM payments")
            .fetch_one(db)
            .await?;
    let (total_analyses,): (i64,) =
        sqlx::query_as("SELECT COALESCE(SUM(total_analyses_used), 0)::BIGINT FROM users")
            .fetch_one(db)
            .await?;
    let (today_users,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM users WHERE created_at >= $1")
            .bind(today_start)
            .fetch_one(db)
            .await?;
    let (total_meals,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM meals")
        .fetch_one(db)
        .await?;
    let (today_meals,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM meals WHERE created_at >= $1")
            .bind(today_start)
            .fetch_one(db)
            .await?;

    Ok(ServiceStats {
        total_users,
        active_subscriptions,
        total_payments,
        total_stars_earned,
        total_meals,
        total_analyses,
        today_users,
        today_meals,
    })
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct TopUser {
    pub external_id: String,
    pub total_analyses_used: i32,
    pub has_subscription: bool,
}

pub async fn top_users(
    db: &PgPool,
    now: OffsetDateTime,
    limit: i64,
) -> anyhow::Result<Vec<TopUser>> {
    let users = sqlx::query_as::<_, TopUser>(
        "SELECT external_id, total_analyses_used,
                COALESCE(subscription_expires_at > $1, FALSE) AS has_subscription
         FROM users
         ORDER BY total_analyses_used DESC
         LIMIT $2",
    )
    .bind(now)
    .bind(limit)
    .fetch_all(db)
    .await?;
    Ok(users)
}
