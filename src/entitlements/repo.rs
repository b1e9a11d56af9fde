use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Promo {
    pub id: Uuid,
    pub code: String,
    pub analyses_count: i32,
    pub max_uses: Option<i32>,
    pub used_count: i32,
    pub expires_at: Option<OffsetDateTime>,
    pub is_active: bool,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub payment_ref: String,
    pub stars: i32,
    pub months: i32,
    pub created_at: OffsetDateTime,
}

const PROMO_COLUMNS: &str =
    "id, code, analyses_count, max_uses, used_count, expires_at, is_active, created_at";

pub async fn create_promo(
    db: &PgPool,
    code: &str,
    analyses_count: i32,
    max_uses: Option<i32>,
    expires_at: Option<OffsetDateTime>,
) -> Result<Promo, AppError> {
    let result = sqlx::query_as::<_, Promo>(&format!(
        "INSERT INTO promos (code, analyses_count, max_uses, expires_at)
         VALUES ($1, $2, $3, $4)
         RETURNING {PROMO_COLUMNS}"
    ))
    .bind(code)
    .bind(analyses_count)
    .bind(max_uses)
    .bind(expires_at)
    .fetch_one(db)
    .await;

    match result {
        Ok(promo) => Ok(promo),
        Err(e) if is_unique_violation(&e) => Err(AppError::DuplicatePromoCode(code.to_string())),
        Err(e) => Err(AppError::Internal(e.into())),
    }
}

pub async fn list_promos(db: &PgPool) -> anyhow::Result<Vec<Promo>> {
    let promos = sqlx::query_as::<_, Promo>(&format!(
        "SELECT {PROMO_COLUMNS} FROM promos ORDER BY created_at DESC"
    ))
    .fetch_all(db)
    .await?;
    Ok(promos)
}

pub async fn deactivate_promo(db: &PgPool, code: &str) -> anyhow::Result<bool> {
    let result = sqlx::query("UPDATE promos SET is_active = FALSE WHERE code = $1")
        .bind(code)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_promo(db: &PgPool, code: &str) -> anyhow::Result<bool> {
    let result = sqlx::query("DELETE FROM promos WHERE code = $1")
        .bind(code)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn recent_payments(db: &PgPool, limit: i64) -> anyhow::Result<Vec<Payment>> {
    let payments = sqlx::query_as::<_, Payment>(
        "SELECT id, user_id, payment_ref, stars, months, created_at
         FROM payments
         ORDER BY created_at DESC
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(db)
    .await?;
    Ok(payments)
}

pub fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}
