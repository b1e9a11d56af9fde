//! The usage-entitlement ledger. Three pools govern whether an analysis may
//! run: an active subscription (unlimited), bonus credits from promo codes,
//! and the free starter credits. The spend order is fixed policy: subscription
//! first, then bonus before free.
//!
//! `check_access` is advisory and may be stale by the time the analysis
//! finishes; correctness is enforced by `consume` and `redeem_promo`, whose
//! writes are single guarded statements or row-locked transactions.

use rand::Rng;
use serde::Serialize;
use sqlx::PgPool;
use time::{Date, Month, OffsetDateTime};
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::users::repo as users_repo;
use crate::users::User;

use super::repo::{self, Promo};

const PROMO_CODE_LEN: usize = 8;
const PROMO_CODE_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessPool {
    Subscription,
    Bonus,
    Free,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AccessDecision {
    pub allowed: bool,
    pub pool: AccessPool,
    /// Credits left in the granting pool; None for the unlimited subscription.
    pub remaining: Option<i32>,
}

impl AccessDecision {
    fn denied() -> Self {
        Self {
            allowed: false,
            pool: AccessPool::None,
            remaining: None,
        }
    }
}

/// Pure policy: subscription in the future wins, then bonus, then free.
pub fn evaluate_access(user: &User, now: OffsetDateTime) -> AccessDecision {
    if matches!(user.subscription_expires_at, Some(end) if end > now) {
        return AccessDecision {
            allowed: true,
            pool: AccessPool::Subscription,
            remaining: None,
        };
    }
    if user.bonus_credits > 0 {
        return AccessDecision {
            allowed: true,
            pool: AccessPool::Bonus,
            remaining: Some(user.bonus_credits),
        };
    }
    if user.free_credits > 0 {
        return AccessDecision {
            allowed: true,
            pool: AccessPool::Free,
            remaining: Some(user.free_credits),
        };
    }
    AccessDecision::denied()
}

/// Advisory read; a missing user is simply denied.
pub async fn check_access(
    db: &PgPool,
    user_id: Uuid,
    now: OffsetDateTime,
) -> anyhow::Result<AccessDecision> {
    match users_repo::find_by_id(db, user_id).await? {
        Some(user) => Ok(evaluate_access(&user, now)),
        None => Ok(AccessDecision::denied()),
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ConsumeOutcome {
    pub pool: AccessPool,
    pub bonus_left: i32,
    pub free_left: i32,
}

/// Settles one successful analysis against the pools. Each attempt is a single
/// guarded UPDATE, so two near-simultaneous analyses can never both draw the
/// last credit from a pool, and no counter ever goes negative. Returns None
/// when the user is missing or every pool is empty.
pub async fn consume(
    db: &PgPool,
    user_id: Uuid,
    now: OffsetDateTime,
) -> anyhow::Result<Option<ConsumeOutcome>> {
    // Active subscription: meter the counter, leave the pools alone.
    let row: Option<(i32, i32)> = sqlx::query_as(
        "UPDATE users SET total_analyses_used = total_analyses_used + 1
         WHERE id = $1 AND subscription_expires_at > $2
         RETURNING bonus_credits, free_credits",
    )
    .bind(user_id)
    .bind(now)
    .fetch_optional(db)
    .await?;
    if let Some((bonus_left, free_left)) = row {
        return Ok(Some(ConsumeOutcome {
            pool: AccessPool::Subscription,
            bonus_left,
            free_left,
        }));
    }

    let row: Option<(i32, i32)> = sqlx::query_as(
        "UPDATE users SET bonus_credits = bonus_credits - 1,
                          total_analyses_used = total_analyses_used + 1
         WHERE id = $1 AND bonus_credits > 0
         RETURNING bonus_credits, free_credits",
    )
    .bind(user_id)
    .fetch_optional(db)
    .await?;
    if let Some((bonus_left, free_left)) = row {
        return Ok(Some(ConsumeOutcome {
            pool: AccessPool::Bonus,
            bonus_left,
            free_left,
        }));
    }

    let row: Option<(i32, i32)> = sqlx::query_as(
        "UPDATE users SET free_credits = free_credits - 1,
                          total_analyses_used = total_analyses_used + 1
         WHERE id = $1 AND free_credits > 0
         RETURNING bonus_credits, free_credits",
    )
    .bind(user_id)
    .fetch_optional(db)
    .await?;
    if let Some((bonus_left, free_left)) = row {
        return Ok(Some(ConsumeOutcome {
            pool: AccessPool::Free,
            bonus_left,
            free_left,
        }));
    }

    Ok(None)
}

/// Calendar-month arithmetic with the day clamped to the target month's length,
/// so Jan 31 + 1 month lands on the last day of February.
pub fn add_months(when: OffsetDateTime, months: i32) -> OffsetDateTime {
    let date = when.date();
    let zero_based = date.year() * 12 + (date.month() as i32 - 1) + months;
    let year = zero_based.div_euclid(12);
    let month = Month::January.nth_next(zero_based.rem_euclid(12) as u8);
    let day = date.day().min(time::util::days_in_year_month(year, month));
    match Date::from_calendar_date(year, month, day) {
        Ok(new_date) => when.replace_date(new_date),
        // Unreachable with a clamped day; keep the input rather than panic.
        Err(_) => when,
    }
}

/// Extends the subscription from max(now, current expiry) and appends the
/// payment audit row, both in one transaction. A replayed payment reference is
/// reported as a conflict and changes nothing.
pub async fn activate_subscription(
    db: &PgPool,
    user_id: Uuid,
    payment_ref: &str,
    stars: i32,
    months: i32,
    now: OffsetDateTime,
) -> Result<OffsetDateTime, AppError> {
    let mut tx = db.begin().await.map_err(anyhow::Error::from)?;

    let row: Option<(Option<OffsetDateTime>,)> =
        sqlx::query_as("SELECT subscription_expires_at FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(anyhow::Error::from)?;
    let Some((current,)) = row else {
        return Err(AppError::UserNotFound);
    };

    let start = match current {
        Some(end) if end > now => end,
        _ => now,
    };
    let new_end = add_months(start, months);

    let inserted = sqlx::query(
        "INSERT INTO payments (user_id, payment_ref, stars, months) VALUES ($1, $2, $3, $4)",
    )
    .bind(user_id)
    .bind(payment_ref)
    .bind(stars)
    .bind(months)
    .execute(&mut *tx)
    .await;
    match inserted {
        Ok(_) => {}
        Err(e) if repo::is_unique_violation(&e) => {
            return Err(AppError::DuplicatePayment(payment_ref.to_string()));
        }
        Err(e) => return Err(AppError::Internal(e.into())),
    }

    sqlx::query("UPDATE users SET subscription_expires_at = $2 WHERE id = $1")
        .bind(user_id)
        .bind(new_end)
        .execute(&mut *tx)
        .await
        .map_err(anyhow::Error::from)?;

    tx.commit().await.map_err(anyhow::Error::from)?;
    info!(%user_id, %payment_ref, stars, months, "subscription extended");
    Ok(new_end)
}

/// Promo rejection is an expected outcome, so it travels as a value.
#[derive(Debug, Clone, Serialize)]
pub struct PromoRedemption {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analyses_added: Option<i32>,
}

impl PromoRedemption {
    fn rejected(message: &str) -> Self {
        Self {
            success: false,
            message: message.to_string(),
            analyses_added: None,
        }
    }
}

/// All checks and all three writes run in one transaction with the promo row
/// locked, so a concurrent redemption of the same code serializes behind this
/// one: the (promo, user) primary key turns a duplicate into a definite
/// "already used", and a capped promo hands out its last use exactly once.
pub async fn redeem_promo(
    db: &PgPool,
    user_id: Uuid,
    code: &str,
    now: OffsetDateTime,
) -> anyhow::Result<PromoRedemption> {
    let code = code.trim().to_uppercase();
    let mut tx = db.begin().await?;

    let user_exists: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
    if user_exists.is_none() {
        return Ok(PromoRedemption::rejected("User not found"));
    }

    let promo: Option<Promo> = sqlx::query_as(
        "SELECT id, code, analyses_count, max_uses, used_count, expires_at, is_active, created_at
         FROM promos WHERE code = $1 FOR UPDATE",
    )
    .bind(&code)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(promo) = promo else {
        return Ok(PromoRedemption::rejected("Promo code not found"));
    };
    if !promo.is_active {
        return Ok(PromoRedemption::rejected("Promo code is no longer active"));
    }
    if matches!(promo.expires_at, Some(end) if end < now) {
        return Ok(PromoRedemption::rejected("Promo code has expired"));
    }
    if matches!(promo.max_uses, Some(cap) if promo.used_count >= cap) {
        return Ok(PromoRedemption::rejected(
            "Promo code has reached its usage limit",
        ));
    }

    let activation = sqlx::query(
        "INSERT INTO promo_activations (promo_id, user_id) VALUES ($1, $2)
         ON CONFLICT DO NOTHING",
    )
    .bind(promo.id)
    .bind(user_id)
    .execute(&mut *tx)
    .await?;
    if activation.rows_affected() == 0 {
        return Ok(PromoRedemption::rejected(
            "You have already used this promo code",
        ));
    }

    sqlx::query("UPDATE promos SET used_count = used_count + 1 WHERE id = $1")
        .bind(promo.id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE users SET bonus_credits = bonus_credits + $2 WHERE id = $1")
        .bind(user_id)
        .bind(promo.analyses_count)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    info!(%user_id, code = %promo.code, added = promo.analyses_count, "promo redeemed");
    Ok(PromoRedemption {
        success: true,
        message: format!(
            "Promo code accepted, {} analyses added",
            promo.analyses_count
        ),
        analyses_added: Some(promo.analyses_count),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionInfo {
    pub has_subscription: bool,
    pub subscription_expires_at: Option<OffsetDateTime>,
    pub bonus_credits: i32,
    pub free_credits: i32,
    pub total_analyses_used: i32,
}

pub async fn subscription_info(
    db: &PgPool,
    user_id: Uuid,
    now: OffsetDateTime,
) -> anyhow::Result<Option<SubscriptionInfo>> {
    let Some(user) = users_repo::find_by_id(db, user_id).await? else {
        return Ok(None);
    };
    Ok(Some(SubscriptionInfo {
        has_subscription: matches!(user.subscription_expires_at, Some(end) if end > now),
        subscription_expires_at: user.subscription_expires_at,
        bonus_credits: user.bonus_credits,
        free_credits: user.free_credits,
        total_analyses_used: user.total_analyses_used,
    }))
}

pub fn generate_promo_code() -> String {
    let mut rng = rand::thread_rng();
    (0..PROMO_CODE_LEN)
        .map(|_| PROMO_CODE_CHARS[rng.gen_range(0..PROMO_CODE_CHARS.len())] as char)
        .collect()
}

/// Creates a promo, generating a random code when none is supplied. Duplicate
/// codes surface as a creation conflict.
pub async fn create_promo(
    db: &PgPool,
    code: Option<String>,
    analyses_count: i32,
    max_uses: Option<i32>,
    expires_at: Option<OffsetDateTime>,
) -> Result<Promo, AppError> {
    let code = code
        .map(|c| c.trim().to_uppercase())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(generate_promo_code);
    repo::create_promo(db, &code, analyses_count, max_uses, expires_at).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn user(
        subscription_expires_at: Option<OffsetDateTime>,
        bonus_credits: i32,
        free_credits: i32,
    ) -> User {
        User {
            id: Uuid::new_v4(),
            external_id: "42".into(),
            subscription_expires_at,
            bonus_credits,
            free_credits,
            total_analyses_used: 0,
            age: None,
            height_cm: None,
            weight_kg: None,
            gender: None,
            activity_level: None,
            goal: None,
            daily_calories: None,
            created_at: datetime!(2024-01-01 00:00 UTC),
        }
    }

    const NOW: OffsetDateTime = datetime!(2024-06-15 12:00 UTC);

    #[test]
    fn active_subscription_wins_over_credits() {
        let u = user(Some(datetime!(2024-07-01 00:00 UTC)), 5, 5);
        let d = evaluate_access(&u, NOW);
        assert!(d.allowed);
        assert_eq!(d.pool, AccessPool::Subscription);
        assert_eq!(d.remaining, None);
    }

    #[test]
    fn expired_subscription_falls_through_to_bonus() {
        let u = user(Some(datetime!(2024-06-01 00:00 UTC)), 2, 5);
        let d = evaluate_access(&u, NOW);
        assert_eq!(d.pool, AccessPool::Bonus);
        assert_eq!(d.remaining, Some(2));
    }

    #[test]
    fn bonus_is_checked_before_free() {
        let u = user(None, 1, 5);
        assert_eq!(evaluate_access(&u, NOW).pool, AccessPool::Bonus);
    }

    #[test]
    fn free_credits_grant_access_when_bonus_is_empty() {
        let u = user(None, 0, 3);
        let d = evaluate_access(&u, NOW);
        assert_eq!(d.pool, AccessPool::Free);
        assert_eq!(d.remaining, Some(3));
    }

    #[test]
    fn empty_pools_deny_access() {
        let u = user(None, 0, 0);
        let d = evaluate_access(&u, NOW);
        assert!(!d.allowed);
        assert_eq!(d.pool, AccessPool::None);
    }

    #[test]
    fn subscription_expiring_exactly_now_does_not_count() {
        let u = user(Some(NOW), 0, 0);
        assert!(!evaluate_access(&u, NOW).allowed);
    }

    #[test]
    fn add_months_plain() {
        let end = add_months(datetime!(2024-03-10 09:30 UTC), 1);
        assert_eq!(end, datetime!(2024-04-10 09:30 UTC));
    }

    #[test]
    fn add_months_clamps_to_month_end() {
        let end = add_months(datetime!(2024-01-31 00:00 UTC), 1);
        assert_eq!(end, datetime!(2024-02-29 00:00 UTC));
        let end = add_months(datetime!(2023-01-31 00:00 UTC), 1);
        assert_eq!(end, datetime!(2023-02-28 00:00 UTC));
    }

    #[test]
    fn add_months_crosses_year_boundary() {
        let end = add_months(datetime!(2024-11-15 00:00 UTC), 3);
        assert_eq!(end, datetime!(2025-02-15 00:00 UTC));
        let end = add_months(datetime!(2024-06-01 00:00 UTC), 12);
        assert_eq!(end, datetime!(2025-06-01 00:00 UTC));
    }

    #[test]
    fn extension_from_future_expiry_preserves_remaining_time() {
        // 10 days of paid time left; one more month must stack on top of it.
        let current_end = NOW + time::Duration::days(10);
        let start = if current_end > NOW { current_end } else { NOW };
        assert_eq!(add_months(start, 1), datetime!(2024-07-25 12:00 UTC));
    }

    #[test]
    fn generated_codes_have_the_expected_shape() {
        for _ in 0..50 {
            let code = generate_promo_code();
            assert_eq!(code.len(), 8);
            assert!(code
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }
}
