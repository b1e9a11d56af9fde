//! Flat key/value settings table with hard-coded fallbacks. Keys are read on
//! every ledger decision that needs a configurable parameter, so a missing or
//! garbled row can never take the ledger down.

use sqlx::PgPool;

pub const SUBSCRIPTION_PRICE_STARS: &str = "SUBSCRIPTION_PRICE_STARS";
pub const SUBSCRIPTION_MONTHS: &str = "SUBSCRIPTION_MONTHS";
pub const FREE_ANALYSES_COUNT: &str = "FREE_ANALYSES_COUNT";

pub const KNOWN_KEYS: &[&str] = &[
    SUBSCRIPTION_PRICE_STARS,
    SUBSCRIPTION_MONTHS,
    FREE_ANALYSES_COUNT,
];

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct LedgerSettings {
    pub subscription_price_stars: i32,
    pub subscription_months: i32,
    pub free_analyses_count: i32,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            subscription_price_stars: 100,
            subscription_months: 1,
            free_analyses_count: 3,
        }
    }
}

impl LedgerSettings {
    pub async fn load(db: &PgPool) -> anyhow::Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            subscription_price_stars: parse_or(
                get(db, SUBSCRIPTION_PRICE_STARS).await?,
                defaults.subscription_price_stars,
            ),
            subscription_months: parse_or(
                get(db, SUBSCRIPTION_MONTHS).await?,
                defaults.subscription_months,
            ),
            free_analyses_count: parse_or(
                get(db, FREE_ANALYSES_COUNT).await?,
                defaults.free_analyses_count,
            ),
        })
    }
}

pub async fn get(db: &PgPool, key: &str) -> anyhow::Result<Option<String>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = $1")
        .bind(key)
        .fetch_optional(db)
        .await?;
    Ok(row.map(|(value,)| value))
}

pub async fn set(db: &PgPool, key: &str, value: &str) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES ($1, $2)
         ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
    )
    .bind(key)
    .bind(value)
    .execute(db)
    .await?;
    Ok(())
}

fn parse_or(value: Option<String>, default: i32) -> i32 {
    value
        .as_deref()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_value_falls_back_to_default() {
        assert_eq!(parse_or(None, 100), 100);
    }

    #[test]
    fn garbled_value_falls_back_to_default() {
        assert_eq!(parse_or(Some("not a number".into()), 3), 3);
        assert_eq!(parse_or(Some("".into()), 1), 1);
    }

    #[test]
    fn stored_value_wins() {
        assert_eq!(parse_or(Some("250".into()), 100), 250);
        assert_eq!(parse_or(Some(" 5 ".into()), 3), 5);
    }

    #[test]
    fn defaults_match_documented_fallbacks() {
        let d = LedgerSettings::default();
        assert_eq!(d.subscription_price_stars, 100);
        assert_eq!(d.subscription_months, 1);
        assert_eq!(d.free_analyses_count, 3);
    }
}
