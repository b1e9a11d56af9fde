use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct TextAnalysisRequest {
    pub user_id: Uuid,
    pub description: String,
    /// When the meal was eaten; defaults to now. Also drives the time-of-day
    /// meal classification.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub at: Option<OffsetDateTime>,
}

#[derive(Debug, Deserialize)]
pub struct PhotoAnalysisRequest {
    pub user_id: Uuid,
    /// Data URI or fetchable URL handed to the vision model.
    pub image: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub at: Option<OffsetDateTime>,
}

#[derive(Debug, Deserialize)]
pub struct DayReportQuery {
    pub user_id: Uuid,
    /// Calendar date, `YYYY-MM-DD`.
    pub date: String,
}

#[derive(Debug, Deserialize)]
pub struct RangeReportQuery {
    pub user_id: Uuid,
    pub start: String,
    /// Inclusive as a date; queried as an exclusive next-day bound.
    pub end: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteMealQuery {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct DeleteMealResponse {
    pub deleted: bool,
}

pub fn parse_date(value: &str) -> Result<Date, AppError> {
    let format = format_description!("[year]-[month]-[day]");
    Date::parse(value, &format)
        .map_err(|_| AppError::BadRequest(format!("invalid date: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn parses_iso_dates() {
        assert_eq!(parse_date("2024-02-29").unwrap(), date!(2024 - 02 - 29));
    }

    #[test]
    fn rejects_garbage_dates() {
        assert!(parse_date("yesterday").is_err());
        assert!(parse_date("2024-13-01").is_err());
        assert!(parse_date("2023-02-29").is_err());
    }
}
