use serde::Serialize;
use sqlx::PgPool;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::ai::normalize::{self, FoodItem};
use crate::entitlements::{self, ConsumeOutcome};
use crate::error::AppError;
use crate::state::AppState;

use super::repo::{self, Meal, MealSource, MealType, MealWithItems};

/// Time-of-day heuristic used when the model does not classify the meal
/// (text path). Half-open boundaries at 5, 11, 16 and 22.
pub fn classify_meal_type(hour: u8) -> MealType {
    match hour {
        5..=10 => MealType::Breakfast,
        11..=15 => MealType::Lunch,
        16..=21 => MealType::Dinner,
        _ => MealType::Snack,
    }
}

/// The four macro totals of a meal or a period. Always derived by summation,
/// never edited on their own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MealTotals {
    pub calories: i32,
    pub protein: f64,
    pub fat: f64,
    pub carbs: f64,
}

impl MealTotals {
    pub fn from_items(items: &[FoodItem]) -> Self {
        items.iter().fold(Self::default(), |acc, item| Self {
            calories: acc.calories + item.calories,
            protein: acc.protein + item.protein,
            fat: acc.fat + item.fat,
            carbs: acc.carbs + item.carbs,
        })
    }

    /// Period totals sum the meals' stored totals, trusting that each meal was
    /// internally consistent at write time.
    pub fn from_meals<'a>(meals: impl IntoIterator<Item = &'a Meal>) -> Self {
        meals.into_iter().fold(Self::default(), |acc, meal| Self {
            calories: acc.calories + meal.total_calories,
            protein: acc.protein + meal.total_protein,
            fat: acc.fat + meal.total_fat,
            carbs: acc.carbs + meal.total_carbs,
        })
    }
}

pub async fn create_meal(
    db: &PgPool,
    user_id: Uuid,
    eaten_at: OffsetDateTime,
    meal_type: MealType,
    items: Vec<FoodItem>,
    source: MealSource,
) -> anyhow::Result<MealWithItems> {
    let totals = MealTotals::from_items(&items);
    let meal = repo::insert_with_items(db, user_id, eaten_at, meal_type, source, &items, &totals)
        .await?;
    info!(%user_id, meal_id = %meal.meal.id, items = meal.items.len(),
        calories = totals.calories, "meal recorded");
    Ok(meal)
}

#[derive(Debug, Serialize)]
pub struct AnalysisResult {
    #[serde(flatten)]
    pub meal: MealWithItems,
    pub consumed: ConsumeOutcome,
}

/// Full text-path analysis: entitlement gate, model call, normalization,
/// persistence, then settlement. The access check up front is advisory; the
/// pool that actually pays is decided by `consume` after the meal is stored.
pub async fn run_text_analysis(
    state: &AppState,
    user_id: Uuid,
    description: &str,
    eaten_at: OffsetDateTime,
) -> Result<AnalysisResult, AppError> {
    gate(state, user_id).await?;

    let raw = state.estimator.analyze_text(description).await?;
    let items = normalize::parse_items_response(&raw)?;
    if items.is_empty() {
        return Err(AppError::NothingRecognized);
    }

    let meal_type = classify_meal_type(eaten_at.hour());
    finish(state, user_id, eaten_at, meal_type, items, MealSource::Text).await
}

/// Photo path: the meal category comes from the model, not the clock.
pub async fn run_photo_analysis(
    state: &AppState,
    user_id: Uuid,
    image: &str,
    eaten_at: OffsetDateTime,
) -> Result<AnalysisResult, AppError> {
    gate(state, user_id).await?;

    let raw = state.estimator.analyze_image(image).await?;
    let (items, meal_type) = normalize::parse_photo_response(&raw)?;
    if items.is_empty() {
        return Err(AppError::NothingRecognized);
    }

    finish(state, user_id, eaten_at, meal_type, items, MealSource::Photo).await
}

// Ledger decisions run against the wall clock, not the (possibly backdated)
// eaten_at timestamp.
async fn gate(state: &AppState, user_id: Uuid) -> Result<(), AppError> {
    let decision =
        entitlements::services::check_access(&state.db, user_id, OffsetDateTime::now_utc()).await?;
    if !decision.allowed {
        return Err(AppError::AccessDenied {
            bonus_left: 0,
            free_left: 0,
        });
    }
    Ok(())
}

async fn finish(
    state: &AppState,
    user_id: Uuid,
    eaten_at: OffsetDateTime,
    meal_type: MealType,
    items: Vec<FoodItem>,
    source: MealSource,
) -> Result<AnalysisResult, AppError> {
    let meal = create_meal(&state.db, user_id, eaten_at, meal_type, items, source).await?;

    // The advisory check can be stale under concurrency; the guarded update in
    // consume is what actually settles the ledger. An empty outcome means a
    // parallel request drained the last credit between check and settle; the
    // meal is already recorded, so this one rides for free.
    let consumed = match entitlements::services::consume(&state.db, user_id, OffsetDateTime::now_utc()).await? {
        Some(outcome) => outcome,
        None => {
            warn!(%user_id, "pools drained between access check and consume");
            ConsumeOutcome {
                pool: entitlements::AccessPool::None,
                bonus_left: 0,
                free_left: 0,
            }
        }
    };

    Ok(AnalysisResult { meal, consumed })
}

#[derive(Debug, Serialize)]
pub struct PeriodReport {
    pub meals: Vec<MealWithItems>,
    pub totals: MealTotals,
    pub daily_calories: Option<i32>,
}

pub async fn report_for_range(
    db: &PgPool,
    user_id: Uuid,
    start: OffsetDateTime,
    end: OffsetDateTime,
) -> anyhow::Result<PeriodReport> {
    let meals = repo::list_in_range(db, user_id, start, end).await?;
    let totals = MealTotals::from_meals(meals.iter().map(|m| &m.meal));
    let daily_calories = crate::users::repo::find_by_id(db, user_id)
        .await?
        .and_then(|u| u.daily_calories);
    Ok(PeriodReport {
        meals,
        totals,
        daily_calories,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifier_partitions_the_day() {
        for hour in 0..24u8 {
            let expected = match hour {
                5..=10 => MealType::Breakfast,
                11..=15 => MealType::Lunch,
                16..=21 => MealType::Dinner,
                _ => MealType::Snack,
            };
            assert_eq!(classify_meal_type(hour), expected, "hour {hour}");
        }
    }

    #[test]
    fn classifier_boundaries_are_half_open() {
        assert_eq!(classify_meal_type(4), MealType::Snack);
        assert_eq!(classify_meal_type(5), MealType::Breakfast);
        assert_eq!(classify_meal_type(10), MealType::Breakfast);
        assert_eq!(classify_meal_type(11), MealType::Lunch);
        assert_eq!(classify_meal_type(15), MealType::Lunch);
        assert_eq!(classify_meal_type(16), MealType::Dinner);
        assert_eq!(classify_meal_type(21), MealType::Dinner);
        assert_eq!(classify_meal_type(22), MealType::Snack);
        assert_eq!(classify_meal_type(23), MealType::Snack);
        assert_eq!(classify_meal_type(0), MealType::Snack);
    }

    fn item(name: &str, calories: i32, protein: f64, fat: f64, carbs: f64) -> FoodItem {
        FoodItem {
            name: name.into(),
            grams: 100.0,
            calories,
            protein,
            fat,
            carbs,
        }
    }

    #[test]
    fn totals_are_exact_sums_over_items() {
        let items = vec![
            item("Egg", 78, 6.0, 5.0, 0.6),
            item("Toast", 80, 2.7, 1.0, 14.0),
            item("Butter", 102, 0.1, 11.5, 0.0),
        ];
        let totals = MealTotals::from_items(&items);
        assert_eq!(totals.calories, 260);
        assert!((totals.protein - 8.8).abs() < 1e-9);
        assert!((totals.fat - 17.5).abs() < 1e-9);
        assert!((totals.carbs - 14.6).abs() < 1e-9);
    }

    #[test]
    fn empty_item_list_sums_to_zero() {
        assert_eq!(MealTotals::from_items(&[]), MealTotals::default());
    }
}
