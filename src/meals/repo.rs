use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::ai::normalize::FoodItem;

use super::services::MealTotals;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "meal_type", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
}

impl MealType {
    /// Lenient parse of the label a vision model supplies; anything it made up
    /// becomes a snack.
    pub fn from_model_label(label: &str) -> Self {
        match label.trim().to_ascii_uppercase().as_str() {
            "BREAKFAST" => Self::Breakfast,
            "LUNCH" => Self::Lunch,
            "DINNER" => Self::Dinner,
            _ => Self::Snack,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "meal_source", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum MealSource {
    Text,
    Photo,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Meal {
    pub id: Uuid,
    pub user_id: Uuid,
    pub eaten_at: OffsetDateTime,
    pub meal_type: MealType,
    pub source: MealSource,
    pub total_calories: i32,
    pub total_protein: f64,
    pub total_fat: f64,
    pub total_carbs: f64,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MealItem {
    pub id: Uuid,
    pub meal_id: Uuid,
    pub name: String,
    pub grams: f64,
    pub calories: i32,
    pub protein: f64,
    pub fat: f64,
    pub carbs: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MealWithItems {
    #[serde(flatten)]
    pub meal: Meal,
    pub items: Vec<MealItem>,
}

const MEAL_COLUMNS: &str = "id, user_id, eaten_at, meal_type, source, total_calories, \
     total_protein, total_fat, total_carbs, created_at";

const ITEM_COLUMNS: &str = "id, meal_id, name, grams, calories, protein, fat, carbs";

/// Meal and items land in one transaction; the items cascade-delete with the
/// meal, so a half-written record can never survive.
pub async fn insert_with_items(
    db: &PgPool,
    user_id: Uuid,
    eaten_at: OffsetDateTime,
    meal_type: MealType,
    source: MealSource,
    items: &[FoodItem],
    totals: &MealTotals,
) -> anyhow::Result<MealWithItems> {
    let mut tx = db.begin().await?;

    let meal = sqlx::query_as::<_, Meal>(&format!(
        "INSERT INTO meals (user_id, eaten_at, meal_type, source,
                            total_calories, total_protein, total_fat, total_carbs)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         RETURNING {MEAL_COLUMNS}"
    ))
    .bind(user_id)
    .bind(eaten_at)
    .bind(meal_type)
    .bind(source)
    .bind(totals.calories)
    .bind(totals.protein)
    .bind(totals.fat)
    .bind(totals.carbs)
    .fetch_one(&mut *tx)
    .await?;

    let mut rows = Vec::with_capacity(items.len());
    for item in items {
        let row = sqlx::query_as::<_, MealItem>(&format!(
            "INSERT INTO meal_items (meal_id, name, grams, calories, protein, fat, carbs)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {ITEM_COLUMNS}"
        ))
        .bind(meal.id)
        .bind(&item.name)
        .bind(item.grams)
        .bind(item.calories)
        .bind(item.protein)
        .bind(item.fat)
        .bind(item.carbs)
        .fetch_one(&mut *tx)
        .await?;
        rows.push(row);
    }

    tx.commit().await?;
    Ok(MealWithItems { meal, items: rows })
}

/// Half-open interval: `start <= eaten_at < end`.
pub async fn list_in_range(
    db: &PgPool,
    user_id: Uuid,
    start: OffsetDateTime,
    end: OffsetDateTime,
) -> anyhow::Result<Vec<MealWithItems>> {
    let meals = sqlx::query_as::<_, Meal>(&format!(
        "SELECT {MEAL_COLUMNS} FROM meals
         WHERE user_id = $1 AND eaten_at >= $2 AND eaten_at < $3
         ORDER BY eaten_at ASC"
    ))
    .bind(user_id)
    .bind(start)
    .bind(end)
    .fetch_all(db)
    .await?;

    if meals.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<Uuid> = meals.iter().map(|m| m.id).collect();
    let items = sqlx::query_as::<_, MealItem>(&format!(
        "SELECT {ITEM_COLUMNS} FROM meal_items WHERE meal_id = ANY($1)"
    ))
    .bind(&ids)
    .fetch_all(db)
    .await?;

    let mut by_meal: HashMap<Uuid, Vec<MealItem>> = HashMap::new();
    for item in items {
        by_meal.entry(item.meal_id).or_default().push(item);
    }

    Ok(meals
        .into_iter()
        .map(|meal| {
            let items = by_meal.remove(&meal.id).unwrap_or_default();
            MealWithItems { meal, items }
        })
        .collect())
}

/// Ownership-checked delete; a mismatch or unknown id is a quiet `false`.
pub async fn delete_owned(db: &PgPool, meal_id: Uuid, owner_id: Uuid) -> anyhow::Result<bool> {
    let result = sqlx::query("DELETE FROM meals WHERE id = $1 AND user_id = $2")
        .bind(meal_id)
        .bind(owner_id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_labels_map_to_categories() {
        assert_eq!(MealType::from_model_label("BREAKFAST"), MealType::Breakfast);
        assert_eq!(MealType::from_model_label("lunch"), MealType::Lunch);
        assert_eq!(MealType::from_model_label(" Dinner "), MealType::Dinner);
        assert_eq!(MealType::from_model_label("SNACK"), MealType::Snack);
    }

    #[test]
    fn unknown_model_labels_default_to_snack() {
        assert_eq!(MealType::from_model_label("BRUNCH"), MealType::Snack);
        assert_eq!(MealType::from_model_label(""), MealType::Snack);
    }
}
