//! Turns the raw, untrusted text of a model response into validated food items.
//!
//! The model is asked for JSON but frequently wraps it in a markdown code fence
//! and occasionally drifts from the requested shape. Decoding failure is the
//! only hard error; everything past that point is total, defaulting coercion
//! so a partially malformed item can never poison the whole response.

use serde::Serialize;
use serde_json::Value;

use crate::meals::MealType;

const FALLBACK_NAME: &str = "Unknown food";
const DEFAULT_GRAMS: f64 = 100.0;

/// Raw model response was not decodable JSON. There is no partial-recovery
/// path past this.
#[derive(Debug, thiserror::Error)]
#[error("model response is not valid JSON")]
pub struct RecognitionError(#[source] pub serde_json::Error);

/// A normalized food item, ready for persistence. Every numeric field is a
/// finite non-negative number by construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoodItem {
    pub name: String,
    pub grams: f64,
    pub calories: i32,
    pub protein: f64,
    pub fat: f64,
    pub carbs: f64,
}

/// Text path: the model returns either a bare array of items or an object with
/// an `items` array. Any other decoded shape yields an empty list.
pub fn parse_items_response(raw: &str) -> Result<Vec<FoodItem>, RecognitionError> {
    let value = decode(raw)?;
    Ok(extract_items(&value))
}

/// Photo path: same item handling, plus a `mealType` label classified by the
/// model. Unknown or missing labels fall back to SNACK.
pub fn parse_photo_response(raw: &str) -> Result<(Vec<FoodItem>, MealType), RecognitionError> {
    let value = decode(raw)?;
    let items = extract_items(&value);
    let meal_type = value
        .get("mealType")
        .and_then(Value::as_str)
        .map(MealType::from_model_label)
        .unwrap_or(MealType::Snack);
    Ok((items, meal_type))
}

fn decode(raw: &str) -> Result<Value, RecognitionError> {
    serde_json::from_str(strip_code_fence(raw)).map_err(RecognitionError)
}

fn strip_code_fence(raw: &str) -> &str {
    let mut s = raw.trim();
    if let Some(rest) = s.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        s = rest.trim_start();
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest.trim_end();
    }
    s
}

fn extract_items(value: &Value) -> Vec<FoodItem> {
    let entries: &[Value] = match value {
        Value::Array(entries) => entries,
        Value::Object(map) => match map.get("items").and_then(Value::as_array) {
            Some(entries) => entries,
            None => &[],
        },
        _ => &[],
    };
    entries.iter().map(coerce_item).collect()
}

fn coerce_item(entry: &Value) -> FoodItem {
    FoodItem {
        name: coerce_name(entry.get("name")),
        grams: coerce_grams(entry.get("grams")),
        calories: coerce_calories(entry.get("calories")),
        protein: coerce_macro(entry.get("protein")),
        fat: coerce_macro(entry.get("fat")),
        carbs: coerce_macro(entry.get("carbs")),
    }
}

fn coerce_name(value: Option<&Value>) -> String {
    match value.and_then(Value::as_str) {
        Some(s) if !s.trim().is_empty() => s.to_string(),
        _ => FALLBACK_NAME.to_string(),
    }
}

// Accepts numeric strings as well, since the model sometimes quotes numbers.
fn numeric(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

fn coerce_grams(value: Option<&Value>) -> f64 {
    numeric(value).filter(|n| *n > 0.0).unwrap_or(DEFAULT_GRAMS)
}

fn coerce_macro(value: Option<&Value>) -> f64 {
    numeric(value).map(|n| n.max(0.0)).unwrap_or(0.0)
}

fn coerce_calories(value: Option<&Value>) -> i32 {
    numeric(value).map(|n| n.round().max(0.0) as i32).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_object_with_items() {
        let raw = r#"{"items":[{"name":"Egg","grams":50,"calories":78,"protein":6,"fat":5,"carbs":0.6}]}"#;
        let items = parse_items_response(raw).expect("valid json");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Egg");
        assert_eq!(items[0].grams, 50.0);
        assert_eq!(items[0].calories, 78);
        assert_eq!(items[0].carbs, 0.6);
    }

    #[test]
    fn parses_bare_array() {
        let raw = r#"[{"name":"Rice","grams":150,"calories":195,"protein":4,"fat":0.4,"carbs":41}]"#;
        let items = parse_items_response(raw).expect("valid json");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Rice");
    }

    #[test]
    fn strips_code_fence_with_language_tag() {
        let raw = "```json\n{\"items\":[{\"name\":\"Tea\",\"grams\":200,\"calories\":2}]}\n```";
        let items = parse_items_response(raw).expect("fence stripped");
        assert_eq!(items[0].name, "Tea");
    }

    #[test]
    fn strips_bare_code_fence() {
        let raw = "```\n[{\"name\":\"Toast\",\"grams\":30,\"calories\":80}]\n```";
        let items = parse_items_response(raw).expect("fence stripped");
        assert_eq!(items[0].name, "Toast");
    }

    #[test]
    fn malformed_json_is_a_recognition_error() {
        assert!(parse_items_response("the meal looks tasty").is_err());
        assert!(parse_items_response("```json\nnot json\n```").is_err());
    }

    #[test]
    fn unexpected_shape_yields_empty_list() {
        assert!(parse_items_response(r#""just a string""#)
            .expect("valid json")
            .is_empty());
        assert!(parse_items_response(r#"{"foods":[]}"#)
            .expect("valid json")
            .is_empty());
    }

    #[test]
    fn missing_fields_get_defaults() {
        let items = parse_items_response(r#"{"items":[{}]}"#).expect("valid json");
        assert_eq!(items[0].name, "Unknown food");
        assert_eq!(items[0].grams, 100.0);
        assert_eq!(items[0].calories, 0);
        assert_eq!(items[0].protein, 0.0);
        assert_eq!(items[0].fat, 0.0);
        assert_eq!(items[0].carbs, 0.0);
    }

    #[test]
    fn non_numeric_and_non_positive_grams_default_to_100() {
        let raw = r#"{"items":[{"name":"A","grams":"lots"},{"name":"B","grams":0},{"name":"C","grams":-5}]}"#;
        let items = parse_items_response(raw).expect("valid json");
        assert!(items.iter().all(|i| i.grams == 100.0));
    }

    #[test]
    fn quoted_numbers_are_accepted() {
        let raw = r#"{"items":[{"name":"Egg","grams":"50","calories":"78.4","protein":"6"}]}"#;
        let items = parse_items_response(raw).expect("valid json");
        assert_eq!(items[0].grams, 50.0);
        assert_eq!(items[0].calories, 78);
        assert_eq!(items[0].protein, 6.0);
    }

    #[test]
    fn calories_round_and_never_go_negative() {
        let raw = r#"{"items":[{"name":"A","calories":95.6},{"name":"B","calories":-20}]}"#;
        let items = parse_items_response(raw).expect("valid json");
        assert_eq!(items[0].calories, 96);
        assert_eq!(items[1].calories, 0);
    }

    #[test]
    fn negative_macros_clamp_to_zero() {
        let raw = r#"{"items":[{"name":"A","protein":-3,"fat":-0.1,"carbs":-7}]}"#;
        let items = parse_items_response(raw).expect("valid json");
        assert_eq!(items[0].protein, 0.0);
        assert_eq!(items[0].fat, 0.0);
        assert_eq!(items[0].carbs, 0.0);
    }

    #[test]
    fn photo_response_reads_meal_type() {
        let raw = r#"{"mealType":"BREAKFAST","items":[{"name":"Oatmeal","grams":250,"calories":180}]}"#;
        let (items, meal_type) = parse_photo_response(raw).expect("valid json");
        assert_eq!(items.len(), 1);
        assert_eq!(meal_type, MealType::Breakfast);
    }

    #[test]
    fn photo_response_defaults_unknown_meal_type_to_snack() {
        let (_, meal_type) =
            parse_photo_response(r#"{"mealType":"BRUNCH","items":[]}"#).expect("valid json");
        assert_eq!(meal_type, MealType::Snack);
        let (_, meal_type) = parse_photo_response(r#"{"items":[]}"#).expect("valid json");
        assert_eq!(meal_type, MealType::Snack);
    }

    #[test]
    fn empty_item_list_is_valid() {
        assert!(parse_items_response(r#"{"items":[]}"#)
            .expect("valid json")
            .is_empty());
    }
}
