mod dto;
mod handlers;
pub mod repo;
pub mod services;

pub use repo::{Meal, MealItem, MealSource, MealType, MealWithItems};

use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    handlers::routes()
}
