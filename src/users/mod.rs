mod dto;
mod handlers;
pub mod repo;
pub mod services;

pub use repo::{ActivityLevel, Gender, GoalType, User};

use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    handlers::routes()
}
