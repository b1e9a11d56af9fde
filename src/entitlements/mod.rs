mod dto;
mod handlers;
pub mod repo;
pub mod services;
pub mod settings;

pub use services::{AccessDecision, AccessPool, ConsumeOutcome, PromoRedemption};

use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    handlers::routes()
}
