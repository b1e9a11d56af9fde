use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

pub use crate::ai::normalize::RecognitionError;

/// Error taxonomy for the analysis and ledger paths. Promo rejections are not
/// here on purpose: an invalid code is an expected outcome and travels back to
/// the caller as a value, not an error.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// The model response could not be decoded into food items. The underlying
    /// cause (bad JSON, refusal) is not actionable by the end user, so the
    /// message stays generic.
    #[error("could not recognize the meal")]
    Recognition(#[from] RecognitionError),

    #[error("no food recognized")]
    NothingRecognized,

    #[error("no analyses left")]
    AccessDenied { bonus_left: i32, free_left: i32 },

    #[error("user not found")]
    UserNotFound,

    #[error("{0}")]
    BadRequest(String),

    #[error("payment {0} was already processed")]
    DuplicatePayment(String),

    #[error("promo code {0} already exists")]
    DuplicatePromoCode(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AppError::Recognition(_) | AppError::NothingRecognized => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "error": self.to_string() }),
            ),
            AppError::AccessDenied {
                bonus_left,
                free_left,
            } => (
                StatusCode::PAYMENT_REQUIRED,
                json!({
                    "error": self.to_string(),
                    "bonus_left": bonus_left,
                    "free_left": free_left,
                }),
            ),
            AppError::UserNotFound => (
                StatusCode::NOT_FOUND,
                json!({ "error": self.to_string() }),
            ),
            AppError::BadRequest(_) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": self.to_string() }),
            ),
            AppError::DuplicatePayment(_) | AppError::DuplicatePromoCode(_) => (
                StatusCode::CONFLICT,
                json!({ "error": self.to_string() }),
            ),
            AppError::Internal(e) => {
                error!(error = %e, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "internal error" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}
