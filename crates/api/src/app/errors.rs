use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use jobboard_core::DomainError;
use jobboard_infra::VacancyServiceError;

/// Map a service failure to its stable error code.
///
/// `invalid_cursor` and `concurrent_transaction` are the codes a client may
/// retry on (with a fresh listing, or the same request later).
pub fn service_error_to_response(err: VacancyServiceError) -> axum::response::Response {
    match err {
        VacancyServiceError::Domain(DomainError::Validation(msg)) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        VacancyServiceError::Domain(DomainError::InvalidId(msg)) => {
            json_error(StatusCode::BAD_REQUEST, "invalid_id", msg)
        }
        VacancyServiceError::Domain(DomainError::NotFound) => {
            json_error(StatusCode::NOT_FOUND, "not_found", "vacancy not found")
        }
        VacancyServiceError::InvalidCursor(e) => {
            json_error(StatusCode::BAD_REQUEST, "invalid_cursor", e.to_string())
        }
        VacancyServiceError::ConcurrentTransaction => json_error(
            StatusCode::CONFLICT,
            "concurrent_transaction",
            "the request conflicted with a concurrent update; retry it",
        ),
        VacancyServiceError::Cancelled(msg) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "cancelled", msg)
        }
        VacancyServiceError::Store(msg) => {
            tracing::error!(error = %msg, "vacancy store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", "internal storage error")
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
