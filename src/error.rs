use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::models::AppointmentStatus;

/// Failures of the booking core. Every variant maps to one stable HTTP status.
#[derive(Debug, Error)]
pub enum BookingError {
    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("slot {0} not found")]
    SlotNotFound(i64),

    #[error("slot {0} is already booked, choose another")]
    SlotAlreadyBooked(i64),

    #[error("slot {0} starts in the past")]
    SlotInPast(i64),

    #[error("slot {slot_id} belongs to doctor {actual}, not doctor {requested}")]
    DoctorMismatch {
        slot_id: i64,
        requested: i64,
        actual: i64,
    },

    #[error("slot {0} is referenced by an appointment")]
    HasAppointment(i64),

    #[error("at least one disease or symptom is required")]
    MissingCriteria,

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("cannot move appointment from {} to {}", .from.as_str(), .to.as_str())]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("slot {0} is no longer available")]
    SlotNoLongerAvailable(i64),

    #[error("{0}")]
    Validation(String),

    #[error("store error: {0}")]
    Store(String),
}

impl From<sqlx::Error> for BookingError {
    fn from(e: sqlx::Error) -> Self {
        BookingError::Store(e.to_string())
    }
}

impl BookingError {
    pub fn code(&self) -> &'static str {
        match self {
            BookingError::InvalidRange(_) => "INVALID_RANGE",
            BookingError::SlotNotFound(_) => "SLOT_NOT_FOUND",
            BookingError::SlotAlreadyBooked(_) => "SLOT_ALREADY_BOOKED",
            BookingError::SlotInPast(_) => "SLOT_IN_PAST",
            BookingError::DoctorMismatch { .. } => "DOCTOR_MISMATCH",
            BookingError::HasAppointment(_) => "HAS_APPOINTMENT",
            BookingError::MissingCriteria => "MISSING_CRITERIA",
            BookingError::NotFound(_) => "NOT_FOUND",
            BookingError::Forbidden(_) => "FORBIDDEN",
            BookingError::InvalidTransition { .. } => "INVALID_TRANSITION",
            BookingError::SlotNoLongerAvailable(_) => "SLOT_NO_LONGER_AVAILABLE",
            BookingError::Validation(_) => "VALIDATION_ERROR",
            BookingError::Store(_) => "INTERNAL",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorObject,
}

#[derive(Debug, Serialize)]
pub struct ErrorObject {
    pub code: String,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(&'static str, String),
    Forbidden(&'static str, String),
    BadRequest(&'static str, String),
    NotFound(&'static str, String),
    Conflict(&'static str, String),
    Internal(String),
}

impl ApiError {
    pub fn session_expired() -> Self {
        ApiError::Unauthorized("SESSION_EXPIRED", "Session expired".into())
    }

    fn to_error_response(code: &str, message: &str) -> Json<ErrorResponse> {
        Json(ErrorResponse {
            error: ErrorObject {
                code: code.to_string(),
                message: message.to_string(),
            },
        })
    }
}

impl From<BookingError> for ApiError {
    fn from(e: BookingError) -> Self {
        let code = e.code();
        match e {
            BookingError::SlotNotFound(_) | BookingError::NotFound(_) => {
                ApiError::NotFound(code, e.to_string())
            }
            BookingError::SlotAlreadyBooked(_) | BookingError::SlotNoLongerAvailable(_) => {
                ApiError::Conflict(code, e.to_string())
            }
            BookingError::Forbidden(_) => ApiError::Forbidden(code, e.to_string()),
            BookingError::Store(msg) => ApiError::Internal(msg),
            BookingError::InvalidRange(_)
            | BookingError::SlotInPast(_)
            | BookingError::DoctorMismatch { .. }
            | BookingError::HasAppointment(_)
            | BookingError::MissingCriteria
            | BookingError::InvalidTransition { .. }
            | BookingError::Validation(_) => ApiError::BadRequest(code, e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized(code, msg) => {
                (StatusCode::UNAUTHORIZED, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::Forbidden(code, msg) => {
                (StatusCode::FORBIDDEN, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::BadRequest(code, msg) => {
                (StatusCode::BAD_REQUEST, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::NotFound(code, msg) => {
                (StatusCode::NOT_FOUND, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::Conflict(code, msg) => {
                (StatusCode::CONFLICT, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::Internal(msg) => {
                // details stay in the log
                tracing::error!(error = %msg, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError::to_error_response("INTERNAL", "Internal server error"),
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(e: BookingError) -> StatusCode {
        ApiError::from(e).into_response().status()
    }

    #[test]
    fn booking_errors_map_to_stable_statuses() {
        assert_eq!(status_of(BookingError::SlotNotFound(1)), StatusCode::NOT_FOUND);
        assert_eq!(status_of(BookingError::NotFound("appointment 1".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_of(BookingError::SlotAlreadyBooked(1)), StatusCode::CONFLICT);
        assert_eq!(status_of(BookingError::SlotNoLongerAvailable(1)), StatusCode::CONFLICT);
        assert_eq!(status_of(BookingError::Forbidden("no".into())), StatusCode::FORBIDDEN);
        assert_eq!(status_of(BookingError::MissingCriteria), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(BookingError::HasAppointment(3)), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(BookingError::InvalidTransition {
                from: AppointmentStatus::Completed,
                to: AppointmentStatus::Confirmed,
            }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(BookingError::Store("connection reset".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
