use axum::Router;
use chrono::{NaiveDate, NaiveTime};

use crate::error::ApiError;
use crate::models::AppState;

pub mod appointment_routes;
pub mod recommendation_routes;
pub mod slot_routes;

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", slot_routes::router())
        .nest("/api/v1", appointment_routes::router())
        .nest("/api/v1", recommendation_routes::router())
        .with_state(state)
}

pub(crate) fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        ApiError::BadRequest("VALIDATION_ERROR", format!("{field} must be YYYY-MM-DD"))
    })
}

pub(crate) fn parse_opt_date(field: &str, raw: Option<&str>) -> Result<Option<NaiveDate>, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => parse_date(field, s).map(Some),
        None => Ok(None),
    }
}

pub(crate) fn parse_time(field: &str, raw: &str) -> Result<NaiveTime, ApiError> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|_| ApiError::BadRequest("VALIDATION_ERROR", format!("{field} must be HH:MM")))
}
