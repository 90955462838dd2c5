// src/routes/slot_routes.rs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    error::ApiError,
    middleware::{auth_context::AuthContext, json_body::ApiJson},
    models::{ApiOk, AppState, Appointment, AppointmentMode, NewBooking, NewProblem, Slot},
    routes::{parse_date, parse_opt_date, parse_time},
    services::{booking, slots},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/slots", get(list_slots))
        .route("/slots/create", post(create_slots))
        .route("/slots/doctor/{doctor_id}", get(list_doctor_slots))
        .route("/slots/available/{doctor_id}", get(list_available_slots))
        .route("/slots/book", post(book_slot))
        .route("/slots/{slot_id}/cancel", put(release_slot))
        .route("/slots/{slot_id}", delete(delete_slot))
}

/* ============================================================
   Request / response DTOs
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct CreateSlotsRequest {
    pub doctor_id: i64,
    pub date: String,       // YYYY-MM-DD
    pub start_time: String, // HH:MM
    pub end_time: String,
    pub duration_minutes: i32,
}

#[derive(Debug, Serialize)]
pub struct CreatedCount {
    pub count: u64,
}

#[derive(Debug, Deserialize)]
pub struct SlotListQuery {
    pub doctor_id: Option<i64>,
    pub date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BookSlotRequest {
    pub slot_id: i64,
    pub patient_id: i64,
    pub doctor_id: i64,
    pub mode: Option<AppointmentMode>,
    pub problem: Option<NewProblem>,
}

#[derive(Debug, Serialize)]
pub struct Deleted {
    pub deleted: bool,
}

/* ============================================================
   POST /slots/create
   ============================================================ */

pub async fn create_slots(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(req): ApiJson<CreateSlotsRequest>,
) -> Result<Json<ApiOk<CreatedCount>>, ApiError> {
    let date = parse_date("date", &req.date)?;
    let start = parse_time("start_time", &req.start_time)?;
    let end = parse_time("end_time", &req.end_time)?;

    let count = slots::generate_slots(
        &state,
        &auth,
        req.doctor_id,
        date,
        start,
        end,
        req.duration_minutes,
    )
    .await?;

    Ok(Json(ApiOk {
        data: CreatedCount { count },
    }))
}

/* ============================================================
   GET /slots, /slots/doctor/{id}, /slots/available/{id}
   ============================================================ */

pub async fn list_slots(
    State(state): State<AppState>,
    _auth: AuthContext,
    Query(q): Query<SlotListQuery>,
) -> Result<Json<ApiOk<Vec<Slot>>>, ApiError> {
    let date = parse_opt_date("date", q.date.as_deref())?;
    let data = slots::list_slots(&state, q.doctor_id, date).await?;
    Ok(Json(ApiOk { data }))
}

pub async fn list_doctor_slots(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(doctor_id): Path<i64>,
    Query(q): Query<DateQuery>,
) -> Result<Json<ApiOk<Vec<Slot>>>, ApiError> {
    let date = parse_opt_date("date", q.date.as_deref())?;
    let data = slots::list_slots(&state, Some(doctor_id), date).await?;
    Ok(Json(ApiOk { data }))
}

pub async fn list_available_slots(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(doctor_id): Path<i64>,
    Query(q): Query<DateQuery>,
) -> Result<Json<ApiOk<Vec<Slot>>>, ApiError> {
    let date = parse_opt_date("date", q.date.as_deref())?;
    let data = slots::list_available(&state, doctor_id, date, Utc::now()).await?;
    Ok(Json(ApiOk { data }))
}

/* ============================================================
   POST /slots/book
   ============================================================ */

pub async fn book_slot(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(req): ApiJson<BookSlotRequest>,
) -> Result<(StatusCode, Json<ApiOk<Appointment>>), ApiError> {
    let booking = NewBooking {
        slot_id: req.slot_id,
        doctor_id: req.doctor_id,
        patient_id: req.patient_id,
        mode: req.mode.unwrap_or(AppointmentMode::InPerson),
        problem: req.problem,
    };
    let data = booking::book_slot(&state, &auth, booking, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(ApiOk { data })))
}

/* ============================================================
   PUT /slots/{id}/cancel, DELETE /slots/{id}
   ============================================================ */

pub async fn release_slot(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(slot_id): Path<i64>,
) -> Result<Json<ApiOk<Slot>>, ApiError> {
    let data = slots::release_slot(&state, &auth, slot_id).await?;
    Ok(Json(ApiOk { data }))
}

pub async fn delete_slot(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(slot_id): Path<i64>,
) -> Result<Json<ApiOk<Deleted>>, ApiError> {
    slots::delete_slot(&state, &auth, slot_id).await?;
    Ok(Json(ApiOk {
        data: Deleted { deleted: true },
    }))
}
