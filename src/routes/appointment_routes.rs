// src/routes/appointment_routes.rs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    error::ApiError,
    middleware::{auth_context::AuthContext, json_body::ApiJson},
    models::{
        ApiOk, AppState, Appointment, AppointmentMode, AppointmentStatus, DoctorLoad, NewProblem,
        RankedSlot,
    },
    routes::parse_opt_date,
    services::{
        booking,
        recommend::{self, AutoScheduleOutcome},
        scoring::SlotPreferences,
    },
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/appointments/smart-recommendations", post(smart_recommendations))
        .route("/appointments/auto-schedule", post(auto_schedule))
        .route("/appointments/balanced-slots", get(balanced_slots))
        .route(
            "/appointments/{appointment_id}",
            get(get_appointment)
                .put(update_status)
                .delete(delete_appointment),
        )
        .route("/appointments/{appointment_id}/cancel", put(cancel_appointment))
}

/* ============================================================
   Request DTOs
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct AutoScheduleRequest {
    pub patient_id: i64,
    pub mode: Option<AppointmentMode>,
    #[serde(flatten)]
    pub preferences: SlotPreferences,
    pub problem: Option<NewProblem>,
}

#[derive(Debug, Deserialize)]
pub struct BalancedQuery {
    pub expertise: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: AppointmentStatus,
}

#[derive(Debug, Serialize)]
pub struct Deleted {
    pub deleted: bool,
}

/* ============================================================
   Recommendations
   ============================================================ */

pub async fn smart_recommendations(
    State(state): State<AppState>,
    _auth: AuthContext,
    ApiJson(prefs): ApiJson<SlotPreferences>,
) -> Result<Json<ApiOk<Vec<RankedSlot>>>, ApiError> {
    let data = recommend::smart_slot_recommendations(&state, &prefs, Utc::now()).await?;
    Ok(Json(ApiOk { data }))
}

pub async fn auto_schedule(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(req): ApiJson<AutoScheduleRequest>,
) -> Result<(StatusCode, Json<ApiOk<AutoScheduleOutcome>>), ApiError> {
    let data = recommend::auto_schedule(
        &state,
        &auth,
        req.patient_id,
        req.mode.unwrap_or(AppointmentMode::InPerson),
        &req.preferences,
        req.problem,
        Utc::now(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(ApiOk { data })))
}

pub async fn balanced_slots(
    State(state): State<AppState>,
    _auth: AuthContext,
    Query(q): Query<BalancedQuery>,
) -> Result<Json<ApiOk<Vec<DoctorLoad>>>, ApiError> {
    let date = parse_opt_date("date", q.date.as_deref())?;
    let expertise = q.expertise.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let data = recommend::balanced_doctor_slots(&state, expertise, date, Utc::now()).await?;
    Ok(Json(ApiOk { data }))
}

/* ============================================================
   /appointments/{id}
   ============================================================ */

pub async fn get_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<i64>,
) -> Result<Json<ApiOk<Appointment>>, ApiError> {
    let data = booking::get_appointment(&state, &auth, appointment_id).await?;
    Ok(Json(ApiOk { data }))
}

pub async fn update_status(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<i64>,
    ApiJson(req): ApiJson<StatusUpdateRequest>,
) -> Result<Json<ApiOk<Appointment>>, ApiError> {
    let data = booking::update_status(&state, &auth, appointment_id, req.status).await?;
    Ok(Json(ApiOk { data }))
}

pub async fn cancel_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<i64>,
) -> Result<Json<ApiOk<Appointment>>, ApiError> {
    let data = booking::cancel_booking(&state, &auth, appointment_id).await?;
    Ok(Json(ApiOk { data }))
}

pub async fn delete_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<i64>,
) -> Result<Json<ApiOk<Deleted>>, ApiError> {
    booking::delete_appointment(&state, &auth, appointment_id).await?;
    Ok(Json(ApiOk {
        data: Deleted { deleted: true },
    }))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::routes;
    use crate::services::notify::NotificationEvent;
    use crate::test_support::*;

    async fn book(app: &axum::Router, slot_id: i64) -> i64 {
        let (status, body) = send(
            app,
            Method::POST,
            "/api/v1/slots/book",
            Some(PATIENT_TOKEN),
            Some(json!({ "slot_id": slot_id, "patient_id": PATIENT, "doctor_id": CARDIOLOGIST })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["data"]["appointment_id"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn doctor_walks_the_status_graph() {
        let (state, notifier) = test_state();
        let slot = seed_slots(&state, CARDIOLOGIST, 10, 11, 60).await.remove(0);
        let app = routes::router(state);
        let id = book(&app, slot.slot_id).await;
        let uri = format!("/api/v1/appointments/{id}");

        let (status, body) = send(
            &app,
            Method::PUT,
            &uri,
            Some(PATIENT_TOKEN),
            Some(json!({ "status": "CONFIRMED" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "FORBIDDEN");

        for next in ["CONFIRMED", "COMPLETED"] {
            let (status, body) = send(
                &app,
                Method::PUT,
                &uri,
                Some(CARDIOLOGIST_TOKEN),
                Some(json!({ "status": next })),
            )
            .await;
            assert_eq!(status, StatusCode::OK, "{body}");
            assert_eq!(body["data"]["status"], next);
        }

        let (status, body) = send(
            &app,
            Method::PUT,
            &uri,
            Some(ADMIN_TOKEN),
            Some(json!({ "status": "CONFIRMED" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_TRANSITION");

        notifier.wait_for(3).await;
        let events: Vec<_> = notifier.events().into_iter().map(|(e, _)| e).collect();
        assert_eq!(
            events,
            vec![
                NotificationEvent::Booked,
                NotificationEvent::Confirmed,
                NotificationEvent::Completed
            ]
        );
    }

    #[tokio::test]
    async fn malformed_body_gets_error_envelope() {
        let (state, _) = test_state();
        let slot = seed_slots(&state, CARDIOLOGIST, 10, 11, 60).await.remove(0);
        let app = routes::router(state);
        let id = book(&app, slot.slot_id).await;

        let (status, body) = send(
            &app,
            Method::PUT,
            &format!("/api/v1/appointments/{id}"),
            Some(CARDIOLOGIST_TOKEN),
            Some(json!({ "status": "BOGUS" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert!(body["error"]["message"].as_str().unwrap().contains("BOGUS"));

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/appointments/auto-schedule",
            Some(PATIENT_TOKEN),
            Some(json!({ "mode": "ONLINE" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn cancel_frees_slot_for_next_patient() {
        let (state, _) = test_state();
        let slot = seed_slots(&state, CARDIOLOGIST, 10, 11, 60).await.remove(0);
        let app = routes::router(state);
        let id = book(&app, slot.slot_id).await;

        let uri = format!("/api/v1/appointments/{id}/cancel");
        let (status, body) = send(&app, Method::PUT, &uri, Some(PATIENT_TOKEN), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "CANCELLED");

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/v1/slots/book",
            Some(OTHER_PATIENT_TOKEN),
            Some(json!({ "slot_id": slot.slot_id, "patient_id": OTHER_PATIENT, "doctor_id": CARDIOLOGIST })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn read_and_delete_are_limited_to_parties() {
        let (state, _) = test_state();
        let slot = seed_slots(&state, CARDIOLOGIST, 10, 11, 60).await.remove(0);
        let app = routes::router(state);
        let id = book(&app, slot.slot_id).await;
        let uri = format!("/api/v1/appointments/{id}");

        let (status, body) = send(&app, Method::GET, &uri, Some(CARDIOLOGIST_TOKEN), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["patient_name"], "Pat One");
        assert_eq!(body["data"]["doctor_name"], "Dr. Cardio");

        let (status, _) = send(&app, Method::GET, &uri, Some(OTHER_PATIENT_TOKEN), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(&app, Method::DELETE, &uri, Some(CARDIOLOGIST_TOKEN), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(&app, Method::DELETE, &uri, Some(PATIENT_TOKEN), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&app, Method::GET, &uri, Some(ADMIN_TOKEN), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn auto_schedule_books_and_reports_alternatives() {
        let (state, notifier) = test_state();
        seed_slots(&state, CARDIOLOGIST, 9, 13, 60).await;
        let app = routes::router(state);

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/appointments/auto-schedule",
            Some(PATIENT_TOKEN),
            Some(json!({
                "patient_id": PATIENT,
                "mode": "ONLINE",
                "expertise": "cardiology",
                "time_window": { "start_hour": 11, "end_hour": 11 },
                "problem": { "description": "tight chest", "disease_ids": [ANGINA] }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        let data = &body["data"];
        assert_eq!(data["appointment"]["doctor_id"], CARDIOLOGIST);
        assert!(data["appointment"]["problem_id"].is_i64());
        assert_eq!(
            data["selected_slot"]["slot"]["slot_id"],
            data["appointment"]["slot_id"]
        );
        assert_eq!(data["alternatives"].as_array().unwrap().len(), 3);
        notifier.wait_for(1).await;
    }

    #[tokio::test]
    async fn auto_schedule_lost_race_is_conflict() {
        let (state, _) = racing_state();
        seed_slots(&state, CARDIOLOGIST, 9, 11, 60).await;
        let app = routes::router(state);

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/appointments/auto-schedule",
            Some(PATIENT_TOKEN),
            Some(json!({ "patient_id": PATIENT, "expertise": "cardiology" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT, "{body}");
        assert_eq!(body["error"]["code"], "SLOT_NO_LONGER_AVAILABLE");
    }

    #[tokio::test]
    async fn smart_recommendations_validate_window() {
        let (state, _) = test_state();
        let app = routes::router(state);

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/appointments/smart-recommendations",
            Some(PATIENT_TOKEN),
            Some(json!({ "time_window": { "start_hour": 18, "end_hour": 9 } })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/appointments/smart-recommendations",
            Some(PATIENT_TOKEN),
            Some(json!({ "urgency": "FLEXIBLE" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn balanced_slots_orders_by_load() {
        let (state, _) = test_state();
        seed_slots(&state, CARDIOLOGIST, 9, 11, 60).await;
        let general = seed_slots(&state, GENERALIST, 9, 11, 60).await;
        let app = routes::router(state);

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/v1/slots/book",
            Some(PATIENT_TOKEN),
            Some(json!({ "slot_id": general[0].slot_id, "patient_id": PATIENT, "doctor_id": GENERALIST })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(
            &app,
            Method::GET,
            "/api/v1/appointments/balanced-slots?date=2030-03-04",
            Some(ADMIN_TOKEN),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let rows = body["data"].as_array().unwrap();
        let last = rows.last().unwrap();
        assert_eq!(last["doctor_id"], GENERALIST);
        assert_eq!(last["active_appointments"], 1);
        assert_eq!(last["open_slots"], 1);
    }
}
