use axum::{extract::State, routing::post, Json, Router};
use chrono::Utc;
use serde::Deserialize;

use crate::{
    error::ApiError,
    middleware::{auth_context::AuthContext, json_body::ApiJson},
    models::{ApiOk, AppState, RankedDoctor},
    services::recommend,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/recommendations/doctors", post(recommend_doctors))
}

#[derive(Debug, Deserialize)]
pub struct DoctorRecommendationRequest {
    #[serde(default)]
    pub disease_ids: Vec<i64>,
    #[serde(default)]
    pub symptom_ids: Vec<i64>,
}

pub async fn recommend_doctors(
    State(state): State<AppState>,
    _auth: AuthContext,
    ApiJson(req): ApiJson<DoctorRecommendationRequest>,
) -> Result<Json<ApiOk<Vec<RankedDoctor>>>, ApiError> {
    let data =
        recommend::recommend_doctors(&state, &req.disease_ids, &req.symptom_ids, Utc::now()).await?;
    Ok(Json(ApiOk { data }))
}
