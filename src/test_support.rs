// Shared fixtures for unit and router tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use axum::Router;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use tower::ServiceExt;
use uuid::Uuid;

use crate::config::Limits;
use crate::middleware::auth_context::AuthContext;
use crate::models::{
    AppState, Appointment, AppointmentMode, AppointmentStatus, Disease, Doctor, NewBooking, ProfileStatus, Role,
    SessionRow, Slot, SlotDraft, SlotFilter,
};
use crate::services::notify::{NotificationEvent, Notifier};
use crate::services::slots::plan_slots;
use crate::store::memory::{SeedDisease, SeedSession, SeedUser};
use crate::store::{MemorySeed, MemoryStore, Store, StoreResult};

pub const ADMIN: i64 = 1;
pub const PATIENT: i64 = 3;
pub const OTHER_PATIENT: i64 = 5;
pub const CARDIOLOGIST: i64 = 7;
pub const GENERALIST: i64 = 8;
pub const UNAPPROVED_DOCTOR: i64 = 9;
pub const DERMATOLOGIST: i64 = 10;

pub const HYPERTENSION: i64 = 1;
pub const ANGINA: i64 = 2;
pub const COMMON_COLD: i64 = 3;
pub const CHEST_PAIN: i64 = 100;
pub const COUGH: i64 = 101;

pub const ADMIN_TOKEN: &str = "admin-token";
pub const PATIENT_TOKEN: &str = "patient-token";
pub const OTHER_PATIENT_TOKEN: &str = "other-patient-token";
pub const CARDIOLOGIST_TOKEN: &str = "cardiologist-token";

pub fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 3, 4).unwrap()
}

pub fn at(h: u32, m: u32) -> DateTime<Utc> {
    day().and_hms_opt(h, m, 0).unwrap().and_utc()
}

pub fn now() -> DateTime<Utc> {
    at(6, 0)
}

pub fn auth(user_id: i64, role: Role) -> AuthContext {
    AuthContext {
        user_id,
        role,
        session_token_id: Uuid::new_v4(),
    }
}

fn doctor(
    doctor_id: i64,
    name: &str,
    specialty: &str,
    expertise: &[&str],
    rating: f64,
    experience_years: i32,
    consultation_fee: f64,
    profile_status: ProfileStatus,
) -> Doctor {
    Doctor {
        doctor_id,
        display_name: name.into(),
        specialty: specialty.into(),
        expertise: expertise.iter().map(|e| e.to_string()).collect(),
        rating,
        experience_years,
        consultation_fee,
        city: Some("Lisbon".into()),
        profile_status,
    }
}

fn user(user_id: i64, name: &str, role: Role) -> SeedUser {
    SeedUser {
        user_id,
        display_name: name.into(),
        role,
    }
}

fn session(token: &str, user_id: i64) -> SeedSession {
    SeedSession {
        token: token.into(),
        user_id,
    }
}

fn disease(disease_id: i64, name: &str, specialty: &str, symptom_ids: &[i64]) -> SeedDisease {
    SeedDisease {
        disease: Disease {
            disease_id,
            name: name.into(),
            specialty: specialty.into(),
        },
        symptom_ids: symptom_ids.to_vec(),
    }
}

pub fn seed() -> MemorySeed {
    MemorySeed {
        users: vec![
            user(ADMIN, "Ada Admin", Role::Admin),
            user(PATIENT, "Pat One", Role::Patient),
            user(OTHER_PATIENT, "Pat Two", Role::Patient),
        ],
        doctors: vec![
            doctor(CARDIOLOGIST, "Dr. Cardio", "Cardiology", &["Hypertension"], 4.8, 12, 800.0, ProfileStatus::Approved),
            doctor(GENERALIST, "Dr. General", "General Medicine", &[], 4.9, 5, 300.0, ProfileStatus::Approved),
            doctor(UNAPPROVED_DOCTOR, "Dr. Pending", "Cardiology", &[], 5.0, 30, 100.0, ProfileStatus::Pending),
            doctor(DERMATOLOGIST, "Dr. Derm", "Dermatology", &[], 0.0, 0, 1200.0, ProfileStatus::Approved),
        ],
        diseases: vec![
            disease(HYPERTENSION, "Hypertension", "Cardiology", &[CHEST_PAIN]),
            disease(ANGINA, "Angina", "Cardiology", &[CHEST_PAIN]),
            disease(COMMON_COLD, "Common Cold", "General Medicine", &[COUGH]),
        ],
        sessions: vec![
            session(ADMIN_TOKEN, ADMIN),
            session(PATIENT_TOKEN, PATIENT),
            session(OTHER_PATIENT_TOKEN, OTHER_PATIENT),
            session(CARDIOLOGIST_TOKEN, CARDIOLOGIST),
        ],
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<(NotificationEvent, i64)>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<(NotificationEvent, i64)> {
        self.events.lock().unwrap().clone()
    }

    /// Yields until `n` events arrived; dispatch runs on spawned tasks.
    pub async fn wait_for(&self, n: usize) {
        for _ in 0..1000 {
            if self.events.lock().unwrap().len() >= n {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("expected {n} notifications, got {:?}", self.events());
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: NotificationEvent, appointment: &Appointment) -> anyhow::Result<()> {
        self.events
            .lock()
            .unwrap()
            .push((event, appointment.appointment_id));
        Ok(())
    }
}

pub fn test_state() -> (AppState, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::default());
    let state = AppState {
        store: Arc::new(MemoryStore::new(seed())),
        notifier: notifier.clone(),
        limits: Limits::default(),
    };
    (state, notifier)
}

/// Generates slots on `day()` between the given hours and returns the
/// doctor's slots on that day.
pub async fn seed_slots(state: &AppState, doctor_id: i64, from_hour: u32, to_hour: u32, minutes: i32) -> Vec<Slot> {
    let drafts = plan_slots(
        day(),
        NaiveTime::from_hms_opt(from_hour, 0, 0).unwrap(),
        NaiveTime::from_hms_opt(to_hour, 0, 0).unwrap(),
        minutes,
    )
    .unwrap();
    state.store.insert_slots(doctor_id, &drafts).await.unwrap();
    state
        .store
        .list_slots(&SlotFilter {
            doctor_id: Some(doctor_id),
            date: Some(day()),
            ..SlotFilter::default()
        })
        .await
        .unwrap()
}

/// Sends one request through the router and decodes the JSON body
/// (`Null` when the body is empty or not JSON).
pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let req = match body {
        Some(json) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };

    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

/// Store whose open-slot scan hands out its first slot already booked by a
/// rival patient, as if the rival won the race between ranking and booking.
pub struct RacingStore {
    inner: MemoryStore,
    stolen: AtomicUsize,
}

impl RacingStore {
    pub fn stolen(&self) -> usize {
        self.stolen.load(Ordering::SeqCst)
    }
}

pub fn racing_state() -> (AppState, Arc<RacingStore>) {
    let store = Arc::new(RacingStore {
        inner: MemoryStore::new(seed()),
        stolen: AtomicUsize::new(0),
    });
    let state = AppState {
        store: store.clone(),
        notifier: Arc::new(RecordingNotifier::default()),
        limits: Limits::default(),
    };
    (state, store)
}

#[async_trait]
impl Store for RacingStore {
    async fn resolve_session(&self, token_hash: &str) -> StoreResult<Option<SessionRow>> {
        self.inner.resolve_session(token_hash).await
    }

    async fn get_doctor(&self, doctor_id: i64) -> StoreResult<Option<Doctor>> {
        self.inner.get_doctor(doctor_id).await
    }

    async fn approved_doctors(&self, expertise: Option<&str>, limit: Option<i64>) -> StoreResult<Vec<Doctor>> {
        self.inner.approved_doctors(expertise, limit).await
    }

    async fn diseases_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<Disease>> {
        self.inner.diseases_by_ids(ids).await
    }

    async fn diseases_for_symptoms(&self, symptom_ids: &[i64]) -> StoreResult<Vec<Disease>> {
        self.inner.diseases_for_symptoms(symptom_ids).await
    }

    async fn insert_slots(&self, doctor_id: i64, drafts: &[SlotDraft]) -> StoreResult<u64> {
        self.inner.insert_slots(doctor_id, drafts).await
    }

    async fn list_slots(&self, filter: &SlotFilter) -> StoreResult<Vec<Slot>> {
        self.inner.list_slots(filter).await
    }

    async fn get_slot(&self, slot_id: i64) -> StoreResult<Option<Slot>> {
        self.inner.get_slot(slot_id).await
    }

    async fn open_slots_for_doctors(
        &self,
        doctor_ids: &[i64],
        from: DateTime<Utc>,
        per_doctor: i64,
    ) -> StoreResult<Vec<Slot>> {
        let slots = self.inner.open_slots_for_doctors(doctor_ids, from, per_doctor).await?;
        if let Some(slot) = slots.first() {
            let rival = NewBooking {
                slot_id: slot.slot_id,
                doctor_id: slot.doctor_id,
                patient_id: OTHER_PATIENT,
                mode: AppointmentMode::InPerson,
                problem: None,
            };
            self.inner.book_slot(&rival, from).await?;
            self.stolen.fetch_add(1, Ordering::SeqCst);
        }
        Ok(slots)
    }

    async fn open_slot_counts(
        &self,
        doctor_ids: &[i64],
        from: DateTime<Utc>,
        date: Option<NaiveDate>,
    ) -> StoreResult<HashMap<i64, i64>> {
        self.inner.open_slot_counts(doctor_ids, from, date).await
    }

    async fn live_appointment_counts(
        &self,
        doctor_ids: &[i64],
        date: Option<NaiveDate>,
    ) -> StoreResult<HashMap<i64, i64>> {
        self.inner.live_appointment_counts(doctor_ids, date).await
    }

    async fn book_slot(&self, booking: &NewBooking, now: DateTime<Utc>) -> StoreResult<Appointment> {
        self.inner.book_slot(booking, now).await
    }

    async fn release_slot(&self, slot_id: i64) -> StoreResult<Slot> {
        self.inner.release_slot(slot_id).await
    }

    async fn delete_slot(&self, slot_id: i64) -> StoreResult<()> {
        self.inner.delete_slot(slot_id).await
    }

    async fn get_appointment(&self, appointment_id: i64) -> StoreResult<Option<Appointment>> {
        self.inner.get_appointment(appointment_id).await
    }

    async fn transition_appointment(
        &self,
        appointment_id: i64,
        from: AppointmentStatus,
        to: AppointmentStatus,
    ) -> StoreResult<Appointment> {
        self.inner.transition_appointment(appointment_id, from, to).await
    }

    async fn delete_appointment(&self, appointment_id: i64) -> StoreResult<()> {
        self.inner.delete_appointment(appointment_id).await
    }
}
