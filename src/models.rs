use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::config::Limits;
use crate::services::notify::Notifier;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub notifier: Arc<dyn Notifier>,
    pub limits: Limits,
}

#[derive(Debug, Serialize)]
pub struct ApiOk<T> {
    pub data: T,
}

/* -------------------------
   Enums (stored as smallint)
--------------------------*/

/// 0 Patient, 1 Admin, 2 Doctor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum Role {
    Patient = 0,
    Admin = 1,
    Doctor = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum AppointmentStatus {
    Pending = 0,
    Confirmed = 1,
    Completed = 2,
    Cancelled = 3,
    Rejected = 4,
}

impl AppointmentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::Rejected
        )
    }

    /// Statuses that keep holding their slot and count towards doctor load.
    pub fn is_live(self) -> bool {
        matches!(
            self,
            AppointmentStatus::Pending | AppointmentStatus::Confirmed | AppointmentStatus::Completed
        )
    }

    pub fn is_cancellable(self) -> bool {
        matches!(self, AppointmentStatus::Pending | AppointmentStatus::Confirmed)
    }

    /// PENDING -> CONFIRMED -> COMPLETED, PENDING -> REJECTED,
    /// PENDING/CONFIRMED -> CANCELLED. Nothing leaves a terminal state.
    pub fn can_transition_to(self, next: AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Rejected)
                | (Pending, Cancelled)
                | (Confirmed, Completed)
                | (Confirmed, Cancelled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "PENDING",
            AppointmentStatus::Confirmed => "CONFIRMED",
            AppointmentStatus::Completed => "COMPLETED",
            AppointmentStatus::Cancelled => "CANCELLED",
            AppointmentStatus::Rejected => "REJECTED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum AppointmentMode {
    InPerson = 0,
    Online = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum ProfileStatus {
    Pending = 0,
    Approved = 1,
    Rejected = 2,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Urgency {
    Urgent,
    #[default]
    Normal,
    Flexible,
}

/* -------------------------
   DB Row Models
--------------------------*/

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionRow {
    pub session_token_id: uuid::Uuid,
    pub user_id: i64,
    pub roles: Role,
}

/// Canonical doctor profile. `specialty` and `consultation_fee` are the only
/// accepted names; ingestion does not fall back to aliases.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Doctor {
    pub doctor_id: i64,
    pub display_name: String,
    pub specialty: String,
    #[serde(default)]
    pub expertise: Vec<String>,
    pub rating: f64,
    pub experience_years: i32,
    pub consultation_fee: f64,
    pub city: Option<String>,
    pub profile_status: ProfileStatus,
}

impl Doctor {
    /// Case-insensitive match against the specialty or any expertise tag.
    pub fn has_expertise(&self, tag: &str) -> bool {
        let tag = tag.trim();
        self.specialty.eq_ignore_ascii_case(tag)
            || self.expertise.iter().any(|e| e.eq_ignore_ascii_case(tag))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Disease {
    pub disease_id: i64,
    pub name: String,
    pub specialty: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Slot {
    pub slot_id: i64,
    pub doctor_id: i64,
    pub slot_date: NaiveDate,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub is_booked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Appointment {
    pub appointment_id: i64,
    pub doctor_id: i64,
    pub patient_id: i64,
    pub slot_id: Option<i64>,
    pub scheduled_at: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub mode: AppointmentMode,
    pub problem_id: Option<i64>,
    pub doctor_name: String,
    pub patient_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/* -------------------------
   Store inputs
--------------------------*/

/// One row produced by slot generation, before it has an id.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotDraft {
    pub slot_date: NaiveDate,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub duration_minutes: i32,
}

#[derive(Debug, Clone, Default)]
pub struct SlotFilter {
    pub doctor_id: Option<i64>,
    pub date: Option<NaiveDate>,
    /// Only unbooked slots starting at or after this instant.
    pub open_from: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewProblem {
    pub description: String,
    #[serde(default)]
    pub disease_ids: Vec<i64>,
    #[serde(default)]
    pub symptom_ids: Vec<i64>,
}

#[derive(Debug, Clone)]
pub struct NewBooking {
    pub slot_id: i64,
    pub doctor_id: i64,
    pub patient_id: i64,
    pub mode: AppointmentMode,
    pub problem: Option<NewProblem>,
}

/* -------------------------
   Derived results
--------------------------*/

#[derive(Debug, Clone, Serialize)]
pub struct RankedDoctor {
    pub doctor_id: i64,
    pub display_name: String,
    pub specialty: String,
    pub rating: f64,
    pub score: f64,
    pub matched_diseases: Vec<String>,
    pub next_slot_id: Option<i64>,
    pub next_available_at: Option<DateTime<Utc>>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedSlot {
    pub slot: Slot,
    pub doctor_name: String,
    pub specialty: String,
    pub score: f64,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DoctorLoad {
    pub doctor_id: i64,
    pub display_name: String,
    pub specialty: String,
    pub open_slots: i64,
    pub active_appointments: i64,
    pub load: f64,
}
