// src/store/memory.rs
//
// Single-process store for local development and tests. All state sits
// behind one mutex; multi-row operations work on a copy and swap it in only
// when every step succeeded.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::auth::hash_access_token;
use crate::error::BookingError;
use crate::models::{
    Appointment, AppointmentStatus, Disease, Doctor, NewBooking, NewProblem, ProfileStatus, Role, SessionRow,
    Slot, SlotDraft, SlotFilter,
};
use crate::services::guard;
use crate::store::{Store, StoreResult};

#[derive(Debug, Clone, Deserialize)]
pub struct SeedUser {
    pub user_id: i64,
    pub display_name: String,
    pub role: Role,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedSession {
    /// Plain bearer token; only its hash is kept.
    pub token: String,
    pub user_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedDisease {
    #[serde(flatten)]
    pub disease: Disease,
    #[serde(default)]
    pub symptom_ids: Vec<i64>,
}

/// Initial contents of a [`MemoryStore`]. Doctors are also registered as
/// users with the DOCTOR role.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemorySeed {
    #[serde(default)]
    pub users: Vec<SeedUser>,
    #[serde(default)]
    pub doctors: Vec<Doctor>,
    #[serde(default)]
    pub diseases: Vec<SeedDisease>,
    #[serde(default)]
    pub sessions: Vec<SeedSession>,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    users: BTreeMap<i64, SeedUser>,
    sessions: HashMap<String, SessionRow>,
    // Vec keeps retrieval order stable.
    doctors: Vec<Doctor>,
    diseases: Vec<Disease>,
    disease_symptoms: Vec<(i64, i64)>,
    slots: BTreeMap<i64, Slot>,
    appointments: BTreeMap<i64, Appointment>,
    // problem_id -> (patient_id, snapshot)
    problems: BTreeMap<i64, (i64, NewProblem)>,
    next_slot_id: i64,
    next_appointment_id: i64,
    next_problem_id: i64,
}

impl MemoryState {
    fn user_name(&self, user_id: i64) -> StoreResult<String> {
        self.users
            .get(&user_id)
            .map(|u| u.display_name.clone())
            .ok_or_else(|| BookingError::Validation(format!("user {user_id} does not exist")))
    }

    fn slot_mut(&mut self, slot_id: i64) -> StoreResult<&mut Slot> {
        self.slots
            .get_mut(&slot_id)
            .ok_or(BookingError::SlotNotFound(slot_id))
    }

    fn has_live_appointment(&self, slot_id: i64) -> bool {
        self.appointments
            .values()
            .any(|a| a.slot_id == Some(slot_id) && a.status.is_live())
    }

    fn free_slot(&mut self, slot_id: i64) -> StoreResult<()> {
        self.slot_mut(slot_id)?.is_booked = false;
        Ok(())
    }

    fn current_status(&self, appointment_id: i64) -> StoreResult<AppointmentStatus> {
        self.appointments
            .get(&appointment_id)
            .map(|a| a.status)
            .ok_or_else(|| BookingError::NotFound(format!("appointment {appointment_id}")))
    }
}

pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new(seed: MemorySeed) -> Self {
        let mut state = MemoryState {
            next_slot_id: 1,
            next_appointment_id: 1,
            next_problem_id: 1,
            ..MemoryState::default()
        };

        for u in seed.users {
            state.users.insert(u.user_id, u);
        }
        for d in seed.doctors {
            state.users.insert(
                d.doctor_id,
                SeedUser {
                    user_id: d.doctor_id,
                    display_name: d.display_name.clone(),
                    role: Role::Doctor,
                },
            );
            state.doctors.push(d);
        }
        for sd in seed.diseases {
            for symptom_id in sd.symptom_ids {
                state.disease_symptoms.push((sd.disease.disease_id, symptom_id));
            }
            state.diseases.push(sd.disease);
        }
        for s in seed.sessions {
            if let Some(user) = state.users.get(&s.user_id) {
                let row = SessionRow {
                    session_token_id: Uuid::new_v4(),
                    user_id: user.user_id,
                    roles: user.role,
                };
                state.sessions.insert(hash_access_token(&s.token), row);
            }
        }

        Self {
            state: Mutex::new(state),
        }
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        let seed: MemorySeed = serde_json::from_str(raw)?;
        Ok(Self::new(seed))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn resolve_session(&self, token_hash: &str) -> StoreResult<Option<SessionRow>> {
        let state = self.state.lock().await;
        Ok(state.sessions.get(token_hash).cloned())
    }

    async fn get_doctor(&self, doctor_id: i64) -> StoreResult<Option<Doctor>> {
        let state = self.state.lock().await;
        Ok(state.doctors.iter().find(|d| d.doctor_id == doctor_id).cloned())
    }

    async fn approved_doctors(
        &self,
        expertise: Option<&str>,
        limit: Option<i64>,
    ) -> StoreResult<Vec<Doctor>> {
        let state = self.state.lock().await;
        let limit = limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX);
        Ok(state
            .doctors
            .iter()
            .filter(|d| d.profile_status == ProfileStatus::Approved)
            .filter(|d| expertise.is_none_or(|tag| d.has_expertise(tag)))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn diseases_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<Disease>> {
        let state = self.state.lock().await;
        let mut out: Vec<Disease> = state
            .diseases
            .iter()
            .filter(|d| ids.contains(&d.disease_id))
            .cloned()
            .collect();
        out.sort_by_key(|d| d.disease_id);
        Ok(out)
    }

    async fn diseases_for_symptoms(&self, symptom_ids: &[i64]) -> StoreResult<Vec<Disease>> {
        let state = self.state.lock().await;
        let linked: HashSet<i64> = state
            .disease_symptoms
            .iter()
            .filter(|(_, s)| symptom_ids.contains(s))
            .map(|(d, _)| *d)
            .collect();
        let mut out: Vec<Disease> = state
            .diseases
            .iter()
            .filter(|d| linked.contains(&d.disease_id))
            .cloned()
            .collect();
        out.sort_by_key(|d| d.disease_id);
        Ok(out)
    }

    async fn insert_slots(&self, doctor_id: i64, drafts: &[SlotDraft]) -> StoreResult<u64> {
        let mut state = self.state.lock().await;
        if !state.doctors.iter().any(|d| d.doctor_id == doctor_id) {
            return Err(BookingError::Validation(format!("doctor {doctor_id} does not exist")));
        }

        let mut created = 0u64;
        for d in drafts {
            // half-open intervals: back-to-back slots do not overlap
            let overlaps = state
                .slots
                .values()
                .any(|s| s.doctor_id == doctor_id && s.start_at < d.end_at && d.start_at < s.end_at);
            if overlaps {
                continue;
            }
            let slot_id = state.next_slot_id;
            state.next_slot_id += 1;
            state.slots.insert(
                slot_id,
                Slot {
                    slot_id,
                    doctor_id,
                    slot_date: d.slot_date,
                    start_at: d.start_at,
                    end_at: d.end_at,
                    duration_minutes: d.duration_minutes,
                    is_booked: false,
                },
            );
            created += 1;
        }
        Ok(created)
    }

    async fn list_slots(&self, filter: &SlotFilter) -> StoreResult<Vec<Slot>> {
        let state = self.state.lock().await;
        let mut out: Vec<Slot> = state
            .slots
            .values()
            .filter(|s| filter.doctor_id.is_none_or(|id| s.doctor_id == id))
            .filter(|s| filter.date.is_none_or(|date| s.slot_date == date))
            .filter(|s| filter.open_from.is_none_or(|from| !s.is_booked && s.start_at >= from))
            .cloned()
            .collect();
        out.sort_by_key(|s| (s.start_at, s.slot_id));
        if let Some(limit) = filter.limit {
            out.truncate(limit.max(0) as usize);
        }
        Ok(out)
    }

    async fn get_slot(&self, slot_id: i64) -> StoreResult<Option<Slot>> {
        let state = self.state.lock().await;
        Ok(state.slots.get(&slot_id).cloned())
    }

    async fn open_slots_for_doctors(
        &self,
        doctor_ids: &[i64],
        from: DateTime<Utc>,
        per_doctor: i64,
    ) -> StoreResult<Vec<Slot>> {
        let state = self.state.lock().await;
        let mut open: Vec<Slot> = state
            .slots
            .values()
            .filter(|s| doctor_ids.contains(&s.doctor_id) && !s.is_booked && s.start_at >= from)
            .cloned()
            .collect();
        open.sort_by_key(|s| (s.doctor_id, s.start_at));

        let mut taken: HashMap<i64, i64> = HashMap::new();
        open.retain(|s| {
            let n = taken.entry(s.doctor_id).or_insert(0);
            *n += 1;
            *n <= per_doctor
        });
        Ok(open)
    }

    async fn open_slot_counts(
        &self,
        doctor_ids: &[i64],
        from: DateTime<Utc>,
        date: Option<NaiveDate>,
    ) -> StoreResult<HashMap<i64, i64>> {
        let state = self.state.lock().await;
        let mut counts = HashMap::new();
        for s in state.slots.values() {
            if doctor_ids.contains(&s.doctor_id)
                && !s.is_booked
                && s.start_at >= from
                && date.is_none_or(|d| s.slot_date == d)
            {
                *counts.entry(s.doctor_id).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn live_appointment_counts(
        &self,
        doctor_ids: &[i64],
        date: Option<NaiveDate>,
    ) -> StoreResult<HashMap<i64, i64>> {
        let state = self.state.lock().await;
        let mut counts = HashMap::new();
        for a in state.appointments.values() {
            if doctor_ids.contains(&a.doctor_id)
                && a.status.is_live()
                && date.is_none_or(|d| a.scheduled_at.date_naive() == d)
            {
                *counts.entry(a.doctor_id).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn book_slot(&self, booking: &NewBooking, now: DateTime<Utc>) -> StoreResult<Appointment> {
        let mut state = self.state.lock().await;
        let mut tx = state.clone();

        let slot = guard::ensure_open(tx.slots.get(&booking.slot_id).cloned(), booking.slot_id, now)?;
        guard::ensure_doctor(&slot, booking.doctor_id)?;
        tx.slot_mut(slot.slot_id)?.is_booked = true;

        let problem_id = match &booking.problem {
            Some(problem) => {
                let id = tx.next_problem_id;
                tx.next_problem_id += 1;
                tx.problems.insert(id, (booking.patient_id, problem.clone()));
                Some(id)
            }
            None => None,
        };

        // Constraint checks of the appointment insert.
        let patient_name = tx.user_name(booking.patient_id)?;
        let doctor_name = tx.user_name(slot.doctor_id)?;
        if tx.has_live_appointment(slot.slot_id) {
            return Err(BookingError::SlotAlreadyBooked(slot.slot_id));
        }

        let appointment_id = tx.next_appointment_id;
        tx.next_appointment_id += 1;
        let appointment = Appointment {
            appointment_id,
            doctor_id: slot.doctor_id,
            patient_id: booking.patient_id,
            slot_id: Some(slot.slot_id),
            scheduled_at: slot.start_at,
            status: AppointmentStatus::Pending,
            mode: booking.mode,
            problem_id,
            doctor_name,
            patient_name,
            created_at: now,
            updated_at: now,
        };
        tx.appointments.insert(appointment_id, appointment.clone());

        *state = tx;
        info!(
            appointment_id,
            slot_id = slot.slot_id,
            patient_id = booking.patient_id,
            "slot booked"
        );
        Ok(appointment)
    }

    async fn release_slot(&self, slot_id: i64) -> StoreResult<Slot> {
        let mut state = self.state.lock().await;
        if !state.slots.contains_key(&slot_id) {
            return Err(BookingError::SlotNotFound(slot_id));
        }
        if state.has_live_appointment(slot_id) {
            return Err(BookingError::HasAppointment(slot_id));
        }
        let slot = state.slot_mut(slot_id)?;
        slot.is_booked = false;
        Ok(slot.clone())
    }

    async fn delete_slot(&self, slot_id: i64) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if !state.slots.contains_key(&slot_id) {
            return Err(BookingError::SlotNotFound(slot_id));
        }
        if state.appointments.values().any(|a| a.slot_id == Some(slot_id)) {
            return Err(BookingError::HasAppointment(slot_id));
        }
        state.slots.remove(&slot_id);
        Ok(())
    }

    async fn get_appointment(&self, appointment_id: i64) -> StoreResult<Option<Appointment>> {
        let state = self.state.lock().await;
        Ok(state.appointments.get(&appointment_id).cloned())
    }

    async fn transition_appointment(
        &self,
        appointment_id: i64,
        from: AppointmentStatus,
        to: AppointmentStatus,
    ) -> StoreResult<Appointment> {
        let mut state = self.state.lock().await;
        let current = state.current_status(appointment_id)?;
        if current != from {
            return Err(BookingError::InvalidTransition { from: current, to });
        }

        let mut tx = state.clone();
        let appointment = tx
            .appointments
            .get_mut(&appointment_id)
            .ok_or_else(|| BookingError::NotFound(format!("appointment {appointment_id}")))?;
        appointment.status = to;
        appointment.updated_at = Utc::now();
        let updated = appointment.clone();

        if !to.is_live() {
            if let Some(slot_id) = updated.slot_id {
                tx.free_slot(slot_id)?;
            }
        }

        *state = tx;
        Ok(updated)
    }

    async fn delete_appointment(&self, appointment_id: i64) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let current = state.current_status(appointment_id)?;
        if !current.is_cancellable() {
            return Err(BookingError::InvalidTransition {
                from: current,
                to: AppointmentStatus::Cancelled,
            });
        }

        let mut tx = state.clone();
        if let Some(removed) = tx.appointments.remove(&appointment_id) {
            if let Some(slot_id) = removed.slot_id {
                tx.free_slot(slot_id)?;
            }
        }
        *state = tx;
        Ok(())
    }
}
