use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::BookingError;
use crate::middleware::auth_context::AuthContext;
use crate::models::{
    AppState, Appointment, AppointmentMode, Disease, DoctorLoad, NewBooking, NewProblem,
    RankedDoctor, RankedSlot, Slot,
};
use crate::services::booking::ensure_can_book_for;
use crate::services::notify::{self, NotificationEvent};
use crate::services::scoring::{self, SlotPreferences};

const MAX_RESULTS_CEILING: usize = 50;
const AUTO_SCHEDULE_ALTERNATIVES: usize = 3;

#[derive(Debug, Serialize)]
pub struct AutoScheduleOutcome {
    pub appointment: Appointment,
    pub selected_slot: RankedSlot,
    pub alternatives: Vec<RankedSlot>,
}

/// Explicit diseases plus those implied by the symptoms, first occurrence wins.
async fn resolve_diseases(
    state: &AppState,
    disease_ids: &[i64],
    symptom_ids: &[i64],
) -> Result<Vec<Disease>, BookingError> {
    let mut diseases = state.store.diseases_by_ids(disease_ids).await?;
    diseases.extend(state.store.diseases_for_symptoms(symptom_ids).await?);

    let mut seen = HashSet::new();
    diseases.retain(|d| seen.insert(d.disease_id));
    Ok(diseases)
}

/// Ranks approved doctors (up to the candidate cap) against the disease set.
/// Doctors without a match stay in the list; ties keep retrieval order.
pub async fn recommend_doctors(
    state: &AppState,
    disease_ids: &[i64],
    symptom_ids: &[i64],
    now: DateTime<Utc>,
) -> Result<Vec<RankedDoctor>, BookingError> {
    if disease_ids.is_empty() && symptom_ids.is_empty() {
        return Err(BookingError::MissingCriteria);
    }

    let diseases = resolve_diseases(state, disease_ids, symptom_ids).await?;
    let doctors = state
        .store
        .approved_doctors(None, Some(state.limits.max_candidate_doctors))
        .await?;
    let ids: Vec<i64> = doctors.iter().map(|d| d.doctor_id).collect();

    let mut next_open: HashMap<i64, Slot> = HashMap::new();
    for slot in state.store.open_slots_for_doctors(&ids, now, 1).await? {
        next_open.entry(slot.doctor_id).or_insert(slot);
    }

    let mut ranked: Vec<RankedDoctor> = doctors
        .into_iter()
        .map(|doctor| {
            let next = next_open.get(&doctor.doctor_id);
            let s = scoring::score_doctor(&doctor, &diseases, next);
            RankedDoctor {
                doctor_id: doctor.doctor_id,
                display_name: doctor.display_name,
                specialty: doctor.specialty,
                rating: doctor.rating,
                score: s.score,
                matched_diseases: s.matched_diseases,
                next_slot_id: next.map(|n| n.slot_id),
                next_available_at: next.map(|n| n.start_at),
                reason: s.reason,
            }
        })
        .collect();
    // stable: equal scores keep retrieval order
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

    debug!(
        diseases = diseases.len(),
        doctors = ranked.len(),
        "ranked doctors by condition"
    );
    Ok(ranked)
}

/// Scores open slots of approved doctors against scheduling preferences.
/// The scan is bounded by the candidate-doctor cap and the per-doctor slot cap.
pub async fn smart_slot_recommendations(
    state: &AppState,
    prefs: &SlotPreferences,
    now: DateTime<Utc>,
) -> Result<Vec<RankedSlot>, BookingError> {
    if let Some(w) = prefs.time_window {
        if w.start_hour > 23 || w.end_hour > 23 || w.start_hour > w.end_hour {
            return Err(BookingError::Validation(
                "time_window must satisfy 0 <= start_hour <= end_hour <= 23".into(),
            ));
        }
    }

    let limits = state.limits;
    let doctors = state
        .store
        .approved_doctors(prefs.expertise.as_deref(), Some(limits.max_candidate_doctors))
        .await?;
    let by_id: HashMap<i64, _> = doctors.iter().map(|d| (d.doctor_id, d)).collect();
    let ids: Vec<i64> = doctors.iter().map(|d| d.doctor_id).collect();

    let slots = state
        .store
        .open_slots_for_doctors(&ids, now, limits.slot_scan_per_doctor)
        .await?;

    let mut ranked: Vec<RankedSlot> = slots
        .into_iter()
        .filter_map(|slot| {
            let doctor = by_id.get(&slot.doctor_id)?;
            let (score, reasons) = scoring::score_slot(doctor, &slot, prefs, now);
            Some(RankedSlot {
                doctor_name: doctor.display_name.clone(),
                specialty: doctor.specialty.clone(),
                slot,
                score,
                reasons,
            })
        })
        .collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

    let max = prefs
        .max_results
        .unwrap_or(limits.default_max_results)
        .clamp(1, MAX_RESULTS_CEILING);
    ranked.truncate(max);
    Ok(ranked)
}

/// Books the top-ranked slot. Losing the race for it fails the call; the
/// next-ranked slots are only returned as alternatives, never tried.
pub async fn auto_schedule(
    state: &AppState,
    auth: &AuthContext,
    patient_id: i64,
    mode: AppointmentMode,
    prefs: &SlotPreferences,
    problem: Option<NewProblem>,
    now: DateTime<Utc>,
) -> Result<AutoScheduleOutcome, BookingError> {
    ensure_can_book_for(auth, patient_id)?;

    let mut ranked = smart_slot_recommendations(state, prefs, now).await?.into_iter();
    let selected = ranked
        .next()
        .ok_or_else(|| BookingError::NotFound("open slot matching the preferences".into()))?;
    let alternatives: Vec<RankedSlot> = ranked.take(AUTO_SCHEDULE_ALTERNATIVES).collect();

    let booking = NewBooking {
        slot_id: selected.slot.slot_id,
        doctor_id: selected.slot.doctor_id,
        patient_id,
        mode,
        problem,
    };

    let appointment = match state.store.book_slot(&booking, now).await {
        Ok(a) => a,
        Err(BookingError::SlotAlreadyBooked(slot_id)) | Err(BookingError::SlotInPast(slot_id)) => {
            warn!(slot_id, patient_id, "auto-schedule lost top slot");
            return Err(BookingError::SlotNoLongerAvailable(slot_id));
        }
        Err(e) => return Err(e),
    };

    info!(
        appointment_id = appointment.appointment_id,
        slot_id = selected.slot.slot_id,
        score = selected.score,
        "auto-scheduled appointment"
    );
    notify::dispatch(
        state.notifier.clone(),
        NotificationEvent::Booked,
        appointment.clone(),
    );

    Ok(AutoScheduleOutcome {
        appointment,
        selected_slot: selected,
        alternatives,
    })
}

/// Least-loaded doctors first. Advisory only.
pub async fn balanced_doctor_slots(
    state: &AppState,
    expertise: Option<&str>,
    date: Option<NaiveDate>,
    now: DateTime<Utc>,
) -> Result<Vec<DoctorLoad>, BookingError> {
    let doctors = state
        .store
        .approved_doctors(expertise, Some(state.limits.max_candidate_doctors))
        .await?;
    let ids: Vec<i64> = doctors.iter().map(|d| d.doctor_id).collect();

    let open = state.store.open_slot_counts(&ids, now, date).await?;
    let live = state.store.live_appointment_counts(&ids, date).await?;

    let mut loads: Vec<DoctorLoad> = doctors
        .into_iter()
        .map(|d| {
            let open_slots = open.get(&d.doctor_id).copied().unwrap_or(0);
            let active_appointments = live.get(&d.doctor_id).copied().unwrap_or(0);
            DoctorLoad {
                doctor_id: d.doctor_id,
                display_name: d.display_name,
                specialty: d.specialty,
                open_slots,
                active_appointments,
                load: active_appointments as f64 / open_slots.max(1) as f64,
            }
        })
        .collect();
    loads.sort_by(|a, b| a.load.total_cmp(&b.load));
    Ok(loads)
}
