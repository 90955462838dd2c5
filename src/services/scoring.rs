//! Pure scoring functions for doctor and slot recommendations.
//!
//! Every term is its own function so it can be checked in isolation; the
//! `score_*` functions only add terms up and collect reasons.

use chrono::{DateTime, Timelike, Utc};
use serde::Deserialize;

use crate::models::{Disease, Doctor, Slot, Urgency};

pub const SPECIALTY_MATCH_POINTS: f64 = 50.0;
pub const DOCTOR_RATING_WEIGHT: f64 = 30.0;
pub const AVAILABILITY_BONUS: f64 = 20.0;

pub const SLOT_BASE_SCORE: f64 = 100.0;
pub const SLOT_RATING_WEIGHT: f64 = 8.0;
pub const EXPERIENCE_CAP: f64 = 20.0;
pub const TIME_WINDOW_POINTS: f64 = 30.0;
pub const TIME_WINDOW_PENALTY_PER_HOUR: f64 = 5.0;
pub const AFFORDABLE_FEE: f64 = 500.0;

/// Inclusive preferred hour-of-day window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct HourWindow {
    pub start_hour: u32,
    pub end_hour: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlotPreferences {
    pub expertise: Option<String>,
    pub time_window: Option<HourWindow>,
    #[serde(default)]
    pub urgency: Urgency,
    pub max_results: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DoctorScore {
    pub score: f64,
    pub matched_diseases: Vec<String>,
    pub reason: String,
}

pub fn rating_tier(rating: f64) -> Option<&'static str> {
    if rating >= 4.5 {
        Some("Highly rated")
    } else if rating >= 4.0 {
        Some("Well rated")
    } else {
        None
    }
}

/// Diseases whose specialty equals the doctor's, ignoring case.
pub fn matching_diseases<'a>(doctor: &Doctor, diseases: &'a [Disease]) -> Vec<&'a Disease> {
    diseases
        .iter()
        .filter(|d| d.specialty.trim().eq_ignore_ascii_case(doctor.specialty.trim()))
        .collect()
}

/// 50 per matched disease + 30 x rating + 20 if the doctor has an open slot.
pub fn score_doctor(doctor: &Doctor, diseases: &[Disease], next_open: Option<&Slot>) -> DoctorScore {
    let matched = matching_diseases(doctor, diseases);

    let mut score = SPECIALTY_MATCH_POINTS * matched.len() as f64;
    score += DOCTOR_RATING_WEIGHT * doctor.rating;
    if next_open.is_some() {
        score += AVAILABILITY_BONUS;
    }

    let matched_diseases: Vec<String> = matched.iter().map(|d| d.name.clone()).collect();

    let mut clauses: Vec<String> = vec![];
    if !matched_diseases.is_empty() {
        clauses.push(format!(
            "{} specialist for {}",
            doctor.specialty,
            matched_diseases.join(", ")
        ));
    }
    if let Some(tier) = rating_tier(doctor.rating) {
        clauses.push(tier.to_string());
    }
    if let Some(slot) = next_open {
        clauses.push(format!(
            "Next available {}",
            slot.start_at.format("%Y-%m-%d %H:%M")
        ));
    }
    let reason = if clauses.is_empty() {
        "Verified doctor".to_string()
    } else {
        clauses.join(". ")
    };

    DoctorScore {
        score,
        matched_diseases,
        reason,
    }
}

pub fn hours_until(slot: &Slot, now: DateTime<Utc>) -> f64 {
    (slot.start_at - now).num_minutes() as f64 / 60.0
}

pub fn slot_rating_term(doctor: &Doctor) -> f64 {
    doctor.rating * SLOT_RATING_WEIGHT
}

pub fn experience_term(doctor: &Doctor) -> f64 {
    (f64::from(doctor.experience_years) * 2.0).min(EXPERIENCE_CAP)
}

/// +30 inside the window, 30 - 5 per hour outside it (floored at 0), and
/// nothing when no window was asked for.
pub fn time_preference_term(slot: &Slot, window: Option<HourWindow>) -> f64 {
    let Some(w) = window else {
        return 0.0;
    };
    let hour = slot.start_at.hour();
    let outside = if hour < w.start_hour {
        w.start_hour - hour
    } else if hour > w.end_hour {
        hour - w.end_hour
    } else {
        0
    };
    if outside == 0 {
        TIME_WINDOW_POINTS
    } else {
        (TIME_WINDOW_POINTS - TIME_WINDOW_PENALTY_PER_HOUR * f64::from(outside)).max(0.0)
    }
}

pub fn urgency_term(urgency: Urgency, hours_until: f64) -> f64 {
    if urgency != Urgency::Urgent {
        return 0.0;
    }
    if hours_until <= 4.0 {
        40.0
    } else if hours_until <= 24.0 {
        20.0
    } else {
        0.0
    }
}

pub fn fee_term(doctor: &Doctor) -> f64 {
    (10.0 - doctor.consultation_fee / 100.0).max(0.0)
}

pub fn score_slot(
    doctor: &Doctor,
    slot: &Slot,
    prefs: &SlotPreferences,
    now: DateTime<Utc>,
) -> (f64, Vec<String>) {
    let until = hours_until(slot, now);

    let score = SLOT_BASE_SCORE
        + slot_rating_term(doctor)
        + experience_term(doctor)
        + time_preference_term(slot, prefs.time_window)
        + urgency_term(prefs.urgency, until)
        + fee_term(doctor);

    let mut reasons: Vec<String> = vec![];
    if doctor.rating >= 4.5 {
        reasons.push("Highly rated doctor".into());
    }
    if doctor.experience_years >= 10 {
        reasons.push("Experienced specialist".into());
    }
    if until <= 4.0 {
        reasons.push("Available soon".into());
    } else if until <= 24.0 {
        reasons.push("Same-day appointment".into());
    }
    if doctor.consultation_fee < AFFORDABLE_FEE {
        reasons.push("Affordable".into());
    }
    if reasons.is_empty() {
        reasons.push("Available slot".into());
    }

    (score, reasons)
}
