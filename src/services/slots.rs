use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use tracing::info;

use crate::error::BookingError;
use crate::middleware::auth_context::AuthContext;
use crate::models::{AppState, Slot, SlotDraft, SlotFilter};

/// Steps from `start` to `end` in `duration_minutes` increments. A trailing
/// interval that would run past `end` is dropped.
pub fn plan_slots(
    date: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
    duration_minutes: i32,
) -> Result<Vec<SlotDraft>, BookingError> {
    if duration_minutes <= 0 {
        return Err(BookingError::InvalidRange(
            "duration_minutes must be > 0".into(),
        ));
    }
    if start >= end {
        return Err(BookingError::InvalidRange(
            "start_time must be before end_time".into(),
        ));
    }

    let day_end = date.and_time(end).and_utc();
    let step = Duration::minutes(i64::from(duration_minutes));

    let mut drafts = vec![];
    let mut cursor: DateTime<Utc> = date.and_time(start).and_utc();
    while cursor + step <= day_end {
        drafts.push(SlotDraft {
            slot_date: date,
            start_at: cursor,
            end_at: cursor + step,
            duration_minutes,
        });
        cursor += step;
    }
    Ok(drafts)
}

/// Admins manage every doctor's slots; a doctor only their own.
pub fn ensure_manage_slots(auth: &AuthContext, doctor_id: i64) -> Result<(), BookingError> {
    if auth.is_admin() || (auth.is_doctor() && auth.user_id == doctor_id) {
        Ok(())
    } else {
        Err(BookingError::Forbidden(
            "Only admins or the owning doctor can manage slots".into(),
        ))
    }
}

pub async fn generate_slots(
    state: &AppState,
    auth: &AuthContext,
    doctor_id: i64,
    date: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
    duration_minutes: i32,
) -> Result<u64, BookingError> {
    ensure_manage_slots(auth, doctor_id)?;
    let drafts = plan_slots(date, start, end, duration_minutes)?;

    if state.store.get_doctor(doctor_id).await?.is_none() {
        return Err(BookingError::NotFound(format!("doctor {doctor_id}")));
    }

    let created = state.store.insert_slots(doctor_id, &drafts).await?;
    info!(
        doctor_id,
        %date,
        planned = drafts.len(),
        created,
        "slots generated"
    );
    Ok(created)
}

pub async fn list_slots(
    state: &AppState,
    doctor_id: Option<i64>,
    date: Option<NaiveDate>,
) -> Result<Vec<Slot>, BookingError> {
    let filter = SlotFilter {
        doctor_id,
        date,
        ..SlotFilter::default()
    };
    state.store.list_slots(&filter).await
}

/// Open slots from now on, or from the start of `date` when one is given.
pub async fn list_available(
    state: &AppState,
    doctor_id: i64,
    date: Option<NaiveDate>,
    now: DateTime<Utc>,
) -> Result<Vec<Slot>, BookingError> {
    let open_from = match date {
        Some(d) => d.and_time(NaiveTime::MIN).and_utc(),
        None => now,
    };
    let filter = SlotFilter {
        doctor_id: Some(doctor_id),
        date,
        open_from: Some(open_from),
        limit: Some(state.limits.available_page_size),
    };
    state.store.list_slots(&filter).await
}

pub async fn release_slot(
    state: &AppState,
    auth: &AuthContext,
    slot_id: i64,
) -> Result<Slot, BookingError> {
    let slot = state
        .store
        .get_slot(slot_id)
        .await?
        .ok_or(BookingError::SlotNotFound(slot_id))?;
    ensure_manage_slots(auth, slot.doctor_id)?;

    let slot = state.store.release_slot(slot_id).await?;
    info!(slot_id, "slot released");
    Ok(slot)
}

pub async fn delete_slot(
    state: &AppState,
    auth: &AuthContext,
    slot_id: i64,
) -> Result<(), BookingError> {
    let slot = state
        .store
        .get_slot(slot_id)
        .await?
        .ok_or(BookingError::SlotNotFound(slot_id))?;
    ensure_manage_slots(auth, slot.doctor_id)?;

    state.store.delete_slot(slot_id).await?;
    info!(slot_id, doctor_id = slot.doctor_id, "slot deleted");
    Ok(())
}
