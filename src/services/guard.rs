//! Availability checks for a booking attempt.
//!
//! `precheck` is the cheap, non-authoritative rejection path run before a
//! booking transaction. The same `ensure_open` is re-run by the store inside
//! the transaction after the slot row is locked.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::BookingError;
use crate::models::Slot;
use crate::store::Store;

/// Checks in order: exists, not booked, not in the past.
pub fn ensure_open(slot: Option<Slot>, slot_id: i64, now: DateTime<Utc>) -> Result<Slot, BookingError> {
    let slot = slot.ok_or(BookingError::SlotNotFound(slot_id))?;
    if slot.is_booked {
        return Err(BookingError::SlotAlreadyBooked(slot_id));
    }
    if slot.start_at < now {
        return Err(BookingError::SlotInPast(slot_id));
    }
    Ok(slot)
}

pub fn ensure_doctor(slot: &Slot, doctor_id: i64) -> Result<(), BookingError> {
    if slot.doctor_id != doctor_id {
        return Err(BookingError::DoctorMismatch {
            slot_id: slot.slot_id,
            requested: doctor_id,
            actual: slot.doctor_id,
        });
    }
    Ok(())
}

pub async fn precheck(store: &dyn Store, slot_id: i64, now: DateTime<Utc>) -> Result<Slot, BookingError> {
    let slot = store.get_slot(slot_id).await?;
    let slot = ensure_open(slot, slot_id, now)?;
    debug!(slot_id, doctor_id = slot.doctor_id, "slot passed availability precheck");
    Ok(slot)
}
