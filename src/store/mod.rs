//! Data store seam for the booking core.
//!
//! Every method that mutates more than one row is atomic: it either applies
//! all of its writes or none of them. Slot rows are the only contended
//! resource; implementations serialise writers on them (row lock or a single
//! writer lock) and re-check availability after acquiring it.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::BookingError;
use crate::models::{
    Appointment, AppointmentStatus, Disease, Doctor, NewBooking, SessionRow, Slot, SlotDraft,
    SlotFilter,
};

pub mod memory;
pub mod postgres;

pub use memory::{MemorySeed, MemoryStore};
pub use postgres::PgStore;

pub type StoreResult<T> = Result<T, BookingError>;

#[async_trait]
pub trait Store: Send + Sync {
    async fn resolve_session(&self, token_hash: &str) -> StoreResult<Option<SessionRow>>;

    async fn get_doctor(&self, doctor_id: i64) -> StoreResult<Option<Doctor>>;

    /// APPROVED doctors in retrieval (id) order, optionally restricted to an
    /// expertise tag.
    async fn approved_doctors(
        &self,
        expertise: Option<&str>,
        limit: Option<i64>,
    ) -> StoreResult<Vec<Doctor>>;

    async fn diseases_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<Disease>>;

    /// Diseases linked to any of the given symptoms.
    async fn diseases_for_symptoms(&self, symptom_ids: &[i64]) -> StoreResult<Vec<Disease>>;

    /// Bulk insert; drafts overlapping an existing slot of the same doctor
    /// are skipped. Returns the number of rows created.
    async fn insert_slots(&self, doctor_id: i64, drafts: &[SlotDraft]) -> StoreResult<u64>;

    /// Ordered by start time ascending.
    async fn list_slots(&self, filter: &SlotFilter) -> StoreResult<Vec<Slot>>;

    async fn get_slot(&self, slot_id: i64) -> StoreResult<Option<Slot>>;

    /// First `per_doctor` open slots starting at or after `from`, per doctor,
    /// ordered by doctor then start time.
    async fn open_slots_for_doctors(
        &self,
        doctor_ids: &[i64],
        from: DateTime<Utc>,
        per_doctor: i64,
    ) -> StoreResult<Vec<Slot>>;

    async fn open_slot_counts(
        &self,
        doctor_ids: &[i64],
        from: DateTime<Utc>,
        date: Option<NaiveDate>,
    ) -> StoreResult<HashMap<i64, i64>>;

    /// Counts PENDING, CONFIRMED and COMPLETED appointments per doctor.
    async fn live_appointment_counts(
        &self,
        doctor_ids: &[i64],
        date: Option<NaiveDate>,
    ) -> StoreResult<HashMap<i64, i64>>;

    /// Re-checks availability under the slot lock, flips `is_booked`, stores
    /// the optional problem snapshot and inserts a PENDING appointment.
    async fn book_slot(&self, booking: &NewBooking, now: DateTime<Utc>) -> StoreResult<Appointment>;

    /// Returns a slot to the pool unless a live appointment still holds it.
    async fn release_slot(&self, slot_id: i64) -> StoreResult<Slot>;

    /// Fails with `HasAppointment` if any appointment references the slot.
    async fn delete_slot(&self, slot_id: i64) -> StoreResult<()>;

    async fn get_appointment(&self, appointment_id: i64) -> StoreResult<Option<Appointment>>;

    /// Compare-and-set on the current status. Moving to CANCELLED or
    /// REJECTED also releases the linked slot.
    async fn transition_appointment(
        &self,
        appointment_id: i64,
        from: AppointmentStatus,
        to: AppointmentStatus,
    ) -> StoreResult<Appointment>;

    /// Hard delete of a still-cancellable appointment; releases its slot.
    async fn delete_appointment(&self, appointment_id: i64) -> StoreResult<()>;
}
