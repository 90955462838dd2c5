use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::BookingError;
use crate::middleware::auth_context::AuthContext;
use crate::models::{AppState, Appointment, AppointmentStatus, NewBooking};
use crate::services::guard;
use crate::services::notify::{self, NotificationEvent};

/// Patients book for themselves; admins for anyone; doctors never.
pub fn ensure_can_book_for(auth: &AuthContext, patient_id: i64) -> Result<(), BookingError> {
    if auth.is_admin() || (auth.is_patient() && auth.user_id == patient_id) {
        Ok(())
    } else {
        Err(BookingError::Forbidden(
            "Patients can only book appointments for themselves".into(),
        ))
    }
}

fn is_party(auth: &AuthContext, appointment: &Appointment) -> bool {
    auth.is_admin()
        || (auth.is_patient() && auth.user_id == appointment.patient_id)
        || (auth.is_doctor() && auth.user_id == appointment.doctor_id)
}

fn ensure_may_move_to(
    auth: &AuthContext,
    appointment: &Appointment,
    to: AppointmentStatus,
) -> Result<(), BookingError> {
    let doctor_of_record = auth.is_doctor() && auth.user_id == appointment.doctor_id;
    let allowed = match to {
        // cancellation: owner, doctor of record, admin
        AppointmentStatus::Cancelled => is_party(auth, appointment),
        // PENDING is never a valid target; the graph check reports that
        AppointmentStatus::Confirmed
        | AppointmentStatus::Rejected
        | AppointmentStatus::Completed
        | AppointmentStatus::Pending => auth.is_admin() || doctor_of_record,
    };
    if allowed {
        Ok(())
    } else {
        Err(BookingError::Forbidden(format!(
            "Not allowed to move appointment {} to {}",
            appointment.appointment_id,
            to.as_str()
        )))
    }
}

/// Books `booking.slot_id` atomically. The precheck is a cheap early exit;
/// the store re-validates under its lock.
pub async fn book_slot(
    state: &AppState,
    auth: &AuthContext,
    booking: NewBooking,
    now: DateTime<Utc>,
) -> Result<Appointment, BookingError> {
    ensure_can_book_for(auth, booking.patient_id)?;
    guard::precheck(state.store.as_ref(), booking.slot_id, now).await?;

    let appointment = match state.store.book_slot(&booking, now).await {
        Ok(a) => a,
        Err(e @ BookingError::SlotAlreadyBooked(_)) => {
            warn!(
                slot_id = booking.slot_id,
                patient_id = booking.patient_id,
                "booking lost race for slot"
            );
            return Err(e);
        }
        Err(e) => return Err(e),
    };

    notify::dispatch(
        state.notifier.clone(),
        NotificationEvent::Booked,
        appointment.clone(),
    );
    Ok(appointment)
}

pub async fn get_appointment(
    state: &AppState,
    auth: &AuthContext,
    appointment_id: i64,
) -> Result<Appointment, BookingError> {
    let appointment = state
        .store
        .get_appointment(appointment_id)
        .await?
        .ok_or_else(|| BookingError::NotFound(format!("appointment {appointment_id}")))?;
    if !is_party(auth, &appointment) {
        return Err(BookingError::Forbidden(
            "You do not have access to this appointment".into(),
        ));
    }
    Ok(appointment)
}

/// Applies one edge of the status graph. Callers without the right to the
/// target status get `Forbidden` whatever the current status is. The store
/// compares against the status read here, so a stale double submit fails
/// instead of re-applying.
pub async fn update_status(
    state: &AppState,
    auth: &AuthContext,
    appointment_id: i64,
    to: AppointmentStatus,
) -> Result<Appointment, BookingError> {
    let current = get_appointment(state, auth, appointment_id).await?;
    ensure_may_move_to(auth, &current, to)?;
    if !current.status.can_transition_to(to) {
        return Err(BookingError::InvalidTransition {
            from: current.status,
            to,
        });
    }

    let updated = state
        .store
        .transition_appointment(appointment_id, current.status, to)
        .await?;
    info!(
        appointment_id,
        from = current.status.as_str(),
        to = to.as_str(),
        by = auth.user_id,
        session = %auth.session_token_id,
        "appointment status changed"
    );

    notify::dispatch(
        state.notifier.clone(),
        NotificationEvent::for_status(to),
        updated.clone(),
    );
    Ok(updated)
}

/// Cancels and returns the slot (if any) to the pool.
pub async fn cancel_booking(
    state: &AppState,
    auth: &AuthContext,
    appointment_id: i64,
) -> Result<Appointment, BookingError> {
    update_status(state, auth, appointment_id, AppointmentStatus::Cancelled).await
}

/// Hard delete, only for the owning patient or an admin and only while the
/// appointment is still cancellable.
pub async fn delete_appointment(
    state: &AppState,
    auth: &AuthContext,
    appointment_id: i64,
) -> Result<(), BookingError> {
    let current = get_appointment(state, auth, appointment_id).await?;
    let owner = auth.is_patient() && auth.user_id == current.patient_id;
    if !(owner || auth.is_admin()) {
        return Err(BookingError::Forbidden(
            "Only the patient or an admin can delete an appointment".into(),
        ));
    }
    if !current.status.is_cancellable() {
        return Err(BookingError::InvalidTransition {
            from: current.status,
            to: AppointmentStatus::Cancelled,
        });
    }

    state.store.delete_appointment(appointment_id).await?;
    info!(appointment_id, by = auth.user_id, "appointment deleted");
    Ok(())
}
