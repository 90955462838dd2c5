use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::models::{Appointment, AppointmentStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationEvent {
    Booked,
    Confirmed,
    Rejected,
    Completed,
    Cancelled,
}

impl NotificationEvent {
    pub fn for_status(status: AppointmentStatus) -> Self {
        match status {
            AppointmentStatus::Pending => NotificationEvent::Booked,
            AppointmentStatus::Confirmed => NotificationEvent::Confirmed,
            AppointmentStatus::Completed => NotificationEvent::Completed,
            AppointmentStatus::Cancelled => NotificationEvent::Cancelled,
            AppointmentStatus::Rejected => NotificationEvent::Rejected,
        }
    }
}

/// Delivery channel for appointment messages (email, SMS, push).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: NotificationEvent, appointment: &Appointment) -> anyhow::Result<()>;
}

/// Default channel: records the message in the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: NotificationEvent, appointment: &Appointment) -> anyhow::Result<()> {
        info!(
            ?event,
            appointment_id = appointment.appointment_id,
            patient = %appointment.patient_name,
            doctor = %appointment.doctor_name,
            scheduled_at = %appointment.scheduled_at,
            "appointment notification"
        );
        Ok(())
    }
}

/// Fire-and-forget; must only be called after the state change committed.
pub fn dispatch(notifier: Arc<dyn Notifier>, event: NotificationEvent, appointment: Appointment) {
    tokio::spawn(async move {
        if let Err(e) = notifier.notify(event, &appointment).await {
            warn!(
                error = %e,
                ?event,
                appointment_id = appointment.appointment_id,
                "notification delivery failed"
            );
        }
    });
}
