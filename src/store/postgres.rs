// src/store/postgres.rs

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, info};

use crate::error::BookingError;
use crate::models::{
    Appointment, AppointmentStatus, Disease, Doctor, NewBooking, SessionRow, Slot, SlotDraft,
    SlotFilter,
};
use crate::services::guard;
use crate::store::{Store, StoreResult};

const SLOT_COLUMNS: &str =
    "slot_id, doctor_id, slot_date, start_at, end_at, duration_minutes, is_booked";

const DOCTOR_SELECT: &str = r#"
    SELECT dp.doctor_id, u.display_name, dp.specialty, dp.expertise, dp.rating,
           dp.experience_years, dp.consultation_fee, dp.city, dp.profile_status
    FROM doctor_profile dp
    JOIN app_user u ON u.user_id = dp.doctor_id
"#;

const APPOINTMENT_SELECT: &str = r#"
    SELECT a.appointment_id, a.doctor_id, a.patient_id, a.slot_id, a.scheduled_at,
           a.status, a.mode, a.problem_id,
           d.display_name AS doctor_name,
           p.display_name AS patient_name,
           a.created_at, a.updated_at
    FROM appointment a
    JOIN app_user d ON d.user_id = a.doctor_id
    JOIN app_user p ON p.user_id = a.patient_id
    WHERE a.appointment_id = $1
"#;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Foreign-key and unique violations on insert are caller errors, not
/// internal failures.
fn map_insert_error(e: sqlx::Error, slot_id: i64) -> BookingError {
    if let Some(db) = e.as_database_error() {
        match db.code().as_deref() {
            Some("23503") => {
                return BookingError::Validation(
                    "referenced patient or problem does not exist".into(),
                );
            }
            Some("23505") => return BookingError::SlotAlreadyBooked(slot_id),
            _ => {}
        }
    }
    BookingError::from(e)
}

async fn lock_slot(tx: &mut Transaction<'_, Postgres>, slot_id: i64) -> StoreResult<Option<Slot>> {
    let slot = sqlx::query_as::<_, Slot>(&format!(
        "SELECT {SLOT_COLUMNS} FROM slot WHERE slot_id = $1 FOR UPDATE"
    ))
    .bind(slot_id)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(slot)
}

async fn load_appointment(
    tx: &mut Transaction<'_, Postgres>,
    appointment_id: i64,
) -> StoreResult<Appointment> {
    let appointment = sqlx::query_as::<_, Appointment>(APPOINTMENT_SELECT)
        .bind(appointment_id)
        .fetch_one(&mut **tx)
        .await?;
    Ok(appointment)
}

async fn free_slot(tx: &mut Transaction<'_, Postgres>, slot_id: i64) -> StoreResult<()> {
    sqlx::query("UPDATE slot SET is_booked = FALSE WHERE slot_id = $1")
        .bind(slot_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

fn into_count_map(rows: Vec<(i64, i64)>) -> HashMap<i64, i64> {
    rows.into_iter().collect()
}

#[async_trait]
impl Store for PgStore {
    async fn resolve_session(&self, token_hash: &str) -> StoreResult<Option<SessionRow>> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT st.session_token_id, st.user_id, u.roles
            FROM session_token st
            JOIN app_user u ON u.user_id = st.user_id
            WHERE st.session_token_hash = $1
              AND st.revoked_at IS NULL
              AND st.expires_at > now()
              AND u.is_active = true
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = &row {
            // Touch last_seen_at (best-effort)
            let _ = sqlx::query(
                r#"
                UPDATE session_token
                SET last_seen_at = now()
                WHERE session_token_id = $1
                "#,
            )
            .bind(row.session_token_id)
            .execute(&self.pool)
            .await;
        }

        Ok(row)
    }

    async fn get_doctor(&self, doctor_id: i64) -> StoreResult<Option<Doctor>> {
        let doctor = sqlx::query_as::<_, Doctor>(&format!("{DOCTOR_SELECT} WHERE dp.doctor_id = $1"))
            .bind(doctor_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(doctor)
    }

    async fn approved_doctors(
        &self,
        expertise: Option<&str>,
        limit: Option<i64>,
    ) -> StoreResult<Vec<Doctor>> {
        let doctors = sqlx::query_as::<_, Doctor>(&format!(
            r#"
            {DOCTOR_SELECT}
            WHERE dp.profile_status = 1
              AND (
                $1::text IS NULL
                OR lower(dp.specialty) = lower($1)
                OR EXISTS (SELECT 1 FROM unnest(dp.expertise) e WHERE lower(e) = lower($1))
              )
            ORDER BY dp.doctor_id ASC
            LIMIT $2
            "#
        ))
        .bind(expertise.map(str::trim))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        debug!(count = doctors.len(), ?expertise, "loaded approved doctors");
        Ok(doctors)
    }

    async fn diseases_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<Disease>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let rows = sqlx::query_as::<_, Disease>(
            r#"
            SELECT disease_id, name, specialty
            FROM disease
            WHERE disease_id = ANY($1)
            ORDER BY disease_id ASC
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn diseases_for_symptoms(&self, symptom_ids: &[i64]) -> StoreResult<Vec<Disease>> {
        if symptom_ids.is_empty() {
            return Ok(vec![]);
        }
        let rows = sqlx::query_as::<_, Disease>(
            r#"
            SELECT DISTINCT d.disease_id, d.name, d.specialty
            FROM disease d
            JOIN disease_symptom ds ON ds.disease_id = d.disease_id
            WHERE ds.symptom_id = ANY($1)
            ORDER BY d.disease_id ASC
            "#,
        )
        .bind(symptom_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Drafts overlapping an existing slot of the doctor are skipped by the
    /// `slot_no_overlap` exclusion constraint.
    async fn insert_slots(&self, doctor_id: i64, drafts: &[SlotDraft]) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;
        let mut created = 0u64;

        for d in drafts {
            let res = sqlx::query(
                r#"
                INSERT INTO slot (doctor_id, slot_date, start_at, end_at, duration_minutes, is_booked)
                VALUES ($1, $2, $3, $4, $5, FALSE)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(doctor_id)
            .bind(d.slot_date)
            .bind(d.start_at)
            .bind(d.end_at)
            .bind(d.duration_minutes)
            .execute(&mut *tx)
            .await?;
            created += res.rows_affected();
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn list_slots(&self, filter: &SlotFilter) -> StoreResult<Vec<Slot>> {
        let slots = sqlx::query_as::<_, Slot>(&format!(
            r#"
            SELECT {SLOT_COLUMNS}
            FROM slot
            WHERE ($1::bigint IS NULL OR doctor_id = $1)
              AND ($2::date IS NULL OR slot_date = $2)
              AND ($3::timestamptz IS NULL OR (is_booked = FALSE AND start_at >= $3))
            ORDER BY start_at ASC, slot_id ASC
            LIMIT $4
            "#
        ))
        .bind(filter.doctor_id)
        .bind(filter.date)
        .bind(filter.open_from)
        .bind(filter.limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(slots)
    }

    async fn get_slot(&self, slot_id: i64) -> StoreResult<Option<Slot>> {
        let slot = sqlx::query_as::<_, Slot>(&format!(
            "SELECT {SLOT_COLUMNS} FROM slot WHERE slot_id = $1"
        ))
        .bind(slot_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(slot)
    }

    async fn open_slots_for_doctors(
        &self,
        doctor_ids: &[i64],
        from: DateTime<Utc>,
        per_doctor: i64,
    ) -> StoreResult<Vec<Slot>> {
        if doctor_ids.is_empty() {
            return Ok(vec![]);
        }
        let slots = sqlx::query_as::<_, Slot>(&format!(
            r#"
            SELECT {SLOT_COLUMNS}
            FROM (
              SELECT s.*,
                     row_number() OVER (PARTITION BY s.doctor_id ORDER BY s.start_at ASC) AS rn
              FROM slot s
              WHERE s.doctor_id = ANY($1)
                AND s.is_booked = FALSE
                AND s.start_at >= $2
            ) ranked
            WHERE rn <= $3
            ORDER BY doctor_id ASC, start_at ASC
            "#
        ))
        .bind(doctor_ids)
        .bind(from)
        .bind(per_doctor)
        .fetch_all(&self.pool)
        .await?;
        Ok(slots)
    }

    async fn open_slot_counts(
        &self,
        doctor_ids: &[i64],
        from: DateTime<Utc>,
        date: Option<NaiveDate>,
    ) -> StoreResult<HashMap<i64, i64>> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT doctor_id, count(*)
            FROM slot
            WHERE doctor_id = ANY($1)
              AND is_booked = FALSE
              AND start_at >= $2
              AND ($3::date IS NULL OR slot_date = $3)
            GROUP BY doctor_id
            "#,
        )
        .bind(doctor_ids)
        .bind(from)
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        Ok(into_count_map(rows))
    }

    async fn live_appointment_counts(
        &self,
        doctor_ids: &[i64],
        date: Option<NaiveDate>,
    ) -> StoreResult<HashMap<i64, i64>> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT doctor_id, count(*)
            FROM appointment
            WHERE doctor_id = ANY($1)
              AND status IN (0, 1, 2)
              AND ($2::date IS NULL OR (scheduled_at AT TIME ZONE 'UTC')::date = $2)
            GROUP BY doctor_id
            "#,
        )
        .bind(doctor_ids)
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        Ok(into_count_map(rows))
    }

    async fn book_slot(&self, booking: &NewBooking, now: DateTime<Utc>) -> StoreResult<Appointment> {
        let mut tx = self.pool.begin().await?;

        // Authoritative re-check under the row lock; a concurrent loser
        // blocks here and then sees is_booked = true.
        let slot = lock_slot(&mut tx, booking.slot_id).await?;
        let slot = guard::ensure_open(slot, booking.slot_id, now)?;
        guard::ensure_doctor(&slot, booking.doctor_id)?;

        sqlx::query("UPDATE slot SET is_booked = TRUE WHERE slot_id = $1")
            .bind(slot.slot_id)
            .execute(&mut *tx)
            .await?;

        let problem_id: Option<i64> = match &booking.problem {
            Some(problem) => Some(
                sqlx::query_scalar(
                    r#"
                    INSERT INTO problem (patient_id, description, disease_ids, symptom_ids)
                    VALUES ($1, $2, $3, $4)
                    RETURNING problem_id
                    "#,
                )
                .bind(booking.patient_id)
                .bind(&problem.description)
                .bind(&problem.disease_ids)
                .bind(&problem.symptom_ids)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| map_insert_error(e, slot.slot_id))?,
            ),
            None => None,
        };

        let appointment_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO appointment (doctor_id, patient_id, slot_id, scheduled_at, status, mode, problem_id)
            VALUES ($1, $2, $3, $4, 0, $5, $6)
            RETURNING appointment_id
            "#,
        )
        .bind(slot.doctor_id)
        .bind(booking.patient_id)
        .bind(slot.slot_id)
        .bind(slot.start_at)
        .bind(booking.mode)
        .bind(problem_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_insert_error(e, slot.slot_id))?;

        let appointment = load_appointment(&mut tx, appointment_id).await?;
        tx.commit().await?;

        info!(
            appointment_id,
            slot_id = slot.slot_id,
            patient_id = booking.patient_id,
            "slot booked"
        );
        Ok(appointment)
    }

    async fn release_slot(&self, slot_id: i64) -> StoreResult<Slot> {
        let mut tx = self.pool.begin().await?;
        let mut slot = lock_slot(&mut tx, slot_id)
            .await?
            .ok_or(BookingError::SlotNotFound(slot_id))?;

        let held: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
              SELECT 1 FROM appointment WHERE slot_id = $1 AND status IN (0, 1, 2)
            )
            "#,
        )
        .bind(slot_id)
        .fetch_one(&mut *tx)
        .await?;
        if held {
            return Err(BookingError::HasAppointment(slot_id));
        }

        if slot.is_booked {
            free_slot(&mut tx, slot_id).await?;
            slot.is_booked = false;
        }
        tx.commit().await?;
        Ok(slot)
    }

    async fn delete_slot(&self, slot_id: i64) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        lock_slot(&mut tx, slot_id)
            .await?
            .ok_or(BookingError::SlotNotFound(slot_id))?;

        let referenced: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM appointment WHERE slot_id = $1)",
        )
        .bind(slot_id)
        .fetch_one(&mut *tx)
        .await?;
        if referenced {
            return Err(BookingError::HasAppointment(slot_id));
        }

        sqlx::query("DELETE FROM slot WHERE slot_id = $1")
            .bind(slot_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_appointment(&self, appointment_id: i64) -> StoreResult<Option<Appointment>> {
        let appointment = sqlx::query_as::<_, Appointment>(APPOINTMENT_SELECT)
            .bind(appointment_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(appointment)
    }

    async fn transition_appointment(
        &self,
        appointment_id: i64,
        from: AppointmentStatus,
        to: AppointmentStatus,
    ) -> StoreResult<Appointment> {
        let mut tx = self.pool.begin().await?;

        let updated: Option<Option<i64>> = sqlx::query_scalar(
            r#"
            UPDATE appointment
            SET status = $3, updated_at = now()
            WHERE appointment_id = $1 AND status = $2
            RETURNING slot_id
            "#,
        )
        .bind(appointment_id)
        .bind(from)
        .bind(to)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(slot_id) = updated else {
            // Lost a race with another status change.
            let current: Option<AppointmentStatus> =
                sqlx::query_scalar("SELECT status FROM appointment WHERE appointment_id = $1")
                    .bind(appointment_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            return Err(match current {
                Some(current) => BookingError::InvalidTransition { from: current, to },
                None => BookingError::NotFound(format!("appointment {appointment_id}")),
            });
        };

        if !to.is_live() {
            if let Some(slot_id) = slot_id {
                free_slot(&mut tx, slot_id).await?;
            }
        }

        let appointment = load_appointment(&mut tx, appointment_id).await?;
        tx.commit().await?;
        Ok(appointment)
    }

    async fn delete_appointment(&self, appointment_id: i64) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let deleted: Option<Option<i64>> = sqlx::query_scalar(
            r#"
            DELETE FROM appointment
            WHERE appointment_id = $1 AND status IN (0, 1)
            RETURNING slot_id
            "#,
        )
        .bind(appointment_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(slot_id) = deleted else {
            let current: Option<AppointmentStatus> =
                sqlx::query_scalar("SELECT status FROM appointment WHERE appointment_id = $1")
                    .bind(appointment_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            return Err(match current {
                Some(current) => BookingError::InvalidTransition {
                    from: current,
                    to: AppointmentStatus::Cancelled,
                },
                None => BookingError::NotFound(format!("appointment {appointment_id}")),
            });
        };

        if let Some(slot_id) = slot_id {
            free_slot(&mut tx, slot_id).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
