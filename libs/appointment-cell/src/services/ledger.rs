// libs/appointment-cell/src/services/ledger.rs
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use shared_database::{
    get_record, list_records, to_value, AppState, ChangeBus, RecordStore, StoreError,
};
use shared_models::clock::Clock;
use shared_models::identity::{non_empty_eq, SessionIdentity};

use crate::models::{
    Actor, Appointment, AppointmentError, AppointmentStatus, NewBooking, SlotAvailability,
};
use crate::services::lifecycle::AppointmentLifecycle;
use crate::services::slots::{format_slot_time, is_bookable_time, slot_key, slot_times};

const APPOINTMENT_PREFIX: &str = "appointments/";
const APPOINTMENT_SEQUENCE: &str = "appointments";
const MAX_CLAIM_ATTEMPTS: usize = 3;
const MAX_UPDATE_ATTEMPTS: usize = 5;

/// A claim whose appointment row never appeared is abandoned after this long.
const ORPHAN_CLAIM_GRACE_SECONDS: i64 = 60;

pub fn appointment_key(id: &str) -> String {
    format!("{}{}", APPOINTMENT_PREFIX, id)
}

pub fn format_appointment_id(sequence: u64) -> String {
    format!("A{:03}", sequence)
}

/// Marker held at `slots/<doctor>/<date>/<time>` while an appointment occupies it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct SlotClaim {
    appointment_id: String,
    claimed_at: DateTime<Utc>,
}

/// Owner of appointment records and the one-active-booking-per-slot rule.
#[derive(Clone)]
pub struct SlotLedger {
    store: Arc<dyn RecordStore>,
    bus: ChangeBus,
    clock: Arc<dyn Clock>,
    origin: Option<String>,
}

impl SlotLedger {
    pub fn new(store: Arc<dyn RecordStore>, bus: ChangeBus, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            bus,
            clock,
            origin: None,
        }
    }

    pub fn from_state(state: &AppState) -> Self {
        Self::new(state.store.clone(), state.bus.clone(), state.clock.clone())
    }

    pub fn with_origin(mut self, origin: Option<String>) -> Self {
        self.origin = origin;
        self
    }

    // ==========================================================================
    // READS
    // ==========================================================================

    pub async fn get(&self, appointment_id: &str) -> Result<Appointment, AppointmentError> {
        get_record(self.store.as_ref(), &appointment_key(appointment_id))
            .await?
            .ok_or_else(|| AppointmentError::NotFound(appointment_id.to_string()))
    }

    async fn all(&self) -> Result<Vec<Appointment>, AppointmentError> {
        let mut appointments: Vec<Appointment> =
            list_records(self.store.as_ref(), APPOINTMENT_PREFIX).await?;
        appointments.sort_by(|a, b| (a.date, a.time, &a.id).cmp(&(b.date, b.time, &b.id)));
        Ok(appointments)
    }

    pub async fn list_for_doctor(&self, doctor_id: &str) -> Result<Vec<Appointment>, AppointmentError> {
        Ok(self
            .all()
            .await?
            .into_iter()
            .filter(|a| a.doctor_id == doctor_id)
            .collect())
    }

    /// Rows booked under the caller's account, plus legacy rows without an account
    /// key that carry the caller's email.
    pub async fn list_for_patient(
        &self,
        identity: &SessionIdentity,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        Ok(self
            .all()
            .await?
            .into_iter()
            .filter(|a| match &a.patient_id {
                Some(patient_id) => *patient_id == identity.id,
                None => non_empty_eq(&a.patient.email, &identity.email),
            })
            .collect())
    }

    pub async fn is_slot_free(
        &self,
        doctor_id: &str,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<bool, AppointmentError> {
        Ok(!self
            .all()
            .await?
            .iter()
            .any(|a| a.occupies(doctor_id, date, time)))
    }

    pub async fn available_slots(
        &self,
        doctor_id: &str,
        date: NaiveDate,
    ) -> Result<SlotAvailability, AppointmentError> {
        let occupied: Vec<NaiveTime> = self
            .list_for_doctor(doctor_id)
            .await?
            .into_iter()
            .filter(|a| a.date == date && a.status.is_active())
            .map(|a| a.time)
            .collect();

        let (taken, free): (Vec<NaiveTime>, Vec<NaiveTime>) =
            slot_times().into_iter().partition(|t| occupied.contains(t));

        Ok(SlotAvailability {
            doctor_id: doctor_id.to_string(),
            date,
            free: free.into_iter().map(format_slot_time).collect(),
            taken: taken.into_iter().map(format_slot_time).collect(),
        })
    }

    // ==========================================================================
    // BOOKING
    // ==========================================================================

    /// Places a pending appointment. The slot claim and the free check are one
    /// atomic step; a lost race surfaces as `SlotTaken` and is never retried.
    pub async fn book(&self, booking: NewBooking) -> Result<Appointment, AppointmentError> {
        let now = self.clock.now();
        self.validate_booking(&booking, now)?;

        let id = self.next_appointment_id().await?;
        let key = slot_key(&booking.doctor_id, booking.date, booking.time);
        let claim = to_value(&SlotClaim {
            appointment_id: id.clone(),
            claimed_at: now,
        })?;

        // The scan catches rows that predate slot claims; the claim settles races.
        let free = self
            .is_slot_free(&booking.doctor_id, booking.date, booking.time)
            .await?;
        if !free || !self.claim_slot(&key, claim.clone(), now).await? {
            info!(
                "Slot {} {} with doctor {} is taken",
                booking.date,
                format_slot_time(booking.time),
                booking.doctor_id
            );
            return Err(AppointmentError::SlotTaken {
                doctor_id: booking.doctor_id,
                date: booking.date,
                time: format_slot_time(booking.time),
            });
        }

        let appointment = Appointment {
            id: id.clone(),
            patient_id: booking.patient_id,
            patient: booking.patient,
            doctor_id: booking.doctor_id,
            doctor_name: booking.doctor_name,
            specialty: booking.specialty,
            date: booking.date,
            time: booking.time,
            status: AppointmentStatus::Pending,
            notes: booking.notes,
            created_at: now,
            updated_at: None,
        };

        let written = match to_value(&appointment) {
            Ok(value) => self.store.put(&appointment_key(&id), value).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            error!("Failed to store appointment {}, releasing slot: {}", id, e);
            if let Err(release) = self.store.compare_and_swap(&key, Some(claim), None).await {
                error!("Failed to release slot claim {}: {}", key, release);
            }
            return Err(e.into());
        }

        info!(
            "Booked appointment {} with doctor {} on {} at {}",
            id,
            appointment.doctor_id,
            appointment.date,
            format_slot_time(appointment.time)
        );
        self.bus.publish(self.origin.as_deref());

        Ok(appointment)
    }

    fn validate_booking(&self, booking: &NewBooking, now: DateTime<Utc>) -> Result<(), AppointmentError> {
        if booking.doctor_id.trim().is_empty() {
            return Err(AppointmentError::ValidationError(
                "doctor_id is required".to_string(),
            ));
        }
        if booking.doctor_id.contains('/')
            || booking.patient_id.as_deref().is_some_and(|id| id.contains('/'))
        {
            return Err(AppointmentError::ValidationError(
                "ids must not contain '/'".to_string(),
            ));
        }
        if booking.patient.name.trim().is_empty()
            && booking.patient.email.trim().is_empty()
            && booking.patient.phone.trim().is_empty()
        {
            return Err(AppointmentError::ValidationError(
                "patient contact details are required".to_string(),
            ));
        }
        if !is_bookable_time(booking.time) {
            return Err(AppointmentError::ValidationError(format!(
                "{} is not a bookable slot time",
                format_slot_time(booking.time)
            )));
        }
        if booking.date.and_time(booking.time).and_utc() <= now {
            return Err(AppointmentError::ValidationError(
                "Cannot book a slot in the past".to_string(),
            ));
        }
        Ok(())
    }

    /// Store-owned counter; ids left behind by older rows are skipped.
    async fn next_appointment_id(&self) -> Result<String, AppointmentError> {
        loop {
            let sequence = self.store.next_sequence(APPOINTMENT_SEQUENCE).await?;
            let id = format_appointment_id(sequence);
            if self.store.get(&appointment_key(&id)).await?.is_none() {
                return Ok(id);
            }
            debug!("Appointment id {} already used, skipping", id);
        }
    }

    /// Returns whether the slot is now ours. A held claim is taken over only if the
    /// appointment behind it no longer occupies the slot.
    async fn claim_slot(
        &self,
        key: &str,
        claim: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<bool, AppointmentError> {
        for _ in 0..MAX_CLAIM_ATTEMPTS {
            if self.store.put_if_absent(key, claim.clone()).await? {
                return Ok(true);
            }

            let Some(current) = self.store.get(key).await? else {
                // Released between our two calls.
                continue;
            };

            if !self.claim_is_stale(&current, now).await? {
                return Ok(false);
            }

            debug!("Taking over stale slot claim {}", key);
            if self
                .store
                .compare_and_swap(key, Some(current), Some(claim.clone()))
                .await?
            {
                return Ok(true);
            }
        }

        warn!("Slot claim {} kept changing underneath us", key);
        Ok(false)
    }

    async fn claim_is_stale(
        &self,
        raw: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<bool, AppointmentError> {
        let claim: SlotClaim = match serde_json::from_value(raw.clone()) {
            Ok(claim) => claim,
            Err(e) => {
                warn!("Unreadable slot claim, treating as stale: {}", e);
                return Ok(true);
            }
        };

        let holder: Option<Appointment> =
            get_record(self.store.as_ref(), &appointment_key(&claim.appointment_id)).await?;

        Ok(match holder {
            Some(appointment) => !appointment.status.is_active(),
            // Booking still in flight, unless it was abandoned long ago.
            None => now - claim.claimed_at > Duration::seconds(ORPHAN_CLAIM_GRACE_SECONDS),
        })
    }

    // ==========================================================================
    // TRANSITIONS
    // ==========================================================================

    /// Moves an appointment along a legal edge. Concurrent edits are detected and the
    /// request is re-evaluated against the fresh row.
    pub async fn transition(
        &self,
        appointment_id: &str,
        next: AppointmentStatus,
        actor: &Actor,
    ) -> Result<Appointment, AppointmentError> {
        let key = appointment_key(appointment_id);

        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let raw = self
                .store
                .get(&key)
                .await?
                .ok_or_else(|| AppointmentError::NotFound(appointment_id.to_string()))?;
            let current: Appointment =
                serde_json::from_value(raw.clone()).map_err(StoreError::from)?;

            let now = self.clock.now();
            AppointmentLifecycle::authorize_transition(&current, next, actor, now)?;

            let mut updated = current.clone();
            updated.status = next;
            updated.updated_at = Some(now);

            if !self
                .store
                .compare_and_swap(&key, Some(raw), Some(to_value(&updated)?))
                .await?
            {
                debug!("Appointment {} changed during transition, re-reading", appointment_id);
                continue;
            }

            if next.is_terminal() {
                self.release_slot(&updated).await;
            }

            info!(
                "Appointment {} moved {} -> {} by {}",
                appointment_id, current.status, next, actor.role
            );
            self.bus.publish(self.origin.as_deref());
            return Ok(updated);
        }

        Err(AppointmentError::ConcurrentUpdate)
    }

    /// Frees the slot if the claim still points at this appointment. A leftover claim
    /// is harmless since booking treats it as stale.
    async fn release_slot(&self, appointment: &Appointment) {
        let key = slot_key(&appointment.doctor_id, appointment.date, appointment.time);
        let current = match self.store.get(&key).await {
            Ok(current) => current,
            Err(e) => {
                warn!("Could not read slot claim {}: {}", key, e);
                return;
            }
        };
        let Some(raw) = current else { return };

        let ours = serde_json::from_value::<SlotClaim>(raw.clone())
            .map(|claim| claim.appointment_id == appointment.id)
            .unwrap_or(false);
        if !ours {
            return;
        }

        match self.store.compare_and_swap(&key, Some(raw), None).await {
            Ok(true) => debug!("Released slot {}", key),
            Ok(false) => debug!("Slot {} was re-claimed before release", key),
            Err(e) => warn!("Could not release slot claim {}: {}", key, e),
        }
    }
}
