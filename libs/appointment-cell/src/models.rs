// libs/appointment-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use shared_database::StoreError;
use shared_models::identity::{PatientIdentity, Role, SessionIdentity};

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: String,
    /// Stable account key of the patient, when the booking came from a signed-in
    /// patient. Older rows only have the contact bundle.
    #[serde(default)]
    pub patient_id: Option<String>,
    pub patient: PatientIdentity,
    pub doctor_id: String,
    pub doctor_name: String,
    #[serde(default)]
    pub specialty: String,
    pub date: NaiveDate,
    #[serde(with = "slot_time_format")]
    pub time: NaiveTime,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Appointment {
    /// Slot start. Dates and times are clinic wall-clock values, stored as UTC.
    pub fn starts_at(&self) -> DateTime<Utc> {
        self.date.and_time(self.time).and_utc()
    }

    pub fn is_upcoming(&self, now: DateTime<Utc>) -> bool {
        self.starts_at() > now
    }

    pub fn occupies(&self, doctor_id: &str, date: NaiveDate, time: NaiveTime) -> bool {
        self.status.is_active() && self.doctor_id == doctor_id && self.date == date && self.time == time
    }

    /// Address handed to the real-time session service.
    pub fn room_id(&self) -> String {
        format!("appointment-{}", self.id)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl AppointmentStatus {
    /// Pending and confirmed appointments hold their slot.
    pub fn is_active(&self) -> bool {
        matches!(self, AppointmentStatus::Pending | AppointmentStatus::Confirmed)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "pending"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Who is asking for a status change.
#[derive(Debug, Clone)]
pub struct Actor {
    pub role: Role,
    pub identity: SessionIdentity,
}

impl Actor {
    pub fn new(role: Role, identity: SessionIdentity) -> Self {
        Self { role, identity }
    }

    /// Staff-side tooling acting outside of any user session.
    pub fn admin() -> Self {
        Self {
            role: Role::Admin,
            identity: SessionIdentity::default(),
        }
    }
}

/// Everything the ledger needs to place a booking.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub doctor_id: String,
    pub doctor_name: String,
    pub specialty: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub patient: PatientIdentity,
    pub patient_id: Option<String>,
    pub notes: Option<String>,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub doctor_id: String,
    pub doctor_name: String,
    #[serde(default)]
    pub specialty: String,
    pub date: NaiveDate,
    #[serde(with = "slot_time_format")]
    pub time: NaiveTime,
    pub notes: Option<String>,
    /// Staff booking on someone's behalf. Ignored for patient callers, whose
    /// contact details come from their session.
    pub patient: Option<PatientIdentity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotQuery {
    pub doctor_id: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotAvailability {
    pub doctor_id: String,
    pub date: NaiveDate,
    pub free: Vec<String>,
    pub taken: Vec<String>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment {0} not found")]
    NotFound(String),

    #[error("Slot {date} {time} with doctor {doctor_id} is already taken")]
    SlotTaken {
        doctor_id: String,
        date: NaiveDate,
        time: String,
    },

    #[error("Appointment cannot move from {from} to {to}")]
    IllegalTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Not allowed to change this appointment")]
    Unauthorized,

    #[error("Appointment was modified concurrently, please reload")]
    ConcurrentUpdate,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

// ==============================================================================
// SERDE HELPERS
// ==============================================================================

/// Slot times travel as `HH:MM`; `HH:MM:SS` is accepted on input.
pub mod slot_time_format {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%H:%M";

    pub fn serialize<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&time.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    pub fn parse(raw: &str) -> Result<NaiveTime, String> {
        let raw = raw.trim();
        NaiveTime::parse_from_str(raw, FORMAT)
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
            .map_err(|_| format!("'{}' is not a valid time of day", raw))
    }
}
