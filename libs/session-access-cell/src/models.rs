// libs/session-access-cell/src/models.rs
use serde::{Deserialize, Serialize};

use appointment_cell::{Appointment, AppointmentError, AppointmentStatus};
use consultation_cell::{ConsultationError, ConsultationRequest, ConsultationStatus};
use shared_database::StoreError;
use shared_models::identity::{PatientIdentity, Role};

/// Record a session join is checked against.
#[derive(Debug, Clone, Copy)]
pub enum AccessTarget<'a> {
    Appointment(&'a Appointment),
    Consultation(&'a ConsultationRequest),
}

impl AccessTarget<'_> {
    pub fn id(&self) -> &str {
        match self {
            AccessTarget::Appointment(a) => &a.id,
            AccessTarget::Consultation(r) => &r.id,
        }
    }

    /// Stable patient key, if the record has one.
    pub fn patient_id(&self) -> Option<&str> {
        match self {
            AccessTarget::Appointment(a) => a.patient_id.as_deref(),
            AccessTarget::Consultation(r) => Some(r.patient_id.as_str()),
        }
        .filter(|id| !id.trim().is_empty())
    }

    pub fn doctor_id(&self) -> Option<&str> {
        match self {
            AccessTarget::Appointment(a) => Some(a.doctor_id.as_str()),
            AccessTarget::Consultation(r) => Some(r.doctor_id.as_str()),
        }
        .filter(|id| !id.trim().is_empty())
    }

    pub fn doctor_name(&self) -> &str {
        match self {
            AccessTarget::Appointment(a) => &a.doctor_name,
            AccessTarget::Consultation(r) => &r.doctor_name,
        }
    }

    pub fn patient(&self) -> &PatientIdentity {
        match self {
            AccessTarget::Appointment(a) => &a.patient,
            AccessTarget::Consultation(r) => &r.patient,
        }
    }

    /// Confirmed appointments for patients, pending or confirmed for doctors;
    /// consultations only once accepted.
    pub fn admits(&self, role: Role) -> bool {
        match (self, role) {
            (_, Role::Admin) => false,
            (AccessTarget::Appointment(a), Role::Patient) => a.status == AppointmentStatus::Confirmed,
            (AccessTarget::Appointment(a), Role::Doctor) => a.status.is_active(),
            (AccessTarget::Consultation(r), _) => r.status == ConsultationStatus::Accepted,
        }
    }

    pub fn room_id(&self) -> Option<String> {
        match self {
            AccessTarget::Appointment(a) => Some(a.room_id()),
            AccessTarget::Consultation(r) => r.room_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinResponse {
    pub room_id: String,
    pub target_id: String,
    pub role: Role,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamQuery {
    pub session_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    /// Deliberately says nothing about the record.
    #[error("You are not allowed to join this session")]
    Unauthorized,

    #[error(transparent)]
    Appointment(#[from] AppointmentError),

    #[error(transparent)]
    Consultation(#[from] ConsultationError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
