// libs/consultation-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use presence_cell::PresenceError;
use shared_database::StoreError;
use shared_models::identity::PatientIdentity;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsultationRequest {
    pub id: String,
    pub patient_id: String,
    pub patient: PatientIdentity,
    pub doctor_id: String,
    pub doctor_name: String,
    #[serde(default)]
    pub specialty: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    pub status: ConsultationStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub accepted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    /// Set on acceptance only.
    #[serde(default)]
    pub room_id: Option<String>,
}

impl ConsultationRequest {
    pub fn is_party(&self, user_id: &str) -> bool {
        self.patient_id == user_id || self.doctor_id == user_id
    }
}

pub fn room_id_for(request_id: &str) -> String {
    format!("instant-{}", request_id)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConsultationStatus {
    Pending,
    Accepted,
    Rejected,
    Completed,
    Cancelled,
}

impl ConsultationStatus {
    /// Pending and accepted requests block a new one for the same pair.
    pub fn is_outstanding(&self) -> bool {
        matches!(self, ConsultationStatus::Pending | ConsultationStatus::Accepted)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_outstanding()
    }
}

impl fmt::Display for ConsultationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsultationStatus::Pending => write!(f, "pending"),
            ConsultationStatus::Accepted => write!(f, "accepted"),
            ConsultationStatus::Rejected => write!(f, "rejected"),
            ConsultationStatus::Completed => write!(f, "completed"),
            ConsultationStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewConsultation {
    pub patient_id: String,
    pub patient: PatientIdentity,
    pub doctor_id: String,
    pub doctor_name: String,
    pub specialty: Option<String>,
    pub message: Option<String>,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateConsultationRequest {
    pub doctor_id: String,
    pub doctor_name: String,
    pub specialty: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptResponse {
    pub room_id: String,
    pub request: ConsultationRequest,
    pub refresh: bool,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConsultationError {
    #[error("Consultation request {0} not found")]
    NotFound(String),

    #[error("Doctor {0} is not online")]
    DoctorOffline(String),

    #[error("An open consultation request {existing_id} already exists for this doctor")]
    DuplicateRequest {
        existing_id: String,
        room_id: Option<String>,
    },

    #[error("Consultation request {id} is already {status}")]
    RequestAlreadyResolved {
        id: String,
        status: ConsultationStatus,
    },

    #[error("Consultation request cannot move from {from} to {to}")]
    IllegalTransition {
        from: ConsultationStatus,
        to: ConsultationStatus,
    },

    #[error("Not allowed to act on this consultation request")]
    Unauthorized,

    #[error("Consultation request was modified concurrently, please reload")]
    ConcurrentUpdate,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error(transparent)]
    Presence(#[from] PresenceError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
