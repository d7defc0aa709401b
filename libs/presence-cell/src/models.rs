// libs/presence-cell/src/models.rs
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use shared_database::StoreError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresenceEntry {
    pub doctor_id: String,
    pub last_seen_at: DateTime<Utc>,
}

impl PresenceEntry {
    pub fn is_live(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.last_seen_at < ttl
    }

    pub fn expires_at(&self, ttl: Duration) -> DateTime<Utc> {
        self.last_seen_at + ttl
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub doctor_id: String,
    pub last_seen_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub next_heartbeat_in_seconds: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorPresenceResponse {
    pub doctor_id: String,
    pub online: bool,
    pub last_seen_at: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error)]
pub enum PresenceError {
    #[error("Doctor id must not be empty")]
    MissingDoctorId,

    #[error("Only doctors can publish presence")]
    NotADoctor,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
