// libs/consultation-cell/src/services/broker.rs
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use presence_cell::PresenceRegistry;
use shared_database::{
    get_record, list_records, to_value, AppState, ChangeBus, RecordStore, StoreError,
};
use shared_models::clock::Clock;

use crate::models::{
    room_id_for, ConsultationError, ConsultationRequest, ConsultationStatus, NewConsultation,
};
use crate::services::state_machine::ConsultationAction;

const REQUEST_PREFIX: &str = "requests/";
const OPEN_PREFIX: &str = "requests-open/";
const MAX_CLAIM_ATTEMPTS: usize = 3;
const MAX_ID_ATTEMPTS: i64 = 16;
const MAX_UPDATE_ATTEMPTS: usize = 5;
const ORPHAN_CLAIM_GRACE_SECONDS: i64 = 60;

pub fn request_key(id: &str) -> String {
    format!("{}{}", REQUEST_PREFIX, id)
}

pub fn open_request_key(patient_id: &str, doctor_id: &str) -> String {
    format!("{}{}/{}", OPEN_PREFIX, patient_id, doctor_id)
}

pub fn format_request_id(unix_millis: i64) -> String {
    format!("REQ-{}", unix_millis)
}

/// Marker held per `(patient, doctor)` pair while a request is outstanding.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenClaim {
    request_id: String,
    claimed_at: DateTime<Utc>,
}

enum ClaimHolder {
    Outstanding(ConsultationRequest),
    InFlight(String),
    Stale,
}

/// Lifecycle owner for instant consultation requests.
#[derive(Clone)]
pub struct MatchRequestBroker {
    store: Arc<dyn RecordStore>,
    bus: ChangeBus,
    clock: Arc<dyn Clock>,
    presence: PresenceRegistry,
    origin: Option<String>,
}

impl MatchRequestBroker {
    pub fn new(
        store: Arc<dyn RecordStore>,
        bus: ChangeBus,
        clock: Arc<dyn Clock>,
        presence: PresenceRegistry,
    ) -> Self {
        Self {
            store,
            bus,
            clock,
            presence,
            origin: None,
        }
    }

    pub fn from_state(state: &AppState) -> Self {
        Self::new(
            state.store.clone(),
            state.bus.clone(),
            state.clock.clone(),
            PresenceRegistry::from_state(state),
        )
    }

    pub fn with_origin(mut self, origin: Option<String>) -> Self {
        self.origin = origin;
        self
    }

    // ==========================================================================
    // READS
    // ==========================================================================

    pub async fn get(&self, request_id: &str) -> Result<ConsultationRequest, ConsultationError> {
        get_record(self.store.as_ref(), &request_key(request_id))
            .await?
            .ok_or_else(|| ConsultationError::NotFound(request_id.to_string()))
    }

    /// Newest first.
    async fn all(&self) -> Result<Vec<ConsultationRequest>, ConsultationError> {
        let mut requests: Vec<ConsultationRequest> =
            list_records(self.store.as_ref(), REQUEST_PREFIX).await?;
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(requests)
    }

    /// Everything except requests the patient withdrew.
    pub async fn list_for_doctor(
        &self,
        doctor_id: &str,
    ) -> Result<Vec<ConsultationRequest>, ConsultationError> {
        Ok(self
            .all()
            .await?
            .into_iter()
            .filter(|r| r.doctor_id == doctor_id && r.status != ConsultationStatus::Cancelled)
            .collect())
    }

    /// Hides rejected and completed requests.
    pub async fn list_for_patient(
        &self,
        patient_id: &str,
    ) -> Result<Vec<ConsultationRequest>, ConsultationError> {
        Ok(self
            .all()
            .await?
            .into_iter()
            .filter(|r| {
                r.patient_id == patient_id
                    && !matches!(
                        r.status,
                        ConsultationStatus::Rejected | ConsultationStatus::Completed
                    )
            })
            .collect())
    }

    async fn find_outstanding(
        &self,
        patient_id: &str,
        doctor_id: &str,
    ) -> Result<Option<ConsultationRequest>, ConsultationError> {
        Ok(self.all().await?.into_iter().find(|r| {
            r.patient_id == patient_id && r.doctor_id == doctor_id && r.status.is_outstanding()
        }))
    }

    // ==========================================================================
    // CREATION
    // ==========================================================================

    /// Opens a pending request if the pair has nothing outstanding and the doctor
    /// is online. A duplicate carries the existing request's id and room and is
    /// reported even when the doctor has since gone offline.
    pub async fn request(
        &self,
        new: NewConsultation,
    ) -> Result<ConsultationRequest, ConsultationError> {
        if new.patient_id.trim().is_empty() {
            return Err(ConsultationError::ValidationError(
                "patient_id is required".to_string(),
            ));
        }
        if new.doctor_id.trim().is_empty() {
            return Err(ConsultationError::ValidationError(
                "doctor_id is required".to_string(),
            ));
        }

        if new.patient_id.contains('/') || new.doctor_id.contains('/') {
            return Err(ConsultationError::ValidationError(
                "ids must not contain '/'".to_string(),
            ));
        }

        // An accepted consultation stays joinable after the doctor's heartbeat lapses.
        if let Some(existing) = self.find_outstanding(&new.patient_id, &new.doctor_id).await? {
            return Err(duplicate(&existing));
        }

        if !self.presence.is_online(&new.doctor_id).await? {
            info!("Consultation refused, doctor {} is offline", new.doctor_id);
            return Err(ConsultationError::DoctorOffline(new.doctor_id));
        }

        let now = self.clock.now();
        let open_key = open_request_key(&new.patient_id, &new.doctor_id);
        let base_millis = now.timestamp_millis();

        for bump in 0..MAX_ID_ATTEMPTS {
            let id = format_request_id(base_millis + bump);
            let claim = to_value(&OpenClaim {
                request_id: id.clone(),
                claimed_at: now,
            })?;
            self.claim_pair(&open_key, claim.clone(), now).await?;

            let request = ConsultationRequest {
                id: id.clone(),
                patient_id: new.patient_id.clone(),
                patient: new.patient.clone(),
                doctor_id: new.doctor_id.clone(),
                doctor_name: new.doctor_name.clone(),
                specialty: new.specialty.clone(),
                message: new.message.clone(),
                status: ConsultationStatus::Pending,
                created_at: now,
                accepted_at: None,
                resolved_at: None,
                room_id: None,
            };

            let stored = match to_value(&request) {
                Ok(value) => self.store.put_if_absent(&request_key(&id), value).await,
                Err(e) => Err(e),
            };
            match stored {
                Ok(true) => {
                    info!(
                        "Consultation request {} opened by patient {} for doctor {}",
                        id, request.patient_id, request.doctor_id
                    );
                    self.bus.publish(self.origin.as_deref());
                    return Ok(request);
                }
                Ok(false) => {
                    debug!("Request id {} already used, trying the next millisecond", id);
                    self.store.compare_and_swap(&open_key, Some(claim), None).await?;
                }
                Err(e) => {
                    if let Err(release) =
                        self.store.compare_and_swap(&open_key, Some(claim), None).await
                    {
                        warn!("Failed to release pair claim {}: {}", open_key, release);
                    }
                    return Err(e.into());
                }
            }
        }

        Err(ConsultationError::ConcurrentUpdate)
    }

    async fn claim_pair(
        &self,
        open_key: &str,
        claim: Value,
        now: DateTime<Utc>,
    ) -> Result<(), ConsultationError> {
        for _ in 0..MAX_CLAIM_ATTEMPTS {
            if self.store.put_if_absent(open_key, claim.clone()).await? {
                return Ok(());
            }

            let Some(current) = self.store.get(open_key).await? else {
                continue;
            };

            match self.claim_holder(&current, now).await? {
                ClaimHolder::Outstanding(existing) => return Err(duplicate(&existing)),
                ClaimHolder::InFlight(existing_id) => {
                    return Err(ConsultationError::DuplicateRequest {
                        existing_id,
                        room_id: None,
                    })
                }
                ClaimHolder::Stale => {
                    debug!("Taking over stale pair claim {}", open_key);
                    if self
                        .store
                        .compare_and_swap(open_key, Some(current), Some(claim.clone()))
                        .await?
                    {
                        return Ok(());
                    }
                }
            }
        }

        Err(ConsultationError::ConcurrentUpdate)
    }

    async fn claim_holder(
        &self,
        raw: &Value,
        now: DateTime<Utc>,
    ) -> Result<ClaimHolder, ConsultationError> {
        let claim: OpenClaim = match serde_json::from_value(raw.clone()) {
            Ok(claim) => claim,
            Err(e) => {
                warn!("Unreadable pair claim, treating as stale: {}", e);
                return Ok(ClaimHolder::Stale);
            }
        };

        let holder: Option<ConsultationRequest> =
            get_record(self.store.as_ref(), &request_key(&claim.request_id)).await?;

        Ok(match holder {
            Some(request) if request.status.is_outstanding() => ClaimHolder::Outstanding(request),
            Some(_) => ClaimHolder::Stale,
            None if now - claim.claimed_at > Duration::seconds(ORPHAN_CLAIM_GRACE_SECONDS) => {
                ClaimHolder::Stale
            }
            None => ClaimHolder::InFlight(claim.request_id),
        })
    }

    // ==========================================================================
    // TRANSITIONS
    // ==========================================================================

    /// Returns the room id for the session.
    pub async fn accept(
        &self,
        request_id: &str,
        doctor_id: &str,
    ) -> Result<String, ConsultationError> {
        let request = self
            .apply(request_id, doctor_id, ConsultationAction::Accept)
            .await?;
        request.room_id.ok_or(ConsultationError::ConcurrentUpdate)
    }

    pub async fn reject(
        &self,
        request_id: &str,
        doctor_id: &str,
    ) -> Result<ConsultationRequest, ConsultationError> {
        self.apply(request_id, doctor_id, ConsultationAction::Reject).await
    }

    pub async fn cancel(
        &self,
        request_id: &str,
        patient_id: &str,
    ) -> Result<ConsultationRequest, ConsultationError> {
        self.apply(request_id, patient_id, ConsultationAction::Cancel).await
    }

    pub async fn complete(
        &self,
        request_id: &str,
        actor_id: &str,
    ) -> Result<ConsultationRequest, ConsultationError> {
        self.apply(request_id, actor_id, ConsultationAction::Complete).await
    }

    async fn apply(
        &self,
        request_id: &str,
        actor_id: &str,
        action: ConsultationAction,
    ) -> Result<ConsultationRequest, ConsultationError> {
        let key = request_key(request_id);

        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let raw = self
                .store
                .get(&key)
                .await?
                .ok_or_else(|| ConsultationError::NotFound(request_id.to_string()))?;
            let current: ConsultationRequest =
                serde_json::from_value(raw.clone()).map_err(StoreError::from)?;

            action.check(&current, actor_id)?;

            let now = self.clock.now();
            let mut updated = current.clone();
            updated.status = action.to_status();
            match action {
                ConsultationAction::Accept => {
                    updated.accepted_at = Some(now);
                    updated.room_id = Some(room_id_for(&updated.id));
                }
                _ => updated.resolved_at = Some(now),
            }

            if !self
                .store
                .compare_and_swap(&key, Some(raw), Some(to_value(&updated)?))
                .await?
            {
                debug!("Request {} changed during {:?}, re-reading", request_id, action);
                continue;
            }

            if updated.status.is_terminal() {
                self.release_pair(&updated).await;
            }

            info!(
                "Consultation request {} moved {} -> {}",
                request_id, current.status, updated.status
            );
            self.bus.publish(self.origin.as_deref());
            return Ok(updated);
        }

        Err(ConsultationError::ConcurrentUpdate)
    }

    async fn release_pair(&self, request: &ConsultationRequest) {
        let key = open_request_key(&request.patient_id, &request.doctor_id);
        let raw = match self.store.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return,
            Err(e) => {
                warn!("Could not read pair claim {}: {}", key, e);
                return;
            }
        };

        let ours = serde_json::from_value::<OpenClaim>(raw.clone())
            .map(|claim| claim.request_id == request.id)
            .unwrap_or(false);
        if !ours {
            return;
        }

        if let Err(e) = self.store.compare_and_swap(&key, Some(raw), None).await {
            warn!("Could not release pair claim {}: {}", key, e);
        }
    }
}

fn duplicate(existing: &ConsultationRequest) -> ConsultationError {
    ConsultationError::DuplicateRequest {
        existing_id: existing.id.clone(),
        room_id: existing.room_id.clone(),
    }
}
