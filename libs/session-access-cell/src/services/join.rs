// libs/session-access-cell/src/services/join.rs
use appointment_cell::{AppointmentError, SlotLedger};
use consultation_cell::{ConsultationError, MatchRequestBroker};
use shared_database::AppState;
use shared_models::identity::{Role, SessionIdentity};

use crate::models::{AccessError, AccessTarget, JoinResponse};
use crate::services::AccessGate;

/// Resolves a join request to a room id. Unknown records and denials look the same
/// to the caller.
pub struct SessionJoinService {
    ledger: SlotLedger,
    broker: MatchRequestBroker,
    gate: AccessGate,
}

impl SessionJoinService {
    pub fn new(ledger: SlotLedger, broker: MatchRequestBroker, gate: AccessGate) -> Self {
        Self {
            ledger,
            broker,
            gate,
        }
    }

    pub fn from_state(state: &AppState) -> Self {
        Self::new(
            SlotLedger::from_state(state),
            MatchRequestBroker::from_state(state),
            AccessGate::from_state(state),
        )
    }

    pub async fn join_appointment(
        &self,
        appointment_id: &str,
        identity: &SessionIdentity,
        role: Role,
        auth_token: Option<&str>,
    ) -> Result<JoinResponse, AccessError> {
        let appointment = match self.ledger.get(appointment_id).await {
            Ok(appointment) => appointment,
            Err(AppointmentError::NotFound(_)) => return Err(AccessError::Unauthorized),
            Err(e) => return Err(e.into()),
        };

        self.admit(AccessTarget::Appointment(&appointment), identity, role, auth_token)
            .await
    }

    pub async fn join_consultation(
        &self,
        request_id: &str,
        identity: &SessionIdentity,
        role: Role,
        auth_token: Option<&str>,
    ) -> Result<JoinResponse, AccessError> {
        let request = match self.broker.get(request_id).await {
            Ok(request) => request,
            Err(ConsultationError::NotFound(_)) => return Err(AccessError::Unauthorized),
            Err(e) => return Err(e.into()),
        };

        self.admit(AccessTarget::Consultation(&request), identity, role, auth_token)
            .await
    }

    async fn admit(
        &self,
        target: AccessTarget<'_>,
        identity: &SessionIdentity,
        role: Role,
        auth_token: Option<&str>,
    ) -> Result<JoinResponse, AccessError> {
        if !self.gate.authorize(identity, role, target, auth_token).await {
            return Err(AccessError::Unauthorized);
        }

        let room_id = target.room_id().ok_or(AccessError::Unauthorized)?;
        Ok(JoinResponse {
            room_id,
            target_id: target.id().to_string(),
            role,
        })
    }
}
