// libs/consultation-cell/src/services/state_machine.rs
use tracing::warn;

use crate::models::{ConsultationError, ConsultationRequest, ConsultationStatus};

/// Every edge of the request graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsultationAction {
    Accept,
    Reject,
    Cancel,
    Complete,
}

impl ConsultationAction {
    pub fn from_status(self) -> ConsultationStatus {
        match self {
            ConsultationAction::Accept | ConsultationAction::Reject | ConsultationAction::Cancel => {
                ConsultationStatus::Pending
            }
            ConsultationAction::Complete => ConsultationStatus::Accepted,
        }
    }

    pub fn to_status(self) -> ConsultationStatus {
        match self {
            ConsultationAction::Accept => ConsultationStatus::Accepted,
            ConsultationAction::Reject => ConsultationStatus::Rejected,
            ConsultationAction::Cancel => ConsultationStatus::Cancelled,
            ConsultationAction::Complete => ConsultationStatus::Completed,
        }
    }

    /// Accept and reject belong to the doctor, cancel to the patient, complete to either.
    pub fn permits(self, request: &ConsultationRequest, actor_id: &str) -> bool {
        match self {
            ConsultationAction::Accept | ConsultationAction::Reject => request.doctor_id == actor_id,
            ConsultationAction::Cancel => request.patient_id == actor_id,
            ConsultationAction::Complete => request.is_party(actor_id),
        }
    }

    pub fn check(self, request: &ConsultationRequest, actor_id: &str) -> Result<(), ConsultationError> {
        if actor_id.trim().is_empty() || !self.permits(request, actor_id) {
            warn!("{:?} on {} refused for {}", self, request.id, actor_id);
            return Err(ConsultationError::Unauthorized);
        }

        if request.status == self.from_status() {
            return Ok(());
        }

        if request.status.is_terminal() || self.from_status() == ConsultationStatus::Pending {
            Err(ConsultationError::RequestAlreadyResolved {
                id: request.id.clone(),
                status: request.status,
            })
        } else {
            Err(ConsultationError::IllegalTransition {
                from: request.status,
                to: self.to_status(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shared_models::identity::PatientIdentity;

    fn request(status: ConsultationStatus) -> ConsultationRequest {
        ConsultationRequest {
            id: "REQ-1".to_string(),
            patient_id: "P1".to_string(),
            patient: PatientIdentity::default(),
            doctor_id: "D1".to_string(),
            doctor_name: "Dr. Ada".to_string(),
            specialty: None,
            message: None,
            status,
            created_at: Utc::now(),
            accepted_at: None,
            resolved_at: None,
            room_id: None,
        }
    }

    const ALL_ACTIONS: [ConsultationAction; 4] = [
        ConsultationAction::Accept,
        ConsultationAction::Reject,
        ConsultationAction::Cancel,
        ConsultationAction::Complete,
    ];

    #[test]
    fn only_graph_edges_are_allowed() {
        let statuses = [
            ConsultationStatus::Pending,
            ConsultationStatus::Accepted,
            ConsultationStatus::Rejected,
            ConsultationStatus::Completed,
            ConsultationStatus::Cancelled,
        ];

        for status in statuses {
            for action in ALL_ACTIONS {
                let actor = match action {
                    ConsultationAction::Cancel => "P1",
                    _ => "D1",
                };
                let allowed = action.check(&request(status), actor).is_ok();
                assert_eq!(allowed, status == action.from_status(), "{:?} from {}", action, status);
            }
        }
    }

    #[test]
    fn terminal_requests_report_already_resolved() {
        for action in ALL_ACTIONS {
            let actor = if action == ConsultationAction::Cancel { "P1" } else { "D1" };
            let result = action.check(&request(ConsultationStatus::Rejected), actor);
            assert!(matches!(result, Err(ConsultationError::RequestAlreadyResolved { .. })));
        }
    }

    #[test]
    fn completing_a_pending_request_is_illegal() {
        let result = ConsultationAction::Complete.check(&request(ConsultationStatus::Pending), "P1");
        assert!(matches!(result, Err(ConsultationError::IllegalTransition { .. })));
    }

    #[test]
    fn wrong_party_is_unauthorized() {
        let pending = request(ConsultationStatus::Pending);
        assert!(matches!(
            ConsultationAction::Accept.check(&pending, "D2"),
            Err(ConsultationError::Unauthorized)
        ));
        assert!(matches!(
            ConsultationAction::Accept.check(&pending, "P1"),
            Err(ConsultationError::Unauthorized)
        ));
        assert!(matches!(
            ConsultationAction::Cancel.check(&pending, "D1"),
            Err(ConsultationError::Unauthorized)
        ));
        assert!(matches!(
            ConsultationAction::Complete.check(&pending, ""),
            Err(ConsultationError::Unauthorized)
        ));
    }
}
