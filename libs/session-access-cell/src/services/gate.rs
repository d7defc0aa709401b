// libs/session-access-cell/src/services/gate.rs
use std::sync::Arc;
use tracing::{debug, info, warn};

use shared_database::{AppState, PatientDirectory};
use shared_models::identity::{non_empty_eq, Role, SessionIdentity};

use crate::models::AccessTarget;

/// Allow/deny decision taken right before a session join. Never mutates anything.
#[derive(Clone)]
pub struct AccessGate {
    directory: Arc<dyn PatientDirectory>,
    legacy_fallback: bool,
}

impl AccessGate {
    pub fn new(directory: Arc<dyn PatientDirectory>, legacy_fallback: bool) -> Self {
        Self {
            directory,
            legacy_fallback,
        }
    }

    pub fn from_state(state: &AppState) -> Self {
        Self::new(state.directory.clone(), state.config.legacy_identity_fallback)
    }

    pub async fn authorize(
        &self,
        identity: &SessionIdentity,
        role: Role,
        target: AccessTarget<'_>,
        auth_token: Option<&str>,
    ) -> bool {
        if !target.admits(role) {
            debug!("{} not joinable by a {} in its current status", target.id(), role);
            return false;
        }

        let matched = match role {
            Role::Doctor => self.doctor_matches(identity, &target),
            Role::Patient => self.patient_matches(identity, &target, auth_token).await,
            Role::Admin => false,
        };

        if matched {
            info!("Session access granted to {} for {}", identity.id, target.id());
        } else {
            warn!("Session access denied to {} for {}", identity.id, target.id());
        }
        matched
    }

    fn doctor_matches(&self, identity: &SessionIdentity, target: &AccessTarget<'_>) -> bool {
        match target.doctor_id() {
            Some(doctor_id) => doctor_id == identity.id,
            None => self.legacy_fallback && non_empty_eq(target.doctor_name(), &identity.name),
        }
    }

    async fn patient_matches(
        &self,
        identity: &SessionIdentity,
        target: &AccessTarget<'_>,
        auth_token: Option<&str>,
    ) -> bool {
        if let Some(patient_id) = target.patient_id() {
            return patient_id == identity.id;
        }
        if !self.legacy_fallback {
            return false;
        }

        let patient = target.patient();
        if non_empty_eq(&patient.name, &identity.name) || non_empty_eq(&patient.email, &identity.email) {
            return true;
        }
        if patient.phone.trim().is_empty() || identity.id.trim().is_empty() {
            return false;
        }

        match self.directory.phone_for(&identity.id, auth_token).await {
            Ok(Some(phone)) => non_empty_eq(&patient.phone, &phone),
            Ok(None) => false,
            Err(e) => {
                warn!("Phone lookup for {} failed, denying: {}", identity.id, e);
                false
            }
        }
    }
}
