// libs/appointment-cell/src/services/lifecycle.rs
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use shared_models::identity::{non_empty_eq, Role};

use crate::models::{Actor, Appointment, AppointmentError, AppointmentStatus};

/// Status rules for appointments. Holds no state.
pub struct AppointmentLifecycle;

impl AppointmentLifecycle {
    pub fn valid_transitions(current: AppointmentStatus) -> &'static [AppointmentStatus] {
        match current {
            AppointmentStatus::Pending => &[AppointmentStatus::Confirmed, AppointmentStatus::Cancelled],
            AppointmentStatus::Confirmed => &[AppointmentStatus::Cancelled, AppointmentStatus::Completed],
            // Terminal states
            AppointmentStatus::Cancelled | AppointmentStatus::Completed => &[],
        }
    }

    pub fn validate_status_transition(
        current: AppointmentStatus,
        next: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        if Self::valid_transitions(current).contains(&next) {
            debug!("Status transition validated: {} -> {}", current, next);
            Ok(())
        } else {
            warn!("Invalid status transition attempted: {} -> {}", current, next);
            Err(AppointmentError::IllegalTransition {
                from: current,
                to: next,
            })
        }
    }

    /// Full check of a requested change: the edge itself, then what the actor may do.
    pub fn authorize_transition(
        appointment: &Appointment,
        next: AppointmentStatus,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<(), AppointmentError> {
        Self::validate_status_transition(appointment.status, next)?;

        match actor.role {
            Role::Admin => Ok(()),
            Role::Doctor => {
                if Self::doctor_owns(appointment, actor) {
                    Ok(())
                } else {
                    Err(AppointmentError::Unauthorized)
                }
            }
            Role::Patient => {
                if next != AppointmentStatus::Cancelled {
                    return Err(AppointmentError::IllegalTransition {
                        from: appointment.status,
                        to: next,
                    });
                }
                if !Self::patient_owns(appointment, actor) {
                    return Err(AppointmentError::Unauthorized);
                }
                if !appointment.is_upcoming(now) {
                    return Err(AppointmentError::IllegalTransition {
                        from: appointment.status,
                        to: next,
                    });
                }
                Ok(())
            }
        }
    }

    /// Admins see everything; doctors and patients only their own rows.
    pub fn can_view(appointment: &Appointment, actor: &Actor) -> bool {
        match actor.role {
            Role::Admin => true,
            Role::Doctor => Self::doctor_owns(appointment, actor),
            Role::Patient => Self::patient_owns(appointment, actor),
        }
    }

    pub fn doctor_owns(appointment: &Appointment, actor: &Actor) -> bool {
        if appointment.doctor_id.trim().is_empty() {
            non_empty_eq(&appointment.doctor_name, &actor.identity.name)
        } else {
            appointment.doctor_id == actor.identity.id
        }
    }

    /// Stable key when the row has one, otherwise the contact email.
    pub fn patient_owns(appointment: &Appointment, actor: &Actor) -> bool {
        match &appointment.patient_id {
            Some(patient_id) => *patient_id == actor.identity.id,
            None => non_empty_eq(&appointment.patient.email, &actor.identity.email),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_must_be_confirmed_before_completion() {
        assert!(AppointmentLifecycle::validate_status_transition(
            AppointmentStatus::Pending,
            AppointmentStatus::Confirmed
        )
        .is_ok());
        assert!(AppointmentLifecycle::validate_status_transition(
            AppointmentStatus::Pending,
            AppointmentStatus::Completed
        )
        .is_err());
        assert!(AppointmentLifecycle::validate_status_transition(
            AppointmentStatus::Confirmed,
            AppointmentStatus::Completed
        )
        .is_ok());
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for terminal in [AppointmentStatus::Cancelled, AppointmentStatus::Completed] {
            assert!(AppointmentLifecycle::valid_transitions(terminal).is_empty());
        }
    }

    #[test]
    fn self_edges_are_illegal() {
        assert!(AppointmentLifecycle::validate_status_transition(
            AppointmentStatus::Confirmed,
            AppointmentStatus::Confirmed
        )
        .is_err());
    }
}
