use serde::{Deserialize, Serialize};
use std::fmt;

use crate::auth::User;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Patient,
    Doctor,
    Admin,
}

impl Role {
    /// Unknown or missing roles are treated as patients, the least privileged actor.
    pub fn from_user(user: &User) -> Self {
        match user.role.as_deref() {
            Some("doctor") => Role::Doctor,
            Some("admin") => Role::Admin,
            _ => Role::Patient,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Patient => write!(f, "patient"),
            Role::Doctor => write!(f, "doctor"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

/// Best-effort contact bundle stored on appointments and requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PatientIdentity {
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
}

/// Identity of the caller, resolved once per request from the verified token.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionIdentity {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
}

impl SessionIdentity {
    pub fn from_user(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            name: user.display_name().unwrap_or_default(),
            email: user.email.clone().unwrap_or_default(),
            phone: user.phone().unwrap_or_default(),
        }
    }

    pub fn as_patient_identity(&self) -> PatientIdentity {
        PatientIdentity {
            name: self.name.clone(),
            phone: self.phone.clone(),
            email: self.email.clone(),
        }
    }
}

/// Case-sensitive equality that never lets two empty values match.
pub fn non_empty_eq(a: &str, b: &str) -> bool {
    let a = a.trim();
    !a.is_empty() && a == b.trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user(role: Option<&str>, metadata: Option<serde_json::Value>) -> User {
        User {
            id: "user-1".to_string(),
            email: Some("p1@example.com".to_string()),
            role: role.map(str::to_string),
            metadata,
            created_at: None,
        }
    }

    #[test]
    fn session_identity_reads_metadata() {
        let identity = SessionIdentity::from_user(&user(
            Some("patient"),
            Some(json!({ "full_name": "Ada Obi", "phone": "+2348000000" })),
        ));
        assert_eq!(identity.name, "Ada Obi");
        assert_eq!(identity.phone, "+2348000000");
        assert_eq!(identity.email, "p1@example.com");
    }

    #[test]
    fn unknown_role_is_patient() {
        assert_eq!(Role::from_user(&user(Some("nurse"), None)), Role::Patient);
        assert_eq!(Role::from_user(&user(None, None)), Role::Patient);
        assert_eq!(Role::from_user(&user(Some("doctor"), None)), Role::Doctor);
    }

    #[test]
    fn empty_values_never_match() {
        assert!(!non_empty_eq("", ""));
        assert!(!non_empty_eq("  ", " "));
        assert!(non_empty_eq("a@b.c", "a@b.c"));
    }
}
