use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use shared_config::AppConfig;

use crate::store::{get_record, put_record, RecordStore, StoreError};
use crate::supabase::SupabaseClient;

/// Profile collaborator used to look a patient's phone number up independently of
/// whatever was typed into an appointment form.
#[async_trait]
pub trait PatientDirectory: Send + Sync {
    async fn phone_for(
        &self,
        patient_id: &str,
        auth_token: Option<&str>,
    ) -> Result<Option<String>, StoreError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientProfile {
    pub id: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

fn clean(phone: Option<String>) -> Option<String> {
    phone.map(|p| p.trim().to_string()).filter(|p| !p.is_empty())
}

/// Reads `patients` rows through the Supabase REST API.
pub struct SupabasePatientDirectory {
    supabase: SupabaseClient,
}

impl SupabasePatientDirectory {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }
}

#[async_trait]
impl PatientDirectory for SupabasePatientDirectory {
    async fn phone_for(
        &self,
        patient_id: &str,
        auth_token: Option<&str>,
    ) -> Result<Option<String>, StoreError> {
        let path = format!("/rest/v1/patients?id=eq.{}&select=id,phone", patient_id);

        let rows: Vec<Value> = self
            .supabase
            .get(&path, auth_token)
            .await?;

        let phone = rows
            .first()
            .and_then(|row| row.get("phone"))
            .and_then(|v| v.as_str())
            .map(str::to_string);

        debug!("Profile phone lookup for {}: found={}", patient_id, phone.is_some());
        Ok(clean(phone))
    }
}

/// Profiles cached under `profiles/<patientId>` in the record store.
pub struct StorePatientDirectory {
    store: Arc<dyn RecordStore>,
}

impl StorePatientDirectory {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub fn profile_key(patient_id: &str) -> String {
        format!("profiles/{}", patient_id)
    }

    pub async fn save_profile(&self, profile: &PatientProfile) -> Result<(), StoreError> {
        put_record(self.store.as_ref(), &Self::profile_key(&profile.id), profile).await
    }
}

#[async_trait]
impl PatientDirectory for StorePatientDirectory {
    async fn phone_for(
        &self,
        patient_id: &str,
        _auth_token: Option<&str>,
    ) -> Result<Option<String>, StoreError> {
        let profile: Option<PatientProfile> =
            get_record(self.store.as_ref(), &Self::profile_key(patient_id)).await?;
        Ok(clean(profile.and_then(|p| p.phone)))
    }
}
