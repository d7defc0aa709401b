use std::sync::Arc;
use tracing::info;

use shared_config::AppConfig;
use shared_models::clock::{Clock, SystemClock};

use crate::change_bus::ChangeBus;
use crate::directory::{PatientDirectory, StorePatientDirectory, SupabasePatientDirectory};
use crate::store::{MemoryRecordStore, RecordStore, RedisRecordStore, StoreError};

const REDIS_NAMESPACE: &str = "clinic";

/// Collaborators shared by every cell's handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn RecordStore>,
    pub bus: ChangeBus,
    pub clock: Arc<dyn Clock>,
    pub directory: Arc<dyn PatientDirectory>,
}

impl AppState {
    /// Redis-backed when `REDIS_URL` is configured, in-memory otherwise.
    pub async fn from_config(config: AppConfig) -> Result<Self, StoreError> {
        let store: Arc<dyn RecordStore> = match &config.redis_url {
            Some(url) => Arc::new(RedisRecordStore::new(url, REDIS_NAMESPACE).await?),
            None => Arc::new(MemoryRecordStore::new()),
        };
        Ok(Self::with_store(config, store))
    }

    pub fn in_memory(config: AppConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryRecordStore::new()))
    }

    pub fn with_store(config: AppConfig, store: Arc<dyn RecordStore>) -> Self {
        let directory: Arc<dyn PatientDirectory> = if config.is_configured() {
            info!("Patient phone lookups go through Supabase");
            Arc::new(SupabasePatientDirectory::new(&config))
        } else {
            info!("Patient phone lookups use cached profiles in the record store");
            Arc::new(StorePatientDirectory::new(store.clone()))
        };

        Self {
            config: Arc::new(config),
            store,
            bus: ChangeBus::new(),
            clock: Arc::new(SystemClock),
            directory,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_directory(mut self, directory: Arc<dyn PatientDirectory>) -> Self {
        self.directory = directory;
        self
    }
}
