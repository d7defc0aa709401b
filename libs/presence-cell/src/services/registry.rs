// libs/presence-cell/src/services/registry.rs
use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, info, warn};

use shared_database::{get_record, list_records, put_record, AppState, ChangeBus, RecordStore};
use shared_models::clock::Clock;

use crate::models::{PresenceEntry, PresenceError};

const PRESENCE_PREFIX: &str = "presence/";

/// Ids are trimmed so every read and write lands on the same row.
pub fn presence_key(doctor_id: &str) -> String {
    format!("{}{}", PRESENCE_PREFIX, doctor_id.trim())
}

/// TTL-bounded set of doctors reachable right now.
#[derive(Clone)]
pub struct PresenceRegistry {
    store: Arc<dyn RecordStore>,
    bus: ChangeBus,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    origin: Option<String>,
}

impl PresenceRegistry {
    pub fn new(
        store: Arc<dyn RecordStore>,
        bus: ChangeBus,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            bus,
            clock,
            ttl,
            origin: None,
        }
    }

    pub fn from_state(state: &AppState) -> Self {
        Self::new(
            state.store.clone(),
            state.bus.clone(),
            state.clock.clone(),
            Duration::seconds(state.config.presence_ttl_seconds),
        )
    }

    /// Session that change signals are attributed to.
    pub fn with_origin(mut self, origin: Option<String>) -> Self {
        self.origin = origin;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Marks the doctor as seen now. Idempotent; only an offline-to-online edge
    /// is broadcast.
    pub async fn heartbeat(&self, doctor_id: &str) -> Result<PresenceEntry, PresenceError> {
        let doctor_id = doctor_id.trim();
        if doctor_id.is_empty() {
            return Err(PresenceError::MissingDoctorId);
        }

        let now = self.clock.now();
        let key = presence_key(doctor_id);

        let previous: Option<PresenceEntry> = get_record(self.store.as_ref(), &key).await?;
        let was_online = previous.map(|e| e.is_live(now, self.ttl)).unwrap_or(false);

        let entry = PresenceEntry {
            doctor_id: doctor_id.to_string(),
            last_seen_at: now,
        };
        put_record(self.store.as_ref(), &key, &entry).await?;

        if was_online {
            debug!("Presence refreshed for doctor {}", doctor_id);
        } else {
            info!("Doctor {} is now online", doctor_id);
            self.bus.publish(self.origin.as_deref());
        }

        Ok(entry)
    }

    /// Raw entry, live or not.
    pub async fn get(&self, doctor_id: &str) -> Result<Option<PresenceEntry>, PresenceError> {
        Ok(get_record(self.store.as_ref(), &presence_key(doctor_id)).await?)
    }

    pub async fn is_online(&self, doctor_id: &str) -> Result<bool, PresenceError> {
        let now = self.clock.now();
        Ok(self
            .get(doctor_id)
            .await?
            .map(|entry| entry.is_live(now, self.ttl))
            .unwrap_or(false))
    }

    /// Live doctor ids, sorted. Does not touch stale rows.
    pub async fn list_online(&self) -> Result<Vec<String>, PresenceError> {
        let now = self.clock.now();
        let entries: Vec<PresenceEntry> =
            list_records(self.store.as_ref(), PRESENCE_PREFIX).await?;

        let mut online: Vec<String> = entries
            .into_iter()
            .filter(|entry| entry.is_live(now, self.ttl))
            .map(|entry| entry.doctor_id)
            .collect();
        online.sort();
        online.dedup();
        Ok(online)
    }

    /// Physically removes expired rows and returns how many went. A heartbeat racing
    /// the purge wins: rows are only deleted if unchanged since they were read.
    pub async fn purge_expired(&self) -> Result<usize, PresenceError> {
        let now = self.clock.now();
        let rows = self.store.list(PRESENCE_PREFIX).await?;

        let mut removed = 0;
        for (key, raw) in rows {
            let stale = match serde_json::from_value::<PresenceEntry>(raw.clone()) {
                Ok(entry) => !entry.is_live(now, self.ttl),
                Err(e) => {
                    warn!("Dropping unreadable presence row {}: {}", key, e);
                    true
                }
            };
            if !stale {
                continue;
            }

            if self.store.compare_and_swap(&key, Some(raw), None).await? {
                removed += 1;
            }
        }

        if removed > 0 {
            info!("Purged {} expired presence entries", removed);
        }

        Ok(removed)
    }
}
