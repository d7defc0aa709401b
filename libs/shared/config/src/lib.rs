use std::env;
use std::str::FromStr;
use tracing::warn;

pub const DEFAULT_PRESENCE_TTL_SECONDS: i64 = 300;
pub const DEFAULT_PRESENCE_REAP_INTERVAL_SECONDS: u64 = 60;
pub const DEFAULT_HEARTBEAT_INTERVAL_SECONDS: i64 = 120;
/// Shortest TTL that still leaves room for a whole-second heartbeat below TTL/2.
pub const MIN_PRESENCE_TTL_SECONDS: i64 = 4;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub redis_url: Option<String>,
    pub presence_ttl_seconds: i64,
    pub presence_reap_interval_seconds: u64,
    pub heartbeat_interval_seconds: i64,
    pub legacy_identity_fallback: bool,
    pub server_port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_jwt_secret: String::new(),
            redis_url: None,
            presence_ttl_seconds: DEFAULT_PRESENCE_TTL_SECONDS,
            presence_reap_interval_seconds: DEFAULT_PRESENCE_REAP_INTERVAL_SECONDS,
            heartbeat_interval_seconds: DEFAULT_HEARTBEAT_INTERVAL_SECONDS,
            legacy_identity_fallback: true,
            server_port: 3000,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let mut config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            redis_url: env::var("REDIS_URL").ok().filter(|url| !url.is_empty()),
            presence_ttl_seconds: parse_or("PRESENCE_TTL_SECONDS", defaults.presence_ttl_seconds),
            presence_reap_interval_seconds: parse_or(
                "PRESENCE_REAP_INTERVAL_SECONDS",
                defaults.presence_reap_interval_seconds,
            ),
            heartbeat_interval_seconds: parse_or(
                "HEARTBEAT_INTERVAL_SECONDS",
                defaults.heartbeat_interval_seconds,
            ),
            legacy_identity_fallback: parse_or(
                "LEGACY_IDENTITY_FALLBACK",
                defaults.legacy_identity_fallback,
            ),
            server_port: parse_or("SERVER_PORT", defaults.server_port),
        };

        if config.redis_url.is_none() {
            warn!("REDIS_URL not set, records will be kept in process memory");
        }

        config.normalize_presence_timing();

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn uses_redis(&self) -> bool {
        self.redis_url.is_some()
    }

    /// The heartbeat must fire more than twice per TTL window so a single missed
    /// tick never drops a doctor offline.
    pub fn normalize_presence_timing(&mut self) {
        if self.presence_ttl_seconds <= 0 {
            warn!(
                "PRESENCE_TTL_SECONDS must be positive, using {}",
                DEFAULT_PRESENCE_TTL_SECONDS
            );
            self.presence_ttl_seconds = DEFAULT_PRESENCE_TTL_SECONDS;
        } else if self.presence_ttl_seconds < MIN_PRESENCE_TTL_SECONDS {
            warn!(
                "PRESENCE_TTL_SECONDS={} is too short for any heartbeat below half of it, using {}",
                self.presence_ttl_seconds, MIN_PRESENCE_TTL_SECONDS
            );
            self.presence_ttl_seconds = MIN_PRESENCE_TTL_SECONDS;
        }

        let ceiling = (self.presence_ttl_seconds / 2 - 1).max(1);
        if self.heartbeat_interval_seconds <= 0 || self.heartbeat_interval_seconds > ceiling {
            warn!(
                "HEARTBEAT_INTERVAL_SECONDS={} is not below half the presence TTL, clamping to {}",
                self.heartbeat_interval_seconds, ceiling
            );
            self.heartbeat_interval_seconds = ceiling;
        }

        if self.presence_reap_interval_seconds == 0 {
            self.presence_reap_interval_seconds = DEFAULT_PRESENCE_REAP_INTERVAL_SECONDS;
        }
    }
}

fn parse_or<T: FromStr + std::fmt::Display>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_is_clamped_below_half_ttl() {
        let mut config = AppConfig {
            presence_ttl_seconds: 300,
            heartbeat_interval_seconds: 200,
            ..AppConfig::default()
        };
        config.normalize_presence_timing();
        assert_eq!(config.heartbeat_interval_seconds, 149);
    }

    #[test]
    fn defaults_respect_heartbeat_rule() {
        let mut config = AppConfig::default();
        config.normalize_presence_timing();
        assert_eq!(config.heartbeat_interval_seconds, 120);
        assert!(config.heartbeat_interval_seconds * 2 < config.presence_ttl_seconds);
    }

    #[test]
    fn tiny_ttl_is_raised_so_the_heartbeat_rule_holds() {
        for ttl in 1..=8 {
            let mut config = AppConfig {
                presence_ttl_seconds: ttl,
                heartbeat_interval_seconds: 120,
                ..AppConfig::default()
            };
            config.normalize_presence_timing();
            assert!(config.presence_ttl_seconds >= MIN_PRESENCE_TTL_SECONDS);
            assert!(config.heartbeat_interval_seconds >= 1);
            assert!(
                config.heartbeat_interval_seconds * 2 < config.presence_ttl_seconds,
                "ttl {} -> heartbeat {} / ttl {}",
                ttl,
                config.heartbeat_interval_seconds,
                config.presence_ttl_seconds
            );
        }
    }

    #[test]
    fn not_configured_without_supabase() {
        assert!(!AppConfig::default().is_configured());
        assert!(!AppConfig::default().uses_redis());
    }
}
