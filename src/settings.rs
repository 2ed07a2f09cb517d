use crate::error::{Error, Result};
use chrono::{FixedOffset, Offset, Utc};
use log::info;
use std::env;
use std::fmt::Display;
use std::str::FromStr;

/// The single named zone submission timestamps are recorded in.
#[derive(Clone, Debug)]
pub struct TimeZoneSettings {
    /// Label for logs; only `utc_offset_minutes` is applied to timestamps.
    pub name: String,
    pub utc_offset_minutes: i32,
}

impl TimeZoneSettings {
    pub fn offset(&self) -> FixedOffset {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or(Utc.fix())
    }
}

#[derive(Clone, Debug)]
pub struct SessionSettings {
    pub cookie_name: String,
    pub ttl_secs: u64,
    /// Live sessions kept in memory; the least recently seen one is evicted beyond this.
    pub max_sessions: usize,
    /// Regenerate the anti-forgery token after every submission.
    pub rotate_csrf: bool,
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub debug: bool,
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub max_connections: u32,
    pub migrations_dir: String,
    pub countries_file: String,
    /// Deployment values used when a form omits its hidden `software`/`source` inputs.
    pub software: String,
    pub source: String,
    pub timezone: TimeZoneSettings,
    pub session: SessionSettings,
    /// Reject plan names that are not in the catalog (off: any non-empty name).
    pub strict_plan_names: bool,
    pub max_body_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            debug: false,
            host: "127.0.0.1".to_string(),
            port: 8080,
            database_url: "sqlite://leadgate.db?mode=rwc".to_string(),
            max_connections: 5,
            migrations_dir: "migrations".to_string(),
            countries_file: "config/countries.json".to_string(),
            software: "Bidtrack".to_string(),
            source: "Website".to_string(),
            timezone: TimeZoneSettings {
                name: "Asia/Dhaka".to_string(),
                utc_offset_minutes: 6 * 60,
            },
            session: SessionSettings {
                cookie_name: "leadgate_sid".to_string(),
                ttl_secs: 24 * 60 * 60,
                max_sessions: 10_000,
                rotate_csrf: false,
            },
            strict_plan_names: false,
            max_body_bytes: 64 * 1024,
        }
    }
}

impl Settings {
    /// Defaults overlaid with any `LEADGATE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut s = Settings::default();
        s.debug = try_load("LEADGATE_DEBUG", s.debug)?;
        s.host = try_load("LEADGATE_HOST", s.host)?;
        s.port = try_load("LEADGATE_PORT", s.port)?;
        s.database_url = try_load("LEADGATE_DATABASE_URL", s.database_url)?;
        s.max_connections = try_load("LEADGATE_MAX_CONNECTIONS", s.max_connections)?;
        s.migrations_dir = try_load("LEADGATE_MIGRATIONS_DIR", s.migrations_dir)?;
        s.countries_file = try_load("LEADGATE_COUNTRIES_FILE", s.countries_file)?;
        s.software = try_load("LEADGATE_SOFTWARE", s.software)?;
        s.source = try_load("LEADGATE_SOURCE", s.source)?;
        s.timezone.name = try_load("LEADGATE_TZ_NAME", s.timezone.name)?;
        s.timezone.utc_offset_minutes =
            try_load("LEADGATE_TZ_OFFSET_MINUTES", s.timezone.utc_offset_minutes)?;
        s.session.cookie_name = try_load("LEADGATE_SESSION_COOKIE", s.session.cookie_name)?;
        s.session.ttl_secs = try_load("LEADGATE_SESSION_TTL_SECS", s.session.ttl_secs)?;
        s.session.max_sessions = try_load("LEADGATE_MAX_SESSIONS", s.session.max_sessions)?;
        s.session.rotate_csrf = try_load("LEADGATE_ROTATE_CSRF", s.session.rotate_csrf)?;
        s.strict_plan_names = try_load("LEADGATE_STRICT_PLAN_NAMES", s.strict_plan_names)?;
        s.max_body_bytes = try_load("LEADGATE_MAX_BODY_BYTES", s.max_body_bytes)?;

        let seconds = s.timezone.utc_offset_minutes.checked_mul(60);
        if seconds.and_then(FixedOffset::east_opt).is_none() {
            return Err(Error::Config {
                key: "LEADGATE_TZ_OFFSET_MINUTES".to_string(),
                message: format!("{} is out of range", s.timezone.utc_offset_minutes),
            });
        }
        Ok(s)
    }
}

fn try_load<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| Error::Config {
            key: key.to_string(),
            message: e.to_string(),
        }),
        Err(_) => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}
