//! Practice configuration.
//!
//! Settings are read from a TOML file (`practice.toml` by default) where
//! every field has a default, then selected values are overridden from the
//! environment:
//!
//! - `PRACTICE_CONFIG`: Path to the configuration file
//! - `HOST` / `PORT`: Bind address of the HTTP server
//! - `PRACTICE_ADMIN_TOKEN`: Bearer token for the admin API
//! - `MEETING_APP_SECRET`: Signing secret for meeting tokens

use chrono::{Duration, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::AppointmentType;

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PracticeConfig {
    pub server: ServerSettings,
    pub practice: PracticeSettings,
    pub booking: BookingSettings,
    pub meeting: MeetingSettings,
    pub notifications: NotificationSettings,
    pub invoices: InvoiceSettings,
    pub admin: AdminSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PracticeSettings {
    pub name: String,
    pub practitioner_name: String,
    pub practitioner_email: String,
    /// Fixed offset of the practice's local time from UTC.
    pub utc_offset_minutes: i32,
    pub default_rate_cents: i64,
    pub currency: String,
}

impl Default for PracticeSettings {
    fn default() -> Self {
        Self {
            name: "Therapy Practice".to_string(),
            practitioner_name: "Practitioner".to_string(),
            practitioner_email: "practice@example.com".to_string(),
            utc_offset_minutes: 0,
            default_rate_cents: 9000,
            currency: "EUR".to_string(),
        }
    }
}

impl PracticeSettings {
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BookingSettings {
    pub session_minutes: i64,
    pub slot_step_minutes: i64,
    pub buffer_minutes: i64,
    pub min_notice_hours: i64,
    pub horizon_days: i64,
    pub default_type: AppointmentType,
    /// Create an invoice for every new appointment.
    pub auto_invoice: bool,
}

impl Default for BookingSettings {
    fn default() -> Self {
        Self {
            session_minutes: 50,
            slot_step_minutes: 60,
            buffer_minutes: 10,
            min_notice_hours: 24,
            horizon_days: 60,
            default_type: AppointmentType::Online,
            auto_invoice: true,
        }
    }
}

impl BookingSettings {
    pub fn session_length(&self) -> Duration {
        Duration::minutes(self.session_minutes)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeetingSettings {
    pub domain: String,
    pub app_id: String,
    pub app_secret: String,
    pub access_before_minutes: i64,
    pub access_after_minutes: i64,
}

impl Default for MeetingSettings {
    fn default() -> Self {
        Self {
            domain: "meet.example.com".to_string(),
            app_id: "practice".to_string(),
            app_secret: String::new(),
            access_before_minutes: 15,
            access_after_minutes: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub enabled: bool,
    pub from_address: String,
    pub reminder_hours_before: i64,
    pub dispatch_interval_secs: u64,
    pub dispatch_batch_size: usize,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            from_address: "no-reply@example.com".to_string(),
            reminder_hours_before: 24,
            dispatch_interval_secs: 60,
            dispatch_batch_size: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InvoiceSettings {
    pub prefix: String,
    pub due_days: i64,
}

impl Default for InvoiceSettings {
    fn default() -> Self {
        Self {
            prefix: "INV".to_string(),
            due_days: 14,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminSettings {
    /// Bearer token for the admin API. Empty disables the admin API.
    pub api_token: String,
}

impl PracticeConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: PracticeConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Load configuration the way the server does.
    ///
    /// Uses `PRACTICE_CONFIG` when set, otherwise the first `practice.toml`
    /// found in the standard locations, otherwise defaults. Environment
    /// overrides are applied and the result is validated.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("PRACTICE_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => match Self::default_location() {
                Some(path) => Self::from_file(path)?,
                None => Self::default(),
            },
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn default_location() -> Option<PathBuf> {
        [
            PathBuf::from("practice.toml"),
            PathBuf::from("backend/practice.toml"),
            PathBuf::from("../practice.toml"),
        ]
        .into_iter()
        .find(|p| p.exists())
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("HOST") {
            self.server.host = host;
        }
        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Ok(token) = std::env::var("PRACTICE_ADMIN_TOKEN") {
            self.admin.api_token = token;
        }
        if let Ok(secret) = std::env::var("MEETING_APP_SECRET") {
            self.meeting.app_secret = secret;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.practice.utc_offset_minutes.abs() > 18 * 60 {
            return Err(ConfigError::Invalid(format!(
                "practice.utc_offset_minutes out of range: {}",
                self.practice.utc_offset_minutes
            )));
        }
        if self.practice.default_rate_cents < 0 {
            return Err(ConfigError::Invalid(
                "practice.default_rate_cents must not be negative".to_string(),
            ));
        }
        if self.booking.session_minutes <= 0 || self.booking.slot_step_minutes <= 0 {
            return Err(ConfigError::Invalid(
                "booking.session_minutes and booking.slot_step_minutes must be positive"
                    .to_string(),
            ));
        }
        if self.booking.buffer_minutes < 0
            || self.booking.min_notice_hours < 0
            || self.booking.horizon_days <= 0
        {
            return Err(ConfigError::Invalid(
                "booking buffer/notice must be non-negative and horizon positive".to_string(),
            ));
        }
        if self.invoices.due_days < 0 {
            return Err(ConfigError::Invalid(
                "invoices.due_days must not be negative".to_string(),
            ));
        }
        if self.meeting.access_before_minutes < 0 || self.meeting.access_after_minutes < 0 {
            return Err(ConfigError::Invalid(
                "meeting access window must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = PracticeConfig::from_toml_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.booking.session_minutes, 50);
        assert_eq!(config.meeting.access_before_minutes, 15);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_sections() {
        let toml = r#"
[practice]
name = "Calm Rooms"
utc_offset_minutes = 120

[booking]
default_type = "in_person"
buffer_minutes = 0
"#;
        let config = PracticeConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.practice.name, "Calm Rooms");
        assert_eq!(config.practice.offset().local_minus_utc(), 7200);
        assert_eq!(config.booking.default_type, AppointmentType::InPerson);
        assert_eq!(config.booking.buffer_minutes, 0);
        assert_eq!(config.booking.slot_step_minutes, 60);
    }

    #[test]
    fn test_invalid_offset_rejected() {
        let mut config = PracticeConfig::default();
        config.practice.utc_offset_minutes = 20 * 60;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_unknown_type_is_parse_error() {
        let toml = "[booking]\ndefault_type = \"phone\"\n";
        assert!(matches!(
            PracticeConfig::from_toml_str(toml),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("practice.toml");
        fs::write(&path, "[admin]\napi_token = \"s3cret\"\n").unwrap();
        let config = PracticeConfig::from_file(&path).unwrap();
        assert_eq!(config.admin.api_token, "s3cret");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = PracticeConfig::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
