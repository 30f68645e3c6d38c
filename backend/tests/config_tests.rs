//! Tests for loading `practice.toml` and environment overrides.

mod support;

use std::io::Write;

use practice_backend::api::AppointmentType;
use practice_backend::config::PracticeConfig;

const SAMPLE: &str = r#"
[practice]
name = "Praxis am See"
utc_offset_minutes = 60
default_rate_cents = 11000
currency = "CHF"

[booking]
session_minutes = 45
default_type = "in_person"

[meeting]
domain = "meet.praxis.test"

[admin]
api_token = "from-file"
"#;

#[test]
fn test_partial_file_keeps_defaults() {
    let config = PracticeConfig::from_toml_str(SAMPLE).unwrap();
    assert_eq!(config.practice.name, "Praxis am See");
    assert_eq!(config.practice.offset().local_minus_utc(), 3600);
    assert_eq!(config.booking.session_minutes, 45);
    assert_eq!(config.booking.default_type, AppointmentType::InPerson);
    // Untouched sections and keys
    assert_eq!(config.booking.slot_step_minutes, 60);
    assert_eq!(config.invoices.prefix, "INV");
    assert_eq!(config.server.port, 8080);
}

#[test]
fn test_load_applies_env_overrides() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(SAMPLE.as_bytes()).unwrap();
    let path = file.path().to_str().unwrap().to_string();

    support::with_scoped_env(
        &[
            ("PRACTICE_CONFIG", Some(path.as_str())),
            ("PRACTICE_ADMIN_TOKEN", Some("from-env")),
            ("MEETING_APP_SECRET", Some("s3cret")),
            ("HOST", None),
            ("PORT", Some("9090")),
        ],
        || {
            let config = PracticeConfig::load().unwrap();
            assert_eq!(config.admin.api_token, "from-env");
            assert_eq!(config.meeting.app_secret, "s3cret");
            assert_eq!(config.server.port, 9090);
            assert_eq!(config.practice.currency, "CHF");
        },
    );
}

#[test]
fn test_load_rejects_invalid_values() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[practice]\nutc_offset_minutes = 2000").unwrap();
    let path = file.path().to_str().unwrap().to_string();

    support::with_scoped_env(&[("PRACTICE_CONFIG", Some(path.as_str()))], || {
        assert!(PracticeConfig::load().is_err());
    });
}

#[test]
fn test_load_missing_file_fails() {
    support::with_scoped_env(
        &[("PRACTICE_CONFIG", Some("/nonexistent/practice.toml"))],
        || {
            assert!(PracticeConfig::load().is_err());
        },
    );
}
