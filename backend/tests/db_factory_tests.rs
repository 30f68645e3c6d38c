//! Tests for db::factory module - repository creation and configuration.

mod support;

use std::io::Write;
use std::str::FromStr;

use practice_backend::db::factory::{RepositoryFactory, RepositoryType};
use practice_backend::db::RepositoryConfig;

#[test]
fn test_repository_type_from_str() {
    assert_eq!(
        RepositoryType::from_str("postgres").unwrap(),
        RepositoryType::Postgres
    );
    assert_eq!(
        RepositoryType::from_str("PG").unwrap(),
        RepositoryType::Postgres
    );
    assert_eq!(
        RepositoryType::from_str(" Local ").unwrap(),
        RepositoryType::Local
    );
    assert_eq!(
        RepositoryType::from_str("memory").unwrap(),
        RepositoryType::Local
    );
}

#[test]
fn test_repository_type_from_str_invalid() {
    let result = RepositoryType::from_str("sqlite");
    assert!(result.unwrap_err().contains("Unknown repository type"));
}

#[test]
fn test_repository_type_from_env_default() {
    support::with_scoped_env(
        &[
            ("REPOSITORY_TYPE", None),
            ("DATABASE_URL", None),
            ("PG_DATABASE_URL", None),
        ],
        || {
            assert_eq!(RepositoryType::from_env(), RepositoryType::Local);
        },
    );
}

#[test]
fn test_repository_type_from_env_with_database_url() {
    support::with_scoped_env(
        &[
            ("REPOSITORY_TYPE", None),
            ("DATABASE_URL", Some("postgres://localhost/practice")),
        ],
        || {
            assert_eq!(RepositoryType::from_env(), RepositoryType::Postgres);
        },
    );
}

#[test]
fn test_repository_type_explicit_wins_over_database_url() {
    support::with_scoped_env(
        &[
            ("REPOSITORY_TYPE", Some("local")),
            ("DATABASE_URL", Some("postgres://localhost/practice")),
        ],
        || {
            assert_eq!(RepositoryType::from_env(), RepositoryType::Local);
        },
    );
}

#[test]
fn test_repository_type_from_env_invalid_defaults_to_local() {
    support::with_scoped_env(
        &[
            ("REPOSITORY_TYPE", Some("invalid")),
            ("DATABASE_URL", None),
            ("PG_DATABASE_URL", None),
        ],
        || {
            assert_eq!(RepositoryType::from_env(), RepositoryType::Local);
        },
    );
}

#[tokio::test]
async fn test_create_local_via_factory() {
    let repo = RepositoryFactory::create(RepositoryType::Local, None)
        .await
        .unwrap();
    assert!(repo.health_check().await.unwrap());
}

#[cfg(feature = "postgres-repo")]
#[tokio::test]
async fn test_create_postgres_without_config_fails() {
    let err = RepositoryFactory::create(RepositoryType::Postgres, None)
        .await
        .err()
        .unwrap();
    assert!(err.to_string().contains("requires PostgresConfig"));
}

#[cfg(not(feature = "postgres-repo"))]
#[tokio::test]
async fn test_create_postgres_without_feature_fails() {
    let err = RepositoryFactory::create(RepositoryType::Postgres, None)
        .await
        .err()
        .unwrap();
    assert!(err.to_string().contains("feature not enabled"));
}

#[tokio::test]
async fn test_from_config_file_local() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[repository]\ntype = \"local\"").unwrap();

    let repo = RepositoryFactory::from_config_file(file.path()).await.unwrap();
    assert!(repo.health_check().await.unwrap());
}

#[tokio::test]
async fn test_from_config_file_missing() {
    let dir = tempfile::tempdir().unwrap();
    let err = RepositoryFactory::from_config_file(dir.path().join("repository.toml"))
        .await
        .err()
        .unwrap();
    assert!(err.to_string().contains("Failed to read config file"));
}

#[test]
fn test_repository_config_defaults_to_local() {
    let config: RepositoryConfig = toml::from_str("").unwrap();
    assert_eq!(config.repository_type().unwrap(), RepositoryType::Local);
    assert!(config.to_postgres_config().unwrap().is_none());
    assert_eq!(config.postgres.max_connections, 10);
}
