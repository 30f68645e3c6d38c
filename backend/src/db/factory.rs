//! Repository factory.
//!
//! Picks a backend from the environment or from `repository.toml` and hands
//! it out as `Arc<dyn FullRepository>`.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use super::repo_config::RepositoryConfig;
use super::repositories::LocalRepository;
#[cfg(feature = "postgres-repo")]
use super::repositories::PostgresRepository;
use super::repository::{FullRepository, RepositoryError, RepositoryResult};
use super::PostgresConfig;

/// Repository type configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryType {
    /// Postgres + Diesel implementation
    Postgres,
    /// In-memory local repository
    Local,
}

impl FromStr for RepositoryType {
    type Err = String;

    /// Accepts "postgres", "pg" and "local" in any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "pg" => Ok(Self::Postgres),
            "local" | "memory" => Ok(Self::Local),
            _ => Err(format!("Unknown repository type: {}", s)),
        }
    }
}

impl RepositoryType {
    /// Reads `REPOSITORY_TYPE`. Without it, Postgres is chosen when a
    /// database URL is present, otherwise Local.
    pub fn from_env() -> Self {
        if let Ok(val) = std::env::var("REPOSITORY_TYPE") {
            return val.parse().unwrap_or(Self::Local);
        }

        if std::env::var("DATABASE_URL").is_ok() || std::env::var("PG_DATABASE_URL").is_ok() {
            Self::Postgres
        } else {
            Self::Local
        }
    }
}

/// Repository factory for creating repository instances.
///
/// # Example
/// ```ignore
/// use practice_backend::db::{RepositoryFactory, RepositoryType};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let repo = RepositoryFactory::create(RepositoryType::Local, None).await?;
///     assert!(repo.health_check().await?);
///     Ok(())
/// }
/// ```
pub struct RepositoryFactory;

impl RepositoryFactory {
    /// Create a repository of the given type.
    ///
    /// `postgres_config` is required for [`RepositoryType::Postgres`].
    pub async fn create(
        repo_type: RepositoryType,
        postgres_config: Option<&PostgresConfig>,
    ) -> RepositoryResult<Arc<dyn FullRepository>> {
        match repo_type {
            RepositoryType::Local => Ok(Self::create_local()),
            RepositoryType::Postgres => {
                let config = postgres_config.ok_or_else(|| {
                    RepositoryError::configuration("Postgres repository requires PostgresConfig")
                })?;
                Self::postgres_as_full(config).await
            }
        }
    }

    /// Create a Postgres repository; runs pending migrations.
    #[cfg(feature = "postgres-repo")]
    pub async fn create_postgres(
        config: &PostgresConfig,
    ) -> RepositoryResult<Arc<PostgresRepository>> {
        let config = config.clone();
        let repo = tokio::task::spawn_blocking(move || PostgresRepository::new(config))
            .await
            .map_err(|e| RepositoryError::internal(format!("Task join error: {}", e)))??;
        let stats = repo.get_pool_stats();
        tracing::info!(
            connections = stats.total_connections,
            max_size = stats.max_size,
            "Postgres repository ready"
        );
        Ok(Arc::new(repo))
    }

    /// Create an in-memory local repository.
    pub fn create_local() -> Arc<dyn FullRepository> {
        Arc::new(LocalRepository::new())
    }

    /// Create the repository selected by `REPOSITORY_TYPE` / `DATABASE_URL`.
    pub async fn from_env() -> RepositoryResult<Arc<dyn FullRepository>> {
        match RepositoryType::from_env() {
            RepositoryType::Local => Ok(Self::create_local()),
            RepositoryType::Postgres => {
                let config = Self::postgres_config_from_env()?;
                Self::postgres_as_full(&config).await
            }
        }
    }

    /// Create the repository described by a `repository.toml` file.
    pub async fn from_config_file<P: AsRef<Path>>(
        config_path: P,
    ) -> RepositoryResult<Arc<dyn FullRepository>> {
        let config = RepositoryConfig::from_file(config_path)?;
        Self::from_repository_config(&config).await
    }

    /// Create the repository described by `config`.
    pub async fn from_repository_config(
        config: &RepositoryConfig,
    ) -> RepositoryResult<Arc<dyn FullRepository>> {
        let repo_type = config.repository_type().map_err(|e| {
            RepositoryError::configuration(format!("Invalid repository type: {}", e))
        })?;

        match repo_type {
            RepositoryType::Local => Ok(Self::create_local()),
            RepositoryType::Postgres => {
                let pg_config = config.to_postgres_config()?.ok_or_else(|| {
                    RepositoryError::configuration(
                        "Postgres repository requires database configuration",
                    )
                })?;
                Self::postgres_as_full(&pg_config).await
            }
        }
    }

    /// Server start-up selection: `REPOSITORY_TYPE`/`DATABASE_URL` win, then
    /// a `repository.toml` in the standard locations, then Local.
    pub async fn from_environment_or_default() -> RepositoryResult<Arc<dyn FullRepository>> {
        let env_selected = std::env::var("REPOSITORY_TYPE").is_ok()
            || std::env::var("DATABASE_URL").is_ok()
            || std::env::var("PG_DATABASE_URL").is_ok();
        if env_selected {
            return Self::from_env().await;
        }
        match RepositoryConfig::from_default_location() {
            Ok(config) => Self::from_repository_config(&config).await,
            Err(_) => Ok(Self::create_local()),
        }
    }

    #[cfg(feature = "postgres-repo")]
    fn postgres_config_from_env() -> RepositoryResult<PostgresConfig> {
        PostgresConfig::from_env().map_err(RepositoryError::configuration)
    }

    #[cfg(not(feature = "postgres-repo"))]
    fn postgres_config_from_env() -> RepositoryResult<PostgresConfig> {
        Err(RepositoryError::configuration(
            "Postgres repository feature not enabled",
        ))
    }

    #[cfg(feature = "postgres-repo")]
    async fn postgres_as_full(
        config: &PostgresConfig,
    ) -> RepositoryResult<Arc<dyn FullRepository>> {
        let pg = Self::create_postgres(config).await?;
        Ok(pg as Arc<dyn FullRepository>)
    }

    #[cfg(not(feature = "postgres-repo"))]
    async fn postgres_as_full(
        _config: &PostgresConfig,
    ) -> RepositoryResult<Arc<dyn FullRepository>> {
        Err(RepositoryError::configuration(
            "Postgres repository feature not enabled",
        ))
    }
}
