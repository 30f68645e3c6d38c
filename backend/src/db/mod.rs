//! Persistence layer for the practice.
//!
//! Access goes through the Repository pattern so storage backends can be
//! swapped without touching the services:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  HTTP layer (axum handlers)                             │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//! ┌───────────────────▼─────────────────────────────────────┐
//! │  Services (crate::services) - booking, billing, email   │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//! ┌───────────────────▼─────────────────────────────────────┐
//! │  Repository traits (repository/) - FullRepository       │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//!     ┌───────────────┴──────────────┐
//!     │ LocalRepository (in-memory)  │ PostgresRepository (Diesel)
//!     └──────────────────────────────┘
//! ```
//!
//! The backend is picked at start-up by [`RepositoryFactory`]; see
//! [`init_repository`].

#[cfg(not(any(feature = "postgres-repo", feature = "local-repo")))]
compile_error!("Enable at least one repository backend feature.");

pub mod factory;
pub mod repo_config;
pub mod repositories;
pub mod repository;

// Postgres config is colocated with the repository implementation.
#[cfg(feature = "postgres-repo")]
pub use repositories::postgres::{PoolStats, PostgresConfig};
#[cfg(not(feature = "postgres-repo"))]
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    _private: (),
}

pub use factory::{RepositoryFactory, RepositoryType};
pub use repo_config::RepositoryConfig;
pub use repositories::LocalRepository;
#[cfg(feature = "postgres-repo")]
pub use repositories::PostgresRepository;
pub use repository::{
    AppointmentRepository, AvailabilityRepository, BillingRepository, ClientRepository,
    ErrorContext, FullRepository, NoteRepository, NotificationRepository, RepositoryError,
    RepositoryResult,
};

use anyhow::{Context, Result};
use std::sync::{Arc, OnceLock};

/// Process-wide repository, initialized once.
static REPOSITORY: OnceLock<Arc<dyn FullRepository>> = OnceLock::new();

/// Select and initialize the process-wide repository.
///
/// Selection follows [`RepositoryFactory::from_environment_or_default`].
/// Calling it again after a successful initialization is a no-op.
pub async fn init_repository() -> Result<Arc<dyn FullRepository>> {
    if let Some(repo) = REPOSITORY.get() {
        return Ok(repo.clone());
    }

    let repo = RepositoryFactory::from_environment_or_default()
        .await
        .map_err(|e| anyhow::Error::msg(e.to_string()))
        .context("Failed to initialize repository")?;
    Ok(REPOSITORY.get_or_init(|| repo).clone())
}
