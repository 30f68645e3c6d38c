//! Client records.

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::api::{Client, ClientChanges, ClientFilter, ClientId, NewClient};

/// Repository trait for client records.
///
/// Emails are stored normalized (trimmed, lowercase) and are unique;
/// implementations report a duplicate as `RepositoryError::Conflict`.
#[async_trait]
pub trait ClientRepository: Send + Sync {
    /// Check if the backing store is reachable.
    ///
    /// # Returns
    /// - `Ok(true)` if healthy
    /// - `Ok(false)` if unhealthy but no error occurred
    /// - `Err(RepositoryError)` if the check itself failed
    async fn health_check(&self) -> RepositoryResult<bool>;

    /// Insert a new client with status `active`.
    async fn create_client(&self, client: &NewClient) -> RepositoryResult<Client>;

    /// # Returns
    /// * `Err(RepositoryError::NotFound)` - If the client doesn't exist
    async fn get_client(&self, id: ClientId) -> RepositoryResult<Client>;

    /// Look a client up by normalized email.
    async fn find_client_by_email(&self, email: &str) -> RepositoryResult<Option<Client>>;

    /// Clients matching `filter`, ordered by last name then first name.
    async fn list_clients(&self, filter: &ClientFilter) -> RepositoryResult<Vec<Client>>;

    /// Apply the set fields of `changes` and bump `updated_at`.
    async fn update_client(&self, id: ClientId, changes: &ClientChanges)
        -> RepositoryResult<Client>;

    /// Delete a client together with its appointments, invoices, notes and
    /// queued emails.
    async fn delete_client(&self, id: ClientId) -> RepositoryResult<()>;
}
