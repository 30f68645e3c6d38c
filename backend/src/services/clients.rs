//! Client records.

use crate::api::*;
use crate::models::normalize_email;

use super::{Practice, ServiceError, ServiceResult};

fn validate_email(email: &str) -> ServiceResult<()> {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(ServiceError::validation(format!(
            "Invalid email address: {}",
            email
        ))),
    }
}

fn validate_name(field: &str, value: &str) -> ServiceResult<()> {
    if value.trim().is_empty() {
        return Err(ServiceError::validation(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn validate_rate(rate: Option<i64>) -> ServiceResult<()> {
    match rate {
        Some(rate) if rate < 0 => Err(ServiceError::validation("Rate must not be negative")),
        _ => Ok(()),
    }
}

/// Fail with a conflict when another client already uses `email`.
async fn ensure_email_unused(
    practice: &Practice,
    email: &str,
    owner: Option<ClientId>,
) -> ServiceResult<()> {
    match practice.repo().find_client_by_email(email).await? {
        Some(existing) if Some(existing.id) != owner => Err(ServiceError::conflict(format!(
            "A client with email {} already exists",
            email
        ))),
        _ => Ok(()),
    }
}

pub async fn create(practice: &Practice, mut client: NewClient) -> ServiceResult<Client> {
    validate_name("first_name", &client.first_name)?;
    validate_name("last_name", &client.last_name)?;
    client.email = normalize_email(&client.email);
    validate_email(&client.email)?;
    validate_rate(client.default_rate_cents)?;
    ensure_email_unused(practice, &client.email, None).await?;

    let created = practice.repo().create_client(&client).await?;
    tracing::info!(client_id = %created.id, "Client created");
    Ok(created)
}

pub async fn get(practice: &Practice, id: ClientId) -> ServiceResult<Client> {
    Ok(practice.repo().get_client(id).await?)
}

pub async fn list(practice: &Practice, filter: &ClientFilter) -> ServiceResult<Vec<Client>> {
    Ok(practice.repo().list_clients(filter).await?)
}

pub async fn update(
    practice: &Practice,
    id: ClientId,
    mut changes: ClientChanges,
) -> ServiceResult<Client> {
    if let Some(ref first_name) = changes.first_name {
        validate_name("first_name", first_name)?;
    }
    if let Some(ref last_name) = changes.last_name {
        validate_name("last_name", last_name)?;
    }
    validate_rate(changes.default_rate_cents)?;
    if let Some(email) = changes.email.take() {
        let email = normalize_email(&email);
        validate_email(&email)?;
        ensure_email_unused(practice, &email, Some(id)).await?;
        changes.email = Some(email);
    }

    Ok(practice.repo().update_client(id, &changes).await?)
}

pub async fn archive(practice: &Practice, id: ClientId) -> ServiceResult<Client> {
    let changes = ClientChanges {
        status: Some(ClientStatus::Archived),
        ..Default::default()
    };
    let client = practice.repo().update_client(id, &changes).await?;
    tracing::info!(client_id = %id, "Client archived");
    Ok(client)
}

/// Delete a client together with their appointments, invoices, notes and
/// pending emails.
pub async fn delete(practice: &Practice, id: ClientId) -> ServiceResult<()> {
    practice.repo().delete_client(id).await?;
    tracing::info!(client_id = %id, "Client deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("ada@example.com").is_ok());
        assert!(validate_email("ada").is_err());
        assert!(validate_email("ada@").is_err());
    }

    #[test]
    fn test_validate_rate() {
        assert!(validate_rate(None).is_ok());
        assert!(validate_rate(Some(0)).is_ok());
        assert!(validate_rate(Some(-1)).is_err());
    }
}
