use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::ClientId;
use crate::define_text_enum;

define_text_enum!(
    /// Lifecycle of a client record.
    ClientStatus {
        Active => "active",
        Inactive => "inactive",
        Archived => "archived",
    }
);

/// A client (patient) of the practice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub first_name: String,
    pub last_name: String,
    /// Always stored lowercase; unique across clients.
    pub email: String,
    pub phone: Option<String>,
    pub status: ClientStatus,
    /// Per-client session rate overriding the practice default.
    pub default_rate_cents: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Client {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Payload for creating a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewClient {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub default_rate_cents: Option<i64>,
}

/// Partial update for a client. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientChanges {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub status: Option<ClientStatus>,
    #[serde(default)]
    pub default_rate_cents: Option<i64>,
}

/// Listing filter used by the admin client table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientFilter {
    /// Case-insensitive match against first name, last name and email.
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub status: Option<ClientStatus>,
}

impl ClientFilter {
    pub fn matches(&self, client: &Client) -> bool {
        if let Some(status) = self.status {
            if client.status != status {
                return false;
            }
        }
        match self.search.as_deref().map(str::trim) {
            Some(term) if !term.is_empty() => {
                let term = term.to_lowercase();
                client.first_name.to_lowercase().contains(&term)
                    || client.last_name.to_lowercase().contains(&term)
                    || client.email.contains(&term)
            }
            _ => true,
        }
    }
}

/// Normalize an email address for storage and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(first: &str, last: &str, email: &str, status: ClientStatus) -> Client {
        Client {
            id: ClientId::new(1),
            first_name: first.to_string(),
            last_name: last.to_string(),
            email: email.to_string(),
            phone: None,
            status,
            default_rate_cents: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_filter_search_is_case_insensitive() {
        let c = client("Ada", "Lovelace", "ada@example.com", ClientStatus::Active);
        let filter = ClientFilter {
            search: Some("LOVE".to_string()),
            status: None,
        };
        assert!(filter.matches(&c));
    }

    #[test]
    fn test_filter_status_excludes() {
        let c = client("Ada", "Lovelace", "ada@example.com", ClientStatus::Archived);
        let filter = ClientFilter {
            search: None,
            status: Some(ClientStatus::Active),
        };
        assert!(!filter.matches(&c));
    }

    #[test]
    fn test_status_text_roundtrip() {
        assert_eq!("archived".parse::<ClientStatus>().unwrap(), ClientStatus::Archived);
        assert_eq!(ClientStatus::Inactive.to_string(), "inactive");
        assert!("deleted".parse::<ClientStatus>().is_err());
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Ada@Example.COM "), "ada@example.com");
    }
}
