use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::{AppointmentId, ClientId, NoteId};

/// Free-form session or client note kept by the practitioner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub client_id: ClientId,
    pub appointment_id: Option<AppointmentId>,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNote {
    pub client_id: ClientId,
    #[serde(default)]
    pub appointment_id: Option<AppointmentId>,
    pub title: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoteChanges {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub appointment_id: Option<AppointmentId>,
}
