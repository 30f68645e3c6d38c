//! Data Transfer Objects for the HTTP API.
//!
//! Domain records and service requests already derive Serialize/Deserialize
//! and are used as-is; this module only adds the query strings, small action
//! bodies and response envelopes that exist for the REST surface.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::api::{AppointmentId, Participant, SeriesScope};

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: String,
}

/// List envelope shared by every collection endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T> From<Vec<T>> for ListResponse<T> {
    fn from(items: Vec<T>) -> Self {
        let total = items.len();
        Self { items, total }
    }
}

/// `?date=YYYY-MM-DD`
#[derive(Debug, Clone, Deserialize)]
pub struct DateQuery {
    pub date: NaiveDate,
}

/// `?year=&month=`
#[derive(Debug, Clone, Deserialize)]
pub struct MonthQuery {
    pub year: i32,
    pub month: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DateRangeQuery {
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub to: Option<NaiveDate>,
}

/// `?scope=single|following|all`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScopeQuery {
    #[serde(default)]
    pub scope: SeriesScope,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub scope: SeriesScope,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRequest {
    pub participant: Participant,
    pub attended: bool,
}

/// Body of a new note; the client comes from the path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteRequest {
    #[serde(default)]
    pub appointment_id: Option<AppointmentId>,
    pub title: String,
    #[serde(default)]
    pub content: String,
}

/// Public meeting join: the client's email address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyTokenRequest {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletedResponse {
    pub deleted: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatedResponse {
    pub updated: usize,
}
