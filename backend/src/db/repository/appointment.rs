//! Calendar entries and recurring series.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::error::{ErrorContext, RepositoryError, RepositoryResult};
use crate::api::{Appointment, AppointmentFilter, AppointmentId, NewAppointment};

/// Conflict raised when a write would overlap the live appointment `id`.
pub fn slot_taken(id: AppointmentId, start: DateTime<Utc>) -> RepositoryError {
    RepositoryError::conflict_with_context(
        format!("Time slot overlaps appointment {} starting {}", id, start),
        ErrorContext::new("check_overlap")
            .with_entity("appointment")
            .with_entity_id(id.value()),
    )
}

/// Repository trait for appointments.
///
/// Multi-row writes take slices so an implementation can apply them
/// atomically; either every row is written or none is.
///
/// Live (non-cancelled) appointments never overlap. Writes check this in
/// the same critical section or transaction that stores the rows.
#[async_trait]
pub trait AppointmentRepository: Send + Sync {
    /// Insert one or more appointments (a whole series at once).
    ///
    /// # Returns
    /// * `Ok(Vec<Appointment>)` - Stored rows in input order
    /// * `Err(RepositoryError::NotFound)` - If a referenced client doesn't exist
    /// * `Err(RepositoryError::Conflict)` - If a row overlaps a live appointment
    async fn create_appointments(
        &self,
        appointments: &[NewAppointment],
    ) -> RepositoryResult<Vec<Appointment>>;

    async fn get_appointment(&self, id: AppointmentId) -> RepositoryResult<Appointment>;

    /// Appointments matching `filter`, ordered by start time.
    async fn list_appointments(
        &self,
        filter: &AppointmentFilter,
    ) -> RepositoryResult<Vec<Appointment>>;

    /// Every member of a series, ordered by start time.
    async fn list_series(&self, group_id: Uuid) -> RepositoryResult<Vec<Appointment>>;

    /// Overwrite the mutable fields of existing appointments and bump their
    /// `updated_at`.
    ///
    /// # Returns
    /// * `Ok(Vec<Appointment>)` - Rows as stored
    /// * `Err(RepositoryError::NotFound)` - If any id is unknown (nothing is written)
    /// * `Err(RepositoryError::Conflict)` - If a live row whose times changed
    ///   overlaps a live appointment outside the batch
    async fn save_appointments(
        &self,
        appointments: &[Appointment],
    ) -> RepositoryResult<Vec<Appointment>>;

    /// Delete appointments, detach their invoices and notes and drop their
    /// pending emails.
    ///
    /// # Returns
    /// Number of appointments removed.
    async fn delete_appointments(&self, ids: &[AppointmentId]) -> RepositoryResult<usize>;
}
