//! Weekly working hours and date exceptions.

use async_trait::async_trait;
use chrono::NaiveDate;

use super::error::RepositoryResult;
use crate::api::{AvailabilityException, ExceptionId, NewAvailabilityException, WorkingHours};

#[async_trait]
pub trait AvailabilityRepository: Send + Sync {
    /// The weekly template ordered Monday..Sunday.
    ///
    /// A store that was never configured returns
    /// [`default_working_hours`](crate::models::default_working_hours).
    async fn get_working_hours(&self) -> RepositoryResult<Vec<WorkingHours>>;

    /// Replace the whole template.
    async fn replace_working_hours(
        &self,
        hours: &[WorkingHours],
    ) -> RepositoryResult<Vec<WorkingHours>>;

    async fn create_exception(
        &self,
        exception: &NewAvailabilityException,
    ) -> RepositoryResult<AvailabilityException>;

    async fn get_exception(&self, id: ExceptionId) -> RepositoryResult<AvailabilityException>;

    /// Exceptions overlapping `[from, to]` (either bound optional), ordered by
    /// start date.
    async fn list_exceptions(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> RepositoryResult<Vec<AvailabilityException>>;

    async fn save_exception(
        &self,
        exception: &AvailabilityException,
    ) -> RepositoryResult<AvailabilityException>;

    async fn delete_exception(&self, id: ExceptionId) -> RepositoryResult<()>;
}
