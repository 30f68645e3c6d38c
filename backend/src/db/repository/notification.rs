//! Scheduled email queue.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::RepositoryResult;
use crate::api::{
    AppointmentId, EmailFilter, EmailId, EmailKind, EmailStatus, NewScheduledEmail, ScheduledEmail,
};

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Queue emails with status `pending`.
    async fn enqueue_emails(
        &self,
        emails: &[NewScheduledEmail],
    ) -> RepositoryResult<Vec<ScheduledEmail>>;

    /// Emails matching `filter`, ordered by `send_at`.
    async fn list_emails(&self, filter: &EmailFilter) -> RepositoryResult<Vec<ScheduledEmail>>;

    /// Pending emails with `send_at <= now`, oldest first, at most `limit`.
    async fn due_emails(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> RepositoryResult<Vec<ScheduledEmail>>;

    /// Record the outcome of a delivery attempt.
    async fn mark_email(
        &self,
        id: EmailId,
        status: EmailStatus,
        sent_at: Option<DateTime<Utc>>,
        last_error: Option<String>,
    ) -> RepositoryResult<ScheduledEmail>;

    /// Cancel pending emails of the given appointments, optionally only
    /// those of the given kinds.
    ///
    /// # Returns
    /// Number of emails cancelled.
    async fn cancel_pending_emails(
        &self,
        appointment_ids: &[AppointmentId],
        kinds: Option<&[EmailKind]>,
    ) -> RepositoryResult<usize>;
}
