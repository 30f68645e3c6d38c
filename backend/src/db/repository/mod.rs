//! Repository trait definitions for database operations.
//!
//! Responsibilities are split across focused traits, one per aggregate:
//!
//! - [`ClientRepository`]: client records (plus the health check)
//! - [`AppointmentRepository`]: calendar entries and series
//! - [`BillingRepository`]: invoices
//! - [`NoteRepository`]: per-client notes
//! - [`AvailabilityRepository`]: weekly template and date exceptions
//! - [`NotificationRepository`]: the scheduled email queue
//!
//! # Convenience Trait Bound
//!
//! Services take `&dyn FullRepository`, which every type implementing all six
//! traits gets for free:
//!
//! ```ignore
//! async fn upcoming(repo: &dyn FullRepository) -> RepositoryResult<usize> {
//!     let filter = AppointmentFilter::between(Utc::now(), Utc::now() + Duration::days(7));
//!     Ok(repo.list_appointments(&filter).await?.len())
//! }
//! ```

pub mod appointment;
pub mod availability;
pub mod billing;
pub mod client;
pub mod error;
pub mod note;
pub mod notification;

pub use error::{ErrorContext, RepositoryError, RepositoryResult};

pub use appointment::{slot_taken, AppointmentRepository};
pub use availability::AvailabilityRepository;
pub use billing::BillingRepository;
pub use client::ClientRepository;
pub use note::NoteRepository;
pub use notification::NotificationRepository;

/// Composite trait bound for a complete repository implementation.
pub trait FullRepository:
    ClientRepository
    + AppointmentRepository
    + BillingRepository
    + NoteRepository
    + AvailabilityRepository
    + NotificationRepository
{
}

impl<T> FullRepository for T where
    T: ClientRepository
        + AppointmentRepository
        + BillingRepository
        + NoteRepository
        + AvailabilityRepository
        + NotificationRepository
{
}
