//! Service layer for business logic and orchestration.
//!
//! Services sit between the HTTP handlers and the repository. They validate
//! requests, run the calendar rules from [`crate::scheduler`] and keep the
//! dependent records (invoices, scheduled emails) consistent with the
//! appointments they belong to.
//!
//! Every operation takes a [`Practice`] handle. Operations whose outcome
//! depends on the current time take `now` explicitly.

pub mod appointments;
pub mod availability;
pub mod booking;
pub mod clients;
pub mod dashboard;
pub mod error;
pub mod invoices;
pub mod meeting;
pub mod notes;
pub mod notifications;

pub use error::{ServiceError, ServiceResult};
pub use notifications::{LogMailer, Mailer, MemoryMailer};

use std::sync::Arc;

use chrono::FixedOffset;
use tokio::sync::Mutex;

use crate::config::PracticeConfig;
use crate::db::repository::FullRepository;

/// Shared handle to the repository, configuration and mailer.
#[derive(Clone)]
pub struct Practice {
    repo: Arc<dyn FullRepository>,
    config: Arc<PracticeConfig>,
    mailer: Arc<dyn Mailer>,
    /// Held for a whole dispatch run so overlapping runs cannot send the
    /// same pending email twice.
    dispatch: Arc<Mutex<()>>,
}

impl Practice {
    /// Create a practice handle that logs outgoing emails.
    pub fn new(repo: Arc<dyn FullRepository>, config: PracticeConfig) -> Self {
        let mailer = Arc::new(LogMailer::new(config.notifications.from_address.clone()));
        Self {
            repo,
            config: Arc::new(config),
            mailer,
            dispatch: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = mailer;
        self
    }

    pub fn repo(&self) -> &dyn FullRepository {
        self.repo.as_ref()
    }

    pub fn config(&self) -> &PracticeConfig {
        &self.config
    }

    pub fn mailer(&self) -> &dyn Mailer {
        self.mailer.as_ref()
    }

    pub(crate) fn dispatch_lock(&self) -> &Mutex<()> {
        &self.dispatch
    }

    /// The practice's local UTC offset.
    pub fn offset(&self) -> FixedOffset {
        self.config.practice.offset()
    }
}
