//! Application state for the HTTP server.

use std::sync::Arc;

use crate::config::PracticeConfig;
use crate::db::repository::FullRepository;
use crate::services::Practice;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub practice: Practice,
}

impl AppState {
    pub fn new(practice: Practice) -> Self {
        Self { practice }
    }

    /// State over `repository` with a logging mailer.
    pub fn from_parts(repository: Arc<dyn FullRepository>, config: PracticeConfig) -> Self {
        Self::new(Practice::new(repository, config))
    }

    pub fn admin_token(&self) -> &str {
        &self.practice.config().admin.api_token
    }
}
