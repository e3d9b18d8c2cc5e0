use std::sync::Arc;

use report_core::config::ReportDefaults;
use storage::repository::Storage;

use crate::attempt_service::AttemptService;
use crate::attempt_tracker::AttemptTracker;
use crate::error::ReportServicesError;
use crate::report::{DisplayOptionsService, ReportQueryBuilder, ReportService};
use crate::Clock;

/// Assembles the progress-report services over one storage backend.
#[derive(Clone)]
pub struct ReportServices {
    tracker: Arc<AttemptTracker>,
    attempts: Arc<AttemptService>,
    display_options: Arc<DisplayOptionsService>,
    reports: Arc<ReportService>,
}

impl ReportServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `ReportServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        defaults: ReportDefaults,
    ) -> Result<Self, ReportServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::from_storage(&storage, clock, defaults))
    }

    /// Wire every service to the repositories in `storage`.
    #[must_use]
    pub fn from_storage(storage: &Storage, clock: Clock, defaults: ReportDefaults) -> Self {
        let tracker = Arc::new(AttemptTracker::new(
            Arc::clone(&storage.contexts),
            Arc::clone(&storage.attempts),
            Arc::clone(&storage.cache),
        ));
        let attempts = Arc::new(AttemptService::new(
            Arc::clone(&storage.attempts),
            Arc::clone(&tracker),
        ));
        let display_options = Arc::new(DisplayOptionsService::new(
            defaults,
            Arc::clone(&storage.preferences),
            Arc::clone(&tracker),
        ));
        let builder = ReportQueryBuilder::new(
            clock,
            Arc::clone(&storage.contexts),
            Arc::clone(&storage.enrolments),
        );
        let reports = Arc::new(ReportService::new(
            builder,
            Arc::clone(&storage.attempts),
            Arc::clone(&storage.steps),
        ));

        Self {
            tracker,
            attempts,
            display_options,
            reports,
        }
    }

    #[must_use]
    pub fn tracker(&self) -> Arc<AttemptTracker> {
        Arc::clone(&self.tracker)
    }

    #[must_use]
    pub fn attempts(&self) -> Arc<AttemptService> {
        Arc::clone(&self.attempts)
    }

    #[must_use]
    pub fn display_options(&self) -> Arc<DisplayOptionsService> {
        Arc::clone(&self.display_options)
    }

    #[must_use]
    pub fn reports(&self) -> Arc<ReportService> {
        Arc::clone(&self.reports)
    }
}
