use std::sync::Arc;

use report_core::model::{ReportDisplayOptions, UsageId};
use report_core::report::{
    HistoryColumn, HistoryRow, LatestAttemptRow, LatestColumn, ReportPage, SortKey,
};
use storage::repository::{AttemptRepository, QuestionStepRepository};
use tracing::debug;

use crate::error::ReportError;
use crate::report::query_builder::ReportQueryBuilder;

/// Executes report plans against storage and pages the results.
#[derive(Clone)]
pub struct ReportService {
    builder: ReportQueryBuilder,
    attempts: Arc<dyn AttemptRepository>,
    steps: Arc<dyn QuestionStepRepository>,
}

impl ReportService {
    #[must_use]
    pub fn new(
        builder: ReportQueryBuilder,
        attempts: Arc<dyn AttemptRepository>,
        steps: Arc<dyn QuestionStepRepository>,
    ) -> Self {
        Self {
            builder,
            attempts,
            steps,
        }
    }

    /// Latest answer state per attempt, filtered, sorted and sliced to `page`.
    ///
    /// A download request returns every row on a single page.
    ///
    /// # Errors
    ///
    /// Returns `ReportError` if the plan cannot be built or storage fails.
    pub async fn latest_page(
        &self,
        options: &ReportDisplayOptions,
        sort: Vec<SortKey<LatestColumn>>,
        page: usize,
    ) -> Result<ReportPage<LatestAttemptRow>, ReportError> {
        let plan = self.builder.build_latest_view_query(options, sort).await?;
        let attempts = self.attempts.list_attempts(&plan.filter).await?;
        let usages: Vec<UsageId> = attempts.iter().map(|a| a.usage_id()).collect();
        let steps = self.steps.steps_for_usages(&usages).await?;

        let rows = plan.evaluate(&attempts, &steps);
        debug!(
            attempts = attempts.len(),
            rows = rows.len(),
            "evaluated latest attempt report"
        );
        Ok(paginate(rows, page, options))
    }

    /// Every started step of the usage focused by `options`, with attempt
    /// numbers, sliced to `page`.
    ///
    /// An unknown usage yields an empty page.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::MissingUsage` if `options` has no usage id.
    /// Returns `ReportError::Storage` if the steps cannot be loaded.
    pub async fn history_page(
        &self,
        options: &ReportDisplayOptions,
        sort: Vec<SortKey<HistoryColumn>>,
        page: usize,
    ) -> Result<ReportPage<HistoryRow>, ReportError> {
        let usage_id = options.usage_id().ok_or(ReportError::MissingUsage)?;
        let plan = self.builder.build_history_query(usage_id, sort);
        let steps = self.steps.steps_for_usages(&[usage_id]).await?;
        let rows = plan.evaluate(&steps);
        Ok(paginate(rows, page, options))
    }
}

fn paginate<T>(rows: Vec<T>, page: usize, options: &ReportDisplayOptions) -> ReportPage<T> {
    if options.download().is_none() {
        return ReportPage::slice(rows, page, options.page_size());
    }
    let total = rows.len();
    ReportPage {
        rows,
        total,
        page: 0,
        page_size: options.page_size(),
    }
}
