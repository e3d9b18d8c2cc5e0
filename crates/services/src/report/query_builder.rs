use std::sync::Arc;

use report_core::Clock;
use report_core::model::{ReportDisplayOptions, ReportScope, UsageId};
use report_core::report::{
    AttemptFilter, ContextScope, HistoryColumn, HistoryPlan, LatestColumn, LatestViewPlan,
    SortKey, UserFilter,
};
use storage::repository::{CourseStructure, EnrolmentDirectory};

use crate::error::ReportError;

/// Turns validated display options into store-agnostic read plans.
#[derive(Clone)]
pub struct ReportQueryBuilder {
    clock: Clock,
    contexts: Arc<dyn CourseStructure>,
    enrolments: Arc<dyn EnrolmentDirectory>,
}

impl ReportQueryBuilder {
    #[must_use]
    pub fn new(
        clock: Clock,
        contexts: Arc<dyn CourseStructure>,
        enrolments: Arc<dyn EnrolmentDirectory>,
    ) -> Self {
        Self {
            clock,
            contexts,
            enrolments,
        }
    }

    /// Plan for the latest answer state of each attempt in scope.
    ///
    /// Lookback windows are anchored at the builder's clock.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::Storage` if the scope context or the enrolled
    /// users cannot be loaded.
    pub async fn build_latest_view_query(
        &self,
        options: &ReportDisplayOptions,
        sort: Vec<SortKey<LatestColumn>>,
    ) -> Result<LatestViewPlan, ReportError> {
        let (context, scope_id) = match options.scope() {
            ReportScope::Activity { activity, .. } => (ContextScope::Activity(activity), activity),
            ReportScope::Course(course) => {
                let root = self.contexts.get_context(course).await?;
                (
                    ContextScope::CourseTree {
                        course,
                        path: root.path().clone(),
                    },
                    course,
                )
            }
        };

        let enrolled = self
            .enrolments
            .enrolled_users(scope_id, options.group())
            .await?;

        Ok(LatestViewPlan {
            filter: AttemptFilter {
                context,
                users: UserFilter {
                    enrolled,
                    single: options.user(),
                },
                locations: options.locations().clone(),
            },
            window: options.temporal().window(self.clock.now()),
            sort,
        })
    }

    /// Plan for every started step of one question usage.
    #[must_use]
    pub fn build_history_query(
        &self,
        usage_id: UsageId,
        sort: Vec<SortKey<HistoryColumn>>,
    ) -> HistoryPlan {
        HistoryPlan { usage_id, sort }
    }
}
