use std::collections::BTreeSet;

use crate::model::{Attempt, ContextId, ContextPath, UsageId, UserId};
use crate::report::sort::SortKey;
use crate::report::window::TimeWindow;

/// Which contexts' attempts are in scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextScope {
    /// Exactly one activity context.
    Activity(ContextId),
    /// A course context and everything beneath its path.
    CourseTree { course: ContextId, path: ContextPath },
}

impl ContextScope {
    #[must_use]
    pub fn matches(&self, context_id: ContextId, path: &ContextPath) -> bool {
        match self {
            ContextScope::Activity(id) => *id == context_id,
            ContextScope::CourseTree { path: root, .. } => path.is_within(root),
        }
    }
}

/// Learners whose attempts may appear.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserFilter {
    /// Users passing the enrolment, capability and group check.
    pub enrolled: BTreeSet<UserId>,
    pub single: Option<UserId>,
}

impl UserFilter {
    #[must_use]
    pub fn allows(&self, user: UserId) -> bool {
        self.enrolled.contains(&user) && self.single.is_none_or(|only| only == user)
    }
}

/// Attempt-row predicate the store can evaluate before steps are loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFilter {
    pub context: ContextScope,
    pub users: UserFilter,
    /// Exact context ids; empty means no location restriction.
    pub locations: BTreeSet<ContextId>,
}

impl AttemptFilter {
    /// `path` is the materialised path of the attempt's own context.
    #[must_use]
    pub fn matches(&self, attempt: &Attempt, path: &ContextPath) -> bool {
        self.context.matches(attempt.context_id(), path)
            && self.users.allows(attempt.user_id())
            && (self.locations.is_empty() || self.locations.contains(&attempt.context_id()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LatestColumn {
    User,
    Location,
    PageName,
    Embed,
    State,
    Fraction,
    LastAttempt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HistoryColumn {
    AttemptNumber,
    Time,
    State,
    Fraction,
}

/// Read plan for the latest-attempt summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestViewPlan {
    pub filter: AttemptFilter,
    /// Applied to the timestamp of the selected latest step.
    pub window: TimeWindow,
    pub sort: Vec<SortKey<LatestColumn>>,
}

/// Read plan for every step of one question usage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryPlan {
    pub usage_id: UsageId,
    pub sort: Vec<SortKey<HistoryColumn>>,
}
