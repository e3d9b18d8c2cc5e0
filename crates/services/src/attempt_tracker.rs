use std::collections::BTreeMap;
use std::sync::Arc;

use report_core::model::{
    ContextError, ContextId, ContextLevel, CourseAttemptEntry, TrackedContext,
};
use storage::repository::{AttemptCacheStore, AttemptRepository, CourseStructure, StorageError};
use tracing::debug;

use crate::error::TrackerError;

/// Answers "does this course or activity have any attempts?" from a per-course
/// cache entry, rebuilding or patching the entry whenever it is missing,
/// legacy-shaped or lacks the activity asked about.
///
/// The attempt store stays authoritative. Concurrent rebuilds and patches may
/// interleave; a lost update only leaves the entry stale until the next
/// change or lazy repair touches it.
#[derive(Clone)]
pub struct AttemptTracker {
    contexts: Arc<dyn CourseStructure>,
    attempts: Arc<dyn AttemptRepository>,
    cache: Arc<dyn AttemptCacheStore>,
}

impl AttemptTracker {
    #[must_use]
    pub fn new(
        contexts: Arc<dyn CourseStructure>,
        attempts: Arc<dyn AttemptRepository>,
        cache: Arc<dyn AttemptCacheStore>,
    ) -> Self {
        Self {
            contexts,
            attempts,
            cache,
        }
    }

    /// Whether the course (including its activities) or the activity has attempts.
    ///
    /// May write to the cache as a side effect.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::UnsupportedContext` for contexts other than
    /// courses and activities, or an activity without a course.
    /// Returns `TrackerError::Storage` if a store fails.
    pub async fn has_attempt(&self, context_id: ContextId) -> Result<bool, TrackerError> {
        match self.classify(context_id).await? {
            TrackedContext::Course(course) => {
                let entry = self.entry_or_rebuild(course).await?;
                Ok(entry.any())
            }
            TrackedContext::Activity(activity) => {
                let course = self.course_of(activity).await?;
                let entry = self.entry_or_rebuild(course).await?;
                match entry.activity(activity) {
                    Some(flag) => Ok(flag),
                    None => self.patch_activity(course, activity).await,
                }
            }
        }
    }

    /// Recompute the course entry from the attempt store, replacing any prior entry.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::UnsupportedContext` if `course` is not a course.
    /// Returns `TrackerError::Storage` if a store fails.
    pub async fn rebuild_course(
        &self,
        course: ContextId,
    ) -> Result<CourseAttemptEntry, TrackerError> {
        match self.classify(course).await? {
            TrackedContext::Course(course) => self.rebuild(course).await,
            TrackedContext::Activity(activity) => Err(ContextError::Untracked {
                id: activity,
                level: ContextLevel::Activity,
            }
            .into()),
        }
    }

    /// Bring the cache in line after attempts under `context_id` were added or removed.
    ///
    /// A course is rebuilt. An activity only has its own flag patched, unless the
    /// course entry is unusable, in which case the course is rebuilt.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::UnsupportedContext` for contexts other than
    /// courses and activities.
    /// Returns `TrackerError::Storage` if a store fails.
    pub async fn on_attempts_changed(&self, context_id: ContextId) -> Result<(), TrackerError> {
        match self.classify(context_id).await? {
            TrackedContext::Course(course) => {
                self.rebuild(course).await?;
            }
            TrackedContext::Activity(activity) => {
                let course = self.course_of(activity).await?;
                if self.cached_entry(course).await?.is_some() {
                    self.patch_activity(course, activity).await?;
                } else {
                    self.rebuild(course).await?;
                }
            }
        }
        Ok(())
    }

    /// Activities of `course` currently known to have attempts, in id order.
    ///
    /// Activities the entry does not know yet are checked and patched first.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::UnsupportedContext` if `course` is not a course.
    /// Returns `TrackerError::Storage` if a store fails.
    pub async fn activities_with_attempts(
        &self,
        course: ContextId,
    ) -> Result<Vec<ContextId>, TrackerError> {
        let TrackedContext::Course(course) = self.classify(course).await? else {
            return Err(ContextError::Untracked {
                id: course,
                level: ContextLevel::Activity,
            }
            .into());
        };

        let mut entry = self.entry_or_rebuild(course).await?;
        let activities = self.contexts.list_activity_contexts(course).await?;
        for activity in activities {
            if entry.activity(activity).is_none() {
                let flag = self.patch_activity(course, activity).await?;
                entry.set_activity(activity, flag);
            }
        }
        Ok(entry.activities_with_attempts())
    }

    /// The course's current entry, or `None` when missing or legacy-shaped.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::Storage` if the cache store fails.
    pub async fn cached_entry(
        &self,
        course: ContextId,
    ) -> Result<Option<CourseAttemptEntry>, TrackerError> {
        let stored = self.cache.get_entry(course).await?;
        Ok(stored.and_then(|entry| entry.into_valid()))
    }

    // ─── internals ────────────────────────────────────────────────────────────

    async fn classify(&self, context_id: ContextId) -> Result<TrackedContext, TrackerError> {
        let context = self.contexts.get_context(context_id).await?;
        Ok(TrackedContext::try_from(&context)?)
    }

    async fn course_of(&self, activity: ContextId) -> Result<ContextId, TrackerError> {
        match self.contexts.parent_course(activity).await {
            Ok(course) => Ok(course),
            Err(StorageError::NotFound) => Err(ContextError::MissingCourse(activity).into()),
            Err(e) => Err(e.into()),
        }
    }

    async fn entry_or_rebuild(
        &self,
        course: ContextId,
    ) -> Result<CourseAttemptEntry, TrackerError> {
        match self.cached_entry(course).await? {
            Some(entry) => Ok(entry),
            None => self.rebuild(course).await,
        }
    }

    async fn rebuild(&self, course: ContextId) -> Result<CourseAttemptEntry, TrackerError> {
        let activities = self.contexts.list_activity_contexts(course).await?;
        let counts = self.attempts.count_attempts_grouped(&activities).await?;
        let subcontext: BTreeMap<ContextId, bool> = activities
            .iter()
            .map(|id| (*id, counts.get(id).copied().unwrap_or(0) > 0))
            .collect();
        let value = self.attempts.count_attempts(course).await? > 0;

        let entry = CourseAttemptEntry::new(value, subcontext);
        self.cache.set_entry(course, &entry).await?;
        debug!(
            course = %course,
            activities = entry.subcontext.len(),
            value,
            "rebuilt attempt cache entry"
        );
        Ok(entry)
    }

    /// Live check of one activity, written into the freshest entry for its course.
    async fn patch_activity(
        &self,
        course: ContextId,
        activity: ContextId,
    ) -> Result<bool, TrackerError> {
        let has_attempts = self.attempts.count_attempts(activity).await? > 0;

        // Re-read so a rebuild that landed since our last read keeps its `value`.
        match self.cached_entry(course).await? {
            Some(mut fresh) => {
                fresh.set_activity(activity, has_attempts);
                self.cache.set_entry(course, &fresh).await?;
                debug!(course = %course, activity = %activity, has_attempts, "patched attempt cache entry");
            }
            None => {
                self.rebuild(course).await?;
            }
        }
        Ok(has_attempts)
    }
}
