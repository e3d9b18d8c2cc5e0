use std::collections::BTreeSet;
use std::sync::Arc;

use report_core::model::{Attempt, ContextId, NewAttempt, UsageId};
use storage::repository::AttemptRepository;
use tracing::{info, warn};

use crate::attempt_tracker::AttemptTracker;
use crate::error::AttemptServiceError;

/// Records and removes attempts, then tells the tracker what changed.
///
/// Cache invalidation runs after the store has committed and is best-effort:
/// failures are logged and the next read of the course repairs the entry.
#[derive(Clone)]
pub struct AttemptService {
    attempts: Arc<dyn AttemptRepository>,
    tracker: Arc<AttemptTracker>,
}

impl AttemptService {
    #[must_use]
    pub fn new(attempts: Arc<dyn AttemptRepository>, tracker: Arc<AttemptTracker>) -> Self {
        Self { attempts, tracker }
    }

    /// Register an interaction with an embedded question.
    ///
    /// The first interaction for a (user, context, embed location) creates the
    /// attempt; later ones only move its modified time to `attempt.created_at`.
    ///
    /// # Errors
    ///
    /// Returns `AttemptServiceError::Attempt` if the page URL is invalid.
    /// Returns `AttemptServiceError::Storage` if persistence fails.
    pub async fn record_attempt(&self, attempt: NewAttempt) -> Result<Attempt, AttemptServiceError> {
        let attempt = attempt.validate()?;

        if let Some(mut existing) = self
            .attempts
            .find_attempt(attempt.user_id, attempt.context_id, &attempt.embed)
            .await?
        {
            self.attempts
                .touch_attempt(existing.id(), attempt.created_at)
                .await?;
            existing.touch(attempt.created_at);
            return Ok(existing);
        }

        let inserted = self.attempts.insert_attempt(attempt).await?;
        self.invalidate(inserted.context_id()).await;
        Ok(inserted)
    }

    /// Delete the attempt owning `usage_id` together with its steps.
    ///
    /// Returns the contexts that lost an attempt; empty when nothing matched.
    ///
    /// # Errors
    ///
    /// Returns `AttemptServiceError::Storage` if the deletion fails.
    pub async fn delete_by_usage(
        &self,
        usage_id: UsageId,
    ) -> Result<Vec<ContextId>, AttemptServiceError> {
        let contexts = self.attempts.delete_attempts_by_usage(usage_id).await?;
        info!(usage = %usage_id, contexts = contexts.len(), "deleted attempts by usage");

        let unique: BTreeSet<ContextId> = contexts.iter().copied().collect();
        for context in unique {
            self.invalidate(context).await;
        }
        Ok(contexts)
    }

    /// Delete every attempt attached to `context_id`.
    ///
    /// # Errors
    ///
    /// Returns `AttemptServiceError::Storage` if the deletion fails.
    pub async fn delete_context_attempts(
        &self,
        context_id: ContextId,
    ) -> Result<Vec<UsageId>, AttemptServiceError> {
        let usages = self.attempts.delete_attempts(context_id).await?;
        info!(context = %context_id, usages = usages.len(), "deleted context attempts");

        if !usages.is_empty() {
            self.invalidate(context_id).await;
        }
        Ok(usages)
    }

    async fn invalidate(&self, context_id: ContextId) {
        if let Err(err) = self.tracker.on_attempts_changed(context_id).await {
            warn!(context = %context_id, error = %err, "attempt cache invalidation failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;
    use report_core::model::{
        Context, ContextLevel, ContextPath, CourseAttemptEntry, EmbedLocation, StoredEntry,
        UserId,
    };
    use report_core::time::fixed_now;
    use storage::repository::{AttemptCacheStore, InMemoryRepository, StorageError};

    fn path(ids: &[u64]) -> ContextPath {
        let ids: Vec<_> = ids.iter().copied().map(ContextId::new).collect();
        ContextPath::from_ids(&ids).unwrap()
    }

    fn seeded() -> InMemoryRepository {
        let repo = InMemoryRepository::new();
        repo.add_context(Context::new(
            ContextId::new(3),
            ContextLevel::Course,
            None,
            path(&[3]),
        ))
        .unwrap();
        repo.add_context(Context::new(
            ContextId::new(15),
            ContextLevel::Activity,
            Some(ContextId::new(3)),
            path(&[3, 15]),
        ))
        .unwrap();
        repo
    }

    fn new_attempt(usage: u64) -> NewAttempt {
        NewAttempt {
            context_id: ContextId::new(15),
            user_id: UserId::new(5),
            embed: EmbedLocation::new("q1/e1").unwrap(),
            usage_id: UsageId::new(usage),
            page_url: "https://lms.example/mod/page/view.php?id=15".into(),
            page_name: "Week 1".into(),
            created_at: fixed_now(),
        }
    }

    fn service(repo: &InMemoryRepository, cache: Arc<dyn AttemptCacheStore>) -> AttemptService {
        let tracker = Arc::new(AttemptTracker::new(
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            cache,
        ));
        AttemptService::new(Arc::new(repo.clone()), tracker)
    }

    /// Cache store whose writes always fail.
    struct BrokenCache;

    #[async_trait]
    impl AttemptCacheStore for BrokenCache {
        async fn get_entry(&self, _: ContextId) -> Result<Option<StoredEntry>, StorageError> {
            Ok(None)
        }

        async fn set_entry(&self, _: ContextId, _: &CourseAttemptEntry) -> Result<(), StorageError> {
            Err(StorageError::Connection("cache offline".into()))
        }

        async fn delete_entry(&self, _: ContextId) -> Result<(), StorageError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn repeat_interaction_touches_instead_of_inserting() {
        let repo = seeded();
        let svc = service(&repo, Arc::new(repo.clone()));

        let first = svc.record_attempt(new_attempt(100)).await.unwrap();
        let mut again = new_attempt(101);
        again.created_at = fixed_now() + Duration::minutes(3);
        let second = svc.record_attempt(again).await.unwrap();

        assert_eq!(first.id(), second.id());
        assert_eq!(second.usage_id(), UsageId::new(100));
        assert_eq!(second.modified_at(), fixed_now() + Duration::minutes(3));
        assert_eq!(repo.count_attempts(ContextId::new(15)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn record_rejects_relative_page_url() {
        let repo = seeded();
        let svc = service(&repo, Arc::new(repo.clone()));
        let mut bad = new_attempt(100);
        bad.page_url = "view.php?id=15".into();
        assert!(matches!(
            svc.record_attempt(bad).await,
            Err(AttemptServiceError::Attempt(_))
        ));
    }

    #[tokio::test]
    async fn new_attempt_marks_activity_in_cache() {
        let repo = seeded();
        let svc = service(&repo, Arc::new(repo.clone()));

        svc.record_attempt(new_attempt(100)).await.unwrap();
        let stored = repo.get_entry(ContextId::new(3)).await.unwrap();
        let entry = stored.and_then(StoredEntry::into_valid).unwrap();
        assert_eq!(entry.activity(ContextId::new(15)), Some(true));
    }

    #[tokio::test]
    async fn invalidation_failure_does_not_fail_mutation() {
        let repo = seeded();
        let svc = service(&repo, Arc::new(BrokenCache));

        let attempt = svc.record_attempt(new_attempt(100)).await.unwrap();
        assert_eq!(attempt.usage_id(), UsageId::new(100));

        let contexts = svc.delete_by_usage(UsageId::new(100)).await.unwrap();
        assert_eq!(contexts, vec![ContextId::new(15)]);
        assert_eq!(repo.count_attempts(ContextId::new(15)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn deleting_unknown_usage_is_a_no_op() {
        let repo = seeded();
        let svc = service(&repo, Arc::new(repo.clone()));
        assert!(svc.delete_by_usage(UsageId::new(9)).await.unwrap().is_empty());
        assert!(
            svc.delete_context_attempts(ContextId::new(15))
                .await
                .unwrap()
                .is_empty()
        );
        assert_eq!(repo.get_entry(ContextId::new(3)).await.unwrap(), None);
    }
}
