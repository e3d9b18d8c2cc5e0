use async_trait::async_trait;
use chrono::{DateTime, Utc};
use report_core::model::{
    Attempt, AttemptId, Context, ContextId, ContextLevel, CourseAttemptEntry, EmbedLocation,
    GroupId, NewAttempt, PageSize, QuestionStep, StoredEntry, UsageId, UserId,
};
use report_core::report::AttemptFilter;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── CONTRACTS ─────────────────────────────────────────────────────────────────
//

/// The attempt record store: one row per (user, context, embed location).
#[async_trait]
pub trait AttemptRepository: Send + Sync {
    /// Number of attempts attached directly to `context_id`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn count_attempts(&self, context_id: ContextId) -> Result<u64, StorageError>;

    /// Attempt counts per context for exactly the given ids.
    ///
    /// Contexts without attempts may be absent from the result.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn count_attempts_grouped(
        &self,
        context_ids: &BTreeSet<ContextId>,
    ) -> Result<HashMap<ContextId, u64>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn find_attempt(
        &self,
        user_id: UserId,
        context_id: ContextId,
        embed: &EmbedLocation,
    ) -> Result<Option<Attempt>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn find_by_usage(&self, usage_id: UsageId) -> Result<Option<Attempt>, StorageError>;

    /// Insert a new attempt and return it with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the (user, context, embed) row exists.
    async fn insert_attempt(&self, attempt: NewAttempt) -> Result<Attempt, StorageError>;

    /// Move an attempt's modified time forward.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the attempt does not exist.
    async fn touch_attempt(&self, id: AttemptId, at: DateTime<Utc>) -> Result<(), StorageError>;

    /// Delete a usage's steps and its attempt row in one transaction.
    ///
    /// Returns the contexts whose attempts changed; empty if nothing matched.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures; nothing is deleted then.
    async fn delete_attempts_by_usage(
        &self,
        usage_id: UsageId,
    ) -> Result<Vec<ContextId>, StorageError>;

    /// Delete every attempt attached to `context_id` together with its steps.
    ///
    /// Returns the usages that were removed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures; nothing is deleted then.
    async fn delete_attempts(&self, context_id: ContextId) -> Result<Vec<UsageId>, StorageError>;

    /// Attempts matching `filter`, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_attempts(&self, filter: &AttemptFilter) -> Result<Vec<Attempt>, StorageError>;
}

/// Step storage owned by the question engine.
#[async_trait]
pub trait QuestionStepRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the step id is taken.
    async fn append_step(&self, step: &QuestionStep) -> Result<(), StorageError>;

    /// All steps of the given usages, ordered by step id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn steps_for_usages(
        &self,
        usage_ids: &[UsageId],
    ) -> Result<Vec<QuestionStep>, StorageError>;
}

/// Read access to the platform's context tree.
#[async_trait]
pub trait CourseStructure: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for unknown ids.
    async fn get_context(&self, id: ContextId) -> Result<Context, StorageError>;

    /// Nearest course-level ancestor of `activity`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` when there is none.
    async fn parent_course(&self, activity: ContextId) -> Result<ContextId, StorageError>;

    /// Activity contexts inside the course.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_activity_contexts(
        &self,
        course: ContextId,
    ) -> Result<BTreeSet<ContextId>, StorageError>;
}

/// Enrolment and capability check, resolved to the set of reportable users.
#[async_trait]
pub trait EnrolmentDirectory: Send + Sync {
    /// Users enrolled in the course containing `context`, optionally limited to one group.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn enrolled_users(
        &self,
        context: ContextId,
        group: Option<GroupId>,
    ) -> Result<BTreeSet<UserId>, StorageError>;
}

/// Shared key-value store for per-course attempt flags. Entries never expire.
#[async_trait]
pub trait AttemptCacheStore: Send + Sync {
    /// Raw stored shape, which may be a legacy entry.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_entry(&self, course: ContextId) -> Result<Option<StoredEntry>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn set_entry(
        &self,
        course: ContextId,
        entry: &CourseAttemptEntry,
    ) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn delete_entry(&self, course: ContextId) -> Result<(), StorageError>;
}

#[async_trait]
pub trait PreferenceRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn page_size(&self, user: UserId) -> Result<Option<PageSize>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn set_page_size(&self, user: UserId, size: PageSize) -> Result<(), StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

#[derive(Default)]
struct MemoryState {
    contexts: HashMap<ContextId, Context>,
    enrolments: HashMap<ContextId, BTreeSet<UserId>>,
    groups: HashMap<GroupId, BTreeSet<UserId>>,
    attempts: HashMap<AttemptId, Attempt>,
    next_attempt_id: u64,
    steps: Vec<QuestionStep>,
    cache: HashMap<ContextId, StoredEntry>,
    page_sizes: HashMap<UserId, PageSize>,
}

impl MemoryState {
    fn course_of(&self, context: ContextId) -> Option<ContextId> {
        let mut current = self.contexts.get(&context)?;
        loop {
            if current.level() == ContextLevel::Course {
                return Some(current.id());
            }
            current = self.contexts.get(&current.parent()?)?;
        }
    }

    fn remove_usage(&mut self, usage_id: UsageId) {
        self.steps.retain(|s| s.usage_id != usage_id);
    }
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    /// Register or replace a context.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn add_context(&self, context: Context) -> Result<(), StorageError> {
        self.lock()?.contexts.insert(context.id(), context);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn enrol(&self, course: ContextId, user: UserId) -> Result<(), StorageError> {
        self.lock()?.enrolments.entry(course).or_default().insert(user);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn add_group_member(&self, group: GroupId, user: UserId) -> Result<(), StorageError> {
        self.lock()?.groups.entry(group).or_default().insert(user);
        Ok(())
    }

    /// Store a cache value verbatim, including legacy shapes.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn put_raw_entry(&self, course: ContextId, entry: StoredEntry) -> Result<(), StorageError> {
        self.lock()?.cache.insert(course, entry);
        Ok(())
    }
}

#[async_trait]
impl AttemptRepository for InMemoryRepository {
    async fn count_attempts(&self, context_id: ContextId) -> Result<u64, StorageError> {
        let guard = self.lock()?;
        let count = guard
            .attempts
            .values()
            .filter(|a| a.context_id() == context_id)
            .count();
        Ok(count as u64)
    }

    async fn count_attempts_grouped(
        &self,
        context_ids: &BTreeSet<ContextId>,
    ) -> Result<HashMap<ContextId, u64>, StorageError> {
        let guard = self.lock()?;
        let mut counts = HashMap::new();
        for attempt in guard.attempts.values() {
            if context_ids.contains(&attempt.context_id()) {
                *counts.entry(attempt.context_id()).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn find_attempt(
        &self,
        user_id: UserId,
        context_id: ContextId,
        embed: &EmbedLocation,
    ) -> Result<Option<Attempt>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .attempts
            .values()
            .find(|a| a.user_id() == user_id && a.context_id() == context_id && a.embed() == embed)
            .cloned())
    }

    async fn find_by_usage(&self, usage_id: UsageId) -> Result<Option<Attempt>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .attempts
            .values()
            .find(|a| a.usage_id() == usage_id)
            .cloned())
    }

    async fn insert_attempt(&self, attempt: NewAttempt) -> Result<Attempt, StorageError> {
        let mut guard = self.lock()?;
        let duplicate = guard.attempts.values().any(|a| {
            a.user_id() == attempt.user_id
                && a.context_id() == attempt.context_id
                && a.embed() == &attempt.embed
        });
        if duplicate {
            return Err(StorageError::Conflict);
        }
        guard.next_attempt_id += 1;
        let id = AttemptId::new(guard.next_attempt_id);
        let stored = Attempt::from_new(id, attempt);
        guard.attempts.insert(id, stored.clone());
        Ok(stored)
    }

    async fn touch_attempt(&self, id: AttemptId, at: DateTime<Utc>) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let attempt = guard.attempts.get_mut(&id).ok_or(StorageError::NotFound)?;
        attempt.touch(at);
        Ok(())
    }

    async fn delete_attempts_by_usage(
        &self,
        usage_id: UsageId,
    ) -> Result<Vec<ContextId>, StorageError> {
        let mut guard = self.lock()?;
        let mut contexts = Vec::new();
        guard.attempts.retain(|_, a| {
            if a.usage_id() == usage_id {
                contexts.push(a.context_id());
                false
            } else {
                true
            }
        });
        guard.remove_usage(usage_id);
        Ok(contexts)
    }

    async fn delete_attempts(&self, context_id: ContextId) -> Result<Vec<UsageId>, StorageError> {
        let mut guard = self.lock()?;
        let mut usages = Vec::new();
        guard.attempts.retain(|_, a| {
            if a.context_id() == context_id {
                usages.push(a.usage_id());
                false
            } else {
                true
            }
        });
        for usage in &usages {
            guard.remove_usage(*usage);
        }
        usages.sort();
        Ok(usages)
    }

    async fn list_attempts(&self, filter: &AttemptFilter) -> Result<Vec<Attempt>, StorageError> {
        let guard = self.lock()?;
        let mut out: Vec<Attempt> = guard
            .attempts
            .values()
            .filter(|a| {
                guard
                    .contexts
                    .get(&a.context_id())
                    .is_some_and(|ctx| filter.matches(a, ctx.path()))
            })
            .cloned()
            .collect();
        out.sort_by_key(Attempt::id);
        Ok(out)
    }
}

#[async_trait]
impl QuestionStepRepository for InMemoryRepository {
    async fn append_step(&self, step: &QuestionStep) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        if guard.steps.iter().any(|s| s.id == step.id) {
            return Err(StorageError::Conflict);
        }
        guard.steps.push(step.clone());
        Ok(())
    }

    async fn steps_for_usages(
        &self,
        usage_ids: &[UsageId],
    ) -> Result<Vec<QuestionStep>, StorageError> {
        let guard = self.lock()?;
        let mut out: Vec<QuestionStep> = guard
            .steps
            .iter()
            .filter(|s| usage_ids.contains(&s.usage_id))
            .cloned()
            .collect();
        out.sort_by_key(|s| s.id);
        Ok(out)
    }
}

#[async_trait]
impl CourseStructure for InMemoryRepository {
    async fn get_context(&self, id: ContextId) -> Result<Context, StorageError> {
        let guard = self.lock()?;
        guard.contexts.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn parent_course(&self, activity: ContextId) -> Result<ContextId, StorageError> {
        let guard = self.lock()?;
        let parent = guard
            .contexts
            .get(&activity)
            .and_then(Context::parent)
            .ok_or(StorageError::NotFound)?;
        guard.course_of(parent).ok_or(StorageError::NotFound)
    }

    async fn list_activity_contexts(
        &self,
        course: ContextId,
    ) -> Result<BTreeSet<ContextId>, StorageError> {
        let guard = self.lock()?;
        let root = guard
            .contexts
            .get(&course)
            .ok_or(StorageError::NotFound)?
            .path()
            .clone();
        Ok(guard
            .contexts
            .values()
            .filter(|c| c.level() == ContextLevel::Activity && c.path().is_within(&root))
            .map(Context::id)
            .collect())
    }
}

#[async_trait]
impl EnrolmentDirectory for InMemoryRepository {
    async fn enrolled_users(
        &self,
        context: ContextId,
        group: Option<GroupId>,
    ) -> Result<BTreeSet<UserId>, StorageError> {
        let guard = self.lock()?;
        let course = guard.course_of(context).ok_or(StorageError::NotFound)?;
        let enrolled = guard.enrolments.get(&course).cloned().unwrap_or_default();
        Ok(match group {
            None => enrolled,
            Some(group) => {
                let members = guard.groups.get(&group).cloned().unwrap_or_default();
                enrolled.intersection(&members).copied().collect()
            }
        })
    }
}

#[async_trait]
impl AttemptCacheStore for InMemoryRepository {
    async fn get_entry(&self, course: ContextId) -> Result<Option<StoredEntry>, StorageError> {
        Ok(self.lock()?.cache.get(&course).cloned())
    }

    async fn set_entry(
        &self,
        course: ContextId,
        entry: &CourseAttemptEntry,
    ) -> Result<(), StorageError> {
        self.lock()?
            .cache
            .insert(course, StoredEntry::Valid(entry.clone()));
        Ok(())
    }

    async fn delete_entry(&self, course: ContextId) -> Result<(), StorageError> {
        self.lock()?.cache.remove(&course);
        Ok(())
    }
}

#[async_trait]
impl PreferenceRepository for InMemoryRepository {
    async fn page_size(&self, user: UserId) -> Result<Option<PageSize>, StorageError> {
        Ok(self.lock()?.page_sizes.get(&user).copied())
    }

    async fn set_page_size(&self, user: UserId, size: PageSize) -> Result<(), StorageError> {
        self.lock()?.page_sizes.insert(user, size);
        Ok(())
    }
}

/// Aggregates the repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub attempts: Arc<dyn AttemptRepository>,
    pub steps: Arc<dyn QuestionStepRepository>,
    pub contexts: Arc<dyn CourseStructure>,
    pub enrolments: Arc<dyn EnrolmentDirectory>,
    pub cache: Arc<dyn AttemptCacheStore>,
    pub preferences: Arc<dyn PreferenceRepository>,
}

impl Storage {
    /// Every repository backed by the same in-memory state.
    #[must_use]
    pub fn from_memory(repo: &InMemoryRepository) -> Self {
        Self {
            attempts: Arc::new(repo.clone()),
            steps: Arc::new(repo.clone()),
            contexts: Arc::new(repo.clone()),
            enrolments: Arc::new(repo.clone()),
            cache: Arc::new(repo.clone()),
            preferences: Arc::new(repo.clone()),
        }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_memory(&InMemoryRepository::new())
    }
}
