use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::model::ids::ContextId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ContextError {
    #[error("context {id} has level {level}; only course and activity contexts are tracked")]
    Untracked { id: ContextId, level: ContextLevel },

    #[error("activity context {0} has no parent course")]
    MissingCourse(ContextId),

    #[error("invalid context path: {0}")]
    InvalidPath(String),

    #[error("unknown context level: {0}")]
    UnknownLevel(String),
}

//
// ─── LEVEL ─────────────────────────────────────────────────────────────────────
//

/// Depth class of a context in the platform hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextLevel {
    System,
    Category,
    Course,
    Activity,
    Block,
    User,
}

impl ContextLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ContextLevel::System => "system",
            ContextLevel::Category => "category",
            ContextLevel::Course => "course",
            ContextLevel::Activity => "activity",
            ContextLevel::Block => "block",
            ContextLevel::User => "user",
        }
    }

    /// Parses the storage representation produced by [`ContextLevel::as_str`].
    ///
    /// # Errors
    ///
    /// Returns `ContextError::UnknownLevel` for any other string.
    pub fn parse(s: &str) -> Result<Self, ContextError> {
        match s {
            "system" => Ok(ContextLevel::System),
            "category" => Ok(ContextLevel::Category),
            "course" => Ok(ContextLevel::Course),
            "activity" => Ok(ContextLevel::Activity),
            "block" => Ok(ContextLevel::Block),
            "user" => Ok(ContextLevel::User),
            other => Err(ContextError::UnknownLevel(other.to_owned())),
        }
    }
}

impl fmt::Display for ContextLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── PATH ──────────────────────────────────────────────────────────────────────
//

/// Materialised ancestry of a context, e.g. `/1/3/15`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextPath(String);

impl ContextPath {
    /// Builds a path from the ordered list of ancestor ids, root first.
    ///
    /// # Errors
    ///
    /// Returns `ContextError::InvalidPath` when `ids` is empty.
    pub fn from_ids(ids: &[ContextId]) -> Result<Self, ContextError> {
        if ids.is_empty() {
            return Err(ContextError::InvalidPath(String::new()));
        }
        let mut path = String::new();
        for id in ids {
            path.push('/');
            path.push_str(&id.to_string());
        }
        Ok(Self(path))
    }

    /// Parses a stored `/a/b/c` path.
    ///
    /// # Errors
    ///
    /// Returns `ContextError::InvalidPath` if any segment is not a context id.
    pub fn parse(raw: &str) -> Result<Self, ContextError> {
        let segments = raw
            .strip_prefix('/')
            .ok_or_else(|| ContextError::InvalidPath(raw.to_owned()))?;
        let ids = segments
            .split('/')
            .map(|seg| seg.parse::<ContextId>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| ContextError::InvalidPath(raw.to_owned()))?;
        Self::from_ids(&ids)
    }

    /// Appends a child id.
    #[must_use]
    pub fn child(&self, id: ContextId) -> Self {
        Self(format!("{}/{}", self.0, id))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when `self` is `ancestor` or lies beneath it.
    #[must_use]
    pub fn is_within(&self, ancestor: &ContextPath) -> bool {
        self.0 == ancestor.0
            || (self.0.starts_with(&ancestor.0)
                && self.0.as_bytes().get(ancestor.0.len()) == Some(&b'/'))
    }
}

impl fmt::Display for ContextPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

//
// ─── CONTEXT ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    id: ContextId,
    level: ContextLevel,
    parent: Option<ContextId>,
    path: ContextPath,
}

impl Context {
    #[must_use]
    pub fn new(
        id: ContextId,
        level: ContextLevel,
        parent: Option<ContextId>,
        path: ContextPath,
    ) -> Self {
        Self {
            id,
            level,
            parent,
            path,
        }
    }

    #[must_use]
    pub fn id(&self) -> ContextId {
        self.id
    }

    #[must_use]
    pub fn level(&self) -> ContextLevel {
        self.level
    }

    #[must_use]
    pub fn parent(&self) -> Option<ContextId> {
        self.parent
    }

    #[must_use]
    pub fn path(&self) -> &ContextPath {
        &self.path
    }
}

/// The two context kinds the attempt tracker understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackedContext {
    Course(ContextId),
    Activity(ContextId),
}

impl TrackedContext {
    #[must_use]
    pub fn id(self) -> ContextId {
        match self {
            TrackedContext::Course(id) | TrackedContext::Activity(id) => id,
        }
    }
}

impl TryFrom<&Context> for TrackedContext {
    type Error = ContextError;

    fn try_from(context: &Context) -> Result<Self, Self::Error> {
        match context.level {
            ContextLevel::Course => Ok(TrackedContext::Course(context.id)),
            ContextLevel::Activity => Ok(TrackedContext::Activity(context.id)),
            level => Err(ContextError::Untracked {
                id: context.id,
                level,
            }),
        }
    }
}
