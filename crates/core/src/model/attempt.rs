use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use url::Url;

use crate::model::ids::{AttemptId, ContextId, UsageId, UserId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AttemptError {
    #[error("embed location cannot be empty")]
    EmptyEmbedLocation,

    #[error("invalid page URL: {0}")]
    InvalidPageUrl(String),

    #[error("modified time precedes creation time")]
    ModifiedBeforeCreated,
}

//
// ─── EMBED LOCATION ────────────────────────────────────────────────────────────
//

/// Opaque identifier of one embedded question placement.
///
/// Typically `<question idnumber>/<embed id>`, but the tracker never parses it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EmbedLocation(String);

impl EmbedLocation {
    /// # Errors
    ///
    /// Returns `AttemptError::EmptyEmbedLocation` for blank input.
    pub fn new(raw: impl Into<String>) -> Result<Self, AttemptError> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AttemptError::EmptyEmbedLocation);
        }
        Ok(Self(trimmed.to_owned()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmbedLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

//
// ─── ATTEMPT ───────────────────────────────────────────────────────────────────
//

/// Attempt row to be inserted; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAttempt {
    pub context_id: ContextId,
    pub user_id: UserId,
    pub embed: EmbedLocation,
    pub usage_id: UsageId,
    pub page_url: String,
    pub page_name: String,
    pub created_at: DateTime<Utc>,
}

impl NewAttempt {
    /// Checks the page URL before the row reaches storage.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::InvalidPageUrl` if the URL does not parse.
    pub fn validate(self) -> Result<Self, AttemptError> {
        Url::parse(&self.page_url).map_err(|_| AttemptError::InvalidPageUrl(self.page_url.clone()))?;
        Ok(self)
    }
}

/// One learner's record of interacting with one embed location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    id: AttemptId,
    context_id: ContextId,
    user_id: UserId,
    embed: EmbedLocation,
    usage_id: UsageId,
    page_url: String,
    page_name: String,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
}

impl Attempt {
    #[must_use]
    pub fn from_new(id: AttemptId, new: NewAttempt) -> Self {
        Self {
            id,
            context_id: new.context_id,
            user_id: new.user_id,
            embed: new.embed,
            usage_id: new.usage_id,
            page_url: new.page_url,
            page_name: new.page_name,
            created_at: new.created_at,
            modified_at: new.created_at,
        }
    }

    /// Rehydrate a stored attempt.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::ModifiedBeforeCreated` when timestamps are inverted.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: AttemptId,
        context_id: ContextId,
        user_id: UserId,
        embed: EmbedLocation,
        usage_id: UsageId,
        page_url: String,
        page_name: String,
        created_at: DateTime<Utc>,
        modified_at: DateTime<Utc>,
    ) -> Result<Self, AttemptError> {
        if modified_at < created_at {
            return Err(AttemptError::ModifiedBeforeCreated);
        }
        Ok(Self {
            id,
            context_id,
            user_id,
            embed,
            usage_id,
            page_url,
            page_name,
            created_at,
            modified_at,
        })
    }

    #[must_use]
    pub fn id(&self) -> AttemptId {
        self.id
    }

    #[must_use]
    pub fn context_id(&self) -> ContextId {
        self.context_id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn embed(&self) -> &EmbedLocation {
        &self.embed
    }

    #[must_use]
    pub fn usage_id(&self) -> UsageId {
        self.usage_id
    }

    #[must_use]
    pub fn page_url(&self) -> &str {
        &self.page_url
    }

    #[must_use]
    pub fn page_name(&self) -> &str {
        &self.page_name
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn modified_at(&self) -> DateTime<Utc> {
        self.modified_at
    }

    /// Record a later interaction; only the modified time moves.
    pub fn touch(&mut self, at: DateTime<Utc>) {
        if at > self.modified_at {
            self.modified_at = at;
        }
    }
}
