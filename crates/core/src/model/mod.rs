mod attempt;
mod cache_entry;
mod context;
mod display_options;
mod ids;
mod step;

pub use attempt::{Attempt, AttemptError, EmbedLocation, NewAttempt};
pub use cache_entry::{CourseAttemptEntry, StoredEntry};
pub use context::{Context, ContextError, ContextLevel, ContextPath, TrackedContext};
pub use display_options::{
    DisplayField, DisplayOptionsError, DisplayOptionsErrors, DisplayOptionsSource,
    DownloadFormat, FieldError, FilterForm, PageSize, ReportDisplayOptions, ReportScope,
    TemporalFilter, UrlParams,
};
pub use ids::{
    AttemptId, ContextId, GroupId, ParseIdError, QuestionAttemptId, StepId, UsageId, UserId,
};
pub use step::{QuestionStep, StepState};
