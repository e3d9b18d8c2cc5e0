use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::ids::{QuestionAttemptId, StepId, UsageId, UserId};

/// Answer state recorded by the question engine on each step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepState {
    /// Initial step written when the question is first rendered.
    NotStarted,
    Todo,
    Invalid,
    Complete,
    NeedsGrading,
    Finished,
    GaveUp,
    GradedWrong,
    GradedPartial,
    GradedRight,
}

impl StepState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            StepState::NotStarted => "notstarted",
            StepState::Todo => "todo",
            StepState::Invalid => "invalid",
            StepState::Complete => "complete",
            StepState::NeedsGrading => "needsgrading",
            StepState::Finished => "finished",
            StepState::GaveUp => "gaveup",
            StepState::GradedWrong => "gradedwrong",
            StepState::GradedPartial => "gradedpartial",
            StepState::GradedRight => "gradedright",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "notstarted" => StepState::NotStarted,
            "todo" => StepState::Todo,
            "invalid" => StepState::Invalid,
            "complete" => StepState::Complete,
            "needsgrading" => StepState::NeedsGrading,
            "finished" => StepState::Finished,
            "gaveup" => StepState::GaveUp,
            "gradedwrong" => StepState::GradedWrong,
            "gradedpartial" => StepState::GradedPartial,
            "gradedright" => StepState::GradedRight,
            _ => return None,
        })
    }

    #[must_use]
    pub fn is_started(self) -> bool {
        self != StepState::NotStarted
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded step of a question attempt inside a usage.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionStep {
    pub id: StepId,
    pub usage_id: UsageId,
    pub slot: u32,
    pub question_attempt_id: QuestionAttemptId,
    pub sequence_number: u32,
    pub state: StepState,
    pub fraction: Option<f64>,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_parse_matches_as_str() {
        for state in [
            StepState::NotStarted,
            StepState::Todo,
            StepState::GaveUp,
            StepState::GradedPartial,
            StepState::GradedRight,
        ] {
            assert_eq!(StepState::parse(state.as_str()), Some(state));
        }
        assert_eq!(StepState::parse("bogus"), None);
    }

    #[test]
    fn only_not_started_is_unstarted() {
        assert!(!StepState::NotStarted.is_started());
        assert!(StepState::Todo.is_started());
    }
}
