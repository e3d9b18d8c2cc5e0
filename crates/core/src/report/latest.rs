use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::model::{
    Attempt, AttemptId, ContextId, EmbedLocation, QuestionAttemptId, QuestionStep, StepId,
    StepState, UsageId, UserId,
};
use crate::report::plan::{LatestColumn, LatestViewPlan};
use crate::report::sort::{SortValue, SortableRow, sort_rows};
use crate::report::window::TimeWindow;

/// One row of the latest-attempt summary: an attempt and its newest answer state.
#[derive(Debug, Clone, PartialEq)]
pub struct LatestAttemptRow {
    pub attempt_id: AttemptId,
    pub context_id: ContextId,
    pub user_id: UserId,
    pub embed: EmbedLocation,
    pub usage_id: UsageId,
    pub page_name: String,
    pub page_url: String,
    pub slot: u32,
    pub question_attempt_id: QuestionAttemptId,
    pub step_id: StepId,
    pub sequence_number: u32,
    pub state: StepState,
    pub fraction: Option<f64>,
    pub step_time: DateTime<Utc>,
}

impl SortableRow for LatestAttemptRow {
    type Column = LatestColumn;

    fn sort_value(&self, column: LatestColumn) -> SortValue<'_> {
        match column {
            LatestColumn::User => SortValue::Id(self.user_id.value()),
            LatestColumn::Location => SortValue::Id(self.context_id.value()),
            LatestColumn::PageName => SortValue::Text(&self.page_name),
            LatestColumn::Embed => SortValue::Text(self.embed.as_str()),
            LatestColumn::State => SortValue::Text(self.state.as_str()),
            LatestColumn::Fraction => SortValue::Float(self.fraction),
            LatestColumn::LastAttempt => SortValue::Time(self.step_time),
        }
    }

    fn slot(&self) -> u32 {
        self.slot
    }

    fn row_id(&self) -> u64 {
        self.attempt_id.value()
    }
}

/// Newest step of a usage: highest slot, then highest sequence number in that slot.
#[must_use]
pub fn latest_step<'a>(steps: impl IntoIterator<Item = &'a QuestionStep>) -> Option<&'a QuestionStep> {
    steps
        .into_iter()
        .max_by_key(|step| (step.slot, step.sequence_number, step.id))
}

/// Pairs each attempt with its usage's newest step and keeps those inside `window`.
///
/// Attempts whose usage has no steps are dropped.
#[must_use]
pub fn select_latest(
    attempts: &[Attempt],
    steps: &[QuestionStep],
    window: &TimeWindow,
) -> Vec<LatestAttemptRow> {
    let mut by_usage: HashMap<UsageId, Vec<&QuestionStep>> = HashMap::new();
    for step in steps {
        by_usage.entry(step.usage_id).or_default().push(step);
    }

    attempts
        .iter()
        .filter_map(|attempt| {
            let usage_steps = by_usage.get(&attempt.usage_id())?;
            let step = latest_step(usage_steps.iter().copied())?;
            window.contains(step.created_at).then(|| LatestAttemptRow {
                attempt_id: attempt.id(),
                context_id: attempt.context_id(),
                user_id: attempt.user_id(),
                embed: attempt.embed().clone(),
                usage_id: attempt.usage_id(),
                page_name: attempt.page_name().to_owned(),
                page_url: attempt.page_url().to_owned(),
                slot: step.slot,
                question_attempt_id: step.question_attempt_id,
                step_id: step.id,
                sequence_number: step.sequence_number,
                state: step.state,
                fraction: step.fraction,
                step_time: step.created_at,
            })
        })
        .collect()
}

impl LatestViewPlan {
    /// Runs the plan over attempts already narrowed by `self.filter`.
    #[must_use]
    pub fn evaluate(&self, attempts: &[Attempt], steps: &[QuestionStep]) -> Vec<LatestAttemptRow> {
        let mut rows = select_latest(attempts, steps, &self.window);
        sort_rows(&mut rows, &self.sort);
        rows
    }
}
