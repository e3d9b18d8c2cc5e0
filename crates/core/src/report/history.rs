use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};

use crate::model::{QuestionAttemptId, QuestionStep, StepId, StepState, UsageId, UserId};
use crate::report::plan::{HistoryColumn, HistoryPlan};
use crate::report::sort::{SortValue, SortableRow, sort_rows};

/// One step of a usage's history with its question attempt's number.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRow {
    pub step_id: StepId,
    pub usage_id: UsageId,
    pub slot: u32,
    pub question_attempt_id: QuestionAttemptId,
    /// 1-based position of the question attempt within its slot.
    pub attempt_number: u32,
    pub sequence_number: u32,
    pub state: StepState,
    pub fraction: Option<f64>,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

impl SortableRow for HistoryRow {
    type Column = HistoryColumn;

    fn sort_value(&self, column: HistoryColumn) -> SortValue<'_> {
        match column {
            HistoryColumn::AttemptNumber => SortValue::Int(i64::from(self.attempt_number)),
            HistoryColumn::Time => SortValue::Time(self.created_at),
            HistoryColumn::State => SortValue::Text(self.state.as_str()),
            HistoryColumn::Fraction => SortValue::Float(self.fraction),
        }
    }

    fn slot(&self) -> u32 {
        self.slot
    }

    fn row_id(&self) -> u64 {
        self.step_id.value()
    }
}

/// Ranks question attempts within each slot by their first started sequence number.
///
/// Not-started steps take part in neither the ranking nor the result.
#[must_use]
pub fn number_attempts(steps: &[QuestionStep]) -> HashMap<QuestionAttemptId, u32> {
    let mut first_seq: HashMap<(u32, QuestionAttemptId), u32> = HashMap::new();
    for step in steps.iter().filter(|s| s.state.is_started()) {
        first_seq
            .entry((step.slot, step.question_attempt_id))
            .and_modify(|min| *min = (*min).min(step.sequence_number))
            .or_insert(step.sequence_number);
    }

    let mut by_slot: BTreeMap<u32, Vec<(u32, QuestionAttemptId)>> = BTreeMap::new();
    for ((slot, qa), min_seq) in first_seq {
        by_slot.entry(slot).or_default().push((min_seq, qa));
    }

    let mut numbers = HashMap::new();
    for attempts in by_slot.values_mut() {
        attempts.sort_unstable();
        for (rank, (_, qa)) in attempts.iter().enumerate() {
            numbers.insert(*qa, u32::try_from(rank + 1).unwrap_or(u32::MAX));
        }
    }
    numbers
}

impl HistoryPlan {
    /// Every started step of `self.usage_id`, numbered and sorted.
    ///
    /// Steps belonging to other usages are ignored; no steps yields an empty result.
    #[must_use]
    pub fn evaluate(&self, steps: &[QuestionStep]) -> Vec<HistoryRow> {
        let usage_steps: Vec<QuestionStep> = steps
            .iter()
            .filter(|s| s.usage_id == self.usage_id)
            .cloned()
            .collect();
        let numbers = number_attempts(&usage_steps);

        let mut rows: Vec<HistoryRow> = usage_steps
            .into_iter()
            .filter(|s| s.state.is_started())
            .filter_map(|s| {
                let attempt_number = *numbers.get(&s.question_attempt_id)?;
                Some(HistoryRow {
                    step_id: s.id,
                    usage_id: s.usage_id,
                    slot: s.slot,
                    question_attempt_id: s.question_attempt_id,
                    attempt_number,
                    sequence_number: s.sequence_number,
                    state: s.state,
                    fraction: s.fraction,
                    user_id: s.user_id,
                    created_at: s.created_at,
                })
            })
            .collect();
        sort_rows(&mut rows, &self.sort);
        rows
    }
}
