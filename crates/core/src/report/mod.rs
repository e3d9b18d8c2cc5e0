//! Report plans and the in-memory algorithms that evaluate them.

mod history;
mod latest;
mod page;
mod plan;
mod sort;
mod window;

pub use history::{HistoryRow, number_attempts};
pub use latest::{LatestAttemptRow, latest_step, select_latest};
pub use page::ReportPage;
pub use plan::{
    AttemptFilter, ContextScope, HistoryColumn, HistoryPlan, LatestColumn, LatestViewPlan,
    UserFilter,
};
pub use sort::{SortDirection, SortKey, SortValue, SortableRow, sort_rows};
pub use window::TimeWindow;
