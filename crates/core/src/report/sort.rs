use chrono::{DateTime, Utc};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// One user-requested sort column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SortKey<C> {
    pub column: C,
    pub direction: SortDirection,
}

impl<C> SortKey<C> {
    #[must_use]
    pub fn asc(column: C) -> Self {
        Self {
            column,
            direction: SortDirection::Asc,
        }
    }

    #[must_use]
    pub fn desc(column: C) -> Self {
        Self {
            column,
            direction: SortDirection::Desc,
        }
    }
}

/// Comparable cell value extracted from a report row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SortValue<'a> {
    Int(i64),
    /// Unsigned record id, compared over its full range.
    Id(u64),
    /// Missing values sort before any number.
    Float(Option<f64>),
    Text(&'a str),
    Time(DateTime<Utc>),
}

impl SortValue<'_> {
    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortValue::Int(a), SortValue::Int(b)) => a.cmp(b),
            (SortValue::Id(a), SortValue::Id(b)) => a.cmp(b),
            (SortValue::Float(a), SortValue::Float(b)) => match (a, b) {
                (Some(a), Some(b)) => a.total_cmp(b),
                (a, b) => a.is_some().cmp(&b.is_some()),
            },
            (SortValue::Text(a), SortValue::Text(b)) => a.cmp(b),
            (SortValue::Time(a), SortValue::Time(b)) => a.cmp(b),
            // Columns always yield one variant; mixed pairs only come from a bug.
            _ => Ordering::Equal,
        }
    }
}

/// Rows that can be ordered by report columns.
pub trait SortableRow {
    type Column: Copy;

    fn sort_value(&self, column: Self::Column) -> SortValue<'_>;

    fn slot(&self) -> u32;

    /// Record id used as the final tiebreak.
    fn row_id(&self) -> u64;
}

/// Orders rows by the requested keys, then slot ascending, then row id ascending.
pub fn sort_rows<R: SortableRow>(rows: &mut [R], keys: &[SortKey<R::Column>]) {
    rows.sort_by(|a, b| {
        for key in keys {
            let ord = a
                .sort_value(key.column)
                .compare(&b.sort_value(key.column));
            let ord = match key.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        a.slot()
            .cmp(&b.slot())
            .then_with(|| a.row_id().cmp(&b.row_id()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy)]
    enum Col {
        Id,
        Name,
        Score,
    }

    #[derive(Debug)]
    struct Row {
        id: u64,
        slot: u32,
        name: &'static str,
        score: Option<f64>,
    }

    impl SortableRow for Row {
        type Column = Col;

        fn sort_value(&self, column: Col) -> SortValue<'_> {
            match column {
                Col::Id => SortValue::Id(self.id),
                Col::Name => SortValue::Text(self.name),
                Col::Score => SortValue::Float(self.score),
            }
        }

        fn slot(&self) -> u32 {
            self.slot
        }

        fn row_id(&self) -> u64 {
            self.id
        }
    }

    fn ids(rows: &[Row]) -> Vec<u64> {
        rows.iter().map(|r| r.id).collect()
    }

    #[test]
    fn default_order_is_slot_then_id() {
        let mut rows = vec![
            Row { id: 4, slot: 2, name: "a", score: None },
            Row { id: 3, slot: 1, name: "b", score: None },
            Row { id: 1, slot: 2, name: "c", score: None },
        ];
        sort_rows(&mut rows, &[]);
        assert_eq!(ids(&rows), vec![3, 1, 4]);
    }

    #[test]
    fn equal_user_key_falls_back_to_lower_slot() {
        let mut rows = vec![
            Row { id: 1, slot: 5, name: "same", score: Some(1.0) },
            Row { id: 2, slot: 2, name: "same", score: Some(1.0) },
        ];
        sort_rows(&mut rows, &[SortKey::desc(Col::Name)]);
        assert_eq!(ids(&rows), vec![2, 1]);
    }

    #[test]
    fn user_key_is_primary_and_missing_floats_sort_first() {
        let mut rows = vec![
            Row { id: 1, slot: 1, name: "x", score: Some(0.5) },
            Row { id: 2, slot: 2, name: "y", score: None },
            Row { id: 3, slot: 3, name: "z", score: Some(1.0) },
        ];
        sort_rows(&mut rows, &[SortKey::asc(Col::Score)]);
        assert_eq!(ids(&rows), vec![2, 1, 3]);
        sort_rows(&mut rows, &[SortKey::desc(Col::Score)]);
        assert_eq!(ids(&rows), vec![3, 1, 2]);
    }

    #[test]
    fn ids_above_i64_max_sort_last() {
        let mut rows = vec![
            Row { id: u64::MAX, slot: 1, name: "a", score: None },
            Row { id: 7, slot: 2, name: "b", score: None },
        ];
        sort_rows(&mut rows, &[SortKey::asc(Col::Id)]);
        assert_eq!(ids(&rows), vec![7, u64::MAX]);
    }
}
