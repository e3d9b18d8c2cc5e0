use chrono::{DateTime, Utc};

/// Concrete time bounds applied to a step's timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeWindow {
    after: Option<DateTime<Utc>>,
    from: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
}

impl TimeWindow {
    #[must_use]
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Strictly later than `cutoff`.
    #[must_use]
    pub fn after(cutoff: DateTime<Utc>) -> Self {
        Self {
            after: Some(cutoff),
            ..Self::default()
        }
    }

    /// `from <= t < until`; either side may be open.
    #[must_use]
    pub fn between(from: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> Self {
        Self {
            after: None,
            from,
            until,
        }
    }

    #[must_use]
    pub fn is_unbounded(&self) -> bool {
        self.after.is_none() && self.from.is_none() && self.until.is_none()
    }

    #[must_use]
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.after.is_none_or(|cutoff| t > cutoff)
            && self.from.is_none_or(|from| t >= from)
            && self.until.is_none_or(|until| t < until)
    }

    /// Exclusive lower bound, set by lookback windows.
    #[must_use]
    pub fn exclusive_lower(&self) -> Option<DateTime<Utc>> {
        self.after
    }

    /// Inclusive lower bound, set by a start date.
    #[must_use]
    pub fn inclusive_lower(&self) -> Option<DateTime<Utc>> {
        self.from
    }

    /// Exclusive upper bound, set by an end date.
    #[must_use]
    pub fn exclusive_upper(&self) -> Option<DateTime<Utc>> {
        self.until
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    #[test]
    fn lookback_excludes_cutoff_itself() {
        let now = fixed_now();
        let window = TimeWindow::after(now - Duration::days(7));
        assert!(window.contains(now));
        assert!(!window.contains(now - Duration::days(7)));
    }

    #[test]
    fn half_open_ranges() {
        let now = fixed_now();
        let from_only = TimeWindow::between(Some(now), None);
        assert!(from_only.contains(now));
        assert!(from_only.contains(now + Duration::days(400)));
        assert!(!from_only.contains(now - Duration::seconds(1)));

        let until_only = TimeWindow::between(None, Some(now));
        assert!(!until_only.contains(now));
        assert!(until_only.contains(now - Duration::days(400)));
        assert!(TimeWindow::unbounded().is_unbounded());
    }
}
