//! Reporting defaults shared by the option parser and the services.

use chrono::Duration;

use crate::model::{DisplayOptionsError, PageSize};

/// Page size used when the user has no stored preference.
pub const DEFAULT_PAGE_SIZE: u16 = 100;

/// Page sizes are limited to three digits.
pub const MAX_PAGE_SIZE: u16 = 999;

/// Longest accepted lookback: one hundred years, in seconds.
pub const MAX_LOOKBACK_SECS: i64 = 100 * 366 * 86_400;

/// Lookback choices offered by the filter form, in seconds.
pub const LOOKBACK_CHOICES: [i64; 6] = [
    7 * 86_400,
    14 * 86_400,
    21 * 86_400,
    28 * 86_400,
    42 * 86_400,
    84 * 86_400,
];

/// Tunables for report rendering that callers may override.
///
/// Only constructible with a valid page size and lookback choices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportDefaults {
    page_size: PageSize,
    lookback_choices: Vec<Duration>,
}

impl ReportDefaults {
    /// # Errors
    ///
    /// Returns `DisplayOptionsError::InvalidPageSize` if `page_size` is outside `1..=999`.
    /// Returns `DisplayOptionsError::NonPositiveLookback` or `LookbackTooLarge` for a bad
    /// lookback choice.
    pub fn new(page_size: u16, lookback_secs: &[i64]) -> Result<Self, DisplayOptionsError> {
        let page_size = PageSize::new(page_size)?;
        let lookback_choices = lookback_secs
            .iter()
            .map(|&secs| lookback_choice(secs))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            page_size,
            lookback_choices,
        })
    }

    #[must_use]
    pub fn page_size(&self) -> PageSize {
        self.page_size
    }

    #[must_use]
    pub fn lookback_choices(&self) -> &[Duration] {
        &self.lookback_choices
    }
}

impl Default for ReportDefaults {
    fn default() -> Self {
        Self {
            page_size: PageSize::default(),
            lookback_choices: LOOKBACK_CHOICES
                .iter()
                .map(|secs| Duration::seconds(*secs))
                .collect(),
        }
    }
}

fn lookback_choice(secs: i64) -> Result<Duration, DisplayOptionsError> {
    if secs <= 0 {
        return Err(DisplayOptionsError::NonPositiveLookback);
    }
    Duration::try_seconds(secs)
        .filter(|_| secs <= MAX_LOOKBACK_SECS)
        .ok_or(DisplayOptionsError::LookbackTooLarge {
            max: MAX_LOOKBACK_SECS,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let defaults = ReportDefaults::default();
        assert_eq!(defaults.page_size().value(), DEFAULT_PAGE_SIZE);
        assert_eq!(defaults.lookback_choices().len(), LOOKBACK_CHOICES.len());
        assert_eq!(
            ReportDefaults::new(DEFAULT_PAGE_SIZE, &LOOKBACK_CHOICES).unwrap(),
            defaults
        );
    }

    #[test]
    fn misconfigured_defaults_are_rejected() {
        assert_eq!(
            ReportDefaults::new(0, &LOOKBACK_CHOICES),
            Err(DisplayOptionsError::InvalidPageSize("0".into()))
        );
        assert!(matches!(
            ReportDefaults::new(1000, &LOOKBACK_CHOICES),
            Err(DisplayOptionsError::InvalidPageSize(_))
        ));
        assert_eq!(
            ReportDefaults::new(50, &[86_400, -1]),
            Err(DisplayOptionsError::NonPositiveLookback)
        );
        assert_eq!(
            ReportDefaults::new(50, &[i64::MAX]),
            Err(DisplayOptionsError::LookbackTooLarge {
                max: MAX_LOOKBACK_SECS
            })
        );
    }
}
