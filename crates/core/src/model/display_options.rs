use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

use crate::config::{DEFAULT_PAGE_SIZE, MAX_LOOKBACK_SECS, MAX_PAGE_SIZE};
use crate::model::ids::{ContextId, GroupId, UsageId, UserId};
use crate::report::TimeWindow;
use crate::time::{end_of_day_exclusive, start_of_day};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Form/URL field a validation message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisplayField {
    Lookback,
    DateFrom,
    DateTo,
    PageSize,
    Locations,
    Group,
    User,
    Usage,
    Download,
}

impl DisplayField {
    /// Parameter name used in URLs and form submissions.
    #[must_use]
    pub fn param(self) -> &'static str {
        match self {
            DisplayField::Lookback => "lookback",
            DisplayField::DateFrom => "datefrom",
            DisplayField::DateTo => "dateto",
            DisplayField::PageSize => "pagesize",
            DisplayField::Locations => "locationids",
            DisplayField::Group => "group",
            DisplayField::User => "userid",
            DisplayField::Usage => "usageid",
            DisplayField::Download => "download",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DisplayOptionsError {
    #[error("a lookback period cannot be combined with explicit dates")]
    LookbackWithDates,

    #[error("the start date must not be after the end date")]
    DateFromAfterDateTo,

    #[error("lookback must be a positive number of seconds")]
    NonPositiveLookback,

    #[error("lookback may not exceed {max} seconds")]
    LookbackTooLarge { max: i64 },

    #[error("page size must be a whole number between 1 and 999: {0:?}")]
    InvalidPageSize(String),

    #[error("locations can only be filtered when reporting on a whole course")]
    LocationsRequireCourseScope,

    #[error("location {0} has no attempts to report")]
    UnknownLocation(ContextId),

    #[error("expected a number: {0:?}")]
    InvalidNumber(String),

    #[error("expected a date in YYYY-MM-DD form: {0:?}")]
    InvalidDate(String),

    #[error("unknown download format: {0:?}")]
    UnknownDownloadFormat(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: DisplayField,
    pub error: DisplayOptionsError,
}

/// Every problem found while building display options.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{}", summarize(.0))]
pub struct DisplayOptionsErrors(pub Vec<FieldError>);

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field.param(), e.error))
        .collect::<Vec<_>>()
        .join("; ")
}

impl DisplayOptionsErrors {
    #[must_use]
    pub fn for_field(&self, field: DisplayField) -> Vec<&DisplayOptionsError> {
        self.0
            .iter()
            .filter(|e| e.field == field)
            .map(|e| &e.error)
            .collect()
    }

    #[must_use]
    pub fn contains(&self, error: &DisplayOptionsError) -> bool {
        self.0.iter().any(|e| &e.error == error)
    }
}

#[derive(Default)]
struct Collector(Vec<FieldError>);

impl Collector {
    fn push(&mut self, field: DisplayField, error: DisplayOptionsError) {
        self.0.push(FieldError { field, error });
    }

    fn take<T>(&mut self, field: DisplayField, res: Result<T, DisplayOptionsError>) -> Option<T> {
        match res {
            Ok(v) => Some(v),
            Err(error) => {
                self.push(field, error);
                None
            }
        }
    }

    fn finish(self) -> Result<(), DisplayOptionsErrors> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(DisplayOptionsErrors(self.0))
        }
    }
}

//
// ─── VALUE TYPES ───────────────────────────────────────────────────────────────
//

/// Rows per report page, persisted as a user preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageSize(u16);

impl PageSize {
    /// # Errors
    ///
    /// Returns `DisplayOptionsError::InvalidPageSize` outside `1..=999`.
    pub fn new(size: u16) -> Result<Self, DisplayOptionsError> {
        if size == 0 || size > MAX_PAGE_SIZE {
            return Err(DisplayOptionsError::InvalidPageSize(size.to_string()));
        }
        Ok(Self(size))
    }

    /// Parses user input: one to three ASCII digits, not zero.
    ///
    /// # Errors
    ///
    /// Returns `DisplayOptionsError::InvalidPageSize` for anything else.
    pub fn parse(raw: &str) -> Result<Self, DisplayOptionsError> {
        let trimmed = raw.trim();
        let invalid = || DisplayOptionsError::InvalidPageSize(raw.to_owned());
        if trimmed.is_empty() || trimmed.len() > 3 || !trimmed.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }
        let size: u16 = trimmed.parse().map_err(|_| invalid())?;
        Self::new(size).map_err(|_| invalid())
    }

    #[must_use]
    pub fn value(self) -> u16 {
        self.0
    }
}

impl Default for PageSize {
    fn default() -> Self {
        Self(DEFAULT_PAGE_SIZE)
    }
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which attempts to include by time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemporalFilter {
    #[default]
    None,
    /// Rolling window ending now.
    Lookback(Duration),
    /// Inclusive calendar range; either end may be open.
    Range {
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    },
}

impl TemporalFilter {
    /// Checks exclusivity and ordering of the raw temporal inputs.
    fn build(
        lookback_secs: Option<i64>,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        errors: &mut Collector,
    ) -> Option<Self> {
        let mut ok = true;
        if lookback_secs.is_some() && (from.is_some() || to.is_some()) {
            errors.push(DisplayField::Lookback, DisplayOptionsError::LookbackWithDates);
            ok = false;
        }
        let lookback = match lookback_secs {
            Some(secs) if secs <= 0 => {
                errors.push(DisplayField::Lookback, DisplayOptionsError::NonPositiveLookback);
                ok = false;
                None
            }
            Some(secs) => {
                let span = Duration::try_seconds(secs).filter(|_| secs <= MAX_LOOKBACK_SECS);
                if span.is_none() {
                    errors.push(
                        DisplayField::Lookback,
                        DisplayOptionsError::LookbackTooLarge {
                            max: MAX_LOOKBACK_SECS,
                        },
                    );
                    ok = false;
                }
                span
            }
            None => None,
        };
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                errors.push(DisplayField::DateFrom, DisplayOptionsError::DateFromAfterDateTo);
                ok = false;
            }
        }
        if !ok {
            return None;
        }
        Some(match (lookback, from, to) {
            (Some(span), _, _) => TemporalFilter::Lookback(span),
            (None, None, None) => TemporalFilter::None,
            (None, from, to) => TemporalFilter::Range { from, to },
        })
    }

    /// Resolves the filter into concrete bounds relative to `now`.
    #[must_use]
    pub fn window(&self, now: DateTime<Utc>) -> TimeWindow {
        match *self {
            TemporalFilter::None => TimeWindow::unbounded(),
            TemporalFilter::Lookback(span) => now
                .checked_sub_signed(span)
                .map_or_else(TimeWindow::unbounded, TimeWindow::after),
            TemporalFilter::Range { from, to } => TimeWindow::between(
                from.map(start_of_day),
                to.map(end_of_day_exclusive),
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DownloadFormat {
    Csv,
    Excel,
    Ods,
    Json,
    Html,
    Pdf,
}

impl DownloadFormat {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DownloadFormat::Csv => "csv",
            DownloadFormat::Excel => "excel",
            DownloadFormat::Ods => "ods",
            DownloadFormat::Json => "json",
            DownloadFormat::Html => "html",
            DownloadFormat::Pdf => "pdf",
        }
    }

    /// # Errors
    ///
    /// Returns `DisplayOptionsError::UnknownDownloadFormat` for unsupported names.
    pub fn parse(raw: &str) -> Result<Self, DisplayOptionsError> {
        match raw.trim() {
            "csv" => Ok(DownloadFormat::Csv),
            "excel" => Ok(DownloadFormat::Excel),
            "ods" => Ok(DownloadFormat::Ods),
            "json" => Ok(DownloadFormat::Json),
            "html" => Ok(DownloadFormat::Html),
            "pdf" => Ok(DownloadFormat::Pdf),
            _ => Err(DisplayOptionsError::UnknownDownloadFormat(raw.to_owned())),
        }
    }
}

/// Which part of the context tree the report covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportScope {
    Course(ContextId),
    Activity {
        course: ContextId,
        activity: ContextId,
    },
}

impl ReportScope {
    #[must_use]
    pub fn course(self) -> ContextId {
        match self {
            ReportScope::Course(course) | ReportScope::Activity { course, .. } => course,
        }
    }

    #[must_use]
    pub fn is_whole_course(self) -> bool {
        matches!(self, ReportScope::Course(_))
    }
}

//
// ─── SOURCES ───────────────────────────────────────────────────────────────────
//

/// Submitted filter form. Values arrive already split into fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterForm {
    pub lookback_secs: Option<i64>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub location_ids: Vec<ContextId>,
    pub page_size: String,
    pub group: Option<GroupId>,
}

/// Raw query-string parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlParams(BTreeMap<String, String>);

impl UrlParams {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Present and non-blank value for `field`.
    #[must_use]
    pub fn get(&self, field: DisplayField) -> Option<&str> {
        self.0
            .get(field.param())
            .map(String::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    fn number<T: std::str::FromStr>(
        &self,
        field: DisplayField,
        errors: &mut Collector,
    ) -> Option<T> {
        let raw = self.get(field)?;
        errors.take(
            field,
            raw.parse::<T>()
                .map_err(|_| DisplayOptionsError::InvalidNumber(raw.to_owned())),
        )
    }

    fn date(&self, field: DisplayField, errors: &mut Collector) -> Option<NaiveDate> {
        let raw = self.get(field)?;
        errors.take(
            field,
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map_err(|_| DisplayOptionsError::InvalidDate(raw.to_owned())),
        )
    }
}

/// Where the options for this request come from. Exactly one applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayOptionsSource {
    Form(FilterForm),
    Url(UrlParams),
    Preference,
}

//
// ─── OPTIONS ───────────────────────────────────────────────────────────────────
//

/// Validated per-request report parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportDisplayOptions {
    scope: ReportScope,
    group: Option<GroupId>,
    user: Option<UserId>,
    locations: BTreeSet<ContextId>,
    temporal: TemporalFilter,
    page_size: PageSize,
    download: Option<DownloadFormat>,
    usage_id: Option<UsageId>,
}

impl ReportDisplayOptions {
    /// Options with no filters and the given page size.
    #[must_use]
    pub fn defaults(scope: ReportScope, page_size: PageSize) -> Self {
        Self {
            scope,
            group: None,
            user: None,
            locations: BTreeSet::new(),
            temporal: TemporalFilter::None,
            page_size,
            download: None,
            usage_id: None,
        }
    }

    /// Builds options from exactly one source.
    ///
    /// `offered_locations` are the activities a form may pick from; URL
    /// parameters are not checked against them.
    ///
    /// # Errors
    ///
    /// Returns every field problem at once; nothing is built on failure.
    pub fn resolve(
        scope: ReportScope,
        source: &DisplayOptionsSource,
        stored_page_size: Option<PageSize>,
        offered_locations: &[ContextId],
    ) -> Result<Self, DisplayOptionsErrors> {
        let page_size = stored_page_size.unwrap_or_default();
        match source {
            DisplayOptionsSource::Preference => Ok(Self::defaults(scope, page_size)),
            DisplayOptionsSource::Form(form) => Self::from_form(scope, form, offered_locations),
            DisplayOptionsSource::Url(params) => Self::from_url(scope, params, page_size),
        }
    }

    fn from_form(
        scope: ReportScope,
        form: &FilterForm,
        offered_locations: &[ContextId],
    ) -> Result<Self, DisplayOptionsErrors> {
        let mut errors = Collector::default();

        let temporal =
            TemporalFilter::build(form.lookback_secs, form.date_from, form.date_to, &mut errors);
        let page_size = errors.take(DisplayField::PageSize, PageSize::parse(&form.page_size));
        let locations = check_locations(scope, form.location_ids.iter().copied(), &mut errors);
        for id in &locations {
            if !offered_locations.contains(id) {
                errors.push(DisplayField::Locations, DisplayOptionsError::UnknownLocation(*id));
            }
        }

        errors.finish()?;
        Ok(Self {
            scope,
            group: form.group,
            user: None,
            locations,
            temporal: temporal.unwrap_or_default(),
            page_size: page_size.unwrap_or_default(),
            download: None,
            usage_id: None,
        })
    }

    fn from_url(
        scope: ReportScope,
        params: &UrlParams,
        page_size: PageSize,
    ) -> Result<Self, DisplayOptionsErrors> {
        let mut errors = Collector::default();

        let lookback = params.number::<i64>(DisplayField::Lookback, &mut errors);
        let from = params.date(DisplayField::DateFrom, &mut errors);
        let to = params.date(DisplayField::DateTo, &mut errors);
        let temporal = TemporalFilter::build(lookback, from, to, &mut errors);

        let mut raw_locations = Vec::new();
        if let Some(raw) = params.get(DisplayField::Locations) {
            for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                if let Some(id) = errors.take(
                    DisplayField::Locations,
                    part.parse::<ContextId>()
                        .map_err(|_| DisplayOptionsError::InvalidNumber(part.to_owned())),
                ) {
                    raw_locations.push(id);
                }
            }
        }
        let locations = check_locations(scope, raw_locations.into_iter(), &mut errors);

        let group = params.number::<GroupId>(DisplayField::Group, &mut errors);
        let user = params.number::<UserId>(DisplayField::User, &mut errors);
        let usage_id = params.number::<UsageId>(DisplayField::Usage, &mut errors);
        let download = params
            .get(DisplayField::Download)
            .and_then(|raw| errors.take(DisplayField::Download, DownloadFormat::parse(raw)));

        errors.finish()?;
        Ok(Self {
            scope,
            group,
            user,
            locations,
            temporal: temporal.unwrap_or_default(),
            page_size,
            download,
            usage_id,
        })
    }

    #[must_use]
    pub fn scope(&self) -> ReportScope {
        self.scope
    }

    #[must_use]
    pub fn group(&self) -> Option<GroupId> {
        self.group
    }

    #[must_use]
    pub fn user(&self) -> Option<UserId> {
        self.user
    }

    #[must_use]
    pub fn locations(&self) -> &BTreeSet<ContextId> {
        &self.locations
    }

    #[must_use]
    pub fn temporal(&self) -> TemporalFilter {
        self.temporal
    }

    #[must_use]
    pub fn page_size(&self) -> PageSize {
        self.page_size
    }

    #[must_use]
    pub fn download(&self) -> Option<DownloadFormat> {
        self.download
    }

    #[must_use]
    pub fn usage_id(&self) -> Option<UsageId> {
        self.usage_id
    }

    /// Query-string pairs that reproduce these options on a later request.
    ///
    /// Page size is omitted since it lives in the user's preferences.
    #[must_use]
    pub fn to_url_params(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        match self.temporal {
            TemporalFilter::None => {}
            TemporalFilter::Lookback(span) => {
                out.push((DisplayField::Lookback.param(), span.num_seconds().to_string()));
            }
            TemporalFilter::Range { from, to } => {
                if let Some(from) = from {
                    out.push((DisplayField::DateFrom.param(), from.format("%Y-%m-%d").to_string()));
                }
                if let Some(to) = to {
                    out.push((DisplayField::DateTo.param(), to.format("%Y-%m-%d").to_string()));
                }
            }
        }
        if !self.locations.is_empty() {
            let ids: Vec<String> = self.locations.iter().map(ToString::to_string).collect();
            out.push((DisplayField::Locations.param(), ids.join(",")));
        }
        if let Some(group) = self.group {
            out.push((DisplayField::Group.param(), group.to_string()));
        }
        if let Some(user) = self.user {
            out.push((DisplayField::User.param(), user.to_string()));
        }
        if let Some(usage) = self.usage_id {
            out.push((DisplayField::Usage.param(), usage.to_string()));
        }
        if let Some(download) = self.download {
            out.push((DisplayField::Download.param(), download.as_str().to_owned()));
        }
        out
    }
}

fn check_locations(
    scope: ReportScope,
    ids: impl Iterator<Item = ContextId>,
    errors: &mut Collector,
) -> BTreeSet<ContextId> {
    let locations: BTreeSet<ContextId> = ids.collect();
    if !locations.is_empty() && !scope.is_whole_course() {
        errors.push(
            DisplayField::Locations,
            DisplayOptionsError::LocationsRequireCourseScope,
        );
    }
    locations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn course() -> ReportScope {
        ReportScope::Course(ContextId::new(2))
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn form() -> FilterForm {
        FilterForm {
            page_size: "50".into(),
            ..FilterForm::default()
        }
    }

    #[test]
    fn page_size_accepts_one_to_three_digits() {
        assert_eq!(PageSize::parse("1").unwrap().value(), 1);
        assert_eq!(PageSize::parse("999").unwrap().value(), 999);
        assert!(PageSize::parse("0").is_err());
        assert!(PageSize::parse("1000").is_err());
        assert!(PageSize::parse("-5").is_err());
        assert!(PageSize::parse("12a").is_err());
        assert!(PageSize::parse("").is_err());
    }

    #[test]
    fn lookback_with_date_from_is_rejected() {
        let source = DisplayOptionsSource::Form(FilterForm {
            lookback_secs: Some(604_800),
            date_from: Some(date(2024, 3, 1)),
            ..form()
        });
        let err = ReportDisplayOptions::resolve(course(), &source, None, &[]).unwrap_err();
        assert!(err.contains(&DisplayOptionsError::LookbackWithDates));
        assert_eq!(
            err.for_field(DisplayField::Lookback),
            vec![&DisplayOptionsError::LookbackWithDates]
        );
    }

    #[test]
    fn date_from_after_date_to_is_rejected() {
        let source = DisplayOptionsSource::Form(FilterForm {
            date_from: Some(date(2024, 3, 10)),
            date_to: Some(date(2024, 3, 1)),
            ..form()
        });
        let err = ReportDisplayOptions::resolve(course(), &source, None, &[]).unwrap_err();
        assert!(err.contains(&DisplayOptionsError::DateFromAfterDateTo));
    }

    #[test]
    fn form_reports_all_field_errors_together() {
        let source = DisplayOptionsSource::Form(FilterForm {
            lookback_secs: Some(604_800),
            date_to: Some(date(2024, 3, 1)),
            page_size: "1000".into(),
            location_ids: vec![ContextId::new(99)],
            ..FilterForm::default()
        });
        let err = ReportDisplayOptions::resolve(course(), &source, None, &[]).unwrap_err();
        assert_eq!(err.0.len(), 3);
        assert!(err.contains(&DisplayOptionsError::UnknownLocation(ContextId::new(99))));
    }

    #[test]
    fn form_locations_must_be_offered() {
        let offered = [ContextId::new(10), ContextId::new(11)];
        let source = DisplayOptionsSource::Form(FilterForm {
            location_ids: vec![ContextId::new(11)],
            ..form()
        });
        let options = ReportDisplayOptions::resolve(course(), &source, None, &offered).unwrap();
        assert_eq!(
            options.locations().iter().copied().collect::<Vec<_>>(),
            vec![ContextId::new(11)]
        );
        assert_eq!(options.page_size().value(), 50);
    }

    #[test]
    fn locations_need_course_scope() {
        let scope = ReportScope::Activity {
            course: ContextId::new(2),
            activity: ContextId::new(10),
        };
        let params = UrlParams::from_pairs([("locationids", "10,11")]);
        let err = ReportDisplayOptions::resolve(scope, &DisplayOptionsSource::Url(params), None, &[])
            .unwrap_err();
        assert!(err.contains(&DisplayOptionsError::LocationsRequireCourseScope));
    }

    #[test]
    fn preference_source_uses_stored_page_size() {
        let stored = PageSize::new(25).unwrap();
        let options = ReportDisplayOptions::resolve(
            course(),
            &DisplayOptionsSource::Preference,
            Some(stored),
            &[],
        )
        .unwrap();
        assert_eq!(options.page_size(), stored);
        assert_eq!(options.temporal(), TemporalFilter::None);

        let fallback =
            ReportDisplayOptions::resolve(course(), &DisplayOptionsSource::Preference, None, &[])
                .unwrap();
        assert_eq!(fallback.page_size().value(), DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn url_params_roundtrip_through_options() {
        let params = UrlParams::from_pairs([
            ("datefrom", "2024-03-01"),
            ("dateto", "2024-03-31"),
            ("locationids", "11, 10"),
            ("group", "4"),
            ("userid", "8"),
            ("download", "csv"),
        ]);
        let stored = PageSize::new(20).unwrap();
        let options = ReportDisplayOptions::resolve(
            course(),
            &DisplayOptionsSource::Url(params),
            Some(stored),
            &[],
        )
        .unwrap();
        assert_eq!(
            options.temporal(),
            TemporalFilter::Range {
                from: Some(date(2024, 3, 1)),
                to: Some(date(2024, 3, 31)),
            }
        );
        assert_eq!(options.page_size(), stored);
        assert_eq!(options.download(), Some(DownloadFormat::Csv));

        let again = ReportDisplayOptions::resolve(
            course(),
            &DisplayOptionsSource::Url(UrlParams::from_pairs(options.to_url_params())),
            Some(stored),
            &[],
        )
        .unwrap();
        assert_eq!(again, options);
    }

    #[test]
    fn url_reports_unparseable_values() {
        let params = UrlParams::from_pairs([
            ("lookback", "week"),
            ("dateto", "31/03/2024"),
            ("download", "docx"),
        ]);
        let err = ReportDisplayOptions::resolve(course(), &DisplayOptionsSource::Url(params), None, &[])
            .unwrap_err();
        assert!(err.contains(&DisplayOptionsError::InvalidNumber("week".into())));
        assert!(err.contains(&DisplayOptionsError::InvalidDate("31/03/2024".into())));
        assert!(err.contains(&DisplayOptionsError::UnknownDownloadFormat("docx".into())));
    }

    #[test]
    fn lookback_must_be_positive() {
        let source = DisplayOptionsSource::Form(FilterForm {
            lookback_secs: Some(0),
            ..form()
        });
        let err = ReportDisplayOptions::resolve(course(), &source, None, &[]).unwrap_err();
        assert!(err.contains(&DisplayOptionsError::NonPositiveLookback));
    }

    #[test]
    fn oversized_lookback_is_rejected_not_panicking() {
        for raw in ["9223372036854775807", "100000000000000"] {
            let source =
                DisplayOptionsSource::Url(UrlParams::from_pairs([("lookback", raw)]));
            let err = ReportDisplayOptions::resolve(course(), &source, None, &[]).unwrap_err();
            assert_eq!(
                err.for_field(DisplayField::Lookback),
                vec![&DisplayOptionsError::LookbackTooLarge {
                    max: MAX_LOOKBACK_SECS
                }]
            );
        }

        let longest = DisplayOptionsSource::Url(UrlParams::from_pairs([(
            "lookback",
            MAX_LOOKBACK_SECS.to_string(),
        )]));
        let options = ReportDisplayOptions::resolve(course(), &longest, None, &[]).unwrap();
        let window = options.temporal().window(fixed_now());
        assert_eq!(
            window,
            TimeWindow::after(fixed_now() - Duration::seconds(MAX_LOOKBACK_SECS))
        );
    }

    #[test]
    fn lookback_past_the_calendar_start_is_unbounded() {
        let window = TemporalFilter::Lookback(Duration::MAX).window(fixed_now());
        assert!(window.is_unbounded());
    }
}
