use std::sync::Arc;

use chrono::Duration;
use report_core::config::ReportDefaults;
use report_core::model::{
    ContextId, DisplayOptionsSource, ReportDisplayOptions, ReportScope, UserId,
};
use storage::repository::PreferenceRepository;

use crate::attempt_tracker::AttemptTracker;
use crate::error::DisplayOptionsServiceError;

/// Resolves per-request display options and keeps the page-size preference.
#[derive(Clone)]
pub struct DisplayOptionsService {
    defaults: ReportDefaults,
    preferences: Arc<dyn PreferenceRepository>,
    tracker: Arc<AttemptTracker>,
}

impl DisplayOptionsService {
    #[must_use]
    pub fn new(
        defaults: ReportDefaults,
        preferences: Arc<dyn PreferenceRepository>,
        tracker: Arc<AttemptTracker>,
    ) -> Self {
        Self {
            defaults,
            preferences,
            tracker,
        }
    }

    #[must_use]
    pub fn lookback_choices(&self) -> &[Duration] {
        self.defaults.lookback_choices()
    }

    /// Locations the filter form may offer: activities that have attempts.
    ///
    /// Always empty for a single-activity scope.
    ///
    /// # Errors
    ///
    /// Returns `DisplayOptionsServiceError::Tracker` if the cache lookup fails.
    pub async fn location_choices(
        &self,
        scope: ReportScope,
    ) -> Result<Vec<ContextId>, DisplayOptionsServiceError> {
        match scope {
            ReportScope::Course(course) => {
                Ok(self.tracker.activities_with_attempts(course).await?)
            }
            ReportScope::Activity { .. } => Ok(Vec::new()),
        }
    }

    /// Build options for `user` from exactly one source.
    ///
    /// A successful form submission stores its page size as the user's
    /// preference; other sources read that preference.
    ///
    /// # Errors
    ///
    /// Returns `DisplayOptionsServiceError::Invalid` with every field error.
    /// Returns `DisplayOptionsServiceError::Storage` or `Tracker` on store failures.
    pub async fn resolve(
        &self,
        user: UserId,
        scope: ReportScope,
        source: &DisplayOptionsSource,
    ) -> Result<ReportDisplayOptions, DisplayOptionsServiceError> {
        let stored = self
            .preferences
            .page_size(user)
            .await?
            .unwrap_or(self.defaults.page_size());
        let offered = match source {
            DisplayOptionsSource::Form(_) => self.location_choices(scope).await?,
            DisplayOptionsSource::Url(_) | DisplayOptionsSource::Preference => Vec::new(),
        };

        let options = ReportDisplayOptions::resolve(scope, source, Some(stored), &offered)?;

        if matches!(source, DisplayOptionsSource::Form(_)) {
            self.preferences
                .set_page_size(user, options.page_size())
                .await?;
        }
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use report_core::model::{
        Context, ContextLevel, ContextPath, DisplayField, DisplayOptionsError, EmbedLocation,
        FilterForm, NewAttempt, TemporalFilter, UrlParams, UsageId,
    };
    use report_core::time::fixed_now;
    use storage::repository::{AttemptRepository, InMemoryRepository};

    fn seeded() -> InMemoryRepository {
        let repo = InMemoryRepository::new();
        repo.add_context(Context::new(
            ContextId::new(3),
            ContextLevel::Course,
            None,
            ContextPath::parse("/3").unwrap(),
        ))
        .unwrap();
        for activity in [15, 16] {
            repo.add_context(Context::new(
                ContextId::new(activity),
                ContextLevel::Activity,
                Some(ContextId::new(3)),
                ContextPath::parse(&format!("/3/{activity}")).unwrap(),
            ))
            .unwrap();
        }
        repo
    }

    fn service(repo: &InMemoryRepository) -> DisplayOptionsService {
        let tracker = Arc::new(AttemptTracker::new(
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
        ));
        DisplayOptionsService::new(ReportDefaults::default(), Arc::new(repo.clone()), tracker)
    }

    fn course() -> ReportScope {
        ReportScope::Course(ContextId::new(3))
    }

    fn form(page_size: &str) -> FilterForm {
        FilterForm {
            page_size: page_size.into(),
            ..FilterForm::default()
        }
    }

    async fn add_attempt(repo: &InMemoryRepository, context: u64) {
        repo.insert_attempt(NewAttempt {
            context_id: ContextId::new(context),
            user_id: UserId::new(5),
            embed: EmbedLocation::new("q/e").unwrap(),
            usage_id: UsageId::new(context),
            page_url: "https://lms.example/".into(),
            page_name: "Page".into(),
            created_at: fixed_now(),
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn form_submission_persists_page_size() {
        let repo = seeded();
        let svc = service(&repo);
        let user = UserId::new(5);

        let options = svc
            .resolve(user, course(), &DisplayOptionsSource::Form(form("25")))
            .await
            .unwrap();
        assert_eq!(options.page_size().value(), 25);

        let later = svc
            .resolve(user, course(), &DisplayOptionsSource::Preference)
            .await
            .unwrap();
        assert_eq!(later.page_size().value(), 25);
    }

    #[tokio::test]
    async fn preference_falls_back_to_default_page_size() {
        let repo = seeded();
        let options = service(&repo)
            .resolve(UserId::new(9), course(), &DisplayOptionsSource::Preference)
            .await
            .unwrap();
        assert_eq!(options.page_size().value(), 100);
        assert_eq!(options.temporal(), TemporalFilter::None);
    }

    #[tokio::test]
    async fn configured_default_page_size_applies_without_preference() {
        let repo = seeded();
        let tracker = Arc::new(AttemptTracker::new(
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
        ));
        let defaults = ReportDefaults::new(30, &[86_400]).unwrap();
        let svc = DisplayOptionsService::new(defaults, Arc::new(repo.clone()), tracker);

        let options = svc
            .resolve(UserId::new(9), course(), &DisplayOptionsSource::Preference)
            .await
            .unwrap();
        assert_eq!(options.page_size().value(), 30);
        assert_eq!(svc.lookback_choices(), &[Duration::days(1)]);
    }

    #[tokio::test]
    async fn rejected_form_keeps_previous_preference() {
        let repo = seeded();
        let svc = service(&repo);
        let user = UserId::new(5);
        svc.resolve(user, course(), &DisplayOptionsSource::Form(form("40")))
            .await
            .unwrap();

        let mut bad = form("1000");
        bad.lookback_secs = Some(604_800);
        bad.date_from = NaiveDate::from_ymd_opt(2024, 3, 1);
        let err = svc
            .resolve(user, course(), &DisplayOptionsSource::Form(bad))
            .await
            .unwrap_err();
        let DisplayOptionsServiceError::Invalid(errors) = err else {
            panic!("expected validation errors");
        };
        assert!(errors.contains(&DisplayOptionsError::LookbackWithDates));
        assert_eq!(errors.for_field(DisplayField::PageSize).len(), 1);

        let kept = svc
            .resolve(user, course(), &DisplayOptionsSource::Preference)
            .await
            .unwrap();
        assert_eq!(kept.page_size().value(), 40);
    }

    #[tokio::test]
    async fn form_locations_limited_to_activities_with_attempts() {
        let repo = seeded();
        add_attempt(&repo, 15).await;
        let svc = service(&repo);

        assert_eq!(
            svc.location_choices(course()).await.unwrap(),
            vec![ContextId::new(15)]
        );

        let mut picked = form("10");
        picked.location_ids = vec![ContextId::new(16)];
        let err = svc
            .resolve(UserId::new(5), course(), &DisplayOptionsSource::Form(picked))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DisplayOptionsServiceError::Invalid(ref e)
                if e.contains(&DisplayOptionsError::UnknownLocation(ContextId::new(16)))
        ));

        let mut ok = form("10");
        ok.location_ids = vec![ContextId::new(15)];
        let options = svc
            .resolve(UserId::new(5), course(), &DisplayOptionsSource::Form(ok))
            .await
            .unwrap();
        assert!(options.locations().contains(&ContextId::new(15)));
    }

    #[tokio::test]
    async fn url_source_reads_stored_page_size_without_writing() {
        let repo = seeded();
        let svc = service(&repo);
        let params = UrlParams::from_pairs([("dateto", "2024-03-01")]);

        let options = svc
            .resolve(UserId::new(5), course(), &DisplayOptionsSource::Url(params))
            .await
            .unwrap();
        assert_eq!(
            options.temporal(),
            TemporalFilter::Range {
                from: None,
                to: NaiveDate::from_ymd_opt(2024, 3, 1),
            }
        );
        assert_eq!(repo.page_size(UserId::new(5)).await.unwrap(), None);
        assert_eq!(svc.lookback_choices().len(), 6);
    }
}
