#![forbid(unsafe_code)]

pub mod app_services;
pub mod attempt_service;
pub mod attempt_tracker;
pub mod error;
pub mod report;

pub use report_core::Clock;

pub use app_services::ReportServices;
pub use attempt_service::AttemptService;
pub use attempt_tracker::AttemptTracker;
pub use error::{
    AttemptServiceError, DisplayOptionsServiceError, ReportError, ReportServicesError,
    TrackerError,
};
pub use report::{DisplayOptionsService, ReportQueryBuilder, ReportService};
