//! Report option resolution, query planning and execution.

pub mod display_options_service;
pub mod query_builder;
pub mod service;

pub use display_options_service::DisplayOptionsService;
pub use query_builder::ReportQueryBuilder;
pub use service::ReportService;
