pub mod normalize;
pub mod orchestrator;
pub mod prompts;
pub mod report;

pub use orchestrator::{ReportSettings, ReportsResult, generate_reports};
pub use report::{ClientReport, PractitionerReport};
