pub mod classifier;
pub mod email;
pub mod export;
pub mod llm;
pub mod loader;
pub mod model;
pub mod planner;
pub mod report;
pub mod risk;
pub mod session;

pub use classifier::{BatchOutcome, Classifier, PromptTemplate};
pub use email::{EmailContext, EmailKind};
pub use export::{export_all, ExportError, ExportFormat, ExportOutcome};
pub use llm::{LlmError, LlmOverrides, LlmSettings, ModelChain, ProviderKind, RetryPolicy};
pub use loader::{
    load_users, load_users_from_path, Dataset, DefaultApplied, LoadError, SchemaViolation,
};
pub use model::{AccessLevel, Classification, Disposition, UserRecord};
pub use planner::CleanupPlanner;
pub use report::{render_report, OutputFormat, Report, ReportRow, ReportSummary};
pub use risk::{RiskAssessment, RiskCalculator, RiskCategory, RiskSummary, ScoreBreakdown};
pub use session::Session;
