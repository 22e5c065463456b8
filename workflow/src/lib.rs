mod catalog;
mod config;
mod controller;
mod error;
mod layout;
mod record;
mod report;
mod runner;
mod store;

pub use catalog::PLACEHOLDER_OPTION;
pub use catalog::QuestionSpec;
pub use catalog::Setup;
pub use catalog::SetupCatalog;
pub use catalog::SetupKind;
pub use catalog::StepSpec;
pub use config::WorkflowConfig;
pub use controller::ExportSummary;
pub use controller::Notice;
pub use controller::SetupStatus;
pub use controller::WorkflowController;
pub use error::Result;
pub use error::WorkflowError;
pub use layout::DataLayout;
pub use record::AnswerValue;
pub use record::Answers;
pub use record::FlatRecord;
pub use record::Intake;
pub use record::SessionRecord;
pub use report::HeaderPolicy;
pub use report::Report;
pub use runner::RunnerAction;
pub use runner::RunnerState;
pub use runner::SetupRunner;
pub use store::SessionStore;
