//! The COA parser: download, extract text, extract fields, evaluate rules,
//! score and persist, one step after another.

pub mod config;
pub mod context;
pub mod error;
pub mod runner;

pub use config::PipelineConfig;
pub use context::{ParseContext, ParseOutcome};
pub use error::{ParseError, PipelineWarning};
pub use runner::Parser;

/// Parses one submission end to end.
///
/// The dispatcher depends on this trait rather than on [`Parser`] so it can
/// be driven by other implementations.
pub trait SubmissionParser: Send + Sync {
    fn parse(&self, submission_id: &str) -> Result<ParseOutcome, ParseError>;
}
