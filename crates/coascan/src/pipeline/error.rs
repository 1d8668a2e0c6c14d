use thiserror::Error;

/// Failures that abort a parse. Apart from `SubmissionFailed` all of them
/// are retryable from the dispatcher's point of view.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("submission not found: {0}")]
    NotFound(String),

    /// Failed submissions only come back through a resubmit.
    #[error("submission {0} has failed; resubmit it before parsing again")]
    SubmissionFailed(String),

    #[error("download failed: {0}")]
    DownloadFailed(#[source] crate::error::StorageError),

    #[error("database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

/// Non-fatal problems recorded while parsing. The parse still completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineWarning {
    /// The document could not be read; rules ran against empty text.
    ExtractionFailed { reason: String },
    /// Text was extracted but looked like garbage and was discarded.
    UnusableText,
}
