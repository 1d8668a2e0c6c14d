//! Pipeline entities: submissions, jobs, parsed fields and flags.
//!
//! A `Submission` is the root entity. Its `Job`, `ParsedFields` and `Flag`
//! rows are owned by it and removed with it.

use std::fmt;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Lifecycle of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Queued,
    Processing,
    Done,
    Failed,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(Self::Queued),
            "processing" => Some(Self::Processing),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Lifecycle of a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Claimed,
    Done,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Claimed => "claimed",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "claimed" => Some(Self::Claimed),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

macro_rules! sql_text_enum {
    ($ty:ty) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let text = value.as_str()?;
                <$ty>::parse(text).ok_or(FromSqlError::InvalidType)
            }
        }
    };
}

sql_text_enum!(SubmissionStatus);
sql_text_enum!(JobStatus);

/// One uploaded COA document and its processing record.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub id: String,
    pub file_path: String,
    pub file_mime: String,
    pub original_filename: Option<String>,
    pub status: SubmissionStatus,
    /// Present iff `status == Done`.
    pub trust_score: Option<u8>,
    pub public_token: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A queue entry driving asynchronous processing of a submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: String,
    pub submission_id: String,
    pub status: JobStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    /// Lease start; only set while `status == Claimed`.
    pub claimed_at: Option<DateTime<Utc>>,
    /// Identifies the claim that produced this snapshot. Writes made on
    /// behalf of a claim only land while the row still carries the same ID.
    pub claim_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Structured extraction result. Every field is best-effort.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedFields {
    pub ingredient: Option<String>,
    pub batch_lot: Option<String>,
    pub lab_name: Option<String>,
    pub report_date: Option<String>,
}

/// One validation finding. Higher severity is worse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flag {
    pub code: String,
    pub severity: u32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl Flag {
    pub fn new(code: &str, severity: u32, message: &str) -> Self {
        Self {
            code: code.to_string(),
            severity,
            message: message.to_string(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}
