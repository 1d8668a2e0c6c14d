//! Result lookup by public token.
//!
//! Unknown and malformed tokens produce the same `NotFound` answer, and
//! malformed ones never reach the database.

use tracing::{debug, error};

use crate::db::{result_repo, submission_repo, Database, DatabaseError};
use crate::model::{Flag, ParsedFields, SubmissionStatus};
use crate::sanitize;
use crate::secrets;

#[derive(Debug, Clone, PartialEq)]
pub enum LookupResult {
    NotFound,
    /// Queued or being processed.
    Pending { status: SubmissionStatus },
    /// Processing gave up. No detail is exposed.
    Failed,
    Done {
        fields: ParsedFields,
        flags: Vec<Flag>,
        trust_score: u8,
    },
}

impl LookupResult {
    /// Submission status behind the result, `None` for `NotFound`.
    pub fn status(&self) -> Option<SubmissionStatus> {
        match self {
            Self::NotFound => None,
            Self::Pending { status } => Some(*status),
            Self::Failed => Some(SubmissionStatus::Failed),
            Self::Done { .. } => Some(SubmissionStatus::Done),
        }
    }
}

pub struct ResultLookup {
    db: Database,
}

impl ResultLookup {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn by_token(&self, token: &str) -> Result<LookupResult, DatabaseError> {
        if !secrets::is_well_formed_token(token) {
            debug!("Rejected malformed token");
            return Ok(LookupResult::NotFound);
        }

        let Some(submission) = submission_repo::find_by_token(&self.db, token)? else {
            debug!(token = %sanitize::hash_value(token), "Unknown token");
            return Ok(LookupResult::NotFound);
        };

        match submission.status {
            SubmissionStatus::Queued | SubmissionStatus::Processing => {
                Ok(LookupResult::Pending {
                    status: submission.status,
                })
            }
            SubmissionStatus::Failed => Ok(LookupResult::Failed),
            SubmissionStatus::Done => {
                let Some(trust_score) = submission.trust_score else {
                    error!(
                        token = %sanitize::redact_token(token),
                        "Done submission without a trust score"
                    );
                    return Ok(LookupResult::Pending {
                        status: SubmissionStatus::Processing,
                    });
                };
                let fields = result_repo::find_fields(&self.db, &submission.id)?.unwrap_or_default();
                let flags = result_repo::list_flags(&self.db, &submission.id)?;
                Ok(LookupResult::Done {
                    fields,
                    flags,
                    trust_score,
                })
            }
        }
    }
}
