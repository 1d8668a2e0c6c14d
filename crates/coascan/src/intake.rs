//! Upload registration and job submission.
//!
//! `register` creates the submission row and hands back a direct-upload
//! target; the client uploads the file itself and then calls `submit`,
//! which enqueues the parse job.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info};

use crate::db::submission_repo::{self, NewSubmission};
use crate::db::{job_repo, Database, DatabaseError};
use crate::error::StorageError;
use crate::model::{JobStatus, SubmissionStatus};
use crate::sanitize;
use crate::secrets::{self, SecretError};
use crate::storage::{BlobStore, RAW_PREFIX};

/// MIME type recorded when the client does not declare one.
pub const DEFAULT_MIME: &str = "application/octet-stream";

/// Extension used when the file name has no usable one.
const FALLBACK_EXTENSION: &str = "bin";

const MAX_EXTENSION_LEN: usize = 10;

#[derive(Error, Debug)]
pub enum IntakeError {
    /// Bad input; nothing was written.
    #[error("{0}")]
    Validation(String),

    #[error("submission not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Token generation failed: {0}")]
    Secret(#[from] SecretError),
}

/// Returned by [`Intake::register`].
#[derive(Debug, Clone)]
pub struct Registration {
    pub submission_id: String,
    pub public_token: String,
    pub upload_url: String,
    pub upload_headers: BTreeMap<String, String>,
}

pub struct Intake {
    db: Database,
    store: Arc<dyn BlobStore>,
}

impl Intake {
    pub fn new(db: Database, store: Arc<dyn BlobStore>) -> Self {
        Self { db, store }
    }

    /// Registers an upload: inserts a `queued` submission under a fresh
    /// `raw/<uuid>.<ext>` key and returns where to upload the file.
    pub fn register(
        &self,
        filename: &str,
        mime_type: Option<&str>,
    ) -> Result<Registration, IntakeError> {
        let filename = filename.trim();
        if filename.is_empty() {
            return Err(IntakeError::Validation("filename required".to_string()));
        }
        let mime = mime_type
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_MIME);

        let id = uuid::Uuid::new_v4().to_string();
        let key = storage_key(&id, filename);
        let token = secrets::generate_public_token()?;

        submission_repo::insert(
            &self.db,
            &NewSubmission {
                id: &id,
                file_path: &key,
                file_mime: mime,
                original_filename: Some(filename),
                public_token: &token,
            },
            Utc::now(),
        )?;

        let target = self.store.upload_target(&key, mime)?;

        info!(
            submission_id = %id,
            file = %sanitize::redact_key(&key),
            mime,
            "Upload registered"
        );

        Ok(Registration {
            submission_id: id,
            public_token: token,
            upload_url: target.url,
            upload_headers: target.headers,
        })
    }

    /// Enqueues the parse job for a submission and returns its public token.
    ///
    /// Idempotent: a submission that already has a live or finished job is
    /// left alone. A submission whose job failed permanently is requeued with
    /// a fresh attempt budget.
    pub fn submit(&self, submission_id: &str) -> Result<String, IntakeError> {
        let now = Utc::now();
        let token = self.db.with_immediate_tx(|tx| {
            let Some(submission) = submission_repo::find_by_id_in(tx, submission_id)? else {
                return Ok(None);
            };

            match job_repo::find_by_submission_in(tx, submission_id)? {
                None if submission.status == SubmissionStatus::Done => {
                    debug!("Submission already done, not enqueueing");
                }
                None => {
                    let job_id = uuid::Uuid::new_v4().to_string();
                    job_repo::insert_in(tx, &job_id, submission_id, now)?;
                    submission_repo::set_status_in(
                        tx,
                        submission_id,
                        SubmissionStatus::Processing,
                        now,
                    )?;
                    info!(submission_id, job_id = %job_id, "Job enqueued");
                }
                Some(job) if job.status == JobStatus::Failed => {
                    job_repo::reset_failed_in(tx, &job.id, now)?;
                    submission_repo::set_status_in(
                        tx,
                        submission_id,
                        SubmissionStatus::Processing,
                        now,
                    )?;
                    info!(submission_id, job_id = %job.id, "Failed job requeued");
                }
                Some(job) => {
                    debug!(submission_id, status = %job.status, "Job already exists");
                }
            }
            Ok(Some(submission.public_token))
        })?;

        token.ok_or_else(|| IntakeError::NotFound(submission_id.to_string()))
    }
}

/// Builds `raw/<id>.<ext>` from the original file name.
pub fn storage_key(id: &str, filename: &str) -> String {
    format!("{}{}.{}", RAW_PREFIX, id, file_extension(filename))
}

/// Lower-cased ASCII-alphanumeric extension of `filename`, or `bin`.
fn file_extension(filename: &str) -> String {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string())
}
