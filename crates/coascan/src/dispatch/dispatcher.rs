use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, info_span, warn};

use crate::db::job_repo::{self, RetryOutcome};
use crate::db::Database;
use crate::model::Job;
use crate::pipeline::SubmissionParser;

use super::{DispatchError, DispatcherSettings, DrainSummary};

pub struct Dispatcher {
    db: Database,
    parser: Arc<dyn SubmissionParser>,
    settings: DispatcherSettings,
}

impl Dispatcher {
    pub fn new(db: Database, parser: Arc<dyn SubmissionParser>, settings: DispatcherSettings) -> Self {
        Self {
            db,
            parser,
            settings,
        }
    }

    pub fn settings(&self) -> &DispatcherSettings {
        &self.settings
    }

    /// Claims up to `batch_size` jobs and processes them sequentially.
    ///
    /// Only a failed claim is returned as an error. Per-job failures are
    /// recorded on the job and counted in the summary.
    pub fn drain(&self, batch_size: Option<u32>) -> Result<DrainSummary, DispatchError> {
        let limit = self.settings.batch_size(batch_size);
        let _span = info_span!("drain", batch_size = limit).entered();
        let deadline = Instant::now().checked_add(self.settings.budget);

        let now = Utc::now();
        let jobs = job_repo::claim_batch(&self.db, limit, now, self.stale_before(now))?;

        let mut summary = DrainSummary {
            claimed: jobs.len() as u32,
            ..DrainSummary::default()
        };
        if jobs.is_empty() {
            debug!("No pending jobs");
            return Ok(summary);
        }

        let mut remaining = jobs.into_iter();
        for job in remaining.by_ref() {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                warn!("Drain budget exhausted, releasing unstarted jobs");
                self.release(&job, &mut summary);
                break;
            }
            self.process(&job, &mut summary);
        }
        for job in remaining {
            self.release(&job, &mut summary);
        }

        info!(
            claimed = summary.claimed,
            done = summary.done,
            failed = summary.failed,
            requeued = summary.requeued,
            released = summary.released,
            "Drain finished"
        );
        Ok(summary)
    }

    fn stale_before(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.settings.lease)
            .ok()
            .and_then(|lease| now.checked_sub_signed(lease))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    fn process(&self, job: &Job, summary: &mut DrainSummary) {
        let _span = info_span!(
            "job",
            job_id = %job.id,
            submission_id = %job.submission_id,
            attempt = job.attempts + 1,
        )
        .entered();

        match self.parser.parse(&job.submission_id) {
            Ok(outcome) => {
                summary.done += 1;
                debug!(trust_score = outcome.trust_score, "Job done");
                match job_repo::mark_done(&self.db, job, Utc::now()) {
                    Ok(true) => {}
                    // The submission is already done; the new holder re-runs an
                    // idempotent parse.
                    Ok(false) => warn!("Claim superseded before the job was marked done"),
                    Err(e) => error!(error = %e, "Failed to mark job done"),
                }
            }
            Err(parse_err) => {
                summary.failed += 1;
                let message = parse_err.to_string();
                match job_repo::retry_or_fail(
                    &self.db,
                    job,
                    &message,
                    self.settings.max_attempts,
                    Utc::now(),
                ) {
                    Ok(RetryOutcome::Requeued { attempts }) => {
                        summary.requeued += 1;
                        warn!(attempts, error = %message, "Job failed, requeued");
                    }
                    Ok(RetryOutcome::Failed { attempts }) => {
                        error!(attempts, error = %message, "Job failed permanently");
                    }
                    Ok(RetryOutcome::NotClaimed) => {
                        warn!(error = %message, "Job failed after its claim was superseded");
                    }
                    Err(e) => {
                        error!(error = %e, "Retry bookkeeping failed, forcing job to failed");
                        match job_repo::force_fail(&self.db, job, &message, Utc::now()) {
                            Ok(true) => {}
                            Ok(false) => warn!("Claim superseded, job left to its new holder"),
                            Err(e) => error!(error = %e, "Failed to force job to failed"),
                        }
                    }
                }
            }
        }
    }

    fn release(&self, job: &Job, summary: &mut DrainSummary) {
        match job_repo::release(&self.db, job, Utc::now()) {
            Ok(true) => summary.released += 1,
            Ok(false) => warn!(job_id = %job.id, "Claim superseded before release"),
            // Left claimed; the lease makes it claimable again later.
            Err(e) => error!(job_id = %job.id, error = %e, "Failed to release job"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::submission_repo::{self, NewSubmission};
    use crate::model::{JobStatus, ParsedFields, SubmissionStatus};
    use crate::pipeline::{ParseError, ParseOutcome};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Parser stub that either always succeeds or always fails.
    struct StubParser {
        calls: AtomicU32,
        fail: bool,
    }

    impl StubParser {
        fn ok() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                fail: true,
            })
        }
    }

    impl SubmissionParser for StubParser {
        fn parse(&self, submission_id: &str) -> Result<ParseOutcome, ParseError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ParseError::NotFound(submission_id.to_string()));
            }
            Ok(ParseOutcome {
                submission_id: submission_id.to_string(),
                fields: ParsedFields::default(),
                flags: Vec::new(),
                trust_score: 100,
                warnings: Vec::new(),
            })
        }
    }

    fn seed(db: &Database, n: usize) {
        for i in 0..n {
            let id = format!("sub-{}", i);
            submission_repo::insert(
                db,
                &NewSubmission {
                    id: &id,
                    file_path: "raw/x.pdf",
                    file_mime: "application/pdf",
                    original_filename: None,
                    public_token: &format!("tok-{}", i),
                },
                Utc::now(),
            )
            .unwrap();
            let created = Utc::now() - chrono::Duration::seconds(100 - i as i64);
            db.with_conn(|conn| job_repo::insert_in(conn, &format!("job-{}", i), &id, created))
                .unwrap();
        }
    }

    fn settings(max_attempts: u32) -> DispatcherSettings {
        DispatcherSettings {
            max_attempts,
            ..DispatcherSettings::default()
        }
    }

    #[test]
    fn test_drain_empty_queue() {
        let db = Database::open_in_memory().unwrap();
        let dispatcher = Dispatcher::new(db, StubParser::ok(), settings(5));
        assert_eq!(dispatcher.drain(None).unwrap(), DrainSummary::default());
    }

    #[test]
    fn test_drain_processes_default_batch() {
        let db = Database::open_in_memory().unwrap();
        seed(&db, 5);
        let parser = StubParser::ok();
        let dispatcher = Dispatcher::new(db.clone(), parser.clone(), settings(5));

        let summary = dispatcher.drain(None).unwrap();
        assert_eq!(summary.claimed, 3);
        assert_eq!(summary.done, 3);
        assert_eq!(parser.calls.load(Ordering::SeqCst), 3);
        assert_eq!(job_repo::count_by_status(&db, JobStatus::Done).unwrap(), 3);
        assert_eq!(job_repo::count_by_status(&db, JobStatus::Pending).unwrap(), 2);
    }

    #[test]
    fn test_failure_requeues_then_fails() {
        let db = Database::open_in_memory().unwrap();
        seed(&db, 1);
        let dispatcher = Dispatcher::new(db.clone(), StubParser::failing(), settings(2));

        let first = dispatcher.drain(Some(1)).unwrap();
        assert_eq!((first.failed, first.requeued), (1, 1));

        let second = dispatcher.drain(Some(1)).unwrap();
        assert_eq!((second.failed, second.requeued), (1, 0));

        let job = job_repo::find_by_id(&db, "job-0").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempts, 2);
        let sub = submission_repo::find_by_id(&db, "sub-0").unwrap().unwrap();
        assert_eq!(sub.status, SubmissionStatus::Failed);

        assert_eq!(dispatcher.drain(Some(1)).unwrap().claimed, 0);
    }

    #[test]
    fn test_exhausted_budget_releases_without_attempt() {
        let db = Database::open_in_memory().unwrap();
        seed(&db, 3);
        let parser = StubParser::ok();
        let dispatcher = Dispatcher::new(
            db.clone(),
            parser.clone(),
            DispatcherSettings {
                budget: Duration::ZERO,
                ..DispatcherSettings::default()
            },
        );

        let summary = dispatcher.drain(Some(3)).unwrap();
        assert_eq!(summary.claimed, 3);
        assert_eq!(summary.released, 3);
        assert_eq!(summary.done, 0);
        assert_eq!(parser.calls.load(Ordering::SeqCst), 0);

        let job = job_repo::find_by_id(&db, "job-0").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 0);
    }

    #[test]
    fn test_stale_before_saturates() {
        let db = Database::open_in_memory().unwrap();
        let dispatcher = Dispatcher::new(
            db,
            StubParser::ok(),
            DispatcherSettings {
                lease: Duration::from_secs(u64::MAX),
                ..DispatcherSettings::default()
            },
        );
        let now = Utc::now();
        assert_eq!(dispatcher.stale_before(now), DateTime::<Utc>::MIN_UTC);
    }
}
