//! Job repository: queue operations for the `coa_jobs` table.
//!
//! Each claim stamps the row with a fresh `claim_id`. Every later write for
//! that claim matches on it, so once a lease expires and another dispatcher
//! takes the job over, the previous holder's writes affect nothing.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{format_ts, parse_ts, parse_ts_opt, submission_repo, Database, DatabaseError};
use crate::model::{Job, JobStatus};

const COLUMNS: &str = "id, submission_id, status, attempts, last_error, claimed_at, claim_id, \
                       created_at, updated_at";

fn from_row(row: &Row<'_>) -> Result<Job, rusqlite::Error> {
    Ok(Job {
        id: row.get(0)?,
        submission_id: row.get(1)?,
        status: row.get(2)?,
        attempts: row.get(3)?,
        last_error: row.get(4)?,
        claimed_at: parse_ts_opt(5, row.get(5)?)?,
        claim_id: row.get(6)?,
        created_at: parse_ts(7, &row.get::<_, String>(7)?)?,
        updated_at: parse_ts(8, &row.get::<_, String>(8)?)?,
    })
}

/// Result of recording a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Back to `pending`; will be picked up by a later drain.
    Requeued { attempts: u32 },
    /// Out of attempts; the job and its submission are terminally failed.
    Failed { attempts: u32 },
    /// The claim is gone: its lease expired and another dispatcher took the
    /// job, or the job was never claimed.
    NotClaimed,
}

/// Inserts a pending job for a submission.
pub(crate) fn insert_in(
    conn: &Connection,
    id: &str,
    submission_id: &str,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let ts = format_ts(now);
    conn.execute(
        "INSERT INTO coa_jobs (id, submission_id, status, attempts, created_at, updated_at)
         VALUES (?1, ?2, ?3, 0, ?4, ?4)",
        params![id, submission_id, JobStatus::Pending, ts],
    )?;
    Ok(())
}

/// Puts a terminally failed job back to `pending` with a fresh attempt budget.
/// Returns false if the job was not in `failed`.
pub(crate) fn reset_failed_in(
    conn: &Connection,
    id: &str,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE coa_jobs
         SET status = 'pending', attempts = 0, last_error = NULL, claimed_at = NULL,
             claim_id = NULL, updated_at = ?2
         WHERE id = ?1 AND status = 'failed'",
        params![id, format_ts(now)],
    )?;
    Ok(changed == 1)
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<Job>, DatabaseError> {
    db.with_conn(|conn| {
        let sql = format!("SELECT {} FROM coa_jobs WHERE id = ?1", COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query_map(params![id], from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Finds the job belonging to a submission.
pub fn find_by_submission(
    db: &Database,
    submission_id: &str,
) -> Result<Option<Job>, DatabaseError> {
    db.with_conn(|conn| find_by_submission_in(conn, submission_id))
}

pub(crate) fn find_by_submission_in(
    conn: &Connection,
    submission_id: &str,
) -> Result<Option<Job>, DatabaseError> {
    let sql = format!("SELECT {} FROM coa_jobs WHERE submission_id = ?1", COLUMNS);
    Ok(conn
        .query_row(&sql, params![submission_id], from_row)
        .optional()?)
}

/// Atomically claims up to `limit` jobs, oldest first.
///
/// Eligible jobs are `pending` ones plus `claimed` ones whose lease started
/// before `stale_before`. The selection and the status change are one
/// statement inside an `IMMEDIATE` transaction, so two dispatchers running
/// at the same time always receive disjoint sets. All jobs of one batch share
/// a new `claim_id`.
pub fn claim_batch(
    db: &Database,
    limit: u32,
    now: DateTime<Utc>,
    stale_before: DateTime<Utc>,
) -> Result<Vec<Job>, DatabaseError> {
    if limit == 0 {
        return Ok(Vec::new());
    }
    let sql = format!(
        "UPDATE coa_jobs
         SET status = 'claimed', claimed_at = ?1, claim_id = ?4, updated_at = ?1
         WHERE id IN (
             SELECT id FROM coa_jobs
             WHERE status = 'pending'
                OR (status = 'claimed' AND claimed_at IS NOT NULL AND claimed_at < ?2)
             ORDER BY created_at, id
             LIMIT ?3
         )
         RETURNING {}",
        COLUMNS
    );
    let mut jobs = db.with_immediate_tx(|tx| {
        let mut stmt = tx.prepare(&sql)?;
        let rows = stmt.query_map(
            params![
                format_ts(now),
                format_ts(stale_before),
                limit,
                Uuid::new_v4().to_string()
            ],
            from_row,
        )?;
        let jobs = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    })?;
    jobs.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    Ok(jobs)
}

/// Marks a claimed job done. Returns false if `job`'s claim is no longer
/// current.
pub fn mark_done(db: &Database, job: &Job, now: DateTime<Utc>) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE coa_jobs
             SET status = 'done', claimed_at = NULL, claim_id = NULL, updated_at = ?3
             WHERE id = ?1 AND status = 'claimed' AND claim_id = ?2",
            params![job.id, job.claim_id, format_ts(now)],
        )?;
        Ok(changed == 1)
    })
}

/// Records a failed attempt under `job`'s claim.
///
/// Increments `attempts` and stores `error`. Below `max_attempts` the job goes
/// back to `pending`; at the limit it becomes `failed` and its submission is
/// marked failed in the same transaction.
pub fn retry_or_fail(
    db: &Database,
    job: &Job,
    error: &str,
    max_attempts: u32,
    now: DateTime<Utc>,
) -> Result<RetryOutcome, DatabaseError> {
    let ts = format_ts(now);
    db.with_immediate_tx(|tx| {
        let updated: Option<(JobStatus, u32, String)> = tx
            .query_row(
                "UPDATE coa_jobs
                 SET attempts = attempts + 1,
                     last_error = ?3,
                     claimed_at = NULL,
                     claim_id = NULL,
                     updated_at = ?4,
                     status = CASE WHEN attempts + 1 >= ?5 THEN 'failed' ELSE 'pending' END
                 WHERE id = ?1 AND status = 'claimed' AND claim_id = ?2
                 RETURNING status, attempts, submission_id",
                params![job.id, job.claim_id, error, ts, max_attempts],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()?;

        match updated {
            None => Ok(RetryOutcome::NotClaimed),
            Some((JobStatus::Failed, attempts, submission_id)) => {
                submission_repo::mark_failed_in(tx, &submission_id, now)?;
                Ok(RetryOutcome::Failed { attempts })
            }
            Some((_, attempts, _)) => Ok(RetryOutcome::Requeued { attempts }),
        }
    })
}

/// Fails a job under `job`'s claim regardless of its attempt count. Used when
/// the retry bookkeeping itself could not be written. Returns false if the
/// claim is no longer current.
pub fn force_fail(
    db: &Database,
    job: &Job,
    error: &str,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let ts = format_ts(now);
    db.with_immediate_tx(|tx| {
        let submission_id: Option<String> = tx
            .query_row(
                "UPDATE coa_jobs
                 SET status = 'failed', last_error = ?3, claimed_at = NULL, claim_id = NULL,
                     updated_at = ?4
                 WHERE id = ?1 AND status = 'claimed' AND claim_id = ?2
                 RETURNING submission_id",
                params![job.id, job.claim_id, error, ts],
                |r| r.get(0),
            )
            .optional()?;
        match submission_id {
            Some(submission_id) => {
                submission_repo::mark_failed_in(tx, &submission_id, now)?;
                Ok(true)
            }
            None => Ok(false),
        }
    })
}

/// Returns a claimed job to `pending` without consuming an attempt. Returns
/// false if `job`'s claim is no longer current.
pub fn release(db: &Database, job: &Job, now: DateTime<Utc>) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE coa_jobs
             SET status = 'pending', claimed_at = NULL, claim_id = NULL, updated_at = ?3
             WHERE id = ?1 AND status = 'claimed' AND claim_id = ?2",
            params![job.id, job.claim_id, format_ts(now)],
        )?;
        Ok(changed == 1)
    })
}

/// Counts jobs with the given status.
pub fn count_by_status(db: &Database, status: JobStatus) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM coa_jobs WHERE status = ?1",
            params![status],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::submission_repo::tests::{sample, test_db};
    use crate::model::SubmissionStatus;
    use chrono::Duration;

    fn enqueue(db: &Database, submission_id: &str, job_id: &str, at: DateTime<Utc>) {
        db.with_conn(|conn| insert_in(conn, job_id, submission_id, at))
            .unwrap();
    }

    fn seed(db: &Database, n: usize) -> DateTime<Utc> {
        let base = Utc::now() - Duration::minutes(10);
        for i in 0..n {
            let sub = format!("sub-{}", i);
            sample(db, &sub, &format!("tok-{}", i));
            enqueue(db, &sub, &format!("job-{}", i), base + Duration::seconds(i as i64));
        }
        base
    }

    #[test]
    fn test_insert_and_find() {
        let db = test_db();
        seed(&db, 1);
        let job = find_by_id(&db, "job-0").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 0);
        assert!(job.claimed_at.is_none());
        assert_eq!(
            find_by_submission(&db, "sub-0").unwrap().unwrap().id,
            "job-0"
        );
    }

    #[test]
    fn test_one_job_per_submission() {
        let db = test_db();
        seed(&db, 1);
        let dup = db.with_conn(|conn| insert_in(conn, "job-x", "sub-0", Utc::now()));
        assert!(dup.is_err());
    }

    #[test]
    fn test_claim_batch_oldest_first_and_bounded() {
        let db = test_db();
        seed(&db, 5);
        let now = Utc::now();
        let claimed = claim_batch(&db, 3, now, now - Duration::minutes(10)).unwrap();
        let ids: Vec<_> = claimed.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec!["job-0", "job-1", "job-2"]);
        assert!(claimed.iter().all(|j| j.status == JobStatus::Claimed));
        assert!(claimed.iter().all(|j| j.claimed_at.is_some()));

        let rest = claim_batch(&db, 3, now, now - Duration::minutes(10)).unwrap();
        assert_eq!(rest.len(), 2);
        assert!(claim_batch(&db, 3, now, now - Duration::minutes(10))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_claim_zero_is_noop() {
        let db = test_db();
        seed(&db, 2);
        let now = Utc::now();
        assert!(claim_batch(&db, 0, now, now).unwrap().is_empty());
        assert_eq!(count_by_status(&db, JobStatus::Pending).unwrap(), 2);
    }

    #[test]
    fn test_stale_claim_is_reclaimable() {
        let db = test_db();
        seed(&db, 1);
        let first = Utc::now() - Duration::minutes(30);
        assert_eq!(claim_batch(&db, 1, first, first).unwrap().len(), 1);

        let now = Utc::now();
        // Lease of 60 minutes: still held.
        assert!(claim_batch(&db, 1, now, now - Duration::minutes(60))
            .unwrap()
            .is_empty());
        // Lease of 10 minutes: expired, reclaimed with a fresh lease.
        let again = claim_batch(&db, 1, now, now - Duration::minutes(10)).unwrap();
        assert_eq!(again.len(), 1);
        assert!(again[0].claimed_at.unwrap() > first);
    }

    #[test]
    fn test_retry_then_fail_at_max_attempts() {
        let db = test_db();
        seed(&db, 1);
        for expected in 1..=2 {
            let now = Utc::now();
            let claimed = claim_batch(&db, 1, now, now - Duration::minutes(10)).unwrap();
            let outcome = retry_or_fail(&db, &claimed[0], "boom", 3, now).unwrap();
            assert_eq!(outcome, RetryOutcome::Requeued { attempts: expected });
        }
        let now = Utc::now();
        let claimed = claim_batch(&db, 1, now, now - Duration::minutes(10)).unwrap();
        let outcome = retry_or_fail(&db, &claimed[0], "boom", 3, now).unwrap();
        assert_eq!(outcome, RetryOutcome::Failed { attempts: 3 });

        let job = find_by_id(&db, "job-0").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.last_error.as_deref(), Some("boom"));
        assert!(job.claim_id.is_none());

        let sub = submission_repo::find_by_id(&db, "sub-0").unwrap().unwrap();
        assert_eq!(sub.status, SubmissionStatus::Failed);

        // Failed jobs are never claimed again.
        assert!(claim_batch(&db, 1, now, now).unwrap().is_empty());
    }

    #[test]
    fn test_retry_requires_claim() {
        let db = test_db();
        seed(&db, 1);
        let pending = find_by_id(&db, "job-0").unwrap().unwrap();
        let outcome = retry_or_fail(&db, &pending, "boom", 3, Utc::now()).unwrap();
        assert_eq!(outcome, RetryOutcome::NotClaimed);
        assert_eq!(find_by_id(&db, "job-0").unwrap().unwrap().attempts, 0);
    }

    #[test]
    fn test_each_claim_gets_a_new_id() {
        let db = test_db();
        seed(&db, 2);
        let now = Utc::now();
        let first = claim_batch(&db, 1, now, now).unwrap();
        let second = claim_batch(&db, 1, now, now).unwrap();
        assert!(first[0].claim_id.is_some());
        assert_ne!(first[0].claim_id, second[0].claim_id);
    }

    #[test]
    fn test_superseded_claim_cannot_write() {
        let db = test_db();
        seed(&db, 1);
        let first_at = Utc::now() - Duration::minutes(30);
        let stale = claim_batch(&db, 1, first_at, first_at).unwrap().remove(0);

        let now = Utc::now();
        let current = claim_batch(&db, 1, now, now - Duration::minutes(10))
            .unwrap()
            .remove(0);
        assert_eq!(current.id, stale.id);

        assert_eq!(
            retry_or_fail(&db, &stale, "late failure", 5, now).unwrap(),
            RetryOutcome::NotClaimed
        );
        assert!(!mark_done(&db, &stale, now).unwrap());
        assert!(!release(&db, &stale, now).unwrap());
        assert!(!force_fail(&db, &stale, "late failure", now).unwrap());

        let job = find_by_id(&db, "job-0").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Claimed);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.claim_id, current.claim_id);
        assert!(claim_batch(&db, 1, now, now - Duration::minutes(10))
            .unwrap()
            .is_empty());

        assert!(mark_done(&db, &current, now).unwrap());
    }

    #[test]
    fn test_release_keeps_attempts() {
        let db = test_db();
        seed(&db, 1);
        let now = Utc::now();
        let claimed = claim_batch(&db, 1, now, now).unwrap().remove(0);
        assert!(release(&db, &claimed, now).unwrap());
        let job = find_by_id(&db, "job-0").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 0);
        assert!(job.claimed_at.is_none());
        assert!(job.claim_id.is_none());
        assert!(!release(&db, &claimed, now).unwrap());
    }

    #[test]
    fn test_force_fail_and_reset() {
        let db = test_db();
        seed(&db, 1);
        let now = Utc::now();
        let claimed = claim_batch(&db, 1, now, now).unwrap().remove(0);
        assert!(force_fail(&db, &claimed, "bookkeeping", now).unwrap());
        assert_eq!(
            find_by_id(&db, "job-0").unwrap().unwrap().status,
            JobStatus::Failed
        );

        let reset = db
            .with_conn(|conn| reset_failed_in(conn, "job-0", Utc::now()))
            .unwrap();
        assert!(reset);
        let job = find_by_id(&db, "job-0").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.last_error.is_none());
    }

    #[test]
    fn test_mark_done_only_from_claimed() {
        let db = test_db();
        seed(&db, 1);
        let now = Utc::now();
        let pending = find_by_id(&db, "job-0").unwrap().unwrap();
        assert!(!mark_done(&db, &pending, now).unwrap());
        let claimed = claim_batch(&db, 1, now, now).unwrap().remove(0);
        assert!(mark_done(&db, &claimed, now).unwrap());
        assert_eq!(count_by_status(&db, JobStatus::Done).unwrap(), 1);
    }
}
