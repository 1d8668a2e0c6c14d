//! Submission repository: CRUD operations for the `coa_submissions` table.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{format_ts, parse_ts, parse_ts_opt, Database, DatabaseError};
use crate::model::{Submission, SubmissionStatus};

const COLUMNS: &str = "id, file_path, file_mime, original_filename, status, trust_score, \
                       public_token, created_at, updated_at, completed_at";

fn from_row(row: &Row<'_>) -> Result<Submission, rusqlite::Error> {
    Ok(Submission {
        id: row.get(0)?,
        file_path: row.get(1)?,
        file_mime: row.get(2)?,
        original_filename: row.get(3)?,
        status: row.get(4)?,
        trust_score: row.get(5)?,
        public_token: row.get(6)?,
        created_at: parse_ts(7, &row.get::<_, String>(7)?)?,
        updated_at: parse_ts(8, &row.get::<_, String>(8)?)?,
        completed_at: parse_ts_opt(9, row.get(9)?)?,
    })
}

/// Values needed to register a new submission.
#[derive(Debug, Clone)]
pub struct NewSubmission<'a> {
    pub id: &'a str,
    pub file_path: &'a str,
    pub file_mime: &'a str,
    pub original_filename: Option<&'a str>,
    pub public_token: &'a str,
}

/// Inserts a new submission with status `queued`.
pub fn insert(
    db: &Database,
    new: &NewSubmission<'_>,
    now: DateTime<Utc>,
) -> Result<Submission, DatabaseError> {
    let ts = format_ts(now);
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO coa_submissions (id, file_path, file_mime, original_filename, status,
             public_token, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                new.id,
                new.file_path,
                new.file_mime,
                new.original_filename,
                SubmissionStatus::Queued,
                new.public_token,
                ts,
            ],
        )?;
        find_by_id_in(conn, new.id)?.ok_or_else(|| DatabaseError::NotFound {
            entity: "submission",
            id: new.id.to_string(),
        })
    })
}

/// Finds a submission by its internal ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<Submission>, DatabaseError> {
    db.with_conn(|conn| find_by_id_in(conn, id))
}

pub(crate) fn find_by_id_in(
    conn: &Connection,
    id: &str,
) -> Result<Option<Submission>, DatabaseError> {
    let sql = format!("SELECT {} FROM coa_submissions WHERE id = ?1", COLUMNS);
    Ok(conn.query_row(&sql, params![id], from_row).optional()?)
}

/// Finds a submission by its public token.
pub fn find_by_token(db: &Database, token: &str) -> Result<Option<Submission>, DatabaseError> {
    db.with_conn(|conn| {
        let sql = format!("SELECT {} FROM coa_submissions WHERE public_token = ?1", COLUMNS);
        Ok(conn.query_row(&sql, params![token], from_row).optional()?)
    })
}

/// Moves a submission to `status`. Returns false when no row matched.
///
/// Callers are responsible for only requesting forward transitions; the
/// one sanctioned regression is an operator resubmit of a failed document.
pub(crate) fn set_status_in(
    conn: &Connection,
    id: &str,
    status: SubmissionStatus,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE coa_submissions SET status = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, status, format_ts(now)],
    )?;
    Ok(changed == 1)
}

/// Marks a submission done with its trust score. Must be the last write of a
/// parse so readers never see `done` without fields and flags.
///
/// A `failed` submission is terminal until resubmitted and is refused with
/// [`DatabaseError::InvalidState`].
pub(crate) fn mark_done_in(
    conn: &Connection,
    id: &str,
    trust_score: u8,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let ts = format_ts(now);
    let changed = conn.execute(
        "UPDATE coa_submissions
         SET status = ?2, trust_score = ?3, completed_at = ?4, updated_at = ?4
         WHERE id = ?1 AND status <> 'failed'",
        params![id, SubmissionStatus::Done, trust_score, ts],
    )?;
    if changed == 1 {
        return Ok(());
    }
    match find_by_id_in(conn, id)? {
        Some(current) => Err(DatabaseError::InvalidState {
            entity: "submission",
            id: id.to_string(),
            status: current.status.as_str().to_string(),
        }),
        None => Err(DatabaseError::NotFound {
            entity: "submission",
            id: id.to_string(),
        }),
    }
}

/// Marks a submission permanently failed (its job ran out of attempts).
/// A submission that already reached `done` is left alone.
pub(crate) fn mark_failed_in(
    conn: &Connection,
    id: &str,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let ts = format_ts(now);
    conn.execute(
        "UPDATE coa_submissions
         SET status = ?2, trust_score = NULL, completed_at = ?3, updated_at = ?3
         WHERE id = ?1 AND status <> 'done'",
        params![id, SubmissionStatus::Failed, ts],
    )?;
    Ok(())
}

/// Counts submissions with the given status.
pub fn count_by_status(db: &Database, status: SubmissionStatus) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM coa_submissions WHERE status = ?1",
            params![status],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}
