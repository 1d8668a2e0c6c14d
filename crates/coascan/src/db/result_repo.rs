//! Parse results: `coa_parsed` and `coa_flags`.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{format_ts, submission_repo, Database, DatabaseError};
use crate::model::{Flag, ParsedFields};

/// Writes a complete parse result.
///
/// One `IMMEDIATE` transaction: upsert fields, replace flags, then mark the
/// submission done. Re-running replaces the previous result instead of
/// appending to it.
pub fn save_result(
    db: &Database,
    submission_id: &str,
    fields: &ParsedFields,
    flags: &[Flag],
    trust_score: u8,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    db.with_immediate_tx(|tx| {
        upsert_fields_in(tx, submission_id, fields, now)?;
        replace_flags_in(tx, submission_id, flags)?;
        submission_repo::mark_done_in(tx, submission_id, trust_score, now)
    })
}

fn upsert_fields_in(
    conn: &Connection,
    submission_id: &str,
    fields: &ParsedFields,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO coa_parsed (submission_id, ingredient, batch_lot, lab_name, report_date,
         updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(submission_id) DO UPDATE SET
             ingredient = excluded.ingredient,
             batch_lot = excluded.batch_lot,
             lab_name = excluded.lab_name,
             report_date = excluded.report_date,
             updated_at = excluded.updated_at",
        params![
            submission_id,
            fields.ingredient,
            fields.batch_lot,
            fields.lab_name,
            fields.report_date,
            format_ts(now),
        ],
    )?;
    Ok(())
}

fn replace_flags_in(
    conn: &Connection,
    submission_id: &str,
    flags: &[Flag],
) -> Result<(), DatabaseError> {
    conn.execute(
        "DELETE FROM coa_flags WHERE submission_id = ?1",
        params![submission_id],
    )?;
    let mut stmt = conn.prepare(
        "INSERT INTO coa_flags (submission_id, code, severity, message, details)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for flag in flags {
        let details = flag
            .details
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        stmt.execute(params![
            submission_id,
            flag.code,
            flag.severity,
            flag.message,
            details
        ])?;
    }
    Ok(())
}

/// Loads the parsed fields of a submission, if a parse has been stored.
pub fn find_fields(
    db: &Database,
    submission_id: &str,
) -> Result<Option<ParsedFields>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT ingredient, batch_lot, lab_name, report_date
                 FROM coa_parsed WHERE submission_id = ?1",
                params![submission_id],
                |r| {
                    Ok(ParsedFields {
                        ingredient: r.get(0)?,
                        batch_lot: r.get(1)?,
                        lab_name: r.get(2)?,
                        report_date: r.get(3)?,
                    })
                },
            )
            .optional()?)
    })
}

/// Lists the flags of a submission in insertion order.
pub fn list_flags(db: &Database, submission_id: &str) -> Result<Vec<Flag>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT code, severity, message, details FROM coa_flags
             WHERE submission_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![submission_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, u32>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, Option<String>>(3)?,
            ))
        })?;

        let mut flags = Vec::new();
        for row in rows {
            let (code, severity, message, details) = row?;
            let details = details
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?;
            flags.push(Flag {
                code,
                severity,
                message,
                details,
            });
        }
        Ok(flags)
    })
}
