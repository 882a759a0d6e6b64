//! The `etl_jobs` table.

use chrono::NaiveDate;
use duckdb::{Connection, Row};
use serde_json::{Map, Value};
use uuid::Uuid;
use zone_safety_etl_models::{EtlJob, JobStatus, RunMode};

use crate::DbError;
use crate::convert::{
    format_date, format_timestamp, parse_date, parse_enum, require_timestamp, to_i64, to_u64,
};

const COLUMNS: &str = "id, mode, status, as_of::TEXT, created_at::TEXT, started_at::TEXT,
    finished_at::TEXT, records_processed, zones_total, zones_completed, error, metadata";

struct JobRow {
    id: String,
    mode: String,
    status: String,
    as_of: String,
    created_at: String,
    started_at: Option<String>,
    finished_at: Option<String>,
    records_processed: i64,
    zones_total: i64,
    zones_completed: i64,
    error: Option<String>,
    metadata: String,
}

impl JobRow {
    fn read(row: &Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            mode: row.get(1)?,
            status: row.get(2)?,
            as_of: row.get(3)?,
            created_at: row.get(4)?,
            started_at: row.get(5)?,
            finished_at: row.get(6)?,
            records_processed: row.get(7)?,
            zones_total: row.get(8)?,
            zones_completed: row.get(9)?,
            error: row.get(10)?,
            metadata: row.get(11)?,
        })
    }
}

impl TryFrom<JobRow> for EtlJob {
    type Error = DbError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let metadata: Map<String, Value> = serde_json::from_str(&row.metadata)?;
        Ok(Self {
            id: Uuid::parse_str(&row.id).map_err(|e| DbError::Conversion {
                message: format!("invalid job id {:?}: {e}", row.id),
            })?,
            mode: parse_enum::<RunMode>("mode", &row.mode)?,
            status: parse_enum::<JobStatus>("status", &row.status)?,
            as_of: parse_date(&row.as_of)?,
            created_at: require_timestamp(&row.created_at)?,
            started_at: row.started_at.as_deref().map(require_timestamp).transpose()?,
            finished_at: row.finished_at.as_deref().map(require_timestamp).transpose()?,
            records_processed: to_u64("records_processed", row.records_processed)?,
            zones_total: to_u64("zones_total", row.zones_total)?,
            zones_completed: to_u64("zones_completed", row.zones_completed)?,
            error: row.error,
            metadata,
        })
    }
}

fn query(
    conn: &Connection,
    filter: &str,
    params: &[&dyn duckdb::ToSql],
) -> Result<Vec<EtlJob>, DbError> {
    let sql = format!("SELECT {COLUMNS} FROM etl_jobs {filter}");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params, JobRow::read)?;

    let mut jobs = Vec::new();
    for row in rows {
        jobs.push(EtlJob::try_from(row?)?);
    }
    Ok(jobs)
}

/// Inserts or replaces a job record.
///
/// # Errors
///
/// Returns [`DbError`] if encoding or the upsert fails.
pub fn save(conn: &Connection, job: &EtlJob) -> Result<(), DbError> {
    let metadata = serde_json::to_string(&job.metadata)?;

    conn.execute(
        "INSERT INTO etl_jobs (
            id, mode, status, as_of, created_at, started_at, finished_at,
            records_processed, zones_total, zones_completed, error, metadata
        ) VALUES (
            ?, ?, ?, CAST(? AS DATE), CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP),
            CAST(? AS TIMESTAMP), ?, ?, ?, ?, ?
        )
        ON CONFLICT (id) DO UPDATE SET
            status = EXCLUDED.status,
            started_at = EXCLUDED.started_at,
            finished_at = EXCLUDED.finished_at,
            records_processed = EXCLUDED.records_processed,
            zones_total = EXCLUDED.zones_total,
            zones_completed = EXCLUDED.zones_completed,
            error = EXCLUDED.error,
            metadata = EXCLUDED.metadata",
        duckdb::params![
            job.id.to_string(),
            job.mode.as_ref(),
            job.status.as_ref(),
            format_date(job.as_of),
            format_timestamp(&job.created_at),
            job.started_at.as_ref().map(format_timestamp),
            job.finished_at.as_ref().map(format_timestamp),
            to_i64(job.records_processed),
            to_i64(job.zones_total),
            to_i64(job.zones_completed),
            job.error,
            metadata,
        ],
    )?;

    Ok(())
}

/// Returns one job by id.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or the row is unreadable.
pub fn get(conn: &Connection, id: Uuid) -> Result<Option<EtlJob>, DbError> {
    let id = id.to_string();
    Ok(query(conn, "WHERE id = ?", duckdb::params![id])?
        .into_iter()
        .next())
}

/// Returns the most recent jobs, newest first.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a row is unreadable.
pub fn list(conn: &Connection, limit: usize) -> Result<Vec<EtlJob>, DbError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    query(
        conn,
        "ORDER BY created_at DESC LIMIT ?",
        duckdb::params![limit],
    )
}

/// Returns `SUCCEEDED` jobs, newest calculation date first and, within a
/// date, most recently finished first. `as_of` limits them to one date.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a row is unreadable.
pub fn succeeded(conn: &Connection, as_of: Option<NaiveDate>) -> Result<Vec<EtlJob>, DbError> {
    match as_of {
        Some(date) => {
            let date = format_date(date);
            query(
                conn,
                "WHERE status = 'SUCCEEDED' AND as_of = CAST(? AS DATE)
                 ORDER BY finished_at DESC",
                duckdb::params![date],
            )
        }
        None => query(
            conn,
            "WHERE status = 'SUCCEEDED' ORDER BY as_of DESC, finished_at DESC",
            &[],
        ),
    }
}
