//! Job repository: inserts, the claim, guarded status transitions and listing.
//!
//! Every write is a single SQL statement whose `WHERE` clause carries the
//! state-machine guard, so a crash between calls always leaves the last
//! committed row and a terminal row can never be rewritten.

use rusqlite::types::ToSql;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{Database, DatabaseError};
use crate::worker::job::JobStatus;

/// Rows currently owned by the worker.
const GUARD_PROCESSING: &str = "status = 'PROCESSING'";

fn status_in(statuses: impl Iterator<Item = JobStatus>) -> String {
    let quoted: Vec<String> = statuses.map(|s| format!("'{}'", s.as_str())).collect();
    format!("status IN ({})", quoted.join(", "))
}

/// Rows that are still owned by the queue or the worker.
fn active_guard() -> String {
    status_in(JobStatus::ALL.into_iter().filter(|s| !s.is_terminal()))
}

/// Rows the state machine allows to move to `next`.
fn transition_guard(next: JobStatus) -> String {
    status_in(JobStatus::predecessors(next))
}

/// A raw job row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRow {
    pub id: i64,
    pub file_name: String,
    pub upload_timestamp: String,
    pub status: String,
    pub format: String,
    pub size: f64,
    pub duration_seconds: Option<f64>,
    pub resolution: Option<String>,
    pub progress_percentage: Option<i64>,
    pub processing_time: Option<f64>,
    pub processed_frames: Option<i64>,
    pub detected_objects: Option<i64>,
    pub average_confidence: Option<f64>,
    pub thumbnail_path: Option<String>,
    pub final_output_video_path: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub error: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            file_name: row.get("file_name")?,
            upload_timestamp: row.get("upload_timestamp")?,
            status: row.get("status")?,
            format: row.get("format")?,
            size: row.get("size")?,
            duration_seconds: row.get("duration_seconds")?,
            resolution: row.get("resolution")?,
            progress_percentage: row.get("progress_percentage")?,
            processing_time: row.get("processing_time")?,
            processed_frames: row.get("processed_frames")?,
            detected_objects: row.get("detected_objects")?,
            average_confidence: row.get("average_confidence")?,
            thumbnail_path: row.get("thumbnail_path")?,
            final_output_video_path: row.get("final_output_video_path")?,
            start_time: row.get("start_time")?,
            end_time: row.get("end_time")?,
            error: row.get("error")?,
        })
    }
}

/// Fields supplied by the upload side when a job is created.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub file_name: String,
    pub format: String,
    /// Size in megabytes.
    pub size: f64,
    pub upload_timestamp: String,
}

/// Partial update. `None` leaves the column untouched.
#[derive(Debug, Default, Clone)]
pub struct JobUpdate {
    pub duration_seconds: Option<f64>,
    pub resolution: Option<String>,
    pub progress_percentage: Option<u8>,
    pub processing_time: Option<f64>,
    pub processed_frames: Option<i64>,
    pub detected_objects: Option<i64>,
    pub average_confidence: Option<f64>,
    pub thumbnail_path: Option<String>,
    pub final_output_video_path: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub error: Option<String>,
}

/// Terminal metrics written by the COMPLETED transition.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionMetrics {
    pub duration_seconds: f64,
    pub resolution: String,
    pub processing_time: f64,
    pub processed_frames: i64,
    pub detected_objects: i64,
    pub average_confidence: f64,
    pub final_output_video_path: Option<String>,
    pub end_time: String,
}

/// Query filter parameters for job listing.
#[derive(Debug, Default, Clone)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub exclude_status: Option<JobStatus>,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Inserts a new QUEUED job and returns its id.
pub fn insert(db: &Database, job: &NewJob) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO jobs (file_name, upload_timestamp, status, format, size)
             VALUES (?1, ?2, 'QUEUED', ?3, ?4)",
            params![job.file_name, job.upload_timestamp, job.format, job.size],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: i64) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM jobs WHERE id = ?1",
                params![id],
                JobRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Queries jobs with filters, newest upload first. Returns (rows, total_count).
pub fn query(db: &Database, filter: &JobFilter) -> Result<(Vec<JobRow>, u64), DatabaseError> {
    db.with_conn(|conn| {
        let mut conditions = Vec::new();
        let mut param_values: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            param_values.push(Box::new(status.as_str()));
            conditions.push(format!("status = ?{}", param_values.len()));
        }
        if let Some(exclude_status) = filter.exclude_status {
            param_values.push(Box::new(exclude_status.as_str()));
            conditions.push(format!("status != ?{}", param_values.len()));
        }
        if let Some(ref from_date) = filter.from_date {
            param_values.push(Box::new(from_date.clone()));
            conditions.push(format!("upload_timestamp >= ?{}", param_values.len()));
        }
        if let Some(ref to_date) = filter.to_date {
            param_values.push(Box::new(to_date.clone()));
            conditions.push(format!("upload_timestamp <= ?{}", param_values.len()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) FROM jobs {}", where_clause);
        let params_ref: Vec<&dyn ToSql> = param_values.iter().map(|p| p.as_ref()).collect();
        let total: u64 = conn.query_row(&count_sql, params_ref.as_slice(), |r| r.get(0))?;

        let limit = filter.limit.unwrap_or(100) as i64;
        let offset = filter.offset.unwrap_or(0) as i64;
        param_values.push(Box::new(limit));
        param_values.push(Box::new(offset));
        let query_sql = format!(
            "SELECT * FROM jobs {} ORDER BY upload_timestamp DESC, id DESC LIMIT ?{} OFFSET ?{}",
            where_clause,
            param_values.len() - 1,
            param_values.len()
        );

        let params_ref: Vec<&dyn ToSql> = param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&query_sql)?;
        let rows: Vec<JobRow> = stmt
            .query_map(params_ref.as_slice(), JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((rows, total))
    })
}

/// Counts jobs with the given status.
pub fn count_by_status(db: &Database, status: JobStatus) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE status = ?1",
            params![status.as_str()],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Claims the oldest QUEUED job: QUEUED → PROCESSING in one statement.
///
/// The claim succeeds only if the row is still QUEUED and no other row is
/// PROCESSING, so two callers can never both own a job.
pub fn claim_next_queued(db: &Database, start_time: &str) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "UPDATE jobs
                 SET status = 'PROCESSING', start_time = ?1, progress_percentage = 0,
                     processing_time = 0, error = NULL
                 WHERE id = (
                         SELECT id FROM jobs WHERE status = 'QUEUED'
                         ORDER BY upload_timestamp ASC, id ASC LIMIT 1
                     )
                   AND status = 'QUEUED'
                   AND NOT EXISTS (SELECT 1 FROM jobs WHERE status = 'PROCESSING')
                 RETURNING *",
                params![start_time],
                JobRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Partial update of a non-terminal job. Returns whether a row changed.
pub fn update_fields(db: &Database, id: i64, update: &JobUpdate) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| apply_update(conn, id, None, update, &active_guard()))
}

/// Persists progress. Refuses to lower an already persisted percentage.
pub fn update_progress(
    db: &Database,
    id: i64,
    percentage: u8,
    processing_time: f64,
) -> Result<bool, DatabaseError> {
    let percentage = percentage.min(100);
    let update = JobUpdate {
        progress_percentage: Some(percentage),
        processing_time: Some(processing_time),
        ..Default::default()
    };
    let guard = format!(
        "{} AND COALESCE(progress_percentage, 0) <= {}",
        GUARD_PROCESSING, percentage
    );
    db.with_conn(|conn| apply_update(conn, id, None, &update, &guard))
}

/// Records the thumbnail path once, while the job is still PROCESSING.
pub fn set_thumbnail(db: &Database, id: i64, thumbnail_path: &str) -> Result<bool, DatabaseError> {
    let update = JobUpdate {
        thumbnail_path: Some(thumbnail_path.to_string()),
        ..Default::default()
    };
    let guard = format!("{} AND thumbnail_path IS NULL", GUARD_PROCESSING);
    db.with_conn(|conn| apply_update(conn, id, None, &update, &guard))
}

/// PROCESSING → COMPLETED with terminal metrics.
pub fn mark_completed(
    db: &Database,
    id: i64,
    metrics: &CompletionMetrics,
) -> Result<bool, DatabaseError> {
    let update = JobUpdate {
        duration_seconds: Some(metrics.duration_seconds),
        resolution: Some(metrics.resolution.clone()),
        progress_percentage: Some(100),
        processing_time: Some(metrics.processing_time),
        processed_frames: Some(metrics.processed_frames),
        detected_objects: Some(metrics.detected_objects),
        average_confidence: Some(metrics.average_confidence),
        final_output_video_path: metrics.final_output_video_path.clone(),
        end_time: Some(metrics.end_time.clone()),
        ..Default::default()
    };
    let guard = transition_guard(JobStatus::Completed);
    db.with_conn(|conn| apply_update(conn, id, Some(JobStatus::Completed), &update, &guard))
}

/// PROCESSING → FAILED with the failure reason.
pub fn mark_failed(
    db: &Database,
    id: i64,
    error: &str,
    end_time: &str,
) -> Result<bool, DatabaseError> {
    let update = JobUpdate {
        error: Some(error.to_string()),
        end_time: Some(end_time.to_string()),
        ..Default::default()
    };
    let guard = transition_guard(JobStatus::Failed);
    db.with_conn(|conn| apply_update(conn, id, Some(JobStatus::Failed), &update, &guard))
}

/// Fails every PROCESSING job. Used at startup for jobs orphaned by a crash.
pub fn fail_interrupted(db: &Database, reason: &str, end_time: &str) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let sql = format!(
            "UPDATE jobs SET status = 'FAILED', error = ?1, end_time = ?2 WHERE {}",
            transition_guard(JobStatus::Failed)
        );
        let changed = conn.execute(&sql, params![reason, end_time])?;
        Ok(changed)
    })
}

/// Builds and runs one guarded `UPDATE` from the populated fields.
fn apply_update(
    conn: &Connection,
    id: i64,
    status: Option<JobStatus>,
    update: &JobUpdate,
    guard: &str,
) -> Result<bool, DatabaseError> {
    let mut assignments: Vec<String> = Vec::new();
    let mut values: Vec<Box<dyn ToSql>> = Vec::new();

    macro_rules! assign {
        ($column:ident) => {
            if let Some(ref value) = update.$column {
                values.push(Box::new(value.clone()));
                assignments.push(format!("{} = ?{}", stringify!($column), values.len()));
            }
        };
    }

    if let Some(status) = status {
        values.push(Box::new(status.as_str()));
        assignments.push(format!("status = ?{}", values.len()));
    }
    assign!(duration_seconds);
    assign!(resolution);
    assign!(progress_percentage);
    assign!(processing_time);
    assign!(processed_frames);
    assign!(detected_objects);
    assign!(average_confidence);
    assign!(thumbnail_path);
    assign!(final_output_video_path);
    assign!(start_time);
    assign!(end_time);
    assign!(error);

    if assignments.is_empty() {
        return Ok(false);
    }

    values.push(Box::new(id));
    let sql = format!(
        "UPDATE jobs SET {} WHERE id = ?{} AND ({})",
        assignments.join(", "),
        values.len(),
        guard
    );
    let params_ref: Vec<&dyn ToSql> = values.iter().map(|p| p.as_ref()).collect();
    let changed = conn.execute(&sql, params_ref.as_slice())?;
    Ok(changed > 0)
}
