use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::db::job_repo::{self, JobRow};
use crate::db::{Database, DatabaseError};
use crate::error::AgritrackError;

/// Lifecycle of a job. Moves only forward:
/// QUEUED → PROCESSING → {COMPLETED, FAILED}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Queued,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "QUEUED",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }

    /// COMPLETED and FAILED are final.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }

    /// Statuses a job may hold immediately before entering `next`.
    pub fn predecessors(next: JobStatus) -> impl Iterator<Item = JobStatus> {
        Self::ALL
            .into_iter()
            .filter(move |status| status.can_transition_to(next))
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "QUEUED" => Ok(JobStatus::Queued),
            "PROCESSING" => Ok(JobStatus::Processing),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// Formats a timestamp the way the job table stores it: RFC 3339, UTC,
/// fixed microsecond precision so that text ordering matches time ordering.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// A job record with a typed status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: i64,
    pub file_name: String,
    pub upload_timestamp: String,
    pub status: JobStatus,
    pub format: String,
    pub size: f64,
    pub duration_seconds: Option<f64>,
    pub resolution: Option<String>,
    pub progress_percentage: Option<u8>,
    pub processing_time: Option<f64>,
    pub processed_frames: Option<u64>,
    pub detected_objects: Option<u64>,
    pub average_confidence: Option<f64>,
    pub thumbnail_path: Option<String>,
    pub final_output_video_path: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub error: Option<String>,
}

impl Job {
    /// Looks up one job by id.
    pub fn find(db: &Database, id: i64) -> Result<Job, AgritrackError> {
        let row = job_repo::find_by_id(db, id)?.ok_or(AgritrackError::JobNotFound(id))?;
        Ok(Job::try_from(row)?)
    }

    /// Artifact locations for this job, relative to the media root.
    pub fn artifacts(&self) -> ArtifactPaths {
        ArtifactPaths::for_file(&self.file_name)
    }

    /// Time spent since `start_time`, in seconds. Zero when not started.
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> f64 {
        self.start_time
            .as_deref()
            .and_then(parse_timestamp)
            .map(|start| (now - start).num_milliseconds().max(0) as f64 / 1000.0)
            .unwrap_or(0.0)
    }
}

fn non_negative(job_id: i64, column: &'static str, value: Option<i64>) -> Result<Option<u64>, DatabaseError> {
    value
        .map(|v| {
            u64::try_from(v).map_err(|_| DatabaseError::InvalidValue {
                job_id,
                column,
                value: v.to_string(),
            })
        })
        .transpose()
}

impl TryFrom<JobRow> for Job {
    type Error = DatabaseError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<JobStatus>()
            .map_err(|_| DatabaseError::InvalidValue {
                job_id: row.id,
                column: "status",
                value: row.status.clone(),
            })?;

        let progress_percentage = row
            .progress_percentage
            .map(|p| {
                u8::try_from(p)
                    .ok()
                    .filter(|p| *p <= 100)
                    .ok_or_else(|| DatabaseError::InvalidValue {
                        job_id: row.id,
                        column: "progress_percentage",
                        value: p.to_string(),
                    })
            })
            .transpose()?;

        let processed_frames = non_negative(row.id, "processed_frames", row.processed_frames)?;
        let detected_objects = non_negative(row.id, "detected_objects", row.detected_objects)?;

        Ok(Self {
            id: row.id,
            file_name: row.file_name,
            upload_timestamp: row.upload_timestamp,
            status,
            format: row.format,
            size: row.size,
            duration_seconds: row.duration_seconds,
            resolution: row.resolution,
            progress_percentage,
            processing_time: row.processing_time,
            processed_frames,
            detected_objects,
            average_confidence: row.average_confidence,
            thumbnail_path: row.thumbnail_path,
            final_output_video_path: row.final_output_video_path,
            start_time: row.start_time,
            end_time: row.end_time,
            error: row.error,
        })
    }
}

/// Where a job's input and outputs live, relative to the media root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub upload: PathBuf,
    pub raw_output: PathBuf,
    pub final_output: PathBuf,
    pub thumbnail: PathBuf,
}

pub const UPLOADS_DIR: &str = "uploads";
pub const PROCESSED_DIR: &str = "processed";
pub const THUMBNAILS_DIR: &str = "thumbnails";

impl ArtifactPaths {
    pub fn for_file(file_name: &str) -> Self {
        let stem = Path::new(file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "video".to_string());

        Self {
            upload: Path::new(UPLOADS_DIR).join(file_name),
            raw_output: Path::new(PROCESSED_DIR).join(format!("{}.avi", stem)),
            final_output: Path::new(PROCESSED_DIR).join(format!("{}.mp4", stem)),
            thumbnail: Path::new(THUMBNAILS_DIR).join(format!("{}.jpg", stem)),
        }
    }

    /// Relative path as stored in the job table (forward slashes).
    pub fn to_stored(path: &Path) -> String {
        path.components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Outcome of one worker iteration for a claimed job.
#[derive(Debug)]
pub struct JobResult {
    pub job_id: i64,
    pub file_name: String,
    pub status: JobStatus,
    pub processed_frames: u64,
    pub detected_objects: u64,
    pub warnings: Vec<String>,
    pub error: Option<String>,
}

impl JobResult {
    pub fn completed(
        job: &Job,
        processed_frames: u64,
        detected_objects: u64,
        warnings: Vec<String>,
    ) -> Self {
        Self {
            job_id: job.id,
            file_name: job.file_name.clone(),
            status: JobStatus::Completed,
            processed_frames,
            detected_objects,
            warnings,
            error: None,
        }
    }

    pub fn failed(job: &Job, error: String) -> Self {
        Self {
            job_id: job.id,
            file_name: job.file_name.clone(),
            status: JobStatus::Failed,
            processed_frames: 0,
            detected_objects: 0,
            warnings: vec![],
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(status: &str) -> JobRow {
        JobRow {
            id: 7,
            file_name: "flock.mp4".to_string(),
            upload_timestamp: "2026-01-01T00:00:00.000000Z".to_string(),
            status: status.to_string(),
            format: ".mp4".to_string(),
            size: 3.25,
            duration_seconds: None,
            resolution: None,
            progress_percentage: Some(40),
            processing_time: None,
            processed_frames: Some(12),
            detected_objects: None,
            average_confidence: None,
            thumbnail_path: None,
            final_output_video_path: None,
            start_time: Some("2026-01-01T00:00:10.000000Z".to_string()),
            end_time: None,
            error: None,
        }
    }

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [
            JobStatus::Queued,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert_eq!("processing".parse::<JobStatus>().unwrap(), JobStatus::Processing);
        assert!("DONE".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_status_serde_uses_upper_case() {
        let json = serde_json::to_string(&JobStatus::Processing).unwrap();
        assert_eq!(json, "\"PROCESSING\"");
    }

    #[test]
    fn test_find_missing_job() {
        let db = Database::open_in_memory().unwrap();
        let err = Job::find(&db, 42).unwrap_err();
        assert!(matches!(err, AgritrackError::JobNotFound(42)));
        assert_eq!(err.to_string(), "Job 42 not found");
    }

    #[test]
    fn test_find_existing_job() {
        let db = Database::open_in_memory().unwrap();
        let id = job_repo::insert(
            &db,
            &job_repo::NewJob {
                file_name: "flock.mp4".to_string(),
                format: ".mp4".to_string(),
                size: 1.0,
                upload_timestamp: now_timestamp(),
            },
        )
        .unwrap();

        let job = Job::find(&db, id).unwrap();
        assert_eq!(job.file_name, "flock.mp4");
        assert_eq!(job.status, JobStatus::Queued);
    }

    #[test]
    fn test_transitions() {
        use JobStatus::*;
        assert!(Queued.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));

        assert!(!Queued.can_transition_to(Completed));
        assert!(!Queued.can_transition_to(Failed));
        assert!(!Processing.can_transition_to(Queued));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Queued));
        assert!(Completed.is_terminal());
        assert!(Failed.is_terminal());
        assert!(!Processing.is_terminal());

        assert_eq!(JobStatus::predecessors(Processing).collect::<Vec<_>>(), vec![Queued]);
        assert_eq!(JobStatus::predecessors(Failed).collect::<Vec<_>>(), vec![Processing]);
        assert_eq!(JobStatus::predecessors(Queued).count(), 0);
    }

    #[test]
    fn test_job_from_row() {
        let job = Job::try_from(row("PROCESSING")).unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.progress_percentage, Some(40));
        assert_eq!(job.processed_frames, Some(12));
    }

    #[test]
    fn test_job_from_row_rejects_unknown_status() {
        let err = Job::try_from(row("PAUSED")).unwrap_err();
        assert!(matches!(
            err,
            DatabaseError::InvalidValue { column: "status", .. }
        ));
    }

    #[test]
    fn test_job_from_row_rejects_negative_counts() {
        let mut bad = row("COMPLETED");
        bad.detected_objects = Some(-1);
        assert!(Job::try_from(bad).is_err());
    }

    #[test]
    fn test_artifact_paths() {
        let paths = ArtifactPaths::for_file("field_cam.mov");
        assert_eq!(paths.upload, PathBuf::from("uploads/field_cam.mov"));
        assert_eq!(paths.raw_output, PathBuf::from("processed/field_cam.avi"));
        assert_eq!(paths.final_output, PathBuf::from("processed/field_cam.mp4"));
        assert_eq!(paths.thumbnail, PathBuf::from("thumbnails/field_cam.jpg"));
        assert_eq!(
            ArtifactPaths::to_stored(&paths.thumbnail),
            "thumbnails/field_cam.jpg"
        );
    }

    #[test]
    fn test_timestamps_sort_as_text() {
        let early = format_timestamp(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        let late = format_timestamp(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 1).unwrap());
        assert!(early < late);
        assert_eq!(early, "2026-01-01T00:00:00.000000Z");
        assert!(parse_timestamp(&early).is_some());
    }

    #[test]
    fn test_elapsed_seconds() {
        let job = Job::try_from(row("PROCESSING")).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 15).unwrap();
        assert!((job.elapsed_seconds(now) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_job_result_constructors() {
        let job = Job::try_from(row("PROCESSING")).unwrap();
        let ok = JobResult::completed(&job, 100, 2, vec![]);
        assert!(ok.is_success());
        let failed = JobResult::failed(&job, "boom".to_string());
        assert!(!failed.is_success());
        assert_eq!(failed.error.as_deref(), Some("boom"));
    }
}
