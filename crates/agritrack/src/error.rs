use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgritrackError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Detection error: {0}")]
    Detection(#[from] crate::detection::DetectionError),

    #[error("Intake error: {0}")]
    Intake(#[from] IntakeError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Job {0} not found")]
    JobNotFound(i64),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Video file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with status {code:?}: {stderr}")]
    ExitStatus {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("ffprobe output could not be parsed: {0}")]
    Probe(String),

    #[error("No video stream in '{0}'")]
    NoVideoStream(PathBuf),

    #[error("Invalid video metadata: {0}")]
    InvalidMetadata(String),

    #[error("Frame pipe I/O failed: {0}")]
    Pipe(#[from] std::io::Error),

    #[error("Truncated frame: expected {expected} bytes, got {actual}")]
    TruncatedFrame { expected: usize, actual: usize },

    #[error("Frame size {actual:?} does not match stream size {expected:?}")]
    FrameSize {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Image encoding failed: {0}")]
    Image(#[from] image::ImageError),
}

#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("Upload not found: {0}")]
    NotFound(PathBuf),

    #[error("Not a video file: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to list uploads in '{path}': {source}")]
    ReadDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to copy upload from '{from}' to '{to}': {source}")]
    CopyFile {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to record upload: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Failed to open video '{path}': {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: MediaError,
    },

    #[error("Unusable video: {0}")]
    DegenerateInput(String),

    #[error("Pipeline failed: {0}")]
    Pipeline(#[from] crate::pipeline::PipelineError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Job {0} was claimed but not found in the store")]
    JobVanished(i64),

    #[error("Worker panicked: {0}")]
    Panicked(String),
}

pub type Result<T> = std::result::Result<T, AgritrackError>;
