pub mod config;
pub mod db;
pub mod detection;
pub mod error;
pub mod intake;
pub mod logging;
pub mod media;
pub mod pipeline;
pub mod render;
pub mod sanitize;
pub mod worker;

pub use config::{load_config, Config};
pub use db::Database;
pub use error::{AgritrackError, ConfigError, IntakeError, MediaError, Result, WorkerError};
pub use intake::enqueue_upload;
pub use pipeline::{JobContext, Pipeline, PipelineConfig};
pub use worker::{Job, JobResult, JobStatus, Worker, WorkerHandle};
