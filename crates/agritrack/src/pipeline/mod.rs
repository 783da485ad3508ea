pub mod config;
pub mod context;
pub mod error;
mod finalize;
pub mod progress;
pub mod runner;

pub use config::PipelineConfig;
pub use context::JobContext;
pub use error::{PipelineError, PipelineWarning};
pub use progress::{
    percent, NoopProgress, ProgressAggregator, ProgressEvent, ProgressReporter, StoreProgress,
};
pub use runner::Pipeline;
