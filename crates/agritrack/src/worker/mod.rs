pub mod handle;
pub mod job;
pub mod runner;

pub use handle::WorkerHandle;
pub use job::{ArtifactPaths, Job, JobResult, JobStatus};
pub use runner::{Worker, RESTART_REASON};

// The binary wakes the worker through this channel type.
pub use crossbeam_channel;
