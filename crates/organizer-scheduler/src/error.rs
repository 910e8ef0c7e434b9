use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
///
/// Action failures never reach the code that scheduled the job; the worker
/// logs them and moves on.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The job's callback returned an error.
    #[error("Action failed: {0}")]
    ActionFailed(String),

    /// The job's callback panicked.
    #[error("Action panicked: {0}")]
    ActionPanicked(String),

    /// The job had already been fired or cancelled.
    #[error("Job {id} has no action left to run")]
    AlreadyConsumed { id: String },

    /// The background worker terminated abnormally.
    #[error("Worker shutdown error: {0}")]
    Shutdown(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
