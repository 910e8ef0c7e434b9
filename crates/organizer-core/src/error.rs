use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrganizerError {
    #[error("Configuration error: {0}")]
    Config(String),
}

impl OrganizerError {
    /// Short error code string, used as a stable key in log output.
    pub fn code(&self) -> &'static str {
        match self {
            OrganizerError::Config(_) => "CONFIG_ERROR",
        }
    }
}

/// Failure to deliver a single notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The notification program could not be started.
    #[error("failed to launch `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The notification program ran but reported failure.
    #[error("`{program}` exited with status {status}")]
    ExitStatus { program: String, status: String },

    /// The receiving side of a channel notifier is gone or full.
    #[error("notification channel unavailable: {0}")]
    Channel(String),
}

pub type Result<T> = std::result::Result<T, OrganizerError>;
