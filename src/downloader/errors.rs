// Error types for the download engine

use thiserror::Error;

use super::diagnostics::{diagnose_error, headline, FailureCause};

/// Failure reported by the media-extraction service
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// yt-dlp not found in system
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// The service recognised a restriction or network problem
    #[error("{}: {message}", .cause.description())]
    Blocked { cause: FailureCause, message: String },

    /// Failed to parse the service's JSON output
    #[error("Parse error: {0}")]
    Parse(String),

    /// Process or I/O failure without a recognisable cause
    #[error("Execution error: {0}")]
    Execution(String),

    /// The progress hook asked the service to stop
    #[error("Download aborted")]
    Aborted,
}

impl ServiceError {
    pub fn cause(&self) -> Option<FailureCause> {
        match self {
            Self::Blocked { cause, .. } => Some(*cause),
            _ => None,
        }
    }
}

// Classify raw stderr text
impl From<String> for ServiceError {
    fn from(s: String) -> Self {
        if s.contains("No such file") || s.contains("command not found") {
            return Self::ToolNotFound(s);
        }

        match diagnose_error(&s) {
            Some(FailureCause::Unknown) | None => Self::Execution(headline(&s).to_string()),
            Some(cause) => Self::Blocked {
                cause,
                message: headline(&s).to_string(),
            },
        }
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            Self::ToolNotFound(e.to_string())
        } else {
            Self::Execution(e.to_string())
        }
    }
}

/// Engine-level error taxonomy surfaced to the control path
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// Rejected before any worker was started
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Metadata fetch failed
    #[error("Resolution failed: {0}")]
    ResolutionFailed(ServiceError),

    /// Transfer failed, including the cooperative-abort path
    #[error("Download failed: {0}")]
    DownloadFailed(String),

    /// Session file could not be written; logged, never shown
    #[error("Could not persist session: {0}")]
    PersistenceFailed(String),

    /// The operation observed its token before dispatch
    #[error("Operation cancelled")]
    Cancelled,
}

impl EngineError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Recognised restriction behind a resolution or download failure
    pub fn cause(&self) -> Option<FailureCause> {
        match self {
            Self::ResolutionFailed(e) => e.cause(),
            Self::DownloadFailed(message) => {
                diagnose_error(message).filter(|c| *c != FailureCause::Unknown)
            }
            _ => None,
        }
    }
}
