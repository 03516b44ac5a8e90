/// Message recorded in the download state when the user aborts a download.
pub const CANCELLED_MESSAGE: &str = "Download cancelled";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Backend server not running at {address}. Make sure the backend service is started.")]
    BackendUnavailable { address: String },

    #[error("{0}")]
    DiscoveryFailed(String),

    #[error("{0}")]
    DownloadFailed(String),

    #[error("Download resulted in empty file")]
    EmptyDownload,

    #[error("Download cancelled")]
    DownloadCancelled,

    #[error("A download is already in progress")]
    DownloadInProgress,

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    RequestFailed(String),

    #[error("Failed to save download: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Cancellation is a neutral outcome, not an alarm.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ClientError::DownloadCancelled)
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
