use thiserror::Error;

pub type Result<T> = std::result::Result<T, SnapshotError>;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Snapshot request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Snapshot API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid snapshot URL: {0}")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for SnapshotError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SnapshotError::Timeout(err.to_string())
        } else {
            SnapshotError::Network(err.to_string())
        }
    }
}

impl From<url::ParseError> for SnapshotError {
    fn from(err: url::ParseError) -> Self {
        SnapshotError::InvalidUrl(err.to_string())
    }
}
