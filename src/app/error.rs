use thiserror::Error;

/// Status recorded into source health when a failure carries no HTTP status.
pub const GENERIC_FAILURE_STATUS: u16 = 500;

#[derive(Error, Debug)]
pub enum TubeshelfError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Could not resolve a feed for {url}: {reason}")]
    Resolution { url: String, reason: String },

    #[error("{message}")]
    Fetch { status: Option<u16>, message: String },

    #[error("Feed parsing error: {0}")]
    FeedParse(String),

    #[error("Persistence conflict: {0}")]
    Conflict(String),

    #[error("Moving category {category_id} under {parent_id} would create a cycle")]
    Cycle { category_id: i64, parent_id: i64 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Source not found: {0}")]
    SourceNotFound(i64),

    #[error("Category not found: {0}")]
    CategoryNotFound(i64),

    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("Unknown cursor: {0}")]
    InvalidCursor(String),

    #[error("Unknown content type: {0}")]
    InvalidContentType(String),

    #[error("Unsupported source type: {0}")]
    InvalidSourceType(String),

    #[error("Category {category_id} does not belong to profile {profile_id}")]
    ProfileMismatch { category_id: i64, profile_id: i64 },

    #[error("A scheduler is already registered in this process")]
    SchedulerAlreadyRegistered,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl TubeshelfError {
    /// HTTP status to record in a source's health fields for this failure.
    pub fn http_status(&self) -> u16 {
        match self {
            TubeshelfError::Fetch {
                status: Some(status),
                ..
            } => *status,
            _ => GENERIC_FAILURE_STATUS,
        }
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        let status = err.status().map(|s| s.as_u16());
        let message = match status {
            Some(code) => format!("HTTP Error {}", code),
            None if err.is_timeout() => format!("Request timed out: {}", err),
            None => format!("Transport error: {}", err),
        };
        TubeshelfError::Fetch { status, message }
    }
}

pub type Result<T> = std::result::Result<T, TubeshelfError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_from_fetch_error() {
        let err = TubeshelfError::Fetch {
            status: Some(503),
            message: "HTTP Error 503".into(),
        };
        assert_eq!(err.http_status(), 503);
    }

    #[test]
    fn test_http_status_defaults_to_server_error() {
        let transport = TubeshelfError::Fetch {
            status: None,
            message: "connection reset".into(),
        };
        assert_eq!(transport.http_status(), 500);
        assert_eq!(TubeshelfError::FeedParse("bad xml".into()).http_status(), 500);
    }
}
