use thiserror::Error;

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Connection failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Search failed (status {status}): {body}")]
    Status { status: u16, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] bucketwise::Error),
}

pub type Result<T> = std::result::Result<T, TelemetryError>;
