use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Aggregation node not found: {0}")]
    NodeNotFound(String),

    #[error("Aggregation {id} is not a terms aggregation (found {found})")]
    NotTermsAgg { id: String, found: String },

    #[error("Aggregation {0} has no field configured")]
    MissingField(String),

    #[error("Cannot filter bucket {bucket} of aggregation {id}: {reason}")]
    BucketFilter {
        id: String,
        bucket: String,
        reason: String,
    },

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
