use thiserror::Error;

/// Errors raised while bootstrapping or serving; the intake pipeline itself
/// folds store failures into a [`crate::intake::Submission`] instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration for {key}: {message}")]
    Config { key: String, message: String },

    #[error("malformed request: {0}")]
    Http(String),

    #[error("request body exceeds {0} bytes")]
    PayloadTooLarge(usize),
}

pub type Result<T> = std::result::Result<T, Error>;
