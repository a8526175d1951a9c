//! Error types for eradiate

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{factory} factory: unregistered type '{type_id}'")]
    UnknownType { factory: String, type_id: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unsupported mode: {mode} (supported: {supported})")]
    UnsupportedMode { mode: String, supported: String },

    #[error("Out of bounds: {coordinate} = {value} not in [{min}, {max}]")]
    OutOfBounds {
        coordinate: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Missing coordinate '{0}' in query")]
    MissingCoordinate(String),

    #[error("Data error: {0}")]
    Data(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
