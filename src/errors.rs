use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    /// The request was rejected before anything was touched.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Duplicate key error: _id {0} already exists")]
    DuplicateKey(String),

    /// The request was well-formed but could not be carried out.
    #[error("Operation failure: {0}")]
    OperationFailure(String),

    #[error("Collection not found: {0}")]
    NoSuchCollection(String),

    #[error("Collection already exists: {0}")]
    CollectionAlreadyExists(String),

    #[error("Serde JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl DbError {
    /// Shorthand used by the parsers, which build most messages with `format!`.
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub(crate) fn failure(msg: impl Into<String>) -> Self {
        Self::OperationFailure(msg.into())
    }
}

impl From<std::io::Error> for DbError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
