use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocMapError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Definition error: {0}")]
    Definition(String),

    #[error("`{0}` has not been registered in the schema registry")]
    NotRegistered(String),

    #[error("Operation error: {0}")]
    Operation(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DocMapError>;
