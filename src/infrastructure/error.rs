use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Transient I/O failure: {0}")]
    Transient(String),
    #[error("Authorization rejected: {0}")]
    Auth(String),
    #[error("Credential store error: {0}")]
    Credential(String),
}

impl InfraError {
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}
