use thiserror::Error;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Missing or empty field: {field}")]
    Validation { field: &'static str },

    #[error("Config '{id}' not found")]
    NotFound { id: String },

    /// Import could not create a record because a required field was omitted
    #[error("Missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("Config '{id}' already exists")]
    AlreadyExists { id: String },

    #[error("Backend error: {0:#}")]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn already_exists(id: impl Into<String>) -> Self {
        Self::AlreadyExists { id: id.into() }
    }

    /// Whether the caller can fix the request and retry
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Backend(_))
    }
}

pub(crate) fn require(field: &'static str, value: &str) -> StoreResult<()> {
    if value.is_empty() {
        return Err(StoreError::Validation { field });
    }
    Ok(())
}
