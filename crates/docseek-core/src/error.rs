use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Limit {limit} out of range [1, {max}]")]
    LimitOutOfRange { limit: usize, max: usize },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation failed: {0}")]
    Operation(String),
}

impl Error {
    /// Validation failures are reported to the caller and never retried.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::InvalidQuery(_) | Error::LimitOutOfRange { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
