use accord_core::ConsentError;
use thiserror::Error;

/// Error type for the Accord binary, aggregating the shared consent error
/// with the binary's own configuration and I/O failures.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("consent error: {0}")]
    Consent(#[from] ConsentError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("template error: {0}")]
    Template(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for ServerError {
    fn from(e: toml::de::Error) -> Self {
        ServerError::Config(format!("TOML parse error: {e}"))
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
