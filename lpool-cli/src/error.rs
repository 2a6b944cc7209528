use leslies_pool::ClientError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration file: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("failed to serialize configuration: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("failed to initialize logging: {0}")]
    Logging(String),
}

pub type Result<T> = std::result::Result<T, CliError>;
