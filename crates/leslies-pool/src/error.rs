use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("other: {0}")]
    Other(String),
}

impl ClientError {
    /// Transport-level failures the host should treat as a transient poll failure.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            _ => false,
        }
    }
}

/// Failures while locating the water test table in the response fragment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("water test table not found")]
    TableNotFound,
    #[error("water test table has no body")]
    MissingTableBody,
    #[error("water test table has no rows")]
    MissingRow,
    #[error("water test row has {found} cells, expected more than 10")]
    TooFewCells { found: usize },
    #[error("selector error: {0}")]
    Selector(String),
}

impl ParseError {
    /// Only a missing table (or a traversal failure) is served from the
    /// last-known-good reading; a malformed first row yields an empty result.
    pub fn falls_back_to_cache(&self) -> bool {
        matches!(self, Self::TableNotFound | Self::Selector(_))
    }
}
