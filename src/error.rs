use thiserror::Error;

/// Errors surfaced by the parser, cache store, remote client and repository.
///
/// `Clone` so that one in-flight fetch can hand the same outcome to every
/// caller waiting on it. Foreign errors are flattened to strings at the
/// adapter boundary for the same reason.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TleError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Transport failure: {0}")]
    TransportFailure(String),

    #[error("Unexpected HTTP status: {0}")]
    BadStatus(u16),

    #[error("Response body was empty")]
    EmptyBody,

    #[error("Malformed record at line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    #[error("Structured payload did not decode: {0}")]
    InvalidJson(String),

    #[error("No usable records in payload")]
    NoUsableRecords,

    #[error("Source reported not modified but nothing is cached")]
    NotModifiedWithoutCache,

    #[error("Cache storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl TleError {
    pub fn malformed(line: usize, reason: impl Into<String>) -> Self {
        TleError::MalformedRecord { line, reason: reason.into() }
    }

    /// The source refused the request outright (HTTP 403).
    pub fn is_access_denied(&self) -> bool {
        matches!(self, TleError::BadStatus(403))
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, TleError::BadStatus(429))
    }

    /// Whether this failure should open a backoff window for the key.
    pub fn triggers_backoff(&self) -> bool {
        self.is_access_denied() || self.is_rate_limited()
    }

    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            TleError::InvalidRequest(_) => "invalid_request",
            TleError::TransportFailure(_) => "transport_failure",
            TleError::BadStatus(_) => "bad_status",
            TleError::EmptyBody => "empty_body",
            TleError::MalformedRecord { .. } => "malformed_record",
            TleError::InvalidJson(_) => "invalid_json",
            TleError::NoUsableRecords => "no_usable_records",
            TleError::NotModifiedWithoutCache => "not_modified_without_cache",
            TleError::Storage(_) => "storage",
            TleError::Config(_) => "config",
        }
    }
}

impl From<std::io::Error> for TleError {
    fn from(err: std::io::Error) -> Self {
        TleError::Storage(err.to_string())
    }
}

impl From<toml::de::Error> for TleError {
    fn from(err: toml::de::Error) -> Self {
        TleError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TleError>;
