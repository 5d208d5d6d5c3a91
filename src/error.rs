//! Errors surfaced by the client.

/// Any failure reported by this library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("token fetch: {0}")]
    TokenFetch(#[from] TokenFetchError),
    #[error("api call: {0}")]
    ApiCall(#[from] ApiCallError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("{field} is not a valid http(s) URL: {reason}")]
    InvalidUrl { field: &'static str, reason: String },
    #[error("scope {0:?} is empty or contains whitespace")]
    InvalidScope(String),
}

/// The token endpoint could not be reached or did not hand out a usable token.
#[derive(Debug, thiserror::Error)]
pub enum TokenFetchError {
    #[error("transport: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("{status} status code: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response ({status}): {reason}")]
    Malformed {
        status: u16,
        body: String,
        reason: String,
    },
}

impl TokenFetchError {
    /// HTTP status returned by the token endpoint, if it answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport(err) => err.status().map(|status| status.as_u16()),
            Self::Status { status, .. } | Self::Malformed { status, .. } => Some(*status),
        }
    }

    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Transport(_) => None,
            Self::Status { body, .. } | Self::Malformed { body, .. } => Some(body),
        }
    }
}

/// Failure to perform a downstream call. HTTP error statuses are not errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiCallError {
    #[error("client closed")]
    Closed,
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}
