/// Typed failures of a Send Channel call. Failed sends are reported, never
/// retried.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("rate limited")]
    RateLimited,
    #[error("rejected {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("server error {status}: {body}")]
    ServerError { status: u16, body: String },
    #[error("network error: {0}")]
    NetworkError(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ChannelError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed(_) => "authentication_failed",
            Self::RateLimited => "rate_limited",
            Self::Rejected { .. } => "rejected",
            Self::ServerError { .. } => "server_error",
            Self::NetworkError(_) => "network_error",
            Self::InvalidResponse(_) => "invalid_response",
        }
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::AuthenticationFailed(body),
            429 => Self::RateLimited,
            500..=599 => Self::ServerError { status, body },
            _ => Self::Rejected { status, body },
        }
    }
}

/// Failures resolving a sender's profile.
#[derive(Clone, Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("profile lookup failed: {0}")]
    Channel(#[from] ChannelError),
    #[error("no profile data for sender {0}")]
    MissingProfile(String),
    #[error("subscriber directory: {0}")]
    Directory(String),
}

/// Failures querying the fulfillment engine.
#[derive(Clone, Debug, thiserror::Error)]
pub enum FulfillmentError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("engine returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("undecodable response: {0}")]
    Decode(String),
}
