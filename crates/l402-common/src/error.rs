use thiserror::Error;

/// Error taxonomy shared by the mint, challenger, authenticator and proxy
/// engine. Each variant maps to exactly one HTTP/gRPC outcome; see
/// `l402-common::service` for the REST/gRPC status mapping used by the
/// proxy engine.
#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum L402Error {
    #[error("caveat not satisfied: {0}")]
    NotAuthorized(String),

    #[error("preimage does not hash to the token's payment hash")]
    InvalidPreimage,

    #[error("macaroon signature does not match the stored secret")]
    SignatureMismatch,

    #[error("no secret stored for this token id")]
    SecretNotFound,

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("remote address is blocked")]
    Blocked,

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("shutting down")]
    ShuttingDown,

    #[error("retries exceeded")]
    RetriesExceeded,
}

impl L402Error {
    /// REST status code this error maps to.
    pub fn status_code(&self) -> u16 {
        match self {
            L402Error::NotAuthorized(_)
            | L402Error::InvalidPreimage
            | L402Error::SignatureMismatch
            | L402Error::SecretNotFound => 402,
            L402Error::RateLimited => 429,
            L402Error::Blocked => 403,
            L402Error::BackendUnavailable(_) => 502,
            L402Error::Invalid(_) => 400,
            L402Error::ShuttingDown => 503,
            L402Error::RetriesExceeded => 500,
        }
    }

    /// gRPC status code this error maps to, following
    /// https://github.com/grpc/grpc/blob/master/doc/statuscodes.md
    pub fn grpc_status(&self) -> u16 {
        match self {
            L402Error::NotAuthorized(_)
            | L402Error::InvalidPreimage
            | L402Error::SignatureMismatch
            | L402Error::SecretNotFound => 16, // UNAUTHENTICATED
            L402Error::RateLimited => 8,       // RESOURCE_EXHAUSTED
            L402Error::Blocked => 7,           // PERMISSION_DENIED
            L402Error::BackendUnavailable(_) => 14, // UNAVAILABLE
            L402Error::Invalid(_) => 3,        // INVALID_ARGUMENT
            L402Error::ShuttingDown => 14,      // UNAVAILABLE
            L402Error::RetriesExceeded => 13,   // INTERNAL
        }
    }
}
