use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No credentials were presented where they are required.
    #[error("missing credentials")]
    MissingCredentials,

    /// The presented token is not known to the resolver.
    #[error("invalid token")]
    InvalidToken,

    /// A grant's validity window has elapsed.
    #[error("session has expired")]
    Expired,

    /// A grant's validity window has not started yet.
    #[error("session not yet valid (issued_at is in the future)")]
    NotYetValid,

    /// `expires_at <= issued_at`.
    #[error("invalid session window (expires_at <= issued_at)")]
    InvalidWindow,

    /// The refresher could not obtain a new grant.
    #[error("session refresh failed: {0}")]
    Refresh(String),

    /// Static token configuration could not be parsed.
    #[error("malformed token entry '{0}'")]
    MalformedEntry(String),
}
