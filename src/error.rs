// Error handling module
// Defines the error kinds raised while renewing a session

use thiserror::Error;

/// Errors that can occur while acquiring or renewing credentials
///
/// `Clone` so a single renewal outcome can be handed to every caller
/// waiting on it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthError {
    /// A redirect URL did not carry the expected token fields
    #[error("Malformed redirect: {0}")]
    MalformedRedirect(String),

    /// Cookie replay did not yield a usable redirect; only used to pick the fallback
    #[error("Silent re-authentication failed: {0}")]
    SilentReauthFailed(String),

    /// The login surface was closed before it reached the callback
    #[error("Interactive login was abandoned")]
    LoginAbandoned,

    /// One of the dependent-credential lookups failed
    #[error("Credential derivation failed: {0}")]
    DerivationFailed(String),

    /// Umbrella error returned to callers of `acquire`
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),
}

/// Result type alias for authentication operations
pub type Result<T> = std::result::Result<T, AuthError>;
