// Authentication module
// Manages the token lifecycle: renewal, derivation, persistence

pub mod credentials;
mod derive;
mod manager;
mod refresh;
pub mod types;

#[cfg(test)]
mod testing;

pub use derive::CredentialDeriver;
pub use manager::{AuthContext, AuthManager, Clock};
pub use refresh::{parse_token_fragment, RenewalStrategy, SilentOutcome};
pub use types::{AccessCredentials, SessionStatus};
