// Authentication types

use serde::Deserialize;

use crate::cookies::{Cookie, SessionJar};

/// In-memory credential set
///
/// `entitlement_token` and `user_id` always come from the same `access_token`
/// generation; the set is only ever replaced wholesale.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Credentials {
    pub access_token: Option<String>,
    pub entitlement_token: Option<String>,
    pub user_id: Option<String>,
    /// Absolute expiry in ms since epoch; 0 means never loaded / force refresh
    pub expires_at: i64,
}

impl Credentials {
    /// Snapshot for callers, only while the set is still fresh at `now_ms`
    pub fn fresh_snapshot(&self, now_ms: i64) -> Option<AccessCredentials> {
        if self.expires_at <= now_ms {
            return None;
        }

        Some(AccessCredentials {
            access_token: self.access_token.clone()?,
            entitlement_token: self.entitlement_token.clone()?,
            user_id: self.user_id.clone()?,
        })
    }
}

/// What `acquire` hands back to callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessCredentials {
    pub entitlement_token: String,
    pub access_token: String,
    pub user_id: String,
}

/// Raw token fields extracted from a redirect fragment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPayload {
    pub access_token: String,
    pub expires_in_seconds: u64,
}

/// Output of one renewal: the token plus the jar that produced it
#[derive(Debug, Clone)]
pub struct RenewedSession {
    pub payload: TokenPayload,
    pub jar: SessionJar,
}

/// Credentials derived from an access token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedCredentials {
    pub entitlement_token: String,
    pub user_id: String,
}

/// What the login surface reports once it reaches the callback
#[derive(Debug, Clone)]
pub struct LoginRedirect {
    pub url: String,
    /// Cookies found in the login surface's session for the auth domain
    pub cookies: Vec<Cookie>,
}

/// Raw response to a cookie replay against the authorization endpoint
#[derive(Debug, Clone)]
pub struct AuthorizeResponse {
    pub status: u16,
    pub location: Option<String>,
    pub set_cookies: Vec<String>,
}

/// Entitlement endpoint response
#[derive(Deserialize)]
pub struct EntitlementResponse {
    pub entitlements_token: String,
}

/// User info endpoint response
#[derive(Deserialize)]
pub struct UserInfoResponse {
    pub sub: String,
}

/// Status view of the in-memory session, no renewal involved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub expires_at: i64,
    pub has_credentials: bool,
    pub stored_cookies: usize,
}
