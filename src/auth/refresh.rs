// Token renewal logic
// Silent re-authentication first, interactive login as the fallback

use std::sync::Arc;

use super::types::{RenewedSession, TokenPayload};
use crate::config::ProviderConfig;
use crate::cookies::SessionJar;
use crate::error::{AuthError, Result};
use crate::http_client::ProviderApi;
use crate::login::LoginSurface;

/// Result of the silent branch, consumed by a plain match in [`RenewalStrategy::renew`]
#[derive(Debug)]
pub enum SilentOutcome {
    Renewed(RenewedSession),
    Failed(AuthError),
    NoValidCookie,
}

/// Extract `access_token` and `expires_in` from a redirect URL's fragment
pub fn parse_token_fragment(redirect: &str) -> Result<TokenPayload> {
    let url = url::Url::parse(redirect)
        .map_err(|e| AuthError::MalformedRedirect(format!("invalid URL: {}", e)))?;

    let fragment = url
        .fragment()
        .filter(|f| !f.is_empty())
        .ok_or_else(|| AuthError::MalformedRedirect("redirect has no fragment".to_string()))?;

    let mut access_token = None;
    let mut expires_in = None;
    for (key, value) in url::form_urlencoded::parse(fragment.as_bytes()) {
        match key.as_ref() {
            "access_token" if !value.is_empty() => access_token = Some(value.into_owned()),
            "expires_in" => expires_in = value.parse::<u64>().ok(),
            _ => {}
        }
    }

    let access_token = access_token
        .ok_or_else(|| AuthError::MalformedRedirect("missing access_token".to_string()))?;
    let expires_in_seconds = expires_in
        .ok_or_else(|| AuthError::MalformedRedirect("missing or invalid expires_in".to_string()))?;

    Ok(TokenPayload {
        access_token,
        expires_in_seconds,
    })
}

/// The silent -> interactive fallback chain
pub struct RenewalStrategy {
    api: Arc<dyn ProviderApi>,
    login: Arc<dyn LoginSurface>,
    config: ProviderConfig,
}

impl RenewalStrategy {
    pub fn new(
        api: Arc<dyn ProviderApi>,
        login: Arc<dyn LoginSurface>,
        config: ProviderConfig,
    ) -> Self {
        Self { api, login, config }
    }

    /// Obtain a fresh token. `jar` is not modified; the returned session carries the jar to commit.
    pub async fn renew(&self, jar: &SessionJar, now_ms: i64) -> Result<RenewedSession> {
        match self.try_silent(jar, now_ms).await {
            SilentOutcome::Renewed(session) => {
                tracing::info!("Token renewed via silent re-authentication");
                return Ok(session);
            }
            SilentOutcome::Failed(e) => {
                tracing::warn!(error = %e, "Silent re-authentication failed, falling back to interactive login");
            }
            SilentOutcome::NoValidCookie => {
                tracing::debug!("No valid login cookie, using interactive login");
            }
        }

        self.interactive(now_ms).await
    }

    /// Replay the login cookie against the authorization endpoint
    pub async fn try_silent(&self, jar: &SessionJar, now_ms: i64) -> SilentOutcome {
        let domain = &self.config.auth_domain;

        if !jar.has_valid_cookie(domain, &self.config.login_cookie_name, now_ms) {
            return SilentOutcome::NoValidCookie;
        }

        let Some(cookie_header) = jar.cookie_header(domain, &self.config.authorize_path(), now_ms)
        else {
            return SilentOutcome::NoValidCookie;
        };

        let response = match self.api.authorize(&cookie_header).await {
            Ok(response) => response,
            Err(e) => {
                return SilentOutcome::Failed(AuthError::SilentReauthFailed(format!("{:#}", e)))
            }
        };

        if !(300..400).contains(&response.status) {
            return SilentOutcome::Failed(AuthError::SilentReauthFailed(format!(
                "expected a redirect, got status {}",
                response.status
            )));
        }

        let Some(location) = response.location else {
            return SilentOutcome::Failed(AuthError::SilentReauthFailed(
                "redirect without Location header".to_string(),
            ));
        };

        let payload = match parse_token_fragment(&location) {
            Ok(payload) => payload,
            Err(e) => return SilentOutcome::Failed(e),
        };

        let mut renewed_jar = jar.clone();
        for set_cookie in &response.set_cookies {
            renewed_jar.apply_set_cookie(set_cookie, domain, now_ms);
        }

        SilentOutcome::Renewed(RenewedSession {
            payload,
            jar: renewed_jar,
        })
    }

    /// Full login through the login surface
    pub async fn interactive(&self, now_ms: i64) -> Result<RenewedSession> {
        tracing::info!("Starting interactive login");

        let redirect = self
            .login
            .login(&self.config.authorize_url, &self.config.callback_prefix)
            .await?;

        if !redirect.url.starts_with(&self.config.callback_prefix) {
            return Err(AuthError::MalformedRedirect(format!(
                "login ended outside the callback URL: {}",
                redirect.url.split('#').next().unwrap_or_default()
            )));
        }

        let payload = parse_token_fragment(&redirect.url)?;

        // Only durable, live cookies for the auth domain make it into the jar
        let jar = SessionJar::from_cookies(redirect.cookies.into_iter().filter(|c| {
            c.is_persistent() && !c.is_expired(now_ms) && c.matches_host(&self.config.auth_domain)
        }));

        tracing::info!(cookies = jar.len(), "Interactive login completed");

        Ok(RenewedSession { payload, jar })
    }
}
