// Interactive login surface
// The UI side of a full login; only its interface matters to the renewal protocol

use anyhow::Result;
use async_trait::async_trait;
use dialoguer::Input;

use crate::auth::types::LoginRedirect;
use crate::error::AuthError;

/// Something that can walk the user through the provider's login page
#[async_trait]
pub trait LoginSurface: Send + Sync {
    /// Load `authorize_url` and resolve once a redirect starts with `callback_prefix`.
    /// Closing the surface early yields [`AuthError::LoginAbandoned`].
    async fn login(
        &self,
        authorize_url: &str,
        callback_prefix: &str,
    ) -> Result<LoginRedirect, AuthError>;

    /// Drop every cookie the surface's session holds for `domain`
    async fn clear_cookies(&self, domain: &str) -> Result<()>;
}

/// Terminal login: the user opens the URL in a browser and pastes back the callback URL.
/// There is no browser session to harvest, so no cookies are returned.
#[derive(Debug, Default)]
pub struct TerminalLogin;

#[async_trait]
impl LoginSurface for TerminalLogin {
    async fn login(
        &self,
        authorize_url: &str,
        callback_prefix: &str,
    ) -> Result<LoginRedirect, AuthError> {
        println!();
        println!("Open this URL in your browser and sign in:");
        println!();
        println!("  {}", authorize_url);
        println!();

        let prefix = callback_prefix.to_string();
        let pasted = tokio::task::spawn_blocking(move || {
            Input::<String>::new()
                .with_prompt(format!(
                    "Paste the URL starting with {} (empty to cancel)",
                    prefix
                ))
                .allow_empty(true)
                .interact_text()
        })
        .await;

        let url = match pasted {
            Ok(Ok(url)) => url.trim().to_string(),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Login prompt closed");
                return Err(AuthError::LoginAbandoned);
            }
            Err(e) => {
                tracing::error!(error = %e, "Login prompt task failed");
                return Err(AuthError::LoginAbandoned);
            }
        };

        if url.is_empty() {
            return Err(AuthError::LoginAbandoned);
        }

        Ok(LoginRedirect {
            url,
            cookies: Vec::new(),
        })
    }

    async fn clear_cookies(&self, domain: &str) -> Result<()> {
        tracing::debug!(domain, "Terminal login keeps no browser cookies");
        Ok(())
    }
}
