use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header, redirect, Client};
use std::time::Duration;

use crate::auth::types::{AuthorizeResponse, EntitlementResponse, UserInfoResponse};
use crate::config::ProviderConfig;

const USER_AGENT: &str = concat!("auth-session/", env!("CARGO_PKG_VERSION"));

/// The identity provider's HTTP endpoints, as seen by the renewal protocol
#[async_trait]
pub trait ProviderApi: Send + Sync {
    /// GET the authorization URL replaying `cookie_header`, without following redirects
    async fn authorize(&self, cookie_header: &str) -> Result<AuthorizeResponse>;

    /// Exchange an access token for an entitlement token
    async fn fetch_entitlement(&self, access_token: &str) -> Result<String>;

    /// Resolve the stable user identifier for an access token
    async fn fetch_user_id(&self, access_token: &str) -> Result<String>;
}

/// reqwest-backed provider client
pub struct ProviderHttpClient {
    /// Client for bearer lookups
    client: Client,

    /// Client for cookie replay; never follows redirects
    reauth_client: Client,

    config: ProviderConfig,
}

impl ProviderHttpClient {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        let reauth_client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(redirect::Policy::none())
            .timeout(Duration::from_secs(config.silent_reauth_timeout_secs))
            .build()
            .context("Failed to create re-authentication HTTP client")?;

        Ok(Self {
            client,
            reauth_client,
            config,
        })
    }
}

#[async_trait]
impl ProviderApi for ProviderHttpClient {
    async fn authorize(&self, cookie_header: &str) -> Result<AuthorizeResponse> {
        tracing::debug!(url = %self.config.authorize_url, "Replaying session cookies");

        let response = self
            .reauth_client
            .get(&self.config.authorize_url)
            .header(header::COOKIE, cookie_header)
            .send()
            .await
            .context("Failed to send authorization request")?;

        let status = response.status();
        let headers = response.headers();

        let location = headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let set_cookies = headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect();

        tracing::debug!(status = %status, has_location = location.is_some(), "Authorization response");

        Ok(AuthorizeResponse {
            status: status.as_u16(),
            location,
            set_cookies,
        })
    }

    async fn fetch_entitlement(&self, access_token: &str) -> Result<String> {
        let response = self
            .client
            .post(&self.config.entitlement_url)
            .bearer_auth(access_token)
            .json(&serde_json::json!({}))
            .send()
            .await
            .context("Failed to send entitlement request")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Entitlement request failed: {} - {}", status, error_text);
        }

        let data: EntitlementResponse = response
            .json()
            .await
            .context("Failed to parse entitlement response")?;

        if data.entitlements_token.is_empty() {
            anyhow::bail!("Entitlement response does not contain entitlements_token");
        }

        Ok(data.entitlements_token)
    }

    async fn fetch_user_id(&self, access_token: &str) -> Result<String> {
        let response = self
            .client
            .get(&self.config.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .context("Failed to send user info request")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("User info request failed: {} - {}", status, error_text);
        }

        let data: UserInfoResponse = response
            .json()
            .await
            .context("Failed to parse user info response")?;

        if data.sub.is_empty() {
            anyhow::bail!("User info response does not contain sub");
        }

        Ok(data.sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Server, ServerGuard};

    fn config_for(server: &ServerGuard) -> ProviderConfig {
        ProviderConfig {
            authorize_url: format!("{}/authorize", server.url()),
            entitlement_url: format!("{}/api/token/v1", server.url()),
            userinfo_url: format!("{}/userinfo", server.url()),
            ..ProviderConfig::default()
        }
    }

    #[tokio::test]
    async fn test_authorize_does_not_follow_redirect() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/authorize")
            .match_header("cookie", "ssid=abc")
            .with_status(303)
            .with_header("location", "https://cb.example/opt_in#access_token=t&expires_in=3600")
            .with_header("set-cookie", "ssid=rotated; Max-Age=60")
            .create_async()
            .await;

        let client = ProviderHttpClient::new(config_for(&server)).unwrap();
        let response = client.authorize("ssid=abc").await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.status, 303);
        assert_eq!(
            response.location.as_deref(),
            Some("https://cb.example/opt_in#access_token=t&expires_in=3600")
        );
        assert_eq!(response.set_cookies, vec!["ssid=rotated; Max-Age=60".to_string()]);
    }

    #[tokio::test]
    async fn test_fetch_entitlement_sends_bearer() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/token/v1")
            .match_header("authorization", "Bearer tok1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"entitlements_token":"ent1"}"#)
            .create_async()
            .await;

        let client = ProviderHttpClient::new(config_for(&server)).unwrap();
        assert_eq!(client.fetch_entitlement("tok1").await.unwrap(), "ent1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_user_id() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/userinfo")
            .match_header("authorization", "Bearer tok1")
            .with_status(200)
            .with_body(r#"{"sub":"u1","country":"usa"}"#)
            .create_async()
            .await;

        let client = ProviderHttpClient::new(config_for(&server)).unwrap();
        assert_eq!(client.fetch_user_id("tok1").await.unwrap(), "u1");
    }

    #[tokio::test]
    async fn test_lookup_error_status() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/userinfo")
            .with_status(401)
            .with_body("expired")
            .create_async()
            .await;

        let client = ProviderHttpClient::new(config_for(&server)).unwrap();
        let err = client.fetch_user_id("tok1").await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }
}
