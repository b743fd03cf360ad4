// Fakes for the renewal collaborators, shared by the auth unit tests

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

use super::types::{AuthorizeResponse, LoginRedirect};
use crate::config::ProviderConfig;
use crate::cookies::Cookie;
use crate::error::AuthError;
use crate::http_client::ProviderApi;
use crate::login::LoginSurface;
use crate::store::{CredentialStore, MemoryStore};

pub const NOW: i64 = 1_700_000_000_000;

pub fn provider() -> ProviderConfig {
    ProviderConfig {
        authorize_url: "https://auth.example.com/authorize".to_string(),
        callback_prefix: "https://cb.example.com/opt_in".to_string(),
        auth_domain: "auth.example.com".to_string(),
        login_cookie_name: "ssid".to_string(),
        ..ProviderConfig::default()
    }
}

pub struct FakeApi {
    pub authorize_calls: AtomicUsize,
    pub entitlement_calls: AtomicUsize,
    pub userinfo_calls: AtomicUsize,
    authorize_status: Mutex<u16>,
    authorize_location: Mutex<Option<String>>,
    authorize_cookies: Mutex<Vec<String>>,
    last_cookie_header: Mutex<Option<String>>,
    entitlement: Mutex<std::result::Result<String, String>>,
    user_id: Mutex<std::result::Result<String, String>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            authorize_calls: AtomicUsize::new(0),
            entitlement_calls: AtomicUsize::new(0),
            userinfo_calls: AtomicUsize::new(0),
            authorize_status: Mutex::new(303),
            authorize_location: Mutex::new(None),
            authorize_cookies: Mutex::new(Vec::new()),
            last_cookie_header: Mutex::new(None),
            entitlement: Mutex::new(Ok("ent1".to_string())),
            user_id: Mutex::new(Ok("u1".to_string())),
        }
    }

    pub fn set_authorize_status(&self, status: u16) {
        *self.authorize_status.lock().unwrap() = status;
    }

    pub fn set_authorize_redirect(&self, location: &str) {
        *self.authorize_location.lock().unwrap() = Some(location.to_string());
    }

    pub fn set_authorize_cookies(&self, cookies: Vec<String>) {
        *self.authorize_cookies.lock().unwrap() = cookies;
    }

    pub fn set_entitlement(&self, result: std::result::Result<&str, &str>) {
        *self.entitlement.lock().unwrap() = result.map(str::to_string).map_err(str::to_string);
    }

    pub fn set_user_id(&self, result: std::result::Result<&str, &str>) {
        *self.user_id.lock().unwrap() = result.map(str::to_string).map_err(str::to_string);
    }

    pub fn last_cookie_header(&self) -> Option<String> {
        self.last_cookie_header.lock().unwrap().clone()
    }

    pub fn network_calls(&self) -> usize {
        self.authorize_calls.load(Ordering::SeqCst)
            + self.entitlement_calls.load(Ordering::SeqCst)
            + self.userinfo_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderApi for FakeApi {
    async fn authorize(&self, cookie_header: &str) -> Result<AuthorizeResponse> {
        self.authorize_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_cookie_header.lock().unwrap() = Some(cookie_header.to_string());

        Ok(AuthorizeResponse {
            status: *self.authorize_status.lock().unwrap(),
            location: self.authorize_location.lock().unwrap().clone(),
            set_cookies: self.authorize_cookies.lock().unwrap().clone(),
        })
    }

    async fn fetch_entitlement(&self, _access_token: &str) -> Result<String> {
        self.entitlement_calls.fetch_add(1, Ordering::SeqCst);
        self.entitlement.lock().unwrap().clone().map_err(anyhow::Error::msg)
    }

    async fn fetch_user_id(&self, _access_token: &str) -> Result<String> {
        self.userinfo_calls.fetch_add(1, Ordering::SeqCst);
        self.user_id.lock().unwrap().clone().map_err(anyhow::Error::msg)
    }
}

pub struct FakeLogin {
    pub calls: AtomicUsize,
    redirect: Mutex<String>,
    cookies: Mutex<Vec<Cookie>>,
    abandon: bool,
    gate: Option<Arc<Semaphore>>,
    pub cleared_domains: Mutex<Vec<String>>,
}

impl FakeLogin {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            redirect: Mutex::new(
                "https://cb.example.com/opt_in#access_token=tok1&expires_in=3600".to_string(),
            ),
            cookies: Mutex::new(Vec::new()),
            abandon: false,
            gate: None,
            cleared_domains: Mutex::new(Vec::new()),
        }
    }

    pub fn abandoning() -> Self {
        Self {
            abandon: true,
            ..Self::new()
        }
    }

    /// Login blocks until a permit is added to `gate`
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn set_redirect(&self, url: &str) {
        *self.redirect.lock().unwrap() = url.to_string();
    }

    pub fn set_cookies(&self, cookies: Vec<Cookie>) {
        *self.cookies.lock().unwrap() = cookies;
    }
}

#[async_trait]
impl LoginSurface for FakeLogin {
    async fn login(
        &self,
        _authorize_url: &str,
        _callback_prefix: &str,
    ) -> std::result::Result<LoginRedirect, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|_| AuthError::LoginAbandoned)?
                .forget();
        }

        if self.abandon {
            return Err(AuthError::LoginAbandoned);
        }

        Ok(LoginRedirect {
            url: self.redirect.lock().unwrap().clone(),
            cookies: self.cookies.lock().unwrap().clone(),
        })
    }

    async fn clear_cookies(&self, domain: &str) -> Result<()> {
        self.cleared_domains.lock().unwrap().push(domain.to_string());
        Ok(())
    }
}

/// Store whose writes or removals can be switched to fail; reads always succeed
pub struct FailingStore {
    pub inner: MemoryStore,
    fail_writes: AtomicBool,
    fail_removes: AtomicBool,
}

impl FailingStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_writes: AtomicBool::new(false),
            fail_removes: AtomicBool::new(false),
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_removes(&self, fail: bool) {
        self.fail_removes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl CredentialStore for FailingStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.inner.get_item(key).await
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("disk full");
        }
        self.inner.set_item(key, value).await
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        if self.fail_removes.load(Ordering::SeqCst) {
            anyhow::bail!("store is read-only");
        }
        self.inner.remove_item(key).await
    }

    async fn set_items(&self, items: &[(&str, String)]) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("disk full");
        }
        self.inner.set_items(items).await
    }
}
