use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use super::credentials;
use super::derive::CredentialDeriver;
use super::refresh::RenewalStrategy;
use super::types::{AccessCredentials, Credentials, SessionStatus};
use crate::config::ProviderConfig;
use crate::cookies::SessionJar;
use crate::error::{AuthError, Result};
use crate::http_client::ProviderApi;
use crate::login::LoginSurface;
use crate::store::CredentialStore;

/// Millisecond wall clock
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

type PendingRenewal = Shared<BoxFuture<'static, Result<AccessCredentials>>>;

/// Per-call context: where the session is persisted
#[derive(Clone)]
pub struct AuthContext {
    pub store: Arc<dyn CredentialStore>,
}

impl AuthContext {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }
}

#[derive(Debug, Default)]
struct SessionState {
    credentials: Credentials,
    jar: SessionJar,
}

struct Inner {
    /// Credential set and jar; never held across an await
    state: RwLock<SessionState>,

    /// Guards the one-time read of the persisted record
    loaded: tokio::sync::Mutex<bool>,

    /// At most one renewal in flight
    pending: Mutex<Option<PendingRenewal>>,

    strategy: RenewalStrategy,
    deriver: CredentialDeriver,
    login: Arc<dyn LoginSurface>,
    clock: Clock,
    auth_domain: String,
    refresh_margin_ms: i64,
}

/// Authentication manager
/// Owns the credential set, renews it on expiry and coalesces concurrent renewals
#[derive(Clone)]
pub struct AuthManager {
    inner: Arc<Inner>,
}

impl AuthManager {
    pub fn new(
        api: Arc<dyn ProviderApi>,
        login: Arc<dyn LoginSurface>,
        config: ProviderConfig,
    ) -> Self {
        Self::with_clock(api, login, config, Arc::new(|| Utc::now().timestamp_millis()))
    }

    /// Same as [`AuthManager::new`] with an injected clock
    pub fn with_clock(
        api: Arc<dyn ProviderApi>,
        login: Arc<dyn LoginSurface>,
        config: ProviderConfig,
        clock: Clock,
    ) -> Self {
        let inner = Inner {
            state: RwLock::new(SessionState::default()),
            loaded: tokio::sync::Mutex::new(false),
            pending: Mutex::new(None),
            strategy: RenewalStrategy::new(api.clone(), login.clone(), config.clone()),
            deriver: CredentialDeriver::new(api),
            login,
            clock,
            auth_domain: config.auth_domain.clone(),
            refresh_margin_ms: config.refresh_margin_ms(),
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    /// Get valid credentials, renewing them if they have expired.
    /// Concurrent callers share a single renewal and its outcome.
    pub async fn acquire(&self, ctx: &AuthContext) -> Result<AccessCredentials> {
        self.inner.ensure_loaded(ctx.store.as_ref()).await;

        let now = (self.inner.clock)();
        if let Some(snapshot) = self.inner.read_state().credentials.fresh_snapshot(now) {
            return Ok(snapshot);
        }

        let pending = {
            let mut slot = self.inner.pending.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some(pending) => {
                    tracing::debug!("Joining in-flight renewal");
                    pending.clone()
                }
                None => {
                    // A renewal may have committed since the check above
                    let now = (self.inner.clock)();
                    if let Some(snapshot) = self.inner.read_state().credentials.fresh_snapshot(now) {
                        return Ok(snapshot);
                    }

                    let pending = self.inner.clone().spawn_renewal(ctx.store.clone());
                    *slot = Some(pending.clone());
                    pending
                }
            }
        };

        pending.await
    }

    /// Sign out: drop provider cookies, the persisted record and the in-memory session
    pub async fn clear_account(&self, ctx: Option<&AuthContext>) {
        if let Err(e) = self.inner.login.clear_cookies(&self.inner.auth_domain).await {
            tracing::warn!(error = %e, "Failed to clear login session cookies");
        }

        if let Some(ctx) = ctx {
            credentials::remove_record(ctx.store.as_ref()).await;
        }

        // Nothing left to load once the record is gone
        *self.inner.loaded.lock().await = true;

        let mut state = self.inner.write_state();
        state.jar.clear();
        state.credentials = Credentials::default();

        tracing::info!("Signed out");
    }

    /// In-memory session view; never triggers a renewal
    pub fn status(&self) -> SessionStatus {
        let state = self.inner.read_state();
        SessionStatus {
            expires_at: state.credentials.expires_at,
            has_credentials: state.credentials.access_token.is_some(),
            stored_cookies: state.jar.len(),
        }
    }
}

impl Inner {
    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read the persisted record once per process, only if nothing is in memory yet
    async fn ensure_loaded(&self, store: &dyn CredentialStore) {
        let mut loaded = self.loaded.lock().await;
        if *loaded {
            return;
        }
        *loaded = true;

        if self.read_state().credentials.expires_at != 0 {
            return;
        }

        match credentials::load_record(store).await {
            Ok(Some(record)) => {
                tracing::info!(expires_at = record.credentials.expires_at, "Loaded stored credentials");
                let mut state = self.write_state();
                state.credentials = record.credentials;
                state.jar = record.jar;
            }
            Ok(None) => tracing::debug!("No stored credentials"),
            Err(e) => tracing::warn!(error = %e, "Failed to load stored credentials"),
        }
    }

    /// Start the renewal on its own task so it settles even if every caller goes away
    fn spawn_renewal(self: Arc<Self>, store: Arc<dyn CredentialStore>) -> PendingRenewal {
        let handle = tokio::spawn(async move {
            let _clear = ClearPending(&self);
            self.renew(store.as_ref()).await
        });

        async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => Err(AuthError::AuthenticationFailed(format!(
                    "renewal task failed: {}",
                    e
                ))),
            }
        }
        .boxed()
        .shared()
    }

    /// `now + lifetime - margin`, clamped instead of overflowing on absurd lifetimes
    fn expiry_for(&self, now: i64, expires_in_seconds: u64) -> i64 {
        let lifetime_ms = i64::try_from(expires_in_seconds)
            .unwrap_or(i64::MAX)
            .saturating_mul(1000);
        now.saturating_add(lifetime_ms)
            .saturating_sub(self.refresh_margin_ms)
    }

    /// Renew, derive and persist; commits to memory only after everything succeeded
    async fn renew(&self, store: &dyn CredentialStore) -> Result<AccessCredentials> {
        let now = (self.clock)();
        let jar = self.read_state().jar.clone();

        tracing::info!("Renewing credentials...");

        let result = async {
            let session = self.strategy.renew(&jar, now).await?;
            let derived = self.deriver.derive(&session.payload.access_token).await?;

            let renewed = Credentials {
                access_token: Some(session.payload.access_token.clone()),
                entitlement_token: Some(derived.entitlement_token.clone()),
                user_id: Some(derived.user_id.clone()),
                expires_at: self.expiry_for(now, session.payload.expires_in_seconds),
            };

            credentials::save_record(store, &renewed, &session.jar)
                .await
                .map_err(|e| AuthError::AuthenticationFailed(format!("{:#}", e)))?;

            Ok::<_, AuthError>((renewed, session.jar, derived, session.payload))
        }
        .await;

        match result {
            Ok((renewed, renewed_jar, derived, payload)) => {
                tracing::info!(expires_at = renewed.expires_at, "Credentials renewed");

                let mut state = self.write_state();
                state.credentials = renewed;
                state.jar = renewed_jar;

                Ok(AccessCredentials {
                    entitlement_token: derived.entitlement_token,
                    access_token: payload.access_token,
                    user_id: derived.user_id,
                })
            }
            Err(AuthError::AuthenticationFailed(msg)) => {
                tracing::error!(error = %msg, "Credential renewal failed");
                Err(AuthError::AuthenticationFailed(msg))
            }
            Err(e) => {
                tracing::error!(error = %e, "Credential renewal failed");
                Err(AuthError::AuthenticationFailed(e.to_string()))
            }
        }
    }
}

/// Clears the pending slot when the renewal task ends, panics included
struct ClearPending<'a>(&'a Inner);

impl Drop for ClearPending<'_> {
    fn drop(&mut self) {
        self.0
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}
