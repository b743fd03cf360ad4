// Dependent credential derivation

use std::sync::Arc;

use super::types::DerivedCredentials;
use crate::error::{AuthError, Result};
use crate::http_client::ProviderApi;

/// Turns an access token into the entitlement token and user id
pub struct CredentialDeriver {
    api: Arc<dyn ProviderApi>,
}

impl CredentialDeriver {
    pub fn new(api: Arc<dyn ProviderApi>) -> Self {
        Self { api }
    }

    /// Both lookups run in order against the same token; either failing fails the whole derivation
    pub async fn derive(&self, access_token: &str) -> Result<DerivedCredentials> {
        let entitlement_token = self
            .api
            .fetch_entitlement(access_token)
            .await
            .map_err(|e| AuthError::DerivationFailed(format!("entitlement lookup: {:#}", e)))?;

        let user_id = self
            .api
            .fetch_user_id(access_token)
            .await
            .map_err(|e| AuthError::DerivationFailed(format!("user info lookup: {:#}", e)))?;

        tracing::debug!("Derived entitlement token and user id");

        Ok(DerivedCredentials {
            entitlement_token,
            user_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testing::FakeApi;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_derive_success() {
        let api = Arc::new(FakeApi::new());
        let derived = CredentialDeriver::new(api.clone()).derive("tok1").await.unwrap();

        assert_eq!(derived.entitlement_token, "ent1");
        assert_eq!(derived.user_id, "u1");
        assert_eq!(api.entitlement_calls.load(Ordering::SeqCst), 1);
        assert_eq!(api.userinfo_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_entitlement_failure_skips_identity_lookup() {
        let api = Arc::new(FakeApi::new());
        api.set_entitlement(Err("403 Forbidden"));

        let err = CredentialDeriver::new(api.clone()).derive("tok1").await.unwrap_err();
        assert!(matches!(err, AuthError::DerivationFailed(ref m) if m.contains("403")));
        assert_eq!(api.userinfo_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_identity_failure_fails_derivation() {
        let api = Arc::new(FakeApi::new());
        api.set_user_id(Err("timeout"));

        let err = CredentialDeriver::new(api).derive("tok1").await.unwrap_err();
        assert!(matches!(err, AuthError::DerivationFailed(_)));
    }
}
