// Persisted credential record
// Reads and writes the five-key group through a CredentialStore

use anyhow::{Context, Result};

use super::types::Credentials;
use crate::cookies::SessionJar;
use crate::store::CredentialStore;

pub const EXPIRES_AT_KEY: &str = "expiresAt";
pub const TOKEN_KEY: &str = "token";
pub const ENTITLEMENT_KEY: &str = "entitlement";
pub const USER_ID_KEY: &str = "puuid";
pub const COOKIES_KEY: &str = "cookies";

pub const RECORD_KEYS: [&str; 5] = [
    EXPIRES_AT_KEY,
    TOKEN_KEY,
    ENTITLEMENT_KEY,
    USER_ID_KEY,
    COOKIES_KEY,
];

/// Durable image of a credential set plus its cookie jar
#[derive(Debug, Clone)]
pub struct PersistedRecord {
    pub credentials: Credentials,
    pub jar: SessionJar,
}

/// Load the record, or `None` when nothing has been saved
pub async fn load_record(store: &dyn CredentialStore) -> Result<Option<PersistedRecord>> {
    if !store
        .has_item(EXPIRES_AT_KEY)
        .await
        .context("Failed to check for stored credentials")?
    {
        return Ok(None);
    }

    let expires_at = store
        .get_item(EXPIRES_AT_KEY)
        .await?
        .and_then(|s| s.trim().parse::<i64>().ok())
        .unwrap_or(0);

    let mut credentials = Credentials {
        access_token: store.get_item(TOKEN_KEY).await?,
        entitlement_token: store.get_item(ENTITLEMENT_KEY).await?,
        user_id: store.get_item(USER_ID_KEY).await?,
        expires_at,
    };

    // A record missing any token cannot be served; force a renewal instead
    if credentials.access_token.is_none()
        || credentials.entitlement_token.is_none()
        || credentials.user_id.is_none()
    {
        tracing::warn!("Stored credential record is incomplete, it will be renewed");
        credentials.expires_at = 0;
    }

    let jar = match store.get_item(COOKIES_KEY).await? {
        Some(blob) => SessionJar::deserialize(&blob).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Discarding unreadable stored cookie jar");
            SessionJar::new()
        }),
        None => SessionJar::new(),
    };

    Ok(Some(PersistedRecord { credentials, jar }))
}

/// Write all five keys as one group
pub async fn save_record(
    store: &dyn CredentialStore,
    credentials: &Credentials,
    jar: &SessionJar,
) -> Result<()> {
    let items = [
        (EXPIRES_AT_KEY, credentials.expires_at.to_string()),
        (TOKEN_KEY, credentials.access_token.clone().unwrap_or_default()),
        (
            ENTITLEMENT_KEY,
            credentials.entitlement_token.clone().unwrap_or_default(),
        ),
        (USER_ID_KEY, credentials.user_id.clone().unwrap_or_default()),
        (COOKIES_KEY, jar.serialize()?),
    ];

    store
        .set_items(&items)
        .await
        .context("Failed to persist credential record")
}

/// Remove every record key; failures are logged and skipped
pub async fn remove_record(store: &dyn CredentialStore) {
    for key in RECORD_KEYS {
        if let Err(e) = store.remove_item(key).await {
            tracing::warn!(key, error = %e, "Failed to remove stored credential");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookies::Cookie;
    use crate::store::MemoryStore;

    fn sample() -> Credentials {
        Credentials {
            access_token: Some("tok".to_string()),
            entitlement_token: Some("ent".to_string()),
            user_id: Some("u".to_string()),
            expires_at: 1_234,
        }
    }

    #[tokio::test]
    async fn test_missing_record() {
        let store = MemoryStore::new();
        assert!(load_record(&store).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let store = MemoryStore::new();
        let jar = SessionJar::from_cookies([
            Cookie::new("auth.example.com", "ssid", "s").expiring_at(9_999),
        ]);

        tokio_test::assert_ok!(save_record(&store, &sample(), &jar).await);

        let stored = store.snapshot().await;
        assert_eq!(stored.len(), 5);
        assert_eq!(stored["expiresAt"], "1234");
        assert_eq!(stored["puuid"], "u");

        let record = load_record(&store).await.unwrap().unwrap();
        assert_eq!(record.credentials, sample());
        assert_eq!(record.jar, jar);
    }

    #[tokio::test]
    async fn test_incomplete_record_is_expired() {
        let store = MemoryStore::new();
        store.set_item(EXPIRES_AT_KEY, "99999999999999").await.unwrap();
        store.set_item(TOKEN_KEY, "tok").await.unwrap();

        let record = load_record(&store).await.unwrap().unwrap();
        assert_eq!(record.credentials.expires_at, 0);
        assert!(record.jar.is_empty());
    }

    #[tokio::test]
    async fn test_bad_values_are_tolerated() {
        let store = MemoryStore::new();
        save_record(&store, &sample(), &SessionJar::new()).await.unwrap();
        store.set_item(EXPIRES_AT_KEY, "soon").await.unwrap();
        store.set_item(COOKIES_KEY, "{garbage").await.unwrap();

        let record = load_record(&store).await.unwrap().unwrap();
        assert_eq!(record.credentials.expires_at, 0);
        assert!(record.jar.is_empty());
    }

    #[tokio::test]
    async fn test_remove_record() {
        let store = MemoryStore::new();
        save_record(&store, &sample(), &SessionJar::new()).await.unwrap();
        store.set_item("unrelated", "keep").await.unwrap();

        remove_record(&store).await;

        let stored = store.snapshot().await;
        assert_eq!(stored.len(), 1);
        assert!(stored.contains_key("unrelated"));
    }
}
