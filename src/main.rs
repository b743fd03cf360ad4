use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use auth_session::auth::{credentials, AuthContext, AuthManager};
use auth_session::config::{Command, Config};
use auth_session::http_client::ProviderHttpClient;
use auth_session::login::TerminalLogin;
use auth_session::store::SqliteStore;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::debug!("Credential database: {}", config.db_file.display());

    let store = Arc::new(SqliteStore::open(&config.db_file)?);
    let ctx = AuthContext::new(store.clone());

    match config.command {
        Command::Status => {
            match credentials::load_record(store.as_ref()).await? {
                Some(record) if record.credentials.expires_at > Utc::now().timestamp_millis() => {
                    println!("Session valid until {}", format_millis(record.credentials.expires_at));
                    println!("Stored cookies: {}", record.jar.len());
                }
                Some(record) => {
                    println!("Session expired; it will be renewed on next login");
                    println!("Stored cookies: {}", record.jar.len());
                }
                None => println!("No stored session"),
            }
        }
        Command::Login => {
            let api = Arc::new(ProviderHttpClient::new(config.provider.clone())?);
            let manager = AuthManager::new(api, Arc::new(TerminalLogin), config.provider.clone());

            match manager.acquire(&ctx).await {
                Ok(creds) => {
                    println!("✅ Authenticated as {}", creds.user_id);
                    println!("   access token: {}...", mask(&creds.access_token));
                    println!("   entitlement:  {}...", mask(&creds.entitlement_token));
                    println!(
                        "   valid until:  {}",
                        format_millis(manager.status().expires_at)
                    );
                }
                Err(e) => {
                    tracing::error!("❌ {}", e);
                    anyhow::bail!(e);
                }
            }
        }
        Command::Logout => {
            let api = Arc::new(ProviderHttpClient::new(config.provider.clone())?);
            let manager = AuthManager::new(api, Arc::new(TerminalLogin), config.provider.clone());
            manager.clear_account(Some(&ctx)).await;
            println!("Signed out");
        }
    }

    Ok(())
}

fn mask(token: &str) -> &str {
    let end = token
        .char_indices()
        .nth(20)
        .map(|(i, _)| i)
        .unwrap_or(token.len());
    &token[..end]
}

fn format_millis(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ms.to_string())
}
