use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Default authorization endpoint (implicit grant, token in the redirect fragment)
pub const DEFAULT_AUTHORIZE_URL: &str = "https://auth.riotgames.com/authorize?redirect_uri=https%3A%2F%2Fplayvalorant.com%2Fopt_in&client_id=play-valorant-web-prod&response_type=token%20id_token&nonce=1&scope=account%20openid";
pub const DEFAULT_CALLBACK_PREFIX: &str = "https://playvalorant.com/opt_in";
pub const DEFAULT_AUTH_DOMAIN: &str = "auth.riotgames.com";
pub const DEFAULT_LOGIN_COOKIE: &str = "ssid";
pub const DEFAULT_ENTITLEMENT_URL: &str = "https://entitlements.auth.riotgames.com/api/token/v1";
pub const DEFAULT_USERINFO_URL: &str = "https://auth.riotgames.com/userinfo";

/// Auth Session - keeps an identity provider session alive
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the credential database
    #[arg(short = 'd', long, env = "AUTH_SESSION_DB_FILE")]
    pub db_file: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Seconds subtracted from the provider's token lifetime
    #[arg(long, env = "TOKEN_REFRESH_MARGIN", default_value = "300")]
    pub refresh_margin: u64,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "30")]
    pub http_timeout: u64,

    /// Timeout for the silent re-authentication call, in seconds
    #[arg(long, env = "SILENT_REAUTH_TIMEOUT", default_value = "10")]
    pub silent_reauth_timeout: u64,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Acquire credentials, renewing them if needed
    Login,
    /// Show the stored session's expiry without touching the network
    Status,
    /// Sign out and delete stored credentials
    Logout,
}

/// Fixed identity-provider constants plus renewal tuning
#[derive(Clone, Debug, PartialEq)]
pub struct ProviderConfig {
    pub authorize_url: String,
    pub callback_prefix: String,
    pub auth_domain: String,
    pub login_cookie_name: String,
    pub entitlement_url: String,
    pub userinfo_url: String,

    /// Safety margin subtracted from every token lifetime (seconds)
    pub refresh_margin_secs: u64,
    pub http_timeout_secs: u64,
    pub silent_reauth_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            authorize_url: DEFAULT_AUTHORIZE_URL.to_string(),
            callback_prefix: DEFAULT_CALLBACK_PREFIX.to_string(),
            auth_domain: DEFAULT_AUTH_DOMAIN.to_string(),
            login_cookie_name: DEFAULT_LOGIN_COOKIE.to_string(),
            entitlement_url: DEFAULT_ENTITLEMENT_URL.to_string(),
            userinfo_url: DEFAULT_USERINFO_URL.to_string(),
            refresh_margin_secs: 300,
            http_timeout_secs: 30,
            silent_reauth_timeout_secs: 10,
        }
    }
}

impl ProviderConfig {
    /// Path component of the authorization URL, used for cookie path matching
    pub fn authorize_path(&self) -> String {
        url::Url::parse(&self.authorize_url)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| "/".to_string())
    }

    pub fn refresh_margin_ms(&self) -> i64 {
        (self.refresh_margin_secs as i64).saturating_mul(1000)
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub command: Command,
    pub db_file: PathBuf,
    pub log_level: String,
    pub provider: ProviderConfig,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let args = CliArgs::parse();
        Self::from_args(args)
    }

    pub fn from_args(args: CliArgs) -> Result<Self> {
        let db_file = match args.db_file {
            Some(path) => expand_tilde(&path),
            None => default_db_file().context(
                "Could not determine a config directory (use -d or set AUTH_SESSION_DB_FILE)",
            )?,
        };

        let provider = ProviderConfig {
            refresh_margin_secs: args.refresh_margin,
            http_timeout_secs: args.http_timeout,
            silent_reauth_timeout_secs: args.silent_reauth_timeout,
            ..ProviderConfig::default()
        };

        Ok(Config {
            command: args.command,
            db_file,
            log_level: args.log_level,
            provider,
        })
    }
}

fn default_db_file() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("auth-session").join("credentials.db"))
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
