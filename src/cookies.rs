// Session cookie jar
// Holds the identity provider's session cookies and (de)serializes the durable ones

use anyhow::{Context, Result};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current version of the serialized jar blob
pub const JAR_FORMAT_VERSION: u32 = 1;

/// A single HTTP cookie
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub domain: String,
    pub path: String,
    pub name: String,
    pub value: String,
    /// Absolute expiry in milliseconds since epoch; `None` for session-only cookies
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
}

impl Cookie {
    /// Create a session-only cookie scoped to `domain` and path `/`
    pub fn new(domain: &str, name: &str, value: &str) -> Self {
        Self {
            domain: normalize_domain(domain),
            path: "/".to_string(),
            name: name.to_string(),
            value: value.to_string(),
            expires_at: None,
            secure: false,
            http_only: false,
        }
    }

    /// Builder-style setter for the absolute expiry (ms since epoch)
    pub fn expiring_at(mut self, expires_at: i64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Whether this cookie survives a save/load cycle
    pub fn is_persistent(&self) -> bool {
        self.expires_at.is_some()
    }

    /// Whether the cookie's own expiry has passed; session-only cookies never expire here
    pub fn is_expired(&self, now_ms: i64) -> bool {
        matches!(self.expires_at, Some(exp) if exp <= now_ms)
    }

    /// Domain-match per RFC 6265: exact host or a subdomain of the cookie domain
    pub fn matches_host(&self, host: &str) -> bool {
        let host = normalize_domain(host);
        host == self.domain || host.ends_with(&format!(".{}", self.domain))
    }

    /// Path-match per RFC 6265
    pub fn matches_path(&self, request_path: &str) -> bool {
        if request_path == self.path {
            return true;
        }
        request_path.starts_with(&self.path)
            && (self.path.ends_with('/') || request_path[self.path.len()..].starts_with('/'))
    }

    fn key(&self) -> CookieKey {
        (self.domain.clone(), self.path.clone(), self.name.clone())
    }
}

type CookieKey = (String, String, String);

/// Serialized form of the jar
#[derive(Serialize, Deserialize)]
struct JarBlob {
    version: u32,
    cookies: Vec<Cookie>,
}

/// Cookies keyed by (domain, path, name)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionJar {
    cookies: BTreeMap<CookieKey, Cookie>,
}

impl SessionJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a jar from cookies harvested by a login flow
    pub fn from_cookies(cookies: impl IntoIterator<Item = Cookie>) -> Self {
        let mut jar = Self::new();
        for cookie in cookies {
            jar.set(cookie);
        }
        jar
    }

    /// Insert or replace a cookie with the same (domain, path, name)
    pub fn set(&mut self, mut cookie: Cookie) {
        cookie.domain = normalize_domain(&cookie.domain);
        self.cookies.insert(cookie.key(), cookie);
    }

    pub fn get(&self, domain: &str, path: &str, name: &str) -> Option<&Cookie> {
        self.cookies
            .get(&(normalize_domain(domain), path.to_string(), name.to_string()))
    }

    pub fn remove(&mut self, domain: &str, path: &str, name: &str) -> Option<Cookie> {
        self.cookies
            .remove(&(normalize_domain(domain), path.to_string(), name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cookie> {
        self.cookies.values()
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn clear(&mut self) {
        self.cookies.clear();
    }

    /// True when a cookie named `name` for `host` exists and its own expiry is in the future.
    /// Session-only cookies do not count: their lifetime cannot be verified.
    pub fn has_valid_cookie(&self, host: &str, name: &str, now_ms: i64) -> bool {
        self.cookies.values().any(|c| {
            c.name == name
                && c.matches_host(host)
                && matches!(c.expires_at, Some(exp) if exp > now_ms)
        })
    }

    /// Render a `Cookie` request header for `host` and `path`, skipping expired cookies
    pub fn cookie_header(&self, host: &str, path: &str, now_ms: i64) -> Option<String> {
        let mut matching: Vec<&Cookie> = self
            .cookies
            .values()
            .filter(|c| c.matches_host(host) && c.matches_path(path) && !c.is_expired(now_ms))
            .collect();

        if matching.is_empty() {
            return None;
        }

        // Longer paths first, per RFC 6265 section 5.4
        matching.sort_by(|a, b| b.path.len().cmp(&a.path.len()));

        Some(
            matching
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Merge one `Set-Cookie` header received from `request_host`
    pub fn apply_set_cookie(&mut self, header: &str, request_host: &str, now_ms: i64) {
        match parse_set_cookie(header, request_host, now_ms) {
            Some(cookie) if cookie.is_expired(now_ms) => {
                self.cookies.remove(&cookie.key());
            }
            Some(cookie) => self.set(cookie),
            None => tracing::debug!("Ignoring unparsable or foreign-domain Set-Cookie header"),
        }
    }

    /// Serialize durable cookies to an opaque blob; session-only cookies are dropped
    pub fn serialize(&self) -> Result<String> {
        let blob = JarBlob {
            version: JAR_FORMAT_VERSION,
            cookies: self
                .cookies
                .values()
                .filter(|c| c.is_persistent())
                .cloned()
                .collect(),
        };
        serde_json::to_string(&blob).context("Failed to serialize cookie jar")
    }

    /// Restore a jar from a blob produced by [`SessionJar::serialize`]
    pub fn deserialize(blob: &str) -> Result<Self> {
        let parsed: JarBlob =
            serde_json::from_str(blob).context("Failed to parse cookie jar blob")?;

        if parsed.version != JAR_FORMAT_VERSION {
            anyhow::bail!("Unsupported cookie jar version: {}", parsed.version);
        }

        Ok(Self::from_cookies(
            parsed.cookies.into_iter().filter(Cookie::is_persistent),
        ))
    }
}

fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// Parse a `Set-Cookie` header value into a cookie scoped to `request_host` by default.
/// `Max-Age` takes precedence over `Expires`. Cookies whose `Domain` does not
/// domain-match `request_host` are rejected.
pub fn parse_set_cookie(header: &str, request_host: &str, now_ms: i64) -> Option<Cookie> {
    let mut parts = header.split(';');
    let (name, value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let mut cookie = Cookie::new(request_host, name, value.trim());
    let mut max_age: Option<i64> = None;
    let mut expires: Option<i64> = None;

    for attr in parts {
        let (key, val) = match attr.split_once('=') {
            Some((k, v)) => (k.trim(), v.trim()),
            None => (attr.trim(), ""),
        };

        match key.to_ascii_lowercase().as_str() {
            "domain" if !val.is_empty() => cookie.domain = normalize_domain(val),
            "path" if val.starts_with('/') => cookie.path = val.to_string(),
            "max-age" => max_age = val.parse().ok(),
            "expires" => {
                expires = DateTime::parse_from_rfc2822(val)
                    .ok()
                    .map(|dt| dt.timestamp_millis())
            }
            "secure" => cookie.secure = true,
            "httponly" => cookie.http_only = true,
            _ => {}
        }
    }

    // A Domain attribute must cover the host that sent it
    if !cookie.matches_host(request_host) {
        return None;
    }

    cookie.expires_at = match max_age {
        Some(secs) if secs <= 0 => Some(i64::MIN),
        Some(secs) => Some(now_ms.saturating_add(secs.saturating_mul(1000))),
        None => expires,
    };

    Some(cookie)
}
