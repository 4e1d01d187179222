//! License Issuance
//!
//! Client for the KeyAuth seller API. Mints one permanent, single-use
//! license key per completed order; keys are never stored, only handed to
//! the notification sender.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use crate::error::{FulfillmentError, Result};

/// Identifying header sent with every seller API request.
const USER_AGENT: &str = "Apidog/1.0.0 (https://apidog.com)";

/// Key shape requested from the seller: three 6-character groups.
const KEY_MASK: &str = "******-******-******";

/// Pattern for keys embedded in free-text seller responses,
/// e.g. "Successfully added Key: PPPPPP-QQQQQQ-RRRRRR".
static MESSAGE_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Key: ([A-Z0-9-]+)").expect("valid key pattern"));

/// An issued license key; opaque, no internal structure is assumed
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct LicenseKey(String);

impl LicenseKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Get the key as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LicenseKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// License issuer trait
///
/// Implemented by the KeyAuth client; mocked in pipeline tests.
#[async_trait]
pub trait LicenseIssuer: Send + Sync {
    /// Mint one permanent license key for the given access tier.
    async fn issue(&self, access_level: &str) -> Result<LicenseKey>;
}

/// KeyAuth seller API configuration
#[derive(Clone, Debug)]
pub struct KeyAuthConfig {
    /// Seller credential for the licensing account
    pub seller_key: String,

    /// Seller API endpoint
    pub base_url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Human-readable note attached to every minted key
    pub note: String,
}

impl KeyAuthConfig {
    /// Create a new configuration with the default endpoint
    pub fn new(seller_key: impl Into<String>) -> Self {
        Self {
            seller_key: seller_key.into(),
            base_url: "https://keyauth.win/api/seller/".into(),
            timeout_secs: 10,
            note: "Generated from Northlight Software purchase".into(),
        }
    }

    /// Create from environment variables
    ///
    /// Reads `KEYAUTH_SELLER_KEY`; required.
    pub fn from_env() -> Result<Self> {
        let seller_key = std::env::var("KEYAUTH_SELLER_KEY")
            .map_err(|_| FulfillmentError::Config("KEYAUTH_SELLER_KEY not set".into()))?;

        Ok(Self::new(seller_key))
    }

    /// Set a custom API base URL (for testing)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

/// Seller API response.
///
/// The provider is inconsistent about where the key lands on success:
/// a direct `key` field, an `info` field, or buried in a free-text
/// `message`. All three shapes are tolerated.
#[derive(Debug, Deserialize)]
struct SellerResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    info: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Extract the license key from a successful seller response.
///
/// Strategies are tried in fixed priority order (direct `key`, then
/// `info`, then the `Key: ...` pattern in `message`) and the first
/// non-empty match wins. The order decides which value is returned when a
/// response carries more than one shape.
fn extract_key(response: &SellerResponse) -> Option<String> {
    if !response.success {
        return None;
    }

    if let Some(key) = response.key.as_deref().filter(|k| !k.is_empty()) {
        return Some(key.to_string());
    }

    if let Some(info) = response.info.as_deref().filter(|i| !i.is_empty()) {
        return Some(info.to_string());
    }

    response
        .message
        .as_deref()
        .and_then(|message| MESSAGE_KEY_RE.captures(message))
        .map(|captures| captures[1].to_string())
}

/// KeyAuth seller API client
pub struct KeyAuthClient {
    config: KeyAuthConfig,
    http: reqwest::Client,
}

impl KeyAuthClient {
    /// Create a new client
    pub fn new(config: KeyAuthConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FulfillmentError::Config(e.to_string()))?;

        Ok(Self { config, http })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(KeyAuthConfig::from_env()?)
    }
}

#[async_trait]
impl LicenseIssuer for KeyAuthClient {
    /// Request one lifetime key for the given access tier.
    ///
    /// The seller API contract takes a GET with the operation encoded in
    /// the query string. A single failed attempt is terminal; no retry.
    async fn issue(&self, access_level: &str) -> Result<LicenseKey> {
        let access_level = access_level.trim();
        if access_level.is_empty() {
            return Err(FulfillmentError::InvalidRequest(
                "access level must not be empty".into(),
            ));
        }

        tracing::info!(level = %access_level, "requesting license key from seller API");

        let response = self
            .http
            .get(&self.config.base_url)
            .header("User-Agent", USER_AGENT)
            .query(&[
                ("sellerkey", self.config.seller_key.as_str()),
                ("type", "add"),
                ("format", "JSON"),
                // 0 = lifetime, never expires
                ("expiry", "0"),
                ("mask", KEY_MASK),
                ("level", access_level),
                ("amount", "1"),
                ("character", "1"),
                ("note", self.config.note.as_str()),
            ])
            .send()
            .await
            .map_err(|e| FulfillmentError::Issuance(format!("seller API unreachable: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FulfillmentError::Issuance(format!("seller API read failed: {e}")))?;

        if !status.is_success() {
            tracing::error!(%status, response = %body, "seller API returned error status");
            return Err(FulfillmentError::Issuance(format!(
                "seller API returned HTTP {status}: {body}"
            )));
        }

        let parsed: SellerResponse = serde_json::from_str(&body).map_err(|_| {
            FulfillmentError::Issuance(format!("unrecognized seller response: {body}"))
        })?;

        extract_key(&parsed).map(LicenseKey::new).ok_or_else(|| {
            tracing::error!(response = %body, "unable to extract license key from seller response");
            FulfillmentError::Issuance(format!("unrecognized seller response: {body}"))
        })
    }
}
