//! Cold-email platform client
//!
//! Wraps the Smartlead `email-accounts` REST API: paged account listing,
//! per-account warmup settings and the bulk reconnect call. Each request is
//! authenticated with the caller's own API key, so clients are created per
//! request through an `EmailPlatformConnector`.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_API_BASE: &str = "https://server.smartlead.ai/api/v1";

/// Accounts requested per listing page
pub const ACCOUNTS_PAGE_SIZE: usize = 100;

/// A mailbox registered on the platform
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmailAccount {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub from_email: String,
}

/// Account ids come back as numbers from some endpoints and strings from others
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

/// A listing page is either a bare array or wrapped in `{"data": [...]}`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AccountPage {
    Bare(Vec<EmailAccount>),
    Wrapped {
        #[serde(default)]
        data: Vec<EmailAccount>,
    },
}

impl AccountPage {
    fn into_accounts(self) -> Vec<EmailAccount> {
        match self {
            AccountPage::Bare(accounts) => accounts,
            AccountPage::Wrapped { data } => data,
        }
    }
}

/// Warmup configuration applied to every account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WarmupSettings {
    pub total_warmup_per_day: u32,
    pub daily_rampup: u32,
    pub reply_rate_percentage: u32,
    pub warmup_key_id: String,
}

impl Default for WarmupSettings {
    fn default() -> Self {
        Self {
            total_warmup_per_day: 50,
            daily_rampup: 50,
            reply_rate_percentage: 100,
            warmup_key_id: "default".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct WarmupRequest<'a> {
    warmup_enabled: bool,
    #[serde(flatten)]
    settings: &'a WarmupSettings,
}

/// Body of the bulk reconnect call
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReconnectResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub message: String,
}

/// Operations used against a single platform tenant
#[async_trait]
pub trait EmailPlatform: Send + Sync {
    /// Fetch one page of accounts
    async fn list_accounts(&self, offset: usize, limit: usize) -> Result<Vec<EmailAccount>>;

    /// Turn warmup on for an account
    async fn enable_warmup(&self, account_id: &str, settings: &WarmupSettings) -> Result<()>;

    /// Ask the platform to reconnect every account in a failed state
    async fn reconnect_failed_accounts(&self) -> Result<ReconnectResponse>;
}

/// Builds a platform client for a caller-supplied API key
pub trait EmailPlatformConnector: Send + Sync {
    fn connect(&self, api_key: &str) -> Result<Arc<dyn EmailPlatform>>;
}

/// Page through every account.
///
/// Stops at the first empty page or the first page shorter than
/// `ACCOUNTS_PAGE_SIZE`.
pub async fn list_all_accounts(platform: &dyn EmailPlatform) -> Result<Vec<EmailAccount>> {
    let mut accounts = Vec::new();
    let mut offset = 0;

    loop {
        let page = platform.list_accounts(offset, ACCOUNTS_PAGE_SIZE).await?;
        let len = page.len();
        accounts.extend(page);

        if len < ACCOUNTS_PAGE_SIZE {
            break;
        }
        offset += ACCOUNTS_PAGE_SIZE;
    }

    debug!("Fetched {} email accounts", accounts.len());
    Ok(accounts)
}

// ============================================================
// Smartlead
// ============================================================

/// Smartlead API client bound to one API key
#[derive(Clone)]
pub struct SmartleadClient {
    http: Client,
    api_key: String,
    base_url: String,
}

impl std::fmt::Debug for SmartleadClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartleadClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

fn decode_account_page(status: StatusCode, text: &str) -> Result<Vec<EmailAccount>> {
    if !status.is_success() {
        bail!("Failed to fetch accounts: {}", status);
    }

    let page: Option<AccountPage> =
        serde_json::from_str(text).context("Failed to parse email account page")?;
    Ok(page.map(AccountPage::into_accounts).unwrap_or_default())
}

fn check_warmup_status(account_id: &str, status: StatusCode) -> Result<()> {
    if !status.is_success() {
        bail!(
            "Failed to enable warmup for account {}: {}",
            account_id,
            status
        );
    }
    Ok(())
}

fn decode_reconnect(status: StatusCode, text: &str) -> Result<ReconnectResponse> {
    if !status.is_success() {
        bail!("Failed to reconnect accounts: {}", status);
    }
    serde_json::from_str(text).context("Failed to parse reconnect response")
}

impl SmartleadClient {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl EmailPlatform for SmartleadClient {
    async fn list_accounts(&self, offset: usize, limit: usize) -> Result<Vec<EmailAccount>> {
        let url = self.url(&format!("/email-accounts?offset={}&limit={}", offset, limit));
        debug!("GET {}", url);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .context("Failed to call email platform")?;

        let status = response.status();
        let text = response
            .text()
            .await
            .context("Failed to read email account page")?;

        decode_account_page(status, &text)
    }

    async fn enable_warmup(&self, account_id: &str, settings: &WarmupSettings) -> Result<()> {
        let url = self.url(&format!(
            "/email-accounts/{}/warmup",
            urlencoding::encode(account_id)
        ));
        debug!("POST {}", url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&WarmupRequest {
                warmup_enabled: true,
                settings,
            })
            .send()
            .await
            .with_context(|| format!("Failed to call email platform for account {}", account_id))?;

        check_warmup_status(account_id, response.status())
    }

    async fn reconnect_failed_accounts(&self) -> Result<ReconnectResponse> {
        let url = self.url("/email-accounts/reconnect-failed-email-accounts");
        debug!("POST {}", url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .context("Failed to call email platform")?;

        let status = response.status();
        let text = response
            .text()
            .await
            .context("Failed to read reconnect response")?;

        decode_reconnect(status, &text)
    }
}

/// Creates `SmartleadClient`s sharing one connection pool
#[derive(Debug, Clone)]
pub struct SmartleadConnector {
    http: Client,
    base_url: String,
}

impl SmartleadConnector {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("warpify-engine/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

impl EmailPlatformConnector for SmartleadConnector {
    fn connect(&self, api_key: &str) -> Result<Arc<dyn EmailPlatform>> {
        if api_key.trim().is_empty() {
            bail!("Email platform API key is empty");
        }

        Ok(Arc::new(SmartleadClient {
            http: self.http.clone(),
            api_key: api_key.to_string(),
            base_url: self.base_url.clone(),
        }))
    }
}
