//! Key-value store
//!
//! Audit entries and setup records live in a flat string key-value store.
//! Production uses a Cloudflare Workers KV namespace over the REST API; an
//! in-memory map stands in when no namespace is configured.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn put(&self, key: &str, value: &str) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn delete(&self, key: &str) -> Result<()>;
}

// ============================================================
// Workers KV
// ============================================================

/// Workers KV namespace accessed through the Cloudflare REST API
#[derive(Clone)]
pub struct CloudflareKv {
    http: Client,
    api_token: String,
    account_id: String,
    namespace_id: String,
    base_url: String,
}

impl std::fmt::Debug for CloudflareKv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareKv")
            .field("account_id", &self.account_id)
            .field("namespace_id", &self.namespace_id)
            .finish_non_exhaustive()
    }
}

impl CloudflareKv {
    pub fn new(
        api_token: impl Into<String>,
        account_id: impl Into<String>,
        namespace_id: impl Into<String>,
    ) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("warpify-engine/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            api_token: api_token.into(),
            account_id: account_id.into(),
            namespace_id: namespace_id.into(),
            base_url: cloudflare_dns::cloudflare::CLOUDFLARE_API.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn value_url(&self, key: &str) -> String {
        format!(
            "{}/accounts/{}/storage/kv/namespaces/{}/values/{}",
            self.base_url,
            self.account_id,
            self.namespace_id,
            urlencoding::encode(key)
        )
    }
}

#[async_trait]
impl KvStore for CloudflareKv {
    async fn put(&self, key: &str, value: &str) -> Result<()> {
        debug!("KV put {}", key);

        let response = self
            .http
            .put(self.value_url(key))
            .bearer_auth(&self.api_token)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(value.to_string())
            .send()
            .await
            .with_context(|| format!("Failed to write KV key {}", key))?;

        if !response.status().is_success() {
            bail!("KV write failed for {}: {}", key, response.status());
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        debug!("KV get {}", key);

        let response = self
            .http
            .get(self.value_url(key))
            .bearer_auth(&self.api_token)
            .send()
            .await
            .with_context(|| format!("Failed to read KV key {}", key))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let text = response
                    .text()
                    .await
                    .with_context(|| format!("Failed to read KV value {}", key))?;
                Ok(Some(text))
            }
            status => bail!("KV read failed for {}: {}", key, status),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        debug!("KV delete {}", key);

        let response = self
            .http
            .delete(self.value_url(key))
            .bearer_auth(&self.api_token)
            .send()
            .await
            .with_context(|| format!("Failed to delete KV key {}", key))?;

        let status = response.status();
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            bail!("KV delete failed for {}: {}", key, status);
        }
        Ok(())
    }
}

// ============================================================
// In-memory
// ============================================================

/// Process-local store. Nothing expires: entries stay until deleted or the
/// process exits.
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently stored, sorted
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn put(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_kv_roundtrip() {
        let kv = MemoryKv::new();
        assert_eq!(kv.get("missing").await.unwrap(), None);

        kv.put("domain:example.com:setup", "{}").await.unwrap();
        assert_eq!(
            kv.get("domain:example.com:setup").await.unwrap().as_deref(),
            Some("{}")
        );

        kv.delete("domain:example.com:setup").await.unwrap();
        kv.delete("domain:example.com:setup").await.unwrap();
        assert!(kv.keys().await.is_empty());
    }

    #[test]
    fn test_value_url_encodes_key() {
        let kv = CloudflareKv::new("token", "acct", "ns")
            .unwrap()
            .with_base_url("https://cf.test/client/v4/");

        assert_eq!(
            kv.value_url("automation:1700000000000:a@b.com"),
            "https://cf.test/client/v4/accounts/acct/storage/kv/namespaces/ns/values/automation%3A1700000000000%3Aa%40b.com"
        );
    }
}
