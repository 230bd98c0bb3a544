//! Shared application state

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use cloudflare_dns::{CloudflareClient, DnsProvider};
use warpify_engine::tools::{
    AuditLog, BlobStore, BrowserLauncher, CloudflareKv, EmailPlatformConnector, FsBlobStore,
    HarnessClient, KvStore, MemoryKv, SmartleadConnector,
};
use warpify_engine::{DomainAgent, LoginAutomationAgent};

use crate::auth::TokenVerifier;
use crate::config::Config;

pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";

#[derive(Clone)]
pub struct AppState {
    pub dns: Arc<dyn DnsProvider>,
    pub domains: Arc<DomainAgent>,
    pub automation: Arc<LoginAutomationAgent>,
    pub platforms: Arc<dyn EmailPlatformConnector>,
    pub storage: Arc<dyn BlobStore>,
    pub audit: AuditLog,
    pub auth: Arc<TokenVerifier>,
    pub storage_public_url: Option<String>,
    pub cors_origin: String,
    /// Delay between login attempts and between credentials
    pub throttle: Duration,
}

impl AppState {
    pub fn new(
        dns: Arc<dyn DnsProvider>,
        launcher: Arc<dyn BrowserLauncher>,
        platforms: Arc<dyn EmailPlatformConnector>,
        storage: Arc<dyn BlobStore>,
        kv: Arc<dyn KvStore>,
        api_secret: &str,
    ) -> Self {
        let audit = AuditLog::new(kv);

        Self {
            domains: Arc::new(DomainAgent::new(dns.clone(), audit.clone())),
            automation: Arc::new(LoginAutomationAgent::new(launcher, audit.clone())),
            dns,
            platforms,
            storage,
            audit,
            auth: Arc::new(TokenVerifier::new(api_secret)),
            storage_public_url: None,
            cors_origin: DEFAULT_CORS_ORIGIN.to_string(),
            throttle: Duration::from_secs(2),
        }
    }

    pub fn with_storage_public_url(mut self, url: Option<String>) -> Self {
        self.storage_public_url = url.map(|u| u.trim_end_matches('/').to_string());
        self
    }

    pub fn with_cors_origin(mut self, origin: impl Into<String>) -> Self {
        self.cors_origin = origin.into();
        self
    }

    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    /// Wire the production adapters from configuration
    pub async fn from_config(config: &Config) -> Result<Self> {
        let dns = CloudflareClient::new(config.cloudflare_api_token.clone())?
            .with_account_id(config.cloudflare_account_id.clone());

        let kv: Arc<dyn KvStore> = match &config.kv_namespace_id {
            Some(namespace_id) => {
                let account_id = config.cloudflare_account_id.as_deref().context(
                    "CLOUDFLARE_ACCOUNT_ID is required when CLOUDFLARE_KV_NAMESPACE_ID is set",
                )?;
                info!("Audit log: Workers KV namespace {}", namespace_id);
                Arc::new(CloudflareKv::new(
                    config.cloudflare_api_token.clone(),
                    account_id,
                    namespace_id.clone(),
                )?)
            }
            None => {
                warn!(
                    "CLOUDFLARE_KV_NAMESPACE_ID not set, audit entries are kept in memory \
                     and accumulate until restart"
                );
                Arc::new(MemoryKv::new())
            }
        };

        let storage = FsBlobStore::open(&config.storage_dir)
            .await
            .with_context(|| format!("Failed to open storage at {}", config.storage_dir.display()))?;

        let launcher = HarnessClient::new(config.browser_harness_url.clone())
            .context("Failed to create browser harness client")?;

        let platforms = SmartleadConnector::new(config.email_platform_url.clone())?;

        Ok(Self::new(
            Arc::new(dns),
            Arc::new(launcher),
            Arc::new(platforms),
            Arc::new(storage),
            kv,
            &config.api_secret,
        )
        .with_storage_public_url(config.storage_public_url.clone())
        .with_cors_origin(config.cors_origin.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn config(storage_dir: &std::path::Path, extra: &[&str]) -> Config {
        let mut args = vec![
            "gateway",
            "--api-secret",
            "s3cret",
            "--cloudflare-api-token",
            "cf-token",
            "--storage-dir",
            storage_dir.to_str().unwrap(),
        ];
        args.extend_from_slice(extra);
        Config::try_parse_from(args).unwrap()
    }

    #[tokio::test]
    async fn test_from_config_falls_back_to_memory_kv() {
        let dir = tempfile::TempDir::new().unwrap();
        let state = AppState::from_config(&config(dir.path(), &[])).await.unwrap();

        let kv = state.audit.store();
        kv.put("audit:test", "1").await.unwrap();
        assert_eq!(kv.get("audit:test").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_kv_namespace_requires_account() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = AppState::from_config(&config(dir.path(), &["--kv-namespace-id", "ns-1"]))
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("CLOUDFLARE_ACCOUNT_ID"));
    }
}
