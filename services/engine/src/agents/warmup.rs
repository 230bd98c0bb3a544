//! Mailbox Warmup Agent
//!
//! Enables warmup on every account of an email platform tenant and triggers
//! the bulk reconnect of disconnected mailboxes.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::tools::audit::now_millis;
use crate::tools::email_platform::{list_all_accounts, EmailPlatform, WarmupSettings};

#[derive(Debug, Error)]
pub enum WarmupError {
    #[error("Warmup process failed: {0:#}")]
    Listing(anyhow::Error),

    #[error("Failed to reconnect accounts: {0:#}")]
    Reconnect(anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarmupStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountOutcome {
    pub id: String,
    pub status: WarmupStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmupResult {
    pub success: bool,
    pub processed_count: usize,
    pub failed_count: usize,
    pub details: Vec<AccountOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectResult {
    pub success: bool,
    pub message: String,
    pub timestamp: i64,
}

pub struct WarmupAgent {
    platform: Arc<dyn EmailPlatform>,
}

impl WarmupAgent {
    pub fn new(platform: Arc<dyn EmailPlatform>) -> Self {
        Self { platform }
    }

    /// Enable warmup on every account, in listing order.
    ///
    /// A failing account is recorded and the run moves on; only a listing
    /// failure aborts.
    pub async fn run(&self, settings: &WarmupSettings) -> Result<WarmupResult, WarmupError> {
        let accounts = list_all_accounts(self.platform.as_ref())
            .await
            .map_err(WarmupError::Listing)?;

        info!("Enabling warmup on {} accounts", accounts.len());

        let mut result = WarmupResult {
            success: true,
            processed_count: 0,
            failed_count: 0,
            details: Vec::with_capacity(accounts.len()),
        };

        for account in accounts {
            match self.platform.enable_warmup(&account.id, settings).await {
                Ok(()) => {
                    result.processed_count += 1;
                    result.details.push(AccountOutcome {
                        id: account.id,
                        status: WarmupStatus::Success,
                        error: None,
                    });
                }
                Err(e) => {
                    warn!("Warmup failed for account {}: {:#}", account.id, e);
                    result.failed_count += 1;
                    result.details.push(AccountOutcome {
                        id: account.id,
                        status: WarmupStatus::Failed,
                        error: Some(format!("{:#}", e)),
                    });
                }
            }
        }

        info!(
            "Warmup finished: {} enabled, {} failed",
            result.processed_count, result.failed_count
        );

        Ok(result)
    }

    pub async fn reconnect(&self) -> Result<ReconnectResult, WarmupError> {
        let response = self
            .platform
            .reconnect_failed_accounts()
            .await
            .map_err(WarmupError::Reconnect)?;

        Ok(ReconnectResult {
            success: response.ok,
            message: response.message,
            timestamp: now_millis(),
        })
    }
}
