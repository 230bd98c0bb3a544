//! Login Automation Types

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use super::csv::CsvError;
use crate::tools::BrowserError;

/// Default number of login attempts per credential
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Upper bound accepted for `max_retries`
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// An email/password pair read from the uploaded CSV. Never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Final status of one credential
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialStatus {
    Success,
    Failed,
    Skipped,
}

impl std::fmt::Display for CredentialStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialStatus::Success => write!(f, "success"),
            CredentialStatus::Failed => write!(f, "failed"),
            CredentialStatus::Skipped => write!(f, "skipped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialOutcome {
    pub email: String,
    pub status: CredentialStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of one automation run. `details` follows input order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationResult {
    pub success: bool,
    pub processed_count: usize,
    pub failed_count: usize,
    pub skipped_count: usize,
    pub details: Vec<CredentialOutcome>,
}

impl Default for AutomationResult {
    fn default() -> Self {
        Self {
            success: true,
            processed_count: 0,
            failed_count: 0,
            skipped_count: 0,
            details: Vec::new(),
        }
    }
}

impl AutomationResult {
    pub fn record_success(&mut self, email: &str) {
        self.processed_count += 1;
        self.details.push(CredentialOutcome {
            email: email.to_string(),
            status: CredentialStatus::Success,
            error: None,
        });
    }

    pub fn record_failure(&mut self, email: &str, error: String) {
        self.failed_count += 1;
        self.details.push(CredentialOutcome {
            email: email.to_string(),
            status: CredentialStatus::Failed,
            error: Some(error),
        });
    }

    pub fn record_skip(&mut self, email: &str) {
        self.skipped_count += 1;
        self.details.push(CredentialOutcome {
            email: email.to_string(),
            status: CredentialStatus::Skipped,
            error: None,
        });
    }

    /// Total number of credentials accounted for
    pub fn total(&self) -> usize {
        self.processed_count + self.failed_count + self.skipped_count
    }
}

/// Per-step wait limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginTimeouts {
    pub navigation: Duration,
    pub selector: Duration,
    pub post_login: Duration,
    pub optional_prompt: Duration,
}

impl Default for LoginTimeouts {
    fn default() -> Self {
        Self {
            navigation: Duration::from_secs(30),
            selector: Duration::from_secs(30),
            post_login: Duration::from_secs(10),
            optional_prompt: Duration::from_secs(5),
        }
    }
}

/// Tuning for a single automation run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutomationOptions {
    pub login_url: String,
    pub max_retries: u32,
    /// Pause between failed attempts of the same credential
    pub attempt_delay: Duration,
    /// Pause after each credential that reached the browser
    pub credential_delay: Duration,
    pub timeouts: LoginTimeouts,
}

impl AutomationOptions {
    pub fn new(login_url: impl Into<String>) -> Self {
        Self {
            login_url: login_url.into(),
            max_retries: DEFAULT_MAX_RETRIES,
            attempt_delay: Duration::from_secs(2),
            credential_delay: Duration::from_secs(2),
            timeouts: LoginTimeouts::default(),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.clamp(1, MAX_RETRIES_LIMIT);
        self
    }

    /// Set both throttling delays
    pub fn with_delays(mut self, delay: Duration) -> Self {
        self.attempt_delay = delay;
        self.credential_delay = delay;
        self
    }
}

/// Errors that abort a whole run. Per-credential failures never do.
#[derive(Debug, Error)]
pub enum AutomationError {
    #[error(transparent)]
    InvalidCsv(#[from] CsvError),

    #[error("Failed to fetch existing accounts: {0:#}")]
    ExistingAccounts(anyhow::Error),

    #[error("Failed to launch browser: {0}")]
    BrowserLaunch(#[source] BrowserError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_serialization() {
        let mut result = AutomationResult::default();
        result.record_success("a@example.com");
        result.record_skip("b@example.com");
        result.record_failure("c@example.com", "Login failed".to_string());

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["processedCount"], 1);
        assert_eq!(json["skippedCount"], 1);
        assert_eq!(json["failedCount"], 1);
        assert_eq!(json["details"][1]["status"], "skipped");
        assert!(json["details"][0].get("error").is_none());
        assert_eq!(json["details"][2]["error"], "Login failed");
        assert_eq!(result.total(), 3);
    }

    #[test]
    fn test_credential_debug_hides_password() {
        let cred = Credential {
            email: "a@example.com".to_string(),
            password: "hunter2".to_string(),
        };
        let debug = format!("{:?}", cred);
        assert!(debug.contains("a@example.com"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_max_retries_is_clamped() {
        assert_eq!(AutomationOptions::new("https://x").with_max_retries(0).max_retries, 1);
        assert_eq!(AutomationOptions::new("https://x").with_max_retries(50).max_retries, 10);
        assert_eq!(AutomationOptions::new("https://x").max_retries, 3);
    }
}
