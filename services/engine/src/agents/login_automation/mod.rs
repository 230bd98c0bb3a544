//! Login Automation Agent
//!
//! Signs mailboxes in through a hosted login page so they can be connected to
//! the email platform.
//!
//! ## Run
//!
//! 1. Parse the credential CSV.
//! 2. Page through the platform's accounts to build the skip set.
//! 3. Launch one browser session and walk the credentials in order:
//!    skipped emails never touch the browser, the rest get their own page and
//!    up to `max_retries` attempts.
//! 4. Close the session, whatever happened in between.
//!
//! Per-credential failures land in the result. Only the three setup steps
//! (CSV, account listing, browser launch) abort a run.

mod csv;
mod guard;
mod steps;
mod types;

pub use csv::{parse_credentials, CsvError};
pub use steps::{attempt_login, is_login_url, LoginError};
pub use types::{
    AutomationError, AutomationOptions, AutomationResult, Credential, CredentialOutcome,
    CredentialStatus, LoginTimeouts, DEFAULT_MAX_RETRIES, MAX_RETRIES_LIMIT,
};

use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::tools::audit::now_millis;
use crate::tools::email_platform::{list_all_accounts, EmailPlatform};
use crate::tools::{AuditLog, Browser, BrowserLauncher, Page};

use guard::CloseGuard;

pub struct LoginAutomationAgent {
    launcher: Arc<dyn BrowserLauncher>,
    audit: AuditLog,
}

impl LoginAutomationAgent {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, audit: AuditLog) -> Self {
        Self { launcher, audit }
    }

    /// Full run: parse, fetch the skip set, then drive the browser.
    pub async fn run(
        &self,
        csv_data: &str,
        platform: &dyn EmailPlatform,
        options: &AutomationOptions,
    ) -> Result<AutomationResult, AutomationError> {
        let credentials = parse_credentials(csv_data)?;

        let existing: HashSet<String> = list_all_accounts(platform)
            .await
            .map_err(AutomationError::ExistingAccounts)?
            .into_iter()
            .map(|account| account.from_email)
            .collect();

        info!(
            "Starting login automation: {} credentials, {} existing accounts",
            credentials.len(),
            existing.len()
        );

        self.run_credentials(&credentials, &existing, options).await
    }

    /// Drive the browser over already-parsed credentials.
    ///
    /// The session is launched once and closed before returning. If this
    /// future is dropped mid-run, the open page and the session are still
    /// closed in the background.
    pub async fn run_credentials(
        &self,
        credentials: &[Credential],
        existing: &HashSet<String>,
        options: &AutomationOptions,
    ) -> Result<AutomationResult, AutomationError> {
        let browser: Arc<dyn Browser> = Arc::from(
            self.launcher
                .launch()
                .await
                .map_err(AutomationError::BrowserLaunch)?,
        );

        let session = CloseGuard::new({
            let browser = browser.clone();
            async move {
                if let Err(e) = browser.close().await {
                    warn!("Failed to close browser session: {}", e);
                }
            }
        });

        let result = self
            .process_batch(browser.as_ref(), credentials, existing, options)
            .await;

        session.close().await;

        info!(
            "Login automation finished: {} succeeded, {} failed, {} skipped",
            result.processed_count, result.failed_count, result.skipped_count
        );

        Ok(result)
    }

    async fn process_batch(
        &self,
        browser: &dyn Browser,
        credentials: &[Credential],
        existing: &HashSet<String>,
        options: &AutomationOptions,
    ) -> AutomationResult {
        let mut result = AutomationResult::default();

        for credential in credentials {
            if existing.contains(&credential.email) {
                debug!("Skipping existing account {}", credential.email);
                result.record_skip(&credential.email);
                continue;
            }

            self.audit_credential(&credential.email, "attempt", None).await;

            match self.process_credential(browser, credential, options).await {
                Ok(()) => {
                    info!("Login succeeded for {}", credential.email);
                    self.audit_credential(&credential.email, "success", None).await;
                    result.record_success(&credential.email);
                }
                Err(error) => {
                    warn!("Login failed for {}: {}", credential.email, error);
                    self.audit_credential(&credential.email, "failed", Some(&error))
                        .await;
                    result.record_failure(&credential.email, error);
                }
            }

            tokio::time::sleep(options.credential_delay).await;
        }

        result
    }

    /// Open a page for one credential, retry the login on it, then release it.
    async fn process_credential(
        &self,
        browser: &dyn Browser,
        credential: &Credential,
        options: &AutomationOptions,
    ) -> Result<(), String> {
        let page: Arc<dyn Page> = Arc::from(browser.new_page().await.map_err(|e| e.to_string())?);

        let page_guard = CloseGuard::new({
            let page = page.clone();
            let email = credential.email.clone();
            async move {
                if let Err(e) = page.close().await {
                    warn!("Failed to close page for {}: {}", email, e);
                }
            }
        });

        let outcome = self.attempt_with_retries(page.as_ref(), credential, options).await;

        page_guard.close().await;

        outcome
    }

    async fn attempt_with_retries(
        &self,
        page: &dyn Page,
        credential: &Credential,
        options: &AutomationOptions,
    ) -> Result<(), String> {
        let max_attempts = options.max_retries.max(1);
        let mut attempt = 1;

        loop {
            match attempt_login(page, &options.login_url, credential, &options.timeouts).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt >= max_attempts => return Err(e.to_string()),
                Err(e) => {
                    debug!(
                        "Attempt {}/{} failed for {}: {}",
                        attempt, max_attempts, credential.email, e
                    );
                    attempt += 1;
                    tokio::time::sleep(options.attempt_delay).await;
                }
            }
        }
    }

    async fn audit_credential(&self, email: &str, status: &str, error: Option<&str>) {
        let ts = now_millis();
        let mut entry = json!({ "timestamp": ts, "email": email, "status": status });
        if let Some(error) = error {
            entry["error"] = json!(error);
        }
        self.audit
            .record(&format!("automation:{}:{}", ts, email), entry)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{LoginScript, MemoryEmailPlatform, OptionalPrompts, ScriptedBrowserLauncher};
    use crate::tools::MemoryKv;
    use std::time::Duration;

    const LOGIN_URL: &str = "https://login.microsoftonline.com/";

    fn build_agent(launcher: &ScriptedBrowserLauncher) -> (LoginAutomationAgent, Arc<MemoryKv>) {
        let kv = Arc::new(MemoryKv::new());
        let agent = LoginAutomationAgent::new(Arc::new(launcher.clone()), AuditLog::new(kv.clone()));
        (agent, kv)
    }

    fn options(max_retries: u32) -> AutomationOptions {
        AutomationOptions::new(LOGIN_URL)
            .with_max_retries(max_retries)
            .with_delays(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_end_to_end_scenario() {
        let launcher = ScriptedBrowserLauncher::new()
            .script("a@x.com", LoginScript::SucceedOnAttempt(1))
            .script("c@x.com", LoginScript::AlwaysFail);
        let platform = MemoryEmailPlatform::with_accounts(&["b@x.com"]);
        let (agent, kv) = build_agent(&launcher);

        let csv = "EmailAddress,Password\na@x.com,p1\nb@x.com,p2\nc@x.com,p3";
        let result = agent.run(csv, &platform, &options(2)).await.unwrap();

        assert_eq!(result.processed_count, 1);
        assert_eq!(result.skipped_count, 1);
        assert_eq!(result.failed_count, 1);
        assert_eq!(result.total(), 3);

        let statuses: Vec<_> = result.details.iter().map(|d| d.status).collect();
        assert_eq!(
            statuses,
            vec![
                CredentialStatus::Success,
                CredentialStatus::Skipped,
                CredentialStatus::Failed
            ]
        );
        assert!(result.details[2].error.is_some());

        assert_eq!(launcher.attempts("a@x.com"), 1);
        assert_eq!(launcher.attempts("b@x.com"), 0);
        assert_eq!(launcher.attempts("c@x.com"), 2);
        assert_eq!(launcher.launches(), 1);
        assert_eq!(launcher.closes(), 1);
        assert_eq!(launcher.pages_opened(), 2);
        assert_eq!(launcher.pages_closed(), 2);

        let keys = kv.keys().await;
        assert!(keys.iter().any(|k| k.starts_with("automation:") && k.ends_with(":a@x.com")));
        assert!(keys.iter().any(|k| k.starts_with("automation:") && k.ends_with(":c@x.com")));
        assert!(keys.iter().all(|k| !k.ends_with("b@x.com")));
    }

    #[tokio::test]
    async fn test_success_on_later_attempt_stops_retrying() {
        let launcher =
            ScriptedBrowserLauncher::new().script("a@x.com", LoginScript::SucceedOnAttempt(3));
        let (agent, _) = build_agent(&launcher);
        let creds = parse_credentials("EmailAddress,Password\na@x.com,pw").unwrap();

        let result = agent
            .run_credentials(&creds, &HashSet::new(), &options(5))
            .await
            .unwrap();

        assert_eq!(result.processed_count, 1);
        assert_eq!(launcher.attempts("a@x.com"), 3);
    }

    #[tokio::test]
    async fn test_failure_uses_exactly_max_retries() {
        let launcher = ScriptedBrowserLauncher::new().script("a@x.com", LoginScript::ErrorText);
        let (agent, _) = build_agent(&launcher);
        let creds = parse_credentials("EmailAddress,Password\na@x.com,pw").unwrap();

        let result = agent
            .run_credentials(&creds, &HashSet::new(), &options(4))
            .await
            .unwrap();

        assert_eq!(launcher.attempts("a@x.com"), 4);
        assert_eq!(
            result.details[0].error.as_deref(),
            Some("Login verification failed - error message detected")
        );
    }

    #[tokio::test]
    async fn test_optional_prompts_are_handled() {
        let launcher = ScriptedBrowserLauncher::new().with_prompts(OptionalPrompts::Present);
        let (agent, _) = build_agent(&launcher);
        let creds = parse_credentials("EmailAddress,Password\na@x.com,pw").unwrap();

        let result = agent
            .run_credentials(&creds, &HashSet::new(), &options(1))
            .await
            .unwrap();

        assert_eq!(result.processed_count, 1);
        assert!(launcher.clicked("#KmsiCheckboxField"));
        assert!(launcher.clicked("#idBtn_Back"));
        assert!(launcher.clicked("#btnAskLater"));
    }

    #[tokio::test]
    async fn test_unexpected_prompt_error_fails_attempt() {
        let launcher = ScriptedBrowserLauncher::new().with_prompts(OptionalPrompts::Broken);
        let (agent, _) = build_agent(&launcher);
        let creds = parse_credentials("EmailAddress,Password\na@x.com,pw").unwrap();

        let result = agent
            .run_credentials(&creds, &HashSet::new(), &options(2))
            .await
            .unwrap();

        assert_eq!(result.failed_count, 1);
        assert_eq!(launcher.attempts("a@x.com"), 2);
        assert_eq!(launcher.pages_closed(), 1);
    }

    #[tokio::test]
    async fn test_all_skipped_still_closes_browser() {
        let launcher = ScriptedBrowserLauncher::new();
        let platform = MemoryEmailPlatform::with_accounts(&["a@x.com", "b@x.com"]);
        let (agent, kv) = build_agent(&launcher);

        let result = agent
            .run("EmailAddress,Password\na@x.com,1\nb@x.com,2", &platform, &options(3))
            .await
            .unwrap();

        assert_eq!(result.skipped_count, 2);
        assert_eq!(launcher.pages_opened(), 0);
        assert_eq!(launcher.closes(), 1);
        assert!(kv.keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_setup_failures_abort_run() {
        let launcher = ScriptedBrowserLauncher::new();
        let (agent, _) = build_agent(&launcher);
        let platform = MemoryEmailPlatform::default();

        let err = agent
            .run("Email,Pass\na@x.com,1", &platform, &options(3))
            .await
            .unwrap_err();
        assert!(matches!(err, AutomationError::InvalidCsv(CsvError::MissingColumns)));
        assert_eq!(launcher.launches(), 0);

        let failing = MemoryEmailPlatform::failing_listing();
        let err = agent
            .run("EmailAddress,Password\na@x.com,1", &failing, &options(3))
            .await
            .unwrap_err();
        assert!(matches!(err, AutomationError::ExistingAccounts(_)));

        let broken = ScriptedBrowserLauncher::new().failing_launch();
        let (agent, _) = build_agent(&broken);
        let err = agent
            .run("EmailAddress,Password\na@x.com,1", &platform, &options(3))
            .await
            .unwrap_err();
        assert!(matches!(err, AutomationError::BrowserLaunch(_)));
        assert_eq!(broken.closes(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_run_releases_session() {
        let launcher = ScriptedBrowserLauncher::new();
        let (agent, _) = build_agent(&launcher);
        let creds =
            parse_credentials("EmailAddress,Password\na@x.com,p1\nb@x.com,p2").unwrap();
        let mut opts = options(1);
        opts.credential_delay = Duration::from_secs(5);

        let skip = HashSet::new();
        let run = agent.run_credentials(&creds, &skip, &opts);
        let cut_short = tokio::time::timeout(Duration::from_millis(100), run).await;
        assert!(cut_short.is_err());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(launcher.launches(), 1);
        assert_eq!(launcher.closes(), launcher.launches());
        assert_eq!(launcher.pages_closed(), launcher.pages_opened());
    }

    #[tokio::test]
    async fn test_cancelled_attempt_releases_page() {
        let launcher = ScriptedBrowserLauncher::new().script("a@x.com", LoginScript::AlwaysFail);
        let (agent, _) = build_agent(&launcher);
        let creds = parse_credentials("EmailAddress,Password\na@x.com,p1").unwrap();
        let mut opts = options(3);
        opts.attempt_delay = Duration::from_secs(5);

        let skip = HashSet::new();
        let run = agent.run_credentials(&creds, &skip, &opts);
        assert!(tokio::time::timeout(Duration::from_millis(100), run)
            .await
            .is_err());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(launcher.attempts("a@x.com"), 1);
        assert_eq!(launcher.pages_opened(), 1);
        assert_eq!(launcher.pages_closed(), 1);
        assert_eq!(launcher.closes(), 1);
    }
}
