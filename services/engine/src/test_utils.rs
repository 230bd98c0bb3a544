//! In-memory fakes for the engine's external services.
//!
//! Enabled for the engine's own tests and, through the `test-utils` feature,
//! for crates that want to drive the agents without network access.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use cloudflare_dns::{
    DnsProvider, DnsRecord, NewDnsRecord, PageRule, PageRuleRequest, TokenStatus, Zone,
};

use crate::tools::browser::{Browser, BrowserError, BrowserLauncher, Page};
use crate::tools::email_platform::{
    EmailAccount, EmailPlatform, EmailPlatformConnector, ReconnectResponse, WarmupSettings,
};
use crate::tools::kv::{KvStore, MemoryKv};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================
// Browser
// ============================================================

const EMAIL_INPUT: &str = r#"input[name="loginfmt"]"#;
const OPTIONAL_PROMPTS: [&str; 2] = ["#KmsiCheckboxField", "#btnAskLater"];
const SIGNED_IN_URL: &str = "https://outlook.office.com/mail/";
const LOGIN_PAGE_URL: &str = "https://login.microsoftonline.com/common/login";

/// How the fake login page reacts to one email
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginScript {
    /// Land on the mailbox from attempt `k` onwards
    SucceedOnAttempt(u32),
    /// Never leave the login page
    AlwaysFail,
    /// Leave the login page but show an error message
    ErrorText,
}

/// Behaviour of the "stay signed in" and "ask later" prompts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OptionalPrompts {
    /// Waiting for them times out
    #[default]
    Absent,
    /// They appear and can be clicked
    Present,
    /// Waiting for them fails with a harness error
    Broken,
}

#[derive(Debug, Default)]
struct BrowserState {
    scripts: HashMap<String, LoginScript>,
    prompts: OptionalPrompts,
    fail_launch: bool,
    attempts: HashMap<String, u32>,
    clicked: HashSet<String>,
    launches: usize,
    closes: usize,
    pages_opened: usize,
    pages_closed: usize,
}

/// A browser whose login page follows a per-email script and counts everything
#[derive(Debug, Clone, Default)]
pub struct ScriptedBrowserLauncher {
    state: Arc<Mutex<BrowserState>>,
}

impl ScriptedBrowserLauncher {
    /// Unscripted emails succeed on their first attempt
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, email: &str, script: LoginScript) -> Self {
        lock(&self.state).scripts.insert(email.to_string(), script);
        self
    }

    pub fn with_prompts(self, prompts: OptionalPrompts) -> Self {
        lock(&self.state).prompts = prompts;
        self
    }

    pub fn failing_launch(self) -> Self {
        lock(&self.state).fail_launch = true;
        self
    }

    /// Login attempts made for `email`
    pub fn attempts(&self, email: &str) -> u32 {
        lock(&self.state).attempts.get(email).copied().unwrap_or(0)
    }

    pub fn launches(&self) -> usize {
        lock(&self.state).launches
    }

    pub fn closes(&self) -> usize {
        lock(&self.state).closes
    }

    pub fn pages_opened(&self) -> usize {
        lock(&self.state).pages_opened
    }

    pub fn pages_closed(&self) -> usize {
        lock(&self.state).pages_closed
    }

    pub fn clicked(&self, selector: &str) -> bool {
        lock(&self.state).clicked.contains(selector)
    }
}

#[async_trait]
impl BrowserLauncher for ScriptedBrowserLauncher {
    async fn launch(&self) -> Result<Box<dyn Browser>, BrowserError> {
        let mut state = lock(&self.state);
        if state.fail_launch {
            return Err(BrowserError::Transport("connection refused".to_string()));
        }
        state.launches += 1;

        Ok(Box::new(ScriptedBrowser {
            state: self.state.clone(),
        }))
    }
}

struct ScriptedBrowser {
    state: Arc<Mutex<BrowserState>>,
}

#[async_trait]
impl Browser for ScriptedBrowser {
    async fn new_page(&self) -> Result<Box<dyn Page>, BrowserError> {
        lock(&self.state).pages_opened += 1;
        Ok(Box::new(ScriptedPage {
            state: self.state.clone(),
            email: Mutex::new(None),
        }))
    }

    async fn close(&self) -> Result<(), BrowserError> {
        lock(&self.state).closes += 1;
        Ok(())
    }
}

struct ScriptedPage {
    state: Arc<Mutex<BrowserState>>,
    email: Mutex<Option<String>>,
}

impl ScriptedPage {
    /// Script and attempt count for the email typed into this page
    fn current(&self) -> (LoginScript, u32) {
        let email = lock(&self.email).clone().unwrap_or_default();
        let state = lock(&self.state);
        let script = state
            .scripts
            .get(&email)
            .copied()
            .unwrap_or(LoginScript::SucceedOnAttempt(1));
        let attempts = state.attempts.get(&email).copied().unwrap_or(0);
        (script, attempts)
    }
}

#[async_trait]
impl Page for ScriptedPage {
    async fn goto(&self, _url: &str, _timeout: Duration) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), BrowserError> {
        if !OPTIONAL_PROMPTS.contains(&selector) {
            return Ok(());
        }

        match lock(&self.state).prompts {
            OptionalPrompts::Present => Ok(()),
            OptionalPrompts::Absent => Err(BrowserError::Timeout {
                what: selector.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
            OptionalPrompts::Broken => Err(BrowserError::Harness("tab crashed".to_string())),
        }
    }

    async fn type_text(&self, selector: &str, text: &str) -> Result<(), BrowserError> {
        if selector == EMAIL_INPUT {
            *lock(&self.email) = Some(text.to_string());
            *lock(&self.state)
                .attempts
                .entry(text.to_string())
                .or_default() += 1;
        }
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        lock(&self.state).clicked.insert(selector.to_string());
        Ok(())
    }

    async fn wait_for_navigation(&self, _timeout: Duration) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        let url = match self.current() {
            (LoginScript::SucceedOnAttempt(k), attempts) if attempts >= k => SIGNED_IN_URL,
            (LoginScript::ErrorText, _) => SIGNED_IN_URL,
            _ => LOGIN_PAGE_URL,
        };
        Ok(url.to_string())
    }

    async fn count_xpath(&self, _expression: &str) -> Result<usize, BrowserError> {
        match self.current() {
            (LoginScript::ErrorText, _) => Ok(1),
            _ => Ok(0),
        }
    }

    async fn close(&self) -> Result<(), BrowserError> {
        lock(&self.state).pages_closed += 1;
        Ok(())
    }
}

// ============================================================
// DNS provider
// ============================================================

#[derive(Debug, Clone)]
struct ZoneState {
    zone: Zone,
    records: Vec<DnsRecord>,
    rules: Vec<PageRule>,
}

#[derive(Debug, Default)]
struct DnsState {
    zones: Vec<ZoneState>,
    failing_records: HashSet<String>,
    invalid_token: bool,
    created_records: Vec<NewDnsRecord>,
    rule_creates: usize,
    rule_updates: usize,
    next_id: usize,
}

impl DnsState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn zone_mut(&mut self, zone_id: &str) -> Result<&mut ZoneState> {
        self.zones
            .iter_mut()
            .find(|z| z.zone.id == zone_id)
            .ok_or_else(|| anyhow!("Cloudflare API error (404 Not Found): Invalid zone identifier"))
    }
}

/// DNS provider keeping zones in memory and counting writes
#[derive(Debug, Default)]
pub struct RecordingDnsProvider {
    state: Mutex<DnsState>,
}

impl RecordingDnsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an existing zone
    pub fn with_zone(self, name: &str) -> Self {
        {
            let mut state = lock(&self.state);
            let id = state.next_id("zone");
            state.zones.push(ZoneState {
                zone: zone(id, name),
                records: Vec::new(),
                rules: Vec::new(),
            });
        }
        self
    }

    /// Add a forwarding page rule to the most recently added zone
    pub fn with_forwarding_rule(self, id: &str, pattern: &str, url: &str) -> Self {
        {
            let mut state = lock(&self.state);
            if let Some(zone) = state.zones.last_mut() {
                zone.rules
                    .push(page_rule(id.to_string(), &PageRuleRequest::forwarding(pattern, url, 301)));
            }
        }
        self
    }

    /// Record creation fails for these record names
    pub fn failing_records(self, names: &[&str]) -> Self {
        lock(&self.state)
            .failing_records
            .extend(names.iter().map(|n| n.to_string()));
        self
    }

    pub fn with_invalid_token(self) -> Self {
        lock(&self.state).invalid_token = true;
        self
    }

    pub fn created_records(&self) -> Vec<NewDnsRecord> {
        lock(&self.state).created_records.clone()
    }

    pub fn page_rule_creates(&self) -> usize {
        lock(&self.state).rule_creates
    }

    pub fn page_rule_updates(&self) -> usize {
        lock(&self.state).rule_updates
    }
}

fn zone(id: String, name: &str) -> Zone {
    Zone {
        id,
        name: name.to_string(),
        name_servers: vec![
            "ada.ns.cloudflare.com".to_string(),
            "bob.ns.cloudflare.com".to_string(),
        ],
        status: Some("pending".to_string()),
    }
}

fn page_rule(id: String, request: &PageRuleRequest) -> PageRule {
    PageRule {
        id,
        targets: request.targets.clone(),
        actions: request.actions.clone(),
        status: request.status.clone(),
        priority: None,
    }
}

#[async_trait]
impl DnsProvider for RecordingDnsProvider {
    async fn verify_token(&self) -> Result<TokenStatus> {
        if lock(&self.state).invalid_token {
            bail!("Cloudflare API error (401 Unauthorized): Invalid API Token (code 1000)");
        }
        Ok(TokenStatus {
            id: "token-1".to_string(),
            status: "active".to_string(),
        })
    }

    async fn find_zone(&self, name: &str) -> Result<Option<Zone>> {
        Ok(lock(&self.state)
            .zones
            .iter()
            .find(|z| z.zone.name == name)
            .map(|z| z.zone.clone()))
    }

    async fn create_zone(&self, name: &str) -> Result<Zone> {
        let mut state = lock(&self.state);
        if state.zones.iter().any(|z| z.zone.name == name) {
            bail!("Cloudflare API error (400 Bad Request): Zone already exists (code 1061)");
        }

        let id = state.next_id("zone");
        let created = zone(id, name);
        state.zones.push(ZoneState {
            zone: created.clone(),
            records: Vec::new(),
            rules: Vec::new(),
        });
        Ok(created)
    }

    async fn list_dns_records(&self, zone_id: &str) -> Result<Vec<DnsRecord>> {
        Ok(lock(&self.state).zone_mut(zone_id)?.records.clone())
    }

    async fn create_dns_record(&self, zone_id: &str, record: &NewDnsRecord) -> Result<DnsRecord> {
        let mut state = lock(&self.state);
        if state.failing_records.contains(&record.name) {
            bail!("Cloudflare API error (400 Bad Request): Record quota exceeded (code 81045)");
        }

        let id = state.next_id("rec");
        let created = DnsRecord {
            id,
            record_type: record.record_type,
            name: record.name.clone(),
            content: record.content.clone(),
            ttl: record.ttl,
            proxied: record.proxied,
            priority: record.priority,
        };
        state.zone_mut(zone_id)?.records.push(created.clone());
        state.created_records.push(record.clone());
        Ok(created)
    }

    async fn list_page_rules(&self, zone_id: &str) -> Result<Vec<PageRule>> {
        Ok(lock(&self.state).zone_mut(zone_id)?.rules.clone())
    }

    async fn create_page_rule(&self, zone_id: &str, rule: &PageRuleRequest) -> Result<PageRule> {
        let mut state = lock(&self.state);
        let id = state.next_id("pr");
        let created = page_rule(id, rule);
        state.zone_mut(zone_id)?.rules.push(created.clone());
        state.rule_creates += 1;
        Ok(created)
    }

    async fn update_page_rule(
        &self,
        zone_id: &str,
        rule_id: &str,
        rule: &PageRuleRequest,
    ) -> Result<PageRule> {
        let mut state = lock(&self.state);
        let updated = page_rule(rule_id.to_string(), rule);
        let zone = state.zone_mut(zone_id)?;
        let existing = zone
            .rules
            .iter_mut()
            .find(|r| r.id == rule_id)
            .ok_or_else(|| anyhow!("Cloudflare API error (404 Not Found): Page rule not found"))?;
        *existing = updated.clone();
        state.rule_updates += 1;
        Ok(updated)
    }

    async fn delete_page_rule(&self, zone_id: &str, rule_id: &str) -> Result<()> {
        let mut state = lock(&self.state);
        let zone = state.zone_mut(zone_id)?;
        let before = zone.rules.len();
        zone.rules.retain(|r| r.id != rule_id);
        if zone.rules.len() == before {
            bail!("Cloudflare API error (404 Not Found): Page rule not found");
        }
        Ok(())
    }
}

// ============================================================
// Email platform
// ============================================================

/// Email platform holding a fixed account list
#[derive(Debug, Default)]
pub struct MemoryEmailPlatform {
    accounts: Vec<EmailAccount>,
    fail_listing: bool,
    failing_warmup: HashSet<String>,
    reconnect: ReconnectResponse,
    warmed: Mutex<Vec<String>>,
}

impl MemoryEmailPlatform {
    /// Accounts get ids `1..=n` in the given order
    pub fn with_accounts(emails: &[&str]) -> Self {
        Self {
            accounts: emails
                .iter()
                .enumerate()
                .map(|(i, email)| EmailAccount {
                    id: (i + 1).to_string(),
                    from_email: email.to_string(),
                })
                .collect(),
            ..Self::default()
        }
    }

    pub fn failing_listing() -> Self {
        Self {
            fail_listing: true,
            ..Self::default()
        }
    }

    pub fn failing_warmup_for(mut self, account_id: &str) -> Self {
        self.failing_warmup.insert(account_id.to_string());
        self
    }

    pub fn with_reconnect(mut self, ok: bool, message: &str) -> Self {
        self.reconnect = ReconnectResponse {
            ok,
            message: message.to_string(),
        };
        self
    }

    /// Account ids that had warmup enabled, in call order
    pub fn warmed_up(&self) -> Vec<String> {
        lock(&self.warmed).clone()
    }
}

#[async_trait]
impl EmailPlatform for MemoryEmailPlatform {
    async fn list_accounts(&self, offset: usize, limit: usize) -> Result<Vec<EmailAccount>> {
        if self.fail_listing {
            bail!("Failed to fetch accounts: 401 Unauthorized");
        }
        Ok(self
            .accounts
            .iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn enable_warmup(&self, account_id: &str, _settings: &WarmupSettings) -> Result<()> {
        if self.failing_warmup.contains(account_id) {
            bail!("Failed to enable warmup for account {}: 500 Internal Server Error", account_id);
        }
        lock(&self.warmed).push(account_id.to_string());
        Ok(())
    }

    async fn reconnect_failed_accounts(&self) -> Result<ReconnectResponse> {
        Ok(self.reconnect.clone())
    }
}

/// Connector handing out one shared in-memory platform
#[derive(Debug, Clone)]
pub struct MemoryPlatformConnector {
    platform: Arc<MemoryEmailPlatform>,
    keys: Arc<Mutex<Vec<String>>>,
}

impl MemoryPlatformConnector {
    pub fn new(platform: MemoryEmailPlatform) -> Self {
        Self {
            platform: Arc::new(platform),
            keys: Arc::default(),
        }
    }

    pub fn platform(&self) -> &Arc<MemoryEmailPlatform> {
        &self.platform
    }

    /// API keys passed to `connect`
    pub fn connected_keys(&self) -> Vec<String> {
        lock(&self.keys).clone()
    }
}

impl EmailPlatformConnector for MemoryPlatformConnector {
    fn connect(&self, api_key: &str) -> Result<Arc<dyn EmailPlatform>> {
        lock(&self.keys).push(api_key.to_string());
        Ok(self.platform.clone())
    }
}

// ============================================================
// KV
// ============================================================

/// `MemoryKv` that counts reads and can be made to fail
#[derive(Debug, Default)]
pub struct RecordingKv {
    inner: MemoryKv,
    reads: AtomicUsize,
    failing: bool,
}

impl RecordingKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub async fn keys(&self) -> Vec<String> {
        self.inner.keys().await
    }
}

#[async_trait]
impl KvStore for RecordingKv {
    async fn put(&self, key: &str, value: &str) -> Result<()> {
        if self.failing {
            bail!("KV namespace unavailable");
        }
        self.inner.put(key, value).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            bail!("KV namespace unavailable");
        }
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        if self.failing {
            bail!("KV namespace unavailable");
        }
        self.inner.delete(key).await
    }
}
