//! Domain Setup Agent
//!
//! Provisions sending domains on Cloudflare: creates the zone, writes the
//! Microsoft 365 mail records, and manages the forwarding redirect that sends
//! web traffic for the domain elsewhere.
//!
//! ## Provisioning
//!
//! ```text
//! create zone ──► 6 records (concurrent) ──► upsert redirect ──► SetupResult
//! ```
//!
//! Record failures are collected into one error. Records that were created
//! before the failure are left in place.

mod records;
mod redirects;

pub use records::{email_records, RECORD_TTL};
pub use redirects::{
    find_existing, forwarding_rule, target_pattern, Redirect, RedirectRequest,
    ALLOWED_STATUS_CODES, DEFAULT_STATUS_CODE,
};

use cloudflare_dns::{DnsProvider, DnsRecord, DnsRecordType, Zone};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::tools::AuditLog;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Zone not found for domain: {0}")]
    ZoneNotFound(String),

    #[error("Failed to create {failed} of {total} DNS records: {}", details.join("; "))]
    Records {
        failed: usize,
        total: usize,
        details: Vec<String>,
    },

    #[error("Unsupported redirect status code: {0} (expected 301 or 302)")]
    InvalidStatusCode(u16),

    #[error("Cloudflare request failed: {0:#}")]
    Provider(anyhow::Error),
}

impl From<anyhow::Error> for DomainError {
    fn from(err: anyhow::Error) -> Self {
        DomainError::Provider(err)
    }
}

/// Audit key holding the outcome of the last setup of `domain`
pub fn setup_audit_key(domain: &str) -> String {
    format!("domain:{}:setup", domain)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainSetup {
    pub domain: String,
    pub redirect_to: String,
    pub report_email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedRecord {
    #[serde(rename = "type")]
    pub record_type: DnsRecordType,
    pub name: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupResult {
    pub success: bool,
    pub zone_id: String,
    pub nameservers: Vec<String>,
    pub records: Vec<CreatedRecord>,
    pub redirect: Redirect,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub available: bool,
    pub domain: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordChecks {
    pub spf: bool,
    pub dmarc: bool,
    pub dkim: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedSetup {
    pub success: bool,
    pub domain: String,
    pub records: RecordChecks,
    pub setup_info: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingSetup {
    pub success: bool,
    pub domain: String,
    pub error: String,
}

/// Outcome of `verify_setup`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SetupVerification {
    Verified(VerifiedSetup),
    Missing(MissingSetup),
}

fn any_record(
    records: &[DnsRecord],
    record_type: DnsRecordType,
    check: impl Fn(&DnsRecord) -> bool,
) -> bool {
    records
        .iter()
        .any(|r| r.record_type == record_type && check(r))
}

pub struct DomainAgent {
    provider: Arc<dyn DnsProvider>,
    audit: AuditLog,
}

impl DomainAgent {
    pub fn new(provider: Arc<dyn DnsProvider>, audit: AuditLog) -> Self {
        Self { provider, audit }
    }

    /// Create the zone, its mail records and the forwarding redirect
    pub async fn provision(&self, setup: &DomainSetup) -> Result<SetupResult, DomainError> {
        let zone = self.provider.create_zone(&setup.domain).await?;
        info!("Created zone {} for {}", zone.id, setup.domain);

        let templates = email_records(&setup.domain, &setup.report_email);
        let total = templates.len();

        let results = join_all(
            templates
                .iter()
                .map(|record| self.provider.create_dns_record(&zone.id, record)),
        )
        .await;

        let mut records = Vec::with_capacity(total);
        let mut failures = Vec::new();
        for (template, result) in templates.iter().zip(results) {
            match result {
                Ok(created) => records.push(CreatedRecord {
                    record_type: created.record_type,
                    name: created.name,
                    content: created.content,
                }),
                Err(e) => failures.push(format!("{} {}: {:#}", template.record_type, template.name, e)),
            }
        }

        if !failures.is_empty() {
            warn!(
                "{} of {} DNS records failed for {}",
                failures.len(),
                total,
                setup.domain
            );
            return Err(DomainError::Records {
                failed: failures.len(),
                total,
                details: failures,
            });
        }

        let redirect = self
            .upsert_in_zone(
                &zone,
                &RedirectRequest {
                    domain: setup.domain.clone(),
                    redirect_to: setup.redirect_to.clone(),
                    status_code: DEFAULT_STATUS_CODE,
                },
            )
            .await?;

        info!("Provisioned {} ({} records)", setup.domain, records.len());

        Ok(SetupResult {
            success: true,
            zone_id: zone.id,
            nameservers: zone.name_servers,
            records,
            redirect,
        })
    }

    /// A domain is available when no zone exists for it yet
    pub async fn check_availability(&self, domain: &str) -> Result<Availability, DomainError> {
        let zone = self.provider.find_zone(domain).await?;
        Ok(Availability {
            available: zone.is_none(),
            domain: domain.to_string(),
        })
    }

    /// Report which mail records exist, plus the stored setup entry.
    ///
    /// The stored entry is read once, before any Cloudflare call.
    pub async fn verify_setup(&self, domain: &str) -> Result<SetupVerification, DomainError> {
        let setup_info = self.audit.lookup(&setup_audit_key(domain)).await;

        let Some(zone) = self.provider.find_zone(domain).await? else {
            return Ok(SetupVerification::Missing(MissingSetup {
                success: false,
                domain: domain.to_string(),
                error: "Domain not found in Cloudflare".to_string(),
            }));
        };

        let records = self.provider.list_dns_records(&zone.id).await?;
        let checks = RecordChecks {
            spf: any_record(&records, DnsRecordType::TXT, |r| r.content.contains("v=spf1")),
            dmarc: any_record(&records, DnsRecordType::TXT, |r| r.name.contains("_dmarc")),
            dkim: any_record(&records, DnsRecordType::CNAME, |r| {
                r.name.contains("_domainkey")
            }),
        };

        Ok(SetupVerification::Verified(VerifiedSetup {
            success: true,
            domain: domain.to_string(),
            records: checks,
            setup_info,
        }))
    }

    /// Point the domain's forwarding rule at `redirect_to`, creating it if needed
    pub async fn upsert_redirect(&self, request: &RedirectRequest) -> Result<Redirect, DomainError> {
        let zone = self.require_zone(&request.domain).await?;
        self.upsert_in_zone(&zone, request).await
    }

    pub async fn list_redirects(&self, domain: &str) -> Result<Vec<Redirect>, DomainError> {
        let zone = self.require_zone(domain).await?;
        let rules = self.provider.list_page_rules(&zone.id).await?;
        Ok(rules.iter().map(Redirect::from).collect())
    }

    pub async fn delete_redirect(&self, domain: &str, rule_id: &str) -> Result<(), DomainError> {
        let zone = self.require_zone(domain).await?;
        self.provider.delete_page_rule(&zone.id, rule_id).await?;
        info!("Deleted redirect {} for {}", rule_id, domain);
        Ok(())
    }

    async fn require_zone(&self, domain: &str) -> Result<Zone, DomainError> {
        self.provider
            .find_zone(domain)
            .await?
            .ok_or_else(|| DomainError::ZoneNotFound(domain.to_string()))
    }

    async fn upsert_in_zone(
        &self,
        zone: &Zone,
        request: &RedirectRequest,
    ) -> Result<Redirect, DomainError> {
        if !ALLOWED_STATUS_CODES.contains(&request.status_code) {
            return Err(DomainError::InvalidStatusCode(request.status_code));
        }

        let rules = self.provider.list_page_rules(&zone.id).await?;
        let body = forwarding_rule(request);

        let rule = match find_existing(&rules, &request.domain) {
            Some(existing) => {
                info!("Updating redirect {} for {}", existing.id, request.domain);
                self.provider
                    .update_page_rule(&zone.id, &existing.id, &body)
                    .await?
            }
            None => {
                info!("Creating redirect for {}", request.domain);
                self.provider.create_page_rule(&zone.id, &body).await?
            }
        };

        Ok(Redirect::from(&rule))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{RecordingDnsProvider, RecordingKv};
    use crate::tools::MemoryKv;
    use serde_json::json;

    fn setup() -> DomainSetup {
        DomainSetup {
            domain: "example.com".to_string(),
            redirect_to: "https://target.io".to_string(),
            report_email: "dmarc@example.com".to_string(),
        }
    }

    fn agent(provider: &Arc<RecordingDnsProvider>) -> DomainAgent {
        DomainAgent::new(provider.clone(), AuditLog::new(Arc::new(MemoryKv::new())))
    }

    #[tokio::test]
    async fn test_provision_creates_six_records_and_redirect() {
        let provider = Arc::new(RecordingDnsProvider::new());
        let result = agent(&provider).provision(&setup()).await.unwrap();

        assert!(result.success);
        assert_eq!(result.records.len(), 6);
        assert_eq!(result.nameservers.len(), 2);
        assert_eq!(result.redirect.redirect_to.as_deref(), Some("https://target.io"));

        let created = provider.created_records();
        assert_eq!(created.len(), 6);
        assert!(created
            .iter()
            .any(|r| r.content == "selector1-example.com._domainkey.onmicrosoft.com"));
        assert!(created
            .iter()
            .any(|r| r.content.contains("rua=mailto:dmarc@example.com")));
        assert_eq!(provider.page_rule_creates(), 1);
    }

    #[tokio::test]
    async fn test_provision_aggregates_record_failures() {
        let provider = Arc::new(RecordingDnsProvider::new().failing_records(&["_dmarc"]));
        let err = agent(&provider).provision(&setup()).await.unwrap_err();

        match err {
            DomainError::Records { failed, total, details } => {
                assert_eq!(failed, 1);
                assert_eq!(total, 6);
                assert!(details[0].starts_with("TXT _dmarc"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(provider.created_records().len(), 5);
        assert_eq!(provider.page_rule_creates(), 0);
    }

    #[tokio::test]
    async fn test_upsert_updates_matching_rule() {
        let provider = Arc::new(
            RecordingDnsProvider::new()
                .with_zone("example.com")
                .with_forwarding_rule("pr-existing", "*example.com/*", "https://old.io"),
        );
        let request = RedirectRequest {
            domain: "example.com".to_string(),
            redirect_to: "https://new.io".to_string(),
            status_code: 302,
        };

        let redirect = agent(&provider).upsert_redirect(&request).await.unwrap();

        assert_eq!(redirect.id, "pr-existing");
        assert_eq!(redirect.redirect_to.as_deref(), Some("https://new.io"));
        assert_eq!(provider.page_rule_updates(), 1);
        assert_eq!(provider.page_rule_creates(), 0);
    }

    #[tokio::test]
    async fn test_upsert_creates_when_no_rule_matches() {
        let provider = Arc::new(
            RecordingDnsProvider::new()
                .with_zone("example.com")
                .with_forwarding_rule("pr-other", "*other.com/*", "https://old.io"),
        );
        let request = RedirectRequest {
            domain: "example.com".to_string(),
            redirect_to: "https://new.io".to_string(),
            status_code: 301,
        };

        agent(&provider).upsert_redirect(&request).await.unwrap();

        assert_eq!(provider.page_rule_creates(), 1);
        assert_eq!(provider.page_rule_updates(), 0);
    }

    #[tokio::test]
    async fn test_upsert_rejects_bad_status_and_missing_zone() {
        let provider = Arc::new(RecordingDnsProvider::new().with_zone("example.com"));
        let agent = agent(&provider);

        let bad = RedirectRequest {
            domain: "example.com".to_string(),
            redirect_to: "https://new.io".to_string(),
            status_code: 307,
        };
        assert!(matches!(
            agent.upsert_redirect(&bad).await,
            Err(DomainError::InvalidStatusCode(307))
        ));

        let missing = RedirectRequest {
            domain: "missing.com".to_string(),
            ..bad
        };
        assert!(matches!(
            agent.upsert_redirect(&missing).await,
            Err(DomainError::ZoneNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_and_delete_redirects() {
        let provider = Arc::new(
            RecordingDnsProvider::new()
                .with_zone("example.com")
                .with_forwarding_rule("pr1", "*example.com/*", "https://target.io"),
        );
        let agent = agent(&provider);

        let redirects = agent.list_redirects("example.com").await.unwrap();
        assert_eq!(redirects.len(), 1);
        assert_eq!(redirects[0].target.as_deref(), Some("*example.com/*"));

        agent.delete_redirect("example.com", "pr1").await.unwrap();
        assert!(agent.list_redirects("example.com").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_availability() {
        let provider = Arc::new(RecordingDnsProvider::new().with_zone("taken.com"));
        let agent = agent(&provider);

        assert!(!agent.check_availability("taken.com").await.unwrap().available);
        assert!(agent.check_availability("free.com").await.unwrap().available);
    }

    #[tokio::test]
    async fn test_verify_setup_without_zone_reads_kv_once() {
        let kv = Arc::new(RecordingKv::new());
        let provider = Arc::new(RecordingDnsProvider::new());
        let agent = DomainAgent::new(provider, AuditLog::new(kv.clone()));

        let verification = agent.verify_setup("example.com").await.unwrap();

        let json = serde_json::to_value(&verification).unwrap();
        assert_eq!(
            json,
            json!({
                "success": false,
                "domain": "example.com",
                "error": "Domain not found in Cloudflare"
            })
        );
        assert_eq!(kv.reads(), 1);
    }

    #[tokio::test]
    async fn test_verify_setup_reports_records() {
        let kv = Arc::new(RecordingKv::new());
        let provider = Arc::new(RecordingDnsProvider::new());
        let agent = DomainAgent::new(provider.clone(), AuditLog::new(kv.clone()));

        agent.provision(&setup()).await.unwrap();
        AuditLog::new(kv.clone())
            .record(&setup_audit_key("example.com"), json!({ "requestId": "r1" }))
            .await;

        let SetupVerification::Verified(verified) = agent.verify_setup("example.com").await.unwrap()
        else {
            panic!("expected a verified setup");
        };

        assert_eq!(
            verified.records,
            RecordChecks {
                spf: true,
                dmarc: true,
                dkim: true
            }
        );
        assert_eq!(verified.setup_info.unwrap()["requestId"], "r1");
        assert_eq!(kv.reads(), 1);
    }
}
