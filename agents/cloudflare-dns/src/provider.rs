//! DNS provider abstraction
//!
//! The operations Warpify needs from a DNS host. `CloudflareClient` is the
//! production implementation; callers depend on the trait so provisioning
//! logic can be exercised without network access.

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{DnsRecord, NewDnsRecord, PageRule, PageRuleRequest, TokenStatus, Zone};

#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Check that the configured API token is valid
    async fn verify_token(&self) -> Result<TokenStatus>;

    /// Look up a zone by its domain name
    async fn find_zone(&self, name: &str) -> Result<Option<Zone>>;

    /// Create a zone for a domain
    async fn create_zone(&self, name: &str) -> Result<Zone>;

    /// List DNS records in a zone
    async fn list_dns_records(&self, zone_id: &str) -> Result<Vec<DnsRecord>>;

    /// Create a DNS record in a zone
    async fn create_dns_record(&self, zone_id: &str, record: &NewDnsRecord) -> Result<DnsRecord>;

    /// List page rules in a zone
    async fn list_page_rules(&self, zone_id: &str) -> Result<Vec<PageRule>>;

    /// Create a page rule
    async fn create_page_rule(&self, zone_id: &str, rule: &PageRuleRequest) -> Result<PageRule>;

    /// Replace an existing page rule
    async fn update_page_rule(
        &self,
        zone_id: &str,
        rule_id: &str,
        rule: &PageRuleRequest,
    ) -> Result<PageRule>;

    /// Delete a page rule
    async fn delete_page_rule(&self, zone_id: &str, rule_id: &str) -> Result<()>;
}
