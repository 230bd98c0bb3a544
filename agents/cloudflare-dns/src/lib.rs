//! Cloudflare DNS Library
//!
//! Provides type-safe access to Cloudflare zones, DNS records and page rules
//! behind the `DnsProvider` trait.

pub mod cloudflare;
pub mod provider;
pub mod types;

pub use cloudflare::CloudflareClient;
pub use provider::DnsProvider;
pub use types::{
    DnsRecord, DnsRecordType, ForwardingUrl, NewDnsRecord, PageRule, PageRuleAction,
    PageRuleConstraint, PageRuleRequest, PageRuleTarget, TokenStatus, Zone,
};
