//! Cloudflare API Types
//!
//! Typed request and response shapes for the zone, DNS record and page rule
//! endpoints. Unknown upstream fields are ignored so additive API changes do
//! not break deserialization.

use serde::{Deserialize, Serialize};

// ============================================================
// Envelope
// ============================================================

/// Standard Cloudflare v4 response envelope
#[derive(Debug, Deserialize)]
pub(crate) struct ApiResponse<T> {
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<ApiError>,
    pub result: Option<T>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiError {
    #[serde(default)]
    pub code: i64,
    pub message: String,
}

// ============================================================
// Zones
// ============================================================

/// A DNS zone hosted by Cloudflare
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Zone {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub name_servers: Vec<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateZoneRequest<'a> {
    pub name: &'a str,
    pub jump_start: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<AccountRef<'a>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AccountRef<'a> {
    pub id: &'a str,
}

/// Result of `GET /user/tokens/verify`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenStatus {
    pub id: String,
    pub status: String,
}

impl TokenStatus {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

// ============================================================
// DNS Records
// ============================================================

/// DNS record type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DnsRecordType {
    A,
    #[allow(clippy::upper_case_acronyms)]
    AAAA,
    #[allow(clippy::upper_case_acronyms)]
    CNAME,
    #[allow(clippy::upper_case_acronyms)]
    TXT,
    MX,
    NS,
    /// Any type this client does not manage (SRV, CAA, ...)
    #[serde(other)]
    Other,
}

impl std::fmt::Display for DnsRecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DnsRecordType::A => write!(f, "A"),
            DnsRecordType::AAAA => write!(f, "AAAA"),
            DnsRecordType::CNAME => write!(f, "CNAME"),
            DnsRecordType::TXT => write!(f, "TXT"),
            DnsRecordType::MX => write!(f, "MX"),
            DnsRecordType::NS => write!(f, "NS"),
            DnsRecordType::Other => write!(f, "OTHER"),
        }
    }
}

/// A DNS record as returned by Cloudflare
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DnsRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub record_type: DnsRecordType,
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub ttl: u32,
    #[serde(default)]
    pub proxied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u16>,
}

/// Body for `POST /zones/{zone_id}/dns_records`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewDnsRecord {
    #[serde(rename = "type")]
    pub record_type: DnsRecordType,
    pub name: String,
    pub content: String,
    pub ttl: u32,
    pub proxied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u16>,
}

// ============================================================
// Page Rules
// ============================================================

/// A page rule as returned by Cloudflare
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageRule {
    pub id: String,
    #[serde(default)]
    pub targets: Vec<PageRuleTarget>,
    #[serde(default)]
    pub actions: Vec<PageRuleAction>,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
}

impl PageRule {
    /// URL pattern of the first `url` target, e.g. `*example.com/*`
    pub fn target_pattern(&self) -> Option<&str> {
        self.targets
            .iter()
            .find(|t| t.target == "url")
            .map(|t| t.constraint.value.as_str())
    }

    /// Forwarding action of this rule, if it has one
    pub fn forwarding_url(&self) -> Option<ForwardingUrl> {
        self.actions.iter().find_map(PageRuleAction::forwarding_url)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageRuleTarget {
    pub target: String,
    pub constraint: PageRuleConstraint,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageRuleConstraint {
    pub operator: String,
    pub value: String,
}

/// A page rule action.
///
/// Cloudflare actions carry differently shaped values depending on `id`, so the
/// value is kept raw and only decoded for the actions we manage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageRuleAction {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

impl PageRuleAction {
    pub const FORWARDING_URL: &'static str = "forwarding_url";

    pub fn forwarding(url: &str, status_code: u16) -> Self {
        Self {
            id: Self::FORWARDING_URL.to_string(),
            value: Some(serde_json::json!({ "url": url, "status_code": status_code })),
        }
    }

    pub fn forwarding_url(&self) -> Option<ForwardingUrl> {
        if self.id != Self::FORWARDING_URL {
            return None;
        }
        self.value
            .clone()
            .and_then(|v| serde_json::from_value(v).ok())
    }
}

/// Value of a `forwarding_url` action
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForwardingUrl {
    pub url: String,
    pub status_code: u16,
}

/// Body for creating or replacing a page rule
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageRuleRequest {
    pub targets: Vec<PageRuleTarget>,
    pub actions: Vec<PageRuleAction>,
    pub status: String,
}

impl PageRuleRequest {
    /// An active rule forwarding every URL matching `pattern` to `url`
    pub fn forwarding(pattern: &str, url: &str, status_code: u16) -> Self {
        Self {
            targets: vec![PageRuleTarget {
                target: "url".to_string(),
                constraint: PageRuleConstraint {
                    operator: "matches".to_string(),
                    value: pattern.to_string(),
                },
            }],
            actions: vec![PageRuleAction::forwarding(url, status_code)],
            status: "active".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_serialization() {
        let record = NewDnsRecord {
            record_type: DnsRecordType::MX,
            name: "@".to_string(),
            content: "outlook-com.office365.com".to_string(),
            ttl: 3600,
            proxied: false,
            priority: Some(0),
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "MX");
        assert_eq!(json["priority"], 0);
        assert_eq!(json["proxied"], false);
    }

    #[test]
    fn test_unknown_record_type_is_tolerated() {
        let record: DnsRecord = serde_json::from_value(serde_json::json!({
            "id": "rec1",
            "type": "SRV",
            "name": "_sip._tcp.example.com",
            "content": "10 5 5060 sip.example.com",
            "ttl": 1
        }))
        .unwrap();

        assert_eq!(record.record_type, DnsRecordType::Other);
        assert!(!record.proxied);
    }

    #[test]
    fn test_page_rule_accessors() {
        let rule: PageRule = serde_json::from_value(serde_json::json!({
            "id": "pr1",
            "status": "active",
            "targets": [
                { "target": "url", "constraint": { "operator": "matches", "value": "*example.com/*" } }
            ],
            "actions": [
                { "id": "always_use_https" },
                { "id": "forwarding_url", "value": { "url": "https://target.io", "status_code": 301 } }
            ]
        }))
        .unwrap();

        assert_eq!(rule.target_pattern(), Some("*example.com/*"));
        assert_eq!(
            rule.forwarding_url(),
            Some(ForwardingUrl {
                url: "https://target.io".to_string(),
                status_code: 301,
            })
        );
    }

    #[test]
    fn test_forwarding_request_shape() {
        let request = PageRuleRequest::forwarding("*example.com/*", "https://target.io", 302);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["status"], "active");
        assert_eq!(json["targets"][0]["constraint"]["value"], "*example.com/*");
        assert_eq!(json["actions"][0]["id"], "forwarding_url");
        assert_eq!(json["actions"][0]["value"]["status_code"], 302);
    }
}
