//! Forwarding redirects backed by Cloudflare page rules

use cloudflare_dns::{PageRule, PageRuleRequest};
use serde::{Deserialize, Serialize};

pub const DEFAULT_STATUS_CODE: u16 = 301;

/// Status codes accepted for a forwarding rule
pub const ALLOWED_STATUS_CODES: [u16; 2] = [301, 302];

/// A page rule reduced to what the API exposes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Redirect {
    pub id: String,
    pub target: Option<String>,
    pub redirect_to: Option<String>,
    pub status: String,
}

impl From<&PageRule> for Redirect {
    fn from(rule: &PageRule) -> Self {
        Self {
            id: rule.id.clone(),
            target: rule.target_pattern().map(str::to_string),
            redirect_to: rule.forwarding_url().map(|f| f.url),
            status: rule.status.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedirectRequest {
    pub domain: String,
    pub redirect_to: String,
    #[serde(default = "default_status_code")]
    pub status_code: u16,
}

fn default_status_code() -> u16 {
    DEFAULT_STATUS_CODE
}

/// Page rule pattern covering every URL of `domain`
pub fn target_pattern(domain: &str) -> String {
    format!("*{}/*", domain)
}

/// Page rule body forwarding the whole domain
pub fn forwarding_rule(request: &RedirectRequest) -> PageRuleRequest {
    PageRuleRequest::forwarding(
        &target_pattern(&request.domain),
        &request.redirect_to,
        request.status_code,
    )
}

/// First existing rule whose target mentions `domain`
pub fn find_existing<'a>(rules: &'a [PageRule], domain: &str) -> Option<&'a PageRule> {
    rules
        .iter()
        .find(|rule| rule.target_pattern().is_some_and(|t| t.contains(domain)))
}
