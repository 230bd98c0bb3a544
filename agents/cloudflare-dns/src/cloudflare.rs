//! Cloudflare API Client
//!
//! Type-safe wrapper over the Cloudflare v4 REST API covering zones, DNS
//! records, page rules and token verification.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::provider::DnsProvider;
use crate::types::{
    AccountRef, ApiResponse, CreateZoneRequest, DnsRecord, NewDnsRecord, PageRule,
    PageRuleRequest, TokenStatus, Zone,
};

pub const CLOUDFLARE_API: &str = "https://api.cloudflare.com/client/v4";

/// Decode a Cloudflare response body into its `result`.
///
/// Fails when the HTTP status is not 2xx or the envelope reports
/// `success: false`, carrying the first upstream error message.
fn unwrap_envelope<T: DeserializeOwned>(status: StatusCode, text: &str) -> Result<T> {
    let envelope: ApiResponse<T> = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(e) if status.is_success() => {
            return Err(e).context("Failed to parse Cloudflare response");
        }
        Err(_) => bail!("Cloudflare API error ({}): {}", status, text),
    };

    if !status.is_success() || !envelope.success {
        let message = envelope
            .errors
            .first()
            .map(|e| format!("{} (code {})", e.message, e.code))
            .unwrap_or_else(|| "Cloudflare API error".to_string());
        bail!("Cloudflare API error ({}): {}", status, message);
    }

    envelope.result.context("No result in Cloudflare response")
}

/// Cloudflare API client
#[derive(Clone)]
pub struct CloudflareClient {
    client: Client,
    api_token: String,
    account_id: Option<String>,
    base_url: String,
}

impl std::fmt::Debug for CloudflareClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareClient")
            .field("account_id", &self.account_id)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl CloudflareClient {
    /// Create a new Cloudflare client with API token
    pub fn new(api_token: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("warpify-cloudflare-dns/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_token: api_token.into(),
            account_id: None,
            base_url: CLOUDFLARE_API.to_string(),
        })
    }

    /// Account that newly created zones are attached to
    pub fn with_account_id(mut self, account_id: Option<String>) -> Self {
        self.account_id = account_id;
        self
    }

    /// Override the API base URL (e.g. an egress proxy)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Execute a request and unwrap the Cloudflare envelope
    async fn execute<T, B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);

        let mut request = self
            .client
            .request(method.clone(), &url)
            .bearer_auth(&self.api_token);

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to call Cloudflare API: {} {}", method, path))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .context("Failed to read Cloudflare response")?;

        unwrap_envelope(status, &text)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.execute(Method::GET, path, None::<&()>).await
    }
}

#[async_trait]
impl DnsProvider for CloudflareClient {
    async fn verify_token(&self) -> Result<TokenStatus> {
        self.get("/user/tokens/verify").await
    }

    async fn find_zone(&self, name: &str) -> Result<Option<Zone>> {
        debug!("Looking up zone: {}", name);
        let path = format!("/zones?name={}", urlencoding::encode(name));
        let zones: Vec<Zone> = self.get(&path).await?;
        Ok(zones.into_iter().next())
    }

    async fn create_zone(&self, name: &str) -> Result<Zone> {
        let request = CreateZoneRequest {
            name,
            jump_start: true,
            account: self.account_id.as_deref().map(|id| AccountRef { id }),
        };

        self.execute(Method::POST, "/zones", Some(&request))
            .await
            .with_context(|| format!("Failed to create zone {}", name))
    }

    async fn list_dns_records(&self, zone_id: &str) -> Result<Vec<DnsRecord>> {
        self.get(&format!("/zones/{}/dns_records?per_page=1000", zone_id))
            .await
    }

    async fn create_dns_record(&self, zone_id: &str, record: &NewDnsRecord) -> Result<DnsRecord> {
        self.execute(
            Method::POST,
            &format!("/zones/{}/dns_records", zone_id),
            Some(record),
        )
        .await
        .with_context(|| format!("Failed to create {} record {}", record.record_type, record.name))
    }

    async fn list_page_rules(&self, zone_id: &str) -> Result<Vec<PageRule>> {
        self.get(&format!("/zones/{}/pagerules", zone_id)).await
    }

    async fn create_page_rule(&self, zone_id: &str, rule: &PageRuleRequest) -> Result<PageRule> {
        self.execute(
            Method::POST,
            &format!("/zones/{}/pagerules", zone_id),
            Some(rule),
        )
        .await
    }

    async fn update_page_rule(
        &self,
        zone_id: &str,
        rule_id: &str,
        rule: &PageRuleRequest,
    ) -> Result<PageRule> {
        self.execute(
            Method::PUT,
            &format!("/zones/{}/pagerules/{}", zone_id, rule_id),
            Some(rule),
        )
        .await
    }

    async fn delete_page_rule(&self, zone_id: &str, rule_id: &str) -> Result<()> {
        let _: serde_json::Value = self
            .execute(
                Method::DELETE,
                &format!("/zones/{}/pagerules/{}", zone_id, rule_id),
                None::<&()>,
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let client = CloudflareClient::new("token")
            .unwrap()
            .with_base_url("http://localhost:8080/client/v4/");
        assert_eq!(client.base_url, "http://localhost:8080/client/v4");
    }

    #[test]
    fn test_debug_hides_token() {
        let client = CloudflareClient::new("super-secret-token").unwrap();
        let rendered = format!("{:?}", client);
        assert!(!rendered.contains("super-secret-token"));
    }

    #[test]
    fn test_envelope_result() {
        let zone: Zone = unwrap_envelope(
            StatusCode::OK,
            r#"{"success":true,"errors":[],"result":{"id":"z1","name":"example.com","status":"pending","name_servers":["a.ns.cloudflare.com"]}}"#,
        )
        .unwrap();
        assert_eq!(zone.id, "z1");
    }

    #[test]
    fn test_envelope_error_status() {
        let err = unwrap_envelope::<Zone>(
            StatusCode::BAD_REQUEST,
            r#"{"success":false,"errors":[{"code":1061,"message":"example.com already exists"}],"result":null}"#,
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cloudflare API error (400 Bad Request): example.com already exists (code 1061)"
        );
    }

    #[test]
    fn test_envelope_unsuccessful_with_ok_status() {
        let err = unwrap_envelope::<Zone>(
            StatusCode::OK,
            r#"{"success":false,"errors":[],"result":null}"#,
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cloudflare API error (200 OK): Cloudflare API error"
        );
    }

    #[test]
    fn test_envelope_non_json_error_body() {
        let err = unwrap_envelope::<Zone>(StatusCode::BAD_GATEWAY, "upstream connect error")
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cloudflare API error (502 Bad Gateway): upstream connect error"
        );

        let err = unwrap_envelope::<Zone>(StatusCode::OK, "<html>").unwrap_err();
        assert_eq!(err.to_string(), "Failed to parse Cloudflare response");
    }

    #[test]
    fn test_envelope_missing_result() {
        let err = unwrap_envelope::<Zone>(StatusCode::OK, r#"{"success":true,"errors":[]}"#)
            .unwrap_err();
        assert_eq!(err.to_string(), "No result in Cloudflare response");
    }
}
