//! Headless Browser Harness
//!
//! The login automation drives pages through a REST-controlled headless
//! browser service ("harness"). One session is launched per automation run and
//! tabs are opened inside it; every page operation is a single HTTP call.
//!
//! ## Harness API
//!
//! | Call                                  | Body                                 |
//! |---------------------------------------|--------------------------------------|
//! | `POST   /sessions`                    | `{headless, viewport, timeoutMs}`    |
//! | `DELETE /sessions/{id}`               |                                      |
//! | `POST   /sessions/{id}/tabs`          |                                      |
//! | `DELETE /tabs/{id}`                   |                                      |
//! | `POST   /tabs/{id}/navigate`          | `{url, timeoutMs, waitUntil}`        |
//! | `POST   /tabs/{id}/wait`              | `{selector, timeoutMs}`              |
//! | `POST   /tabs/{id}/type`              | `{selector, text}`                   |
//! | `POST   /tabs/{id}/click`             | `{selector}`                         |
//! | `POST   /tabs/{id}/wait-navigation`   | `{timeoutMs, waitUntil}`             |
//! | `GET    /tabs/{id}/url`               |                                      |
//! | `POST   /tabs/{id}/xpath`             | `{expression}`                       |
//!
//! Failures come back as `{"error": {"kind": "...", "message": "..."}}`.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Lifecycle event the harness waits for after navigation
const WAIT_UNTIL: &str = "networkidle0";

/// Errors raised by browser operations
#[derive(Debug, Error)]
pub enum BrowserError {
    /// A wait exceeded its timeout
    #[error("Timed out after {timeout_ms}ms waiting for {what}")]
    Timeout { what: String, timeout_ms: u64 },

    /// A selector matched nothing
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// Navigation failed (DNS, TLS, aborted load, ...)
    #[error("Navigation failed: {0}")]
    Navigation(String),

    /// The harness rejected the call
    #[error("Browser harness error: {0}")]
    Harness(String),

    /// The harness could not be reached
    #[error("Browser harness request failed: {0}")]
    Transport(String),
}

impl BrowserError {
    /// Whether this error only means "the element never showed up".
    ///
    /// Optional page steps swallow these and propagate everything else.
    pub fn is_absent(&self) -> bool {
        matches!(
            self,
            BrowserError::Timeout { .. } | BrowserError::ElementNotFound(_)
        )
    }
}

impl From<reqwest::Error> for BrowserError {
    fn from(err: reqwest::Error) -> Self {
        BrowserError::Transport(err.to_string())
    }
}

/// Starts browser sessions
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn Browser>, BrowserError>;
}

/// A running browser session shared by one automation run
#[async_trait]
pub trait Browser: Send + Sync {
    /// Open a fresh page (tab)
    async fn new_page(&self) -> Result<Box<dyn Page>, BrowserError>;

    /// Close the session and every page still open in it
    async fn close(&self) -> Result<(), BrowserError>;
}

/// A single page owned by one credential
#[async_trait]
pub trait Page: Send + Sync {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), BrowserError>;

    async fn wait_for_selector(&self, selector: &str, timeout: Duration)
        -> Result<(), BrowserError>;

    async fn type_text(&self, selector: &str, text: &str) -> Result<(), BrowserError>;

    async fn click(&self, selector: &str) -> Result<(), BrowserError>;

    async fn wait_for_navigation(&self, timeout: Duration) -> Result<(), BrowserError>;

    async fn current_url(&self) -> Result<String, BrowserError>;

    /// Number of elements matching an XPath expression
    async fn count_xpath(&self, expression: &str) -> Result<usize, BrowserError>;

    async fn close(&self) -> Result<(), BrowserError>;
}

// ============================================================
// Harness wire types
// ============================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionRequest {
    headless: bool,
    viewport: Viewport,
    timeout_ms: u64,
}

#[derive(Debug, Serialize)]
struct Viewport {
    width: u32,
    height: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionResponse {
    session_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTabResponse {
    tab_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NavigateRequest<'a> {
    url: &'a str,
    timeout_ms: u64,
    wait_until: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WaitRequest<'a> {
    selector: &'a str,
    timeout_ms: u64,
}

#[derive(Debug, Serialize)]
struct TypeTextRequest<'a> {
    selector: &'a str,
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct ClickRequest<'a> {
    selector: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WaitNavigationRequest {
    timeout_ms: u64,
    wait_until: &'static str,
}

#[derive(Debug, Deserialize)]
struct UrlResponse {
    url: String,
}

#[derive(Debug, Serialize)]
struct XPathRequest<'a> {
    expression: &'a str,
}

#[derive(Debug, Deserialize)]
struct XPathResponse {
    count: usize,
}

#[derive(Debug, Deserialize)]
struct HarnessErrorBody {
    error: HarnessErrorDetail,
}

#[derive(Debug, Deserialize)]
struct HarnessErrorDetail {
    #[serde(default)]
    kind: String,
    #[serde(default)]
    message: String,
    #[serde(default, rename = "timeoutMs")]
    timeout_ms: Option<u64>,
}

/// Map a failed harness response onto a `BrowserError`
fn map_harness_error(status: StatusCode, body: &str) -> BrowserError {
    let Ok(HarnessErrorBody { error }) = serde_json::from_str::<HarnessErrorBody>(body) else {
        return BrowserError::Harness(format!("{}: {}", status, body.trim()));
    };

    match error.kind.as_str() {
        "timeout" => BrowserError::Timeout {
            what: error.message,
            timeout_ms: error.timeout_ms.unwrap_or_default(),
        },
        "not_found" => BrowserError::ElementNotFound(error.message),
        "navigation" => BrowserError::Navigation(error.message),
        _ => BrowserError::Harness(format!("{}: {}", status, error.message)),
    }
}

/// Decode a harness response; an empty success body reads as `null`
fn decode_harness_response<T: DeserializeOwned>(
    path: &str,
    status: StatusCode,
    text: &str,
) -> Result<T, BrowserError> {
    if !status.is_success() {
        return Err(map_harness_error(status, text));
    }

    let text = if text.trim().is_empty() { "null" } else { text };
    serde_json::from_str(text)
        .map_err(|e| BrowserError::Harness(format!("unexpected response from {}: {}", path, e)))
}

// ============================================================
// Harness client
// ============================================================

/// REST client for the browser harness; launches sessions
#[derive(Debug, Clone)]
pub struct HarnessClient {
    http: Client,
    base_url: String,
}

impl HarnessClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, BrowserError> {
        // Individual waits run up to 30s on the harness side.
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn call<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T, BrowserError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("harness {} {}", method, path);

        let mut request = self.http.request(method, &url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        decode_harness_response(path, status, &text)
    }
}

#[async_trait]
impl BrowserLauncher for HarnessClient {
    async fn launch(&self) -> Result<Box<dyn Browser>, BrowserError> {
        let request = CreateSessionRequest {
            headless: true,
            viewport: Viewport {
                width: 1280,
                height: 720,
            },
            timeout_ms: 30_000,
        };

        let session: CreateSessionResponse =
            self.call(Method::POST, "/sessions", Some(&request)).await?;
        debug!("Browser session started: {}", session.session_id);

        Ok(Box::new(HarnessBrowser {
            client: self.clone(),
            session_id: session.session_id,
        }))
    }
}

struct HarnessBrowser {
    client: HarnessClient,
    session_id: String,
}

#[async_trait]
impl Browser for HarnessBrowser {
    async fn new_page(&self) -> Result<Box<dyn Page>, BrowserError> {
        let tab: CreateTabResponse = self
            .client
            .call(
                Method::POST,
                &format!("/sessions/{}/tabs", self.session_id),
                None::<&()>,
            )
            .await?;

        Ok(Box::new(HarnessPage {
            client: self.client.clone(),
            tab_id: tab.tab_id,
        }))
    }

    async fn close(&self) -> Result<(), BrowserError> {
        let _: serde::de::IgnoredAny = self
            .client
            .call(
                Method::DELETE,
                &format!("/sessions/{}", self.session_id),
                None::<&()>,
            )
            .await?;
        debug!("Browser session closed: {}", self.session_id);
        Ok(())
    }
}

struct HarnessPage {
    client: HarnessClient,
    tab_id: String,
}

impl HarnessPage {
    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        action: &str,
        body: &B,
    ) -> Result<T, BrowserError> {
        self.client
            .call(
                Method::POST,
                &format!("/tabs/{}/{}", self.tab_id, action),
                Some(body),
            )
            .await
    }
}

fn millis(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

#[async_trait]
impl Page for HarnessPage {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), BrowserError> {
        let _: serde::de::IgnoredAny = self
            .post(
                "navigate",
                &NavigateRequest {
                    url,
                    timeout_ms: millis(timeout),
                    wait_until: WAIT_UNTIL,
                },
            )
            .await?;
        Ok(())
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), BrowserError> {
        let _: serde::de::IgnoredAny = self
            .post(
                "wait",
                &WaitRequest {
                    selector,
                    timeout_ms: millis(timeout),
                },
            )
            .await?;
        Ok(())
    }

    async fn type_text(&self, selector: &str, text: &str) -> Result<(), BrowserError> {
        let _: serde::de::IgnoredAny = self
            .post("type", &TypeTextRequest { selector, text })
            .await?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        let _: serde::de::IgnoredAny = self.post("click", &ClickRequest { selector }).await?;
        Ok(())
    }

    async fn wait_for_navigation(&self, timeout: Duration) -> Result<(), BrowserError> {
        let _: serde::de::IgnoredAny = self
            .post(
                "wait-navigation",
                &WaitNavigationRequest {
                    timeout_ms: millis(timeout),
                    wait_until: WAIT_UNTIL,
                },
            )
            .await?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        let response: UrlResponse = self
            .client
            .call(
                Method::GET,
                &format!("/tabs/{}/url", self.tab_id),
                None::<&()>,
            )
            .await?;
        Ok(response.url)
    }

    async fn count_xpath(&self, expression: &str) -> Result<usize, BrowserError> {
        let response: XPathResponse = self.post("xpath", &XPathRequest { expression }).await?;
        Ok(response.count)
    }

    async fn close(&self) -> Result<(), BrowserError> {
        let _: serde::de::IgnoredAny = self
            .client
            .call(
                Method::DELETE,
                &format!("/tabs/{}", self.tab_id),
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
    fn test_timeout_error_mapping() {
        let body = r#"{"error":{"kind":"timeout","message":"selector #btnAskLater","timeoutMs":5000}}"#;
        let err = map_harness_error(StatusCode::REQUEST_TIMEOUT, body);

        assert!(err.is_absent());
        assert_eq!(
            err.to_string(),
            "Timed out after 5000ms waiting for selector #btnAskLater"
        );
    }

    #[test]
    fn test_not_found_is_absent() {
        let body = r##"{"error":{"kind":"not_found","message":"#KmsiCheckboxField"}}"##;
        let err = map_harness_error(StatusCode::NOT_FOUND, body);
        assert!(matches!(err, BrowserError::ElementNotFound(_)));
        assert!(err.is_absent());
    }

    #[test]
    fn test_other_errors_are_not_absent() {
        let nav = map_harness_error(
            StatusCode::BAD_GATEWAY,
            r#"{"error":{"kind":"navigation","message":"net::ERR_NAME_NOT_RESOLVED"}}"#,
        );
        assert!(matches!(nav, BrowserError::Navigation(_)));
        assert!(!nav.is_absent());

        let crashed = map_harness_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"error":{"kind":"crashed","message":"tab crashed"}}"#,
        );
        assert!(matches!(crashed, BrowserError::Harness(_)));
        assert!(!crashed.is_absent());
    }

    #[test]
    fn test_unstructured_error_body() {
        let err = map_harness_error(StatusCode::SERVICE_UNAVAILABLE, "upstream down\n");
        assert_eq!(
            err.to_string(),
            "Browser harness error: 503 Service Unavailable: upstream down"
        );
    }

    #[test]
    fn test_session_request_shape() {
        let request = CreateSessionRequest {
            headless: true,
            viewport: Viewport {
                width: 1280,
                height: 720,
            },
            timeout_ms: 30_000,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["timeoutMs"], 30_000);
        assert_eq!(json["viewport"]["width"], 1280);
    }

    #[test]
    fn test_decode_harness_response() {
        let url: String = decode_harness_response(
            "/pages/p1/url",
            StatusCode::OK,
            r#""https://outlook.office.com/mail/""#,
        )
        .unwrap();
        assert_eq!(url, "https://outlook.office.com/mail/");

        let unit: Option<serde::de::IgnoredAny> =
            decode_harness_response("/pages/p1/click", StatusCode::NO_CONTENT, "").unwrap();
        assert!(unit.is_none());

        let err = decode_harness_response::<String>("/pages/p1/url", StatusCode::OK, "{")
            .unwrap_err();
        assert!(matches!(err, BrowserError::Harness(ref m) if m.starts_with("unexpected response from /pages/p1/url")));

        let err = decode_harness_response::<String>(
            "/pages/p1/goto",
            StatusCode::BAD_GATEWAY,
            r#"{"error":{"kind":"navigation","message":"net::ERR_NAME_NOT_RESOLVED"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, BrowserError::Navigation(_)));
    }
}
