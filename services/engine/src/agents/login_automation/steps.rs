//! Page steps of a single login attempt

use thiserror::Error;
use tracing::debug;

use super::types::{Credential, LoginTimeouts};
use crate::tools::{BrowserError, Page};

pub const EMAIL_INPUT: &str = r#"input[name="loginfmt"]"#;
pub const PASSWORD_INPUT: &str = r#"input[name="passwd"]"#;
pub const SUBMIT_BUTTON: &str = r#"input[type="submit"]"#;
pub const STAY_SIGNED_IN_CHECKBOX: &str = "#KmsiCheckboxField";
pub const STAY_SIGNED_IN_DECLINE: &str = "#idBtn_Back";
pub const ASK_LATER_BUTTON: &str = "#btnAskLater";

/// Any visible error text left on the page after submitting
pub const ERROR_MESSAGE_XPATH: &str =
    "//div[contains(text(), 'error') or contains(text(), 'invalid')]";

/// URL fragments that mean the login did not complete
const FAILURE_URL_MARKERS: [&str; 3] = ["login", "error", "auth"];

#[derive(Debug, Error)]
pub enum LoginError {
    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error("Login verification failed - still on login/error page")]
    StillOnLoginPage,

    #[error("Login verification failed - error message detected")]
    ErrorMessageDetected,
}

/// Whether a post-login URL still looks like the sign-in flow
pub fn is_login_url(url: &str) -> bool {
    FAILURE_URL_MARKERS.iter().any(|marker| url.contains(marker))
}

/// Run a step that may legitimately not apply.
///
/// Only "the element never appeared" outcomes are swallowed.
async fn optional_step<F>(name: &str, step: F) -> Result<(), BrowserError>
where
    F: std::future::Future<Output = Result<(), BrowserError>>,
{
    match step.await {
        Ok(()) => Ok(()),
        Err(e) if e.is_absent() => {
            debug!("Optional step '{}' skipped: {}", name, e);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Drive one complete login attempt on `page` and classify the result
pub async fn attempt_login(
    page: &dyn Page,
    login_url: &str,
    credential: &Credential,
    timeouts: &LoginTimeouts,
) -> Result<(), LoginError> {
    page.goto(login_url, timeouts.navigation).await?;

    page.wait_for_selector(EMAIL_INPUT, timeouts.selector).await?;
    page.type_text(EMAIL_INPUT, &credential.email).await?;
    page.click(SUBMIT_BUTTON).await?;

    page.wait_for_selector(PASSWORD_INPUT, timeouts.selector).await?;
    page.type_text(PASSWORD_INPUT, &credential.password).await?;
    page.click(SUBMIT_BUTTON).await?;

    optional_step("stay signed in", async {
        page.wait_for_selector(STAY_SIGNED_IN_CHECKBOX, timeouts.optional_prompt)
            .await?;
        page.click(STAY_SIGNED_IN_CHECKBOX).await?;
        page.click(STAY_SIGNED_IN_DECLINE).await
    })
    .await?;

    optional_step("ask later", async {
        page.wait_for_selector(ASK_LATER_BUTTON, timeouts.optional_prompt)
            .await?;
        page.click(ASK_LATER_BUTTON).await
    })
    .await?;

    page.wait_for_navigation(timeouts.post_login).await?;

    let url = page.current_url().await?;
    if is_login_url(&url) {
        return Err(LoginError::StillOnLoginPage);
    }

    if page.count_xpath(ERROR_MESSAGE_XPATH).await? > 0 {
        return Err(LoginError::ErrorMessageDetected);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_url_markers() {
        assert!(is_login_url("https://login.microsoftonline.com/common"));
        assert!(is_login_url("https://example.com/oauth2/authorize"));
        assert!(is_login_url("https://example.com/error?code=50126"));
        assert!(!is_login_url("https://outlook.office.com/mail/"));
    }

    #[tokio::test]
    async fn test_optional_step_swallows_only_absence() {
        let timeout = optional_step("prompt", async {
            Err(BrowserError::Timeout {
                what: "#btnAskLater".to_string(),
                timeout_ms: 5000,
            })
        })
        .await;
        assert!(timeout.is_ok());

        let missing = optional_step("prompt", async {
            Err(BrowserError::ElementNotFound("#idBtn_Back".to_string()))
        })
        .await;
        assert!(missing.is_ok());

        let crashed = optional_step("prompt", async {
            Err(BrowserError::Harness("tab crashed".to_string()))
        })
        .await;
        assert!(matches!(crashed, Err(BrowserError::Harness(_))));
    }
}
