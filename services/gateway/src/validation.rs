//! Input validation for request bodies and query strings

use regex::Regex;
use std::sync::OnceLock;

pub const MAX_URL_LENGTH: usize = 253;
pub const MAX_EMAIL_LENGTH: usize = 254;

/// Implemented by request types checked by `ValidJson` / `ValidQuery`
pub trait Validate {
    fn validate(&self) -> Result<(), String>;
}

fn domain_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z]{2,})+$")
            .unwrap_or_else(|e| panic!("invalid domain pattern: {e}"))
    })
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$")
            .unwrap_or_else(|e| panic!("invalid email pattern: {e}"))
    })
}

/// A registrable domain: one label followed by alphabetic TLD labels
pub fn is_valid_domain(domain: &str) -> bool {
    (4..=253).contains(&domain.len()) && domain_regex().is_match(domain)
}

pub fn is_valid_email(email: &str) -> bool {
    email.len() <= MAX_EMAIL_LENGTH && email_regex().is_match(email)
}

/// An absolute http(s) URL with a host
pub fn is_valid_url(value: &str) -> bool {
    if value.len() > MAX_URL_LENGTH {
        return false;
    }
    match url::Url::parse(value) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
        Err(_) => false,
    }
}

pub fn check_domain(domain: &str) -> Result<(), String> {
    if is_valid_domain(domain) {
        Ok(())
    } else {
        Err(format!("Invalid domain: {}", domain))
    }
}

pub fn check_url(field: &str, value: &str) -> Result<(), String> {
    if is_valid_url(value) {
        Ok(())
    } else {
        Err(format!("{} must be an http(s) URL of at most {} characters", field, MAX_URL_LENGTH))
    }
}

pub fn check_email(field: &str, value: &str) -> Result<(), String> {
    if is_valid_email(value) {
        Ok(())
    } else {
        Err(format!("{} must be a valid email address", field))
    }
}

pub fn check_not_empty(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{} is required", field))
    } else {
        Ok(())
    }
}

pub fn check_range(field: &str, value: u32, min: u32, max: u32) -> Result<(), String> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(format!("{} must be between {} and {}", field, min, max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domains() {
        for ok in ["example.com", "my-brand.co.uk", "a1.io", "x.dev"] {
            assert!(is_valid_domain(ok), "{ok} should be valid");
        }
        for bad in ["-bad.com", "bad-.com", "nodot", "sub.example.c0m", "ex ample.com", "a.b"] {
            assert!(!is_valid_domain(bad), "{bad} should be invalid");
        }
    }

    #[test]
    fn test_urls() {
        assert!(is_valid_url("https://target.io/landing"));
        assert!(is_valid_url("http://localhost:3000"));
        assert!(!is_valid_url("ftp://files.example.com"));
        assert!(!is_valid_url("not a url"));
        assert!(!is_valid_url(&format!("https://{}.com", "a".repeat(250))));
    }

    #[test]
    fn test_emails() {
        assert!(is_valid_email("dmarc@example.com"));
        assert!(!is_valid_email("dmarc@example"));
        assert!(!is_valid_email("dm arc@example.com"));
    }

    #[test]
    fn test_range() {
        assert!(check_range("maxRetries", 10, 1, 10).is_ok());
        assert_eq!(
            check_range("maxRetries", 11, 1, 10).unwrap_err(),
            "maxRetries must be between 1 and 10"
        );
    }
}
