//! Credential CSV parsing
//!
//! The format is deliberately minimal: rows are split on `,` with no quoting,
//! so a password containing a comma shifts the columns.

use thiserror::Error;

use super::types::Credential;

const EMAIL_COLUMN: &str = "emailaddress";
const PASSWORD_COLUMN: &str = "password";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CsvError {
    #[error("CSV data is empty")]
    Empty,

    #[error("CSV must contain EmailAddress and Password columns")]
    MissingColumns,
}

/// Parse credentials from CSV text.
///
/// Headers are matched case-insensitively. Blank lines are skipped and cells
/// missing from short rows become empty strings.
pub fn parse_credentials(data: &str) -> Result<Vec<Credential>, CsvError> {
    let mut lines = data.trim().lines();

    let header = lines.next().filter(|h| !h.trim().is_empty()).ok_or(CsvError::Empty)?;
    let columns: Vec<String> = header
        .split(',')
        .map(|h| h.trim().to_lowercase())
        .collect();

    let email_idx = columns.iter().position(|c| c == EMAIL_COLUMN);
    let password_idx = columns.iter().position(|c| c == PASSWORD_COLUMN);
    let (Some(email_idx), Some(password_idx)) = (email_idx, password_idx) else {
        return Err(CsvError::MissingColumns);
    };

    let credentials = lines
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let cells: Vec<&str> = line.split(',').collect();
            let cell = |idx: usize| cells.get(idx).map(|c| c.trim()).unwrap_or("").to_string();
            Credential {
                email: cell(email_idx),
                password: cell(password_idx),
            }
        })
        .collect();

    Ok(credentials)
}
