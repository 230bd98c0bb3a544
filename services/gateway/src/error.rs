//! API errors and their JSON rendering

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use warpify_engine::agents::domain_setup::DomainError;
use warpify_engine::agents::login_automation::AutomationError;
use warpify_engine::agents::warmup::WarmupError;
use warpify_engine::tools::StorageError;

use crate::request_id::RequestId;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Attach the request id so the error can be rendered
    pub fn for_request(self, request_id: &RequestId) -> ApiFailure {
        ApiFailure {
            error: self,
            request_id: request_id.to_string(),
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::ZoneNotFound(_) => ApiError::NotFound(err.to_string()),
            DomainError::InvalidStatusCode(_) => ApiError::Validation(err.to_string()),
            DomainError::Records { .. } | DomainError::Provider(_) => {
                ApiError::Upstream(err.to_string())
            }
        }
    }
}

impl From<AutomationError> for ApiError {
    fn from(err: AutomationError) -> Self {
        match err {
            AutomationError::InvalidCsv(_) => ApiError::Validation(err.to_string()),
            AutomationError::ExistingAccounts(_) => ApiError::Upstream(err.to_string()),
            AutomationError::BrowserLaunch(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<WarmupError> for ApiError {
    fn from(err: WarmupError) -> Self {
        ApiError::Upstream(err.to_string())
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidKey(_) => ApiError::Validation(err.to_string()),
            StorageError::NotFound(_) => ApiError::NotFound(err.to_string()),
            StorageError::Io(_) => ApiError::Upstream(err.to_string()),
        }
    }
}

/// An `ApiError` bound to the request it failed
#[derive(Debug)]
pub struct ApiFailure {
    pub error: ApiError,
    pub request_id: String,
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let status = self.error.status();
        if status.is_server_error() {
            error!(request_id = %self.request_id, "{}", self.error);
        } else {
            warn!(request_id = %self.request_id, "{}", self.error);
        }

        (
            status,
            Json(json!({
                "success": false,
                "error": self.error.to_string(),
                "requestId": self.request_id,
            })),
        )
            .into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiFailure>;

/// `?`-friendly conversion of engine results into `ApiResult`
pub trait WithRequestId<T> {
    fn for_request(self, request_id: &RequestId) -> ApiResult<T>;
}

impl<T, E: Into<ApiError>> WithRequestId<T> for Result<T, E> {
    fn for_request(self, request_id: &RequestId) -> ApiResult<T> {
        self.map_err(|e| {
            let error: ApiError = e.into();
            error.for_request(request_id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_error_mapping() {
        let not_found: ApiError = DomainError::ZoneNotFound("example.com".to_string()).into();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let bad_code: ApiError = DomainError::InvalidStatusCode(307).into();
        assert_eq!(bad_code.status(), StatusCode::BAD_REQUEST);

        let upstream: ApiError = DomainError::Provider(anyhow::anyhow!("boom")).into();
        assert_eq!(upstream.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_automation_error_mapping() {
        use warpify_engine::agents::login_automation::CsvError;
        use warpify_engine::tools::BrowserError;

        let csv: ApiError = AutomationError::InvalidCsv(CsvError::MissingColumns).into();
        assert_eq!(csv.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            csv.to_string(),
            "CSV must contain EmailAddress and Password columns"
        );

        let launch: ApiError =
            AutomationError::BrowserLaunch(BrowserError::Transport("refused".to_string())).into();
        assert_eq!(launch.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
