//! `POST /api/automation/process`

use axum::{extract::State, Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use warpify_engine::agents::login_automation::{
    AutomationError, AutomationOptions, DEFAULT_MAX_RETRIES, MAX_RETRIES_LIMIT,
};

use crate::auth::Caller;
use crate::error::{ApiError, ApiResult, WithRequestId};
use crate::extract::ValidJson;
use crate::request_id::RequestId;
use crate::state::AppState;
use crate::validation::{check_not_empty, check_range, check_url, Validate};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationRequest {
    pub api_key: String,
    pub csv_data: String,
    pub login_url: String,
    pub max_retries: Option<u32>,
}

impl Validate for AutomationRequest {
    fn validate(&self) -> Result<(), String> {
        check_not_empty("apiKey", &self.api_key)?;
        check_not_empty("csvData", &self.csv_data)?;
        check_url("loginUrl", &self.login_url)?;
        if let Some(max_retries) = self.max_retries {
            check_range("maxRetries", max_retries, 1, MAX_RETRIES_LIMIT)?;
        }
        Ok(())
    }
}

/// Rows after the header, ignoring blank lines
fn data_row_count(csv_data: &str) -> usize {
    csv_data
        .lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .count()
}

pub async fn process(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    request_id: RequestId,
    ValidJson(request): ValidJson<AutomationRequest>,
) -> ApiResult<Json<Value>> {
    let max_retries = request.max_retries.unwrap_or(DEFAULT_MAX_RETRIES);

    // apiKey and csvData stay out of the audit log
    state
        .audit
        .record(
            &format!("automation:request:{}", request_id),
            json!({
                "requestedBy": caller.0,
                "loginUrl": request.login_url,
                "maxRetries": max_retries,
                "csvLength": data_row_count(&request.csv_data),
            }),
        )
        .await;

    let platform = state
        .platforms
        .connect(&request.api_key)
        .map_err(|e| ApiError::Internal(format!("{:#}", e)).for_request(&request_id))?;

    let options = AutomationOptions::new(request.login_url)
        .with_max_retries(max_retries)
        .with_delays(state.throttle);

    info!(request_id = %request_id, "Processing login automation");

    // Runs to completion even if the client disconnects
    let agent = state.automation.clone();
    let audit = state.audit.clone();
    let complete_key = format!("automation:complete:{}", request_id);
    let csv_data = request.csv_data;
    let job = tokio::spawn(async move {
        let result = agent.run(&csv_data, platform.as_ref(), &options).await?;
        audit.record(&complete_key, json!({ "result": result })).await;
        Ok::<_, AutomationError>(result)
    });

    let result = job
        .await
        .map_err(|e| {
            ApiError::Internal(format!("Automation task failed: {}", e)).for_request(&request_id)
        })?
        .for_request(&request_id)?;

    Ok(Json(json!({
        "success": true,
        "requestId": request_id.as_str(),
        "result": result,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_row_count() {
        assert_eq!(data_row_count("EmailAddress,Password\na@x.com,p1\nb@x.com,p2\n"), 2);
        assert_eq!(data_row_count("EmailAddress,Password\n\na@x.com,p1\n\n"), 1);
        assert_eq!(data_row_count("EmailAddress,Password"), 0);
    }
}
