//! Warmup and reconnect routes

use axum::{extract::State, Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use warpify_engine::tools::email_platform::WarmupSettings;
use warpify_engine::WarmupAgent;

use crate::auth::Caller;
use crate::error::{ApiError, ApiResult, WithRequestId};
use crate::extract::ValidJson;
use crate::request_id::RequestId;
use crate::state::AppState;
use crate::validation::{check_not_empty, check_range, Validate};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmupRequest {
    pub api_key: String,
    pub total_warmup_per_day: Option<u32>,
    pub daily_rampup: Option<u32>,
    pub reply_rate_percentage: Option<u32>,
    pub warmup_key_id: Option<String>,
}

impl WarmupRequest {
    fn settings(&self) -> WarmupSettings {
        let defaults = WarmupSettings::default();
        WarmupSettings {
            total_warmup_per_day: self
                .total_warmup_per_day
                .unwrap_or(defaults.total_warmup_per_day),
            daily_rampup: self.daily_rampup.unwrap_or(defaults.daily_rampup),
            reply_rate_percentage: self
                .reply_rate_percentage
                .unwrap_or(defaults.reply_rate_percentage),
            warmup_key_id: self
                .warmup_key_id
                .clone()
                .unwrap_or(defaults.warmup_key_id),
        }
    }
}

impl Validate for WarmupRequest {
    fn validate(&self) -> Result<(), String> {
        check_not_empty("apiKey", &self.api_key)?;
        let numeric = [
            ("totalWarmupPerDay", self.total_warmup_per_day),
            ("dailyRampup", self.daily_rampup),
            ("replyRatePercentage", self.reply_rate_percentage),
        ];
        for (field, value) in numeric {
            if let Some(value) = value {
                check_range(field, value, 1, 100)?;
            }
        }
        if let Some(key_id) = &self.warmup_key_id {
            check_not_empty("warmupKeyId", key_id)?;
        }
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectRequest {
    pub api_key: String,
}

impl Validate for ReconnectRequest {
    fn validate(&self) -> Result<(), String> {
        check_not_empty("apiKey", &self.api_key)
    }
}

fn agent(state: &AppState, api_key: &str, request_id: &RequestId) -> ApiResult<WarmupAgent> {
    let platform = state
        .platforms
        .connect(api_key)
        .map_err(|e| ApiError::Internal(format!("{:#}", e)).for_request(request_id))?;
    Ok(WarmupAgent::new(platform))
}

/// `POST /api/warmup/process`
pub async fn process(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    request_id: RequestId,
    ValidJson(request): ValidJson<WarmupRequest>,
) -> ApiResult<Json<Value>> {
    let settings = request.settings();

    state
        .audit
        .record(
            &format!("warmup:request:{}", request_id),
            json!({ "requestedBy": caller.0, "settings": settings }),
        )
        .await;

    let result = agent(&state, &request.api_key, &request_id)?
        .run(&settings)
        .await
        .for_request(&request_id)?;

    state
        .audit
        .record(
            &format!("warmup:complete:{}", request_id),
            json!({ "result": result }),
        )
        .await;

    Ok(Json(json!({
        "success": true,
        "requestId": request_id.as_str(),
        "result": result,
    })))
}

/// `POST /api/warmup/reconnect`
pub async fn reconnect(
    State(state): State<AppState>,
    request_id: RequestId,
    ValidJson(request): ValidJson<ReconnectRequest>,
) -> ApiResult<Json<Value>> {
    let result = agent(&state, &request.api_key, &request_id)?
        .reconnect()
        .await
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
    fn test_settings_fill_defaults() {
        let request: WarmupRequest =
            serde_json::from_value(json!({ "apiKey": "k", "dailyRampup": 10 })).unwrap();
        let settings = request.settings();

        assert_eq!(settings.daily_rampup, 10);
        assert_eq!(settings.total_warmup_per_day, 50);
        assert_eq!(settings.warmup_key_id, "default");
    }

    #[test]
    fn test_numeric_bounds() {
        let request: WarmupRequest =
            serde_json::from_value(json!({ "apiKey": "k", "replyRatePercentage": 0 })).unwrap();
        assert_eq!(
            request.validate().unwrap_err(),
            "replyRatePercentage must be between 1 and 100"
        );
    }
}
