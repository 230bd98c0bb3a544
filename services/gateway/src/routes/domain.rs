//! Domain provisioning, verification and redirect routes

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use warpify_engine::agents::domain_setup::{
    setup_audit_key, Availability, DomainSetup, RedirectRequest, SetupResult, SetupVerification,
    ALLOWED_STATUS_CODES,
};
use warpify_engine::tools::audit::now_millis;

use crate::auth::Caller;
use crate::error::{ApiResult, WithRequestId};
use crate::extract::{ValidJson, ValidQuery};
use crate::request_id::RequestId;
use crate::state::AppState;
use crate::validation::{check_domain, check_email, check_url, Validate};

impl Validate for DomainSetup {
    fn validate(&self) -> Result<(), String> {
        check_domain(&self.domain)?;
        check_url("redirectTo", &self.redirect_to)?;
        check_email("reportEmail", &self.report_email)
    }
}

impl Validate for RedirectRequest {
    fn validate(&self) -> Result<(), String> {
        check_domain(&self.domain)?;
        check_url("redirectTo", &self.redirect_to)?;
        if !ALLOWED_STATUS_CODES.contains(&self.status_code) {
            return Err("statusCode must be 301 or 302".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct DomainQuery {
    pub domain: String,
}

impl Validate for DomainQuery {
    fn validate(&self) -> Result<(), String> {
        check_domain(&self.domain)
    }
}

async fn provision(
    state: &AppState,
    request_id: &RequestId,
    setup: &DomainSetup,
) -> ApiResult<SetupResult> {
    let result = state.domains.provision(setup).await.for_request(request_id)?;

    state
        .audit
        .record(
            &setup_audit_key(&setup.domain),
            json!({
                "result": result,
                "requestId": request_id.as_str(),
                "completedAt": now_millis(),
            }),
        )
        .await;

    Ok(result)
}

/// `POST /api/setup-domain`
pub async fn setup_domain(
    State(state): State<AppState>,
    request_id: RequestId,
    ValidJson(setup): ValidJson<DomainSetup>,
) -> ApiResult<Json<SetupResult>> {
    provision(&state, &request_id, &setup).await.map(Json)
}

/// `POST /api/domain/setup`: also records who asked before provisioning
pub async fn setup(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    request_id: RequestId,
    ValidJson(setup): ValidJson<DomainSetup>,
) -> ApiResult<Json<SetupResult>> {
    state
        .audit
        .record(
            &format!("setup:{}", request_id),
            json!({ "domain": setup.domain, "requestedBy": caller.0 }),
        )
        .await;

    provision(&state, &request_id, &setup).await.map(Json)
}

/// `GET /api/domain/verify?domain=`
pub async fn verify(
    State(state): State<AppState>,
    request_id: RequestId,
    ValidQuery(query): ValidQuery<DomainQuery>,
) -> ApiResult<Json<Availability>> {
    let availability = state
        .domains
        .check_availability(&query.domain)
        .await
        .for_request(&request_id)?;
    Ok(Json(availability))
}

/// `GET /api/domain/verify-setup?domain=`
pub async fn verify_setup(
    State(state): State<AppState>,
    request_id: RequestId,
    ValidQuery(query): ValidQuery<DomainQuery>,
) -> ApiResult<Json<SetupVerification>> {
    let verification = state
        .domains
        .verify_setup(&query.domain)
        .await
        .for_request(&request_id)?;
    Ok(Json(verification))
}

/// `PUT /api/domain/redirect`
pub async fn upsert_redirect(
    State(state): State<AppState>,
    request_id: RequestId,
    ValidJson(request): ValidJson<RedirectRequest>,
) -> ApiResult<Json<Value>> {
    let redirect = state
        .domains
        .upsert_redirect(&request)
        .await
        .for_request(&request_id)?;

    Ok(Json(json!({
        "success": true,
        "requestId": request_id.as_str(),
        "redirect": redirect,
    })))
}

/// `GET /api/domain/redirects?domain=`
pub async fn list_redirects(
    State(state): State<AppState>,
    request_id: RequestId,
    ValidQuery(query): ValidQuery<DomainQuery>,
) -> ApiResult<Json<Value>> {
    let redirects = state
        .domains
        .list_redirects(&query.domain)
        .await
        .for_request(&request_id)?;

    Ok(Json(json!({
        "success": true,
        "requestId": request_id.as_str(),
        "redirects": redirects,
    })))
}

/// `DELETE /api/domain/redirects/:rule_id?domain=`
pub async fn delete_redirect(
    State(state): State<AppState>,
    Path(rule_id): Path<String>,
    request_id: RequestId,
    ValidQuery(query): ValidQuery<DomainQuery>,
) -> ApiResult<Json<Value>> {
    state
        .domains
        .delete_redirect(&query.domain, &rule_id)
        .await
        .for_request(&request_id)?;

    Ok(Json(json!({
        "success": true,
        "requestId": request_id.as_str(),
        "message": format!("Redirect {} deleted", rule_id),
    })))
}
