//! Uploaded CSV files

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde_json::{json, Value};
use tracing::info;

use warpify_engine::tools::audit::now_millis;

use crate::auth::Caller;
use crate::error::{ApiError, ApiResult, WithRequestId};
use crate::request_id::RequestId;
use crate::state::AppState;

const CSV_CONTENT_TYPE: &str = "text/csv";

fn upload_key(ts: i64) -> String {
    format!("{ts}-email-list-{ts}.csv")
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"))
}

fn public_url(state: &AppState, key: &str) -> String {
    match &state.storage_public_url {
        Some(base) => format!("{}/{}", base, key),
        None => format!("/api/storage/files/{}", key),
    }
}

/// `POST /api/storage/upload`
///
/// A JSON body is the client's upload handshake; anything else is the CSV.
pub async fn upload(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    request_id: RequestId,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    if is_json(&headers) {
        return Ok(Json(json!({
            "success": true,
            "message": "Ready for file upload",
        })));
    }

    if body.is_empty() {
        return Err(ApiError::Validation("File body is empty".to_string()).for_request(&request_id));
    }

    let key = upload_key(now_millis());
    let object = state.storage.put(&key, &body).await.for_request(&request_id)?;
    info!(request_id = %request_id, "Stored upload {} ({} bytes)", key, object.size);

    state
        .audit
        .record(
            &format!("storage:upload:{}", key),
            json!({
                "requestedBy": caller.0,
                "key": key,
                "size": object.size,
                "etag": object.etag,
            }),
        )
        .await;

    Ok(Json(json!({
        "success": true,
        "key": key,
        "url": public_url(&state, &key),
        "size": object.size,
        "etag": object.etag,
    })))
}

/// `GET /api/storage/files`
pub async fn list_files(
    State(state): State<AppState>,
    request_id: RequestId,
) -> ApiResult<Json<Value>> {
    let files = state.storage.list(None).await.for_request(&request_id)?;
    Ok(Json(json!({ "success": true, "files": files })))
}

/// `GET /api/storage/files/:key`
pub async fn get_file(
    State(state): State<AppState>,
    Path(key): Path<String>,
    request_id: RequestId,
) -> ApiResult<Response> {
    match state.storage.get(&key).await.for_request(&request_id)? {
        Some(body) => Ok(([(header::CONTENT_TYPE, CSV_CONTENT_TYPE)], body).into_response()),
        None => Err(ApiError::NotFound(format!("File not found: {}", key)).for_request(&request_id)),
    }
}

/// `DELETE /api/storage/files/:key`
pub async fn delete_file(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(key): Path<String>,
    request_id: RequestId,
) -> ApiResult<Json<Value>> {
    state.storage.delete(&key).await.for_request(&request_id)?;

    state
        .audit
        .record(
            &format!("storage:delete:{}", key),
            json!({ "requestedBy": caller.0, "key": key }),
        )
        .await;

    Ok(Json(json!({
        "success": true,
        "message": format!("File {} deleted successfully", key),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_key_format() {
        assert_eq!(
            upload_key(1_700_000_000_000),
            "1700000000000-email-list-1700000000000.csv"
        );
    }
}
