//! `GET /health`: probes Cloudflare, storage and KV

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::state::AppState;

const HEALTH_CHECK_KEY: &str = "health-check-test";

#[derive(Debug, Serialize)]
pub struct ServiceHealth {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceHealth {
    fn from_result<T>(result: anyhow::Result<T>) -> Self {
        match result {
            Ok(_) => Self {
                status: "healthy",
                error: None,
            },
            Err(e) => Self {
                status: "unhealthy",
                error: Some(format!("{:#}", e)),
            },
        }
    }

    fn is_healthy(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Serialize)]
pub struct Services {
    pub cloudflare: ServiceHealth,
    pub storage: ServiceHealth,
    pub kv: ServiceHealth,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub timestamp: String,
    pub service: &'static str,
    pub version: &'static str,
    pub services: Services,
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let (cloudflare, storage, kv) = tokio::join!(
        async { state.dns.verify_token().await },
        async { state.storage.list(None).await.map_err(anyhow::Error::from) },
        async {
            let kv = state.audit.store();
            kv.put(HEALTH_CHECK_KEY, "test").await?;
            kv.delete(HEALTH_CHECK_KEY).await
        },
    );

    let services = Services {
        cloudflare: ServiceHealth::from_result(cloudflare),
        storage: ServiceHealth::from_result(storage),
        kv: ServiceHealth::from_result(kv),
    };

    let healthy =
        services.cloudflare.is_healthy() && services.storage.is_healthy() && services.kv.is_healthy();

    let report = HealthReport {
        status: if healthy { "ok" } else { "degraded" },
        timestamp: chrono::Utc::now().to_rfc3339(),
        service: "warpify-gateway",
        version: env!("CARGO_PKG_VERSION"),
        services,
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(report))
}
