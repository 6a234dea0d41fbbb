/*
 * KubeClean - Rule-driven pod cleanup for Kubernetes
 * Copyright (C) 2025 5D Labs
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published
 * by the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

//! Liveness and readiness endpoints

use std::net::SocketAddr;

use axum::{extract::State, response::Json, routing::get, Router};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::SharedConfig;

#[derive(Clone)]
struct ProbeState {
    config: SharedConfig,
}

/// `/healthz` and `/readyz` routes over the live configuration
pub fn router(config: SharedConfig) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/readyz", get(readiness_check))
        .layer(TraceLayer::new_for_http())
        .with_state(ProbeState { config })
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "kubeclean",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn readiness_check(State(state): State<ProbeState>) -> Json<Value> {
    let config = state.config.snapshot().await;
    Json(json!({
        "status": "ready",
        "podCleanupEnabled": config.pod_cleanup_config.enabled,
        "activeRules": config.active_rules().count(),
        "dryRun": config.dry_run,
        "batchSize": config.batch_size
    }))
}

/// Serve the probe endpoints on `addr` until `shutdown` fires.
pub async fn serve(
    addr: SocketAddr,
    config: SharedConfig,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Probe server listening on {}", addr);

    axum::serve(listener, router(config))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CleanupConfiguration, CleanupRule, PodCleanupConfig};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn healthz_reports_healthy() {
        let (status, body) = get_json(router(SharedConfig::default()), "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn readyz_reflects_live_config() {
        let shared = SharedConfig::default();
        let app = router(shared.clone());

        let (_, body) = get_json(app.clone(), "/readyz").await;
        assert_eq!(body["activeRules"], 0);

        shared
            .replace(CleanupConfiguration {
                dry_run: true,
                batch_size: 4,
                pod_cleanup_config: PodCleanupConfig {
                    enabled: true,
                    rules: vec![CleanupRule {
                        name: "r".to_string(),
                        enabled: true,
                        ..Default::default()
                    }],
                },
            })
            .await;

        let (status, body) = get_json(app, "/readyz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["activeRules"], 1);
        assert_eq!(body["dryRun"], true);
        assert_eq!(body["batchSize"], 4);
    }
}
