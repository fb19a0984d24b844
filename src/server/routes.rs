//! The HTTP adapter (`spec.md` §6): `POST /sync`, `GET /info`, and the ambient
//! `GET /metrics` scrape endpoint. Each handler is a thin translation layer —
//! all decisions are made by [`crate::sync_manager::SyncManager`].

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::metrics;
use crate::model::ElectPeer;
use crate::server::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/sync", post(sync))
        .route("/info", get(info))
        .route("/metrics", get(metrics_handler))
        .with_state(Arc::new(state))
}

/// Receive the peer sentinel's gossip message, fold it into our election
/// state, and reply with our own current view — the same schema, so the
/// sender can treat the response exactly like an unsolicited `/sync` POST.
async fn sync(State(state): State<Arc<AppState>>, Json(body): Json<ElectPeer>) -> impl IntoResponse {
    state.sync_manager.handle(body).await;
    Json(state.sync_manager.get())
}

#[derive(Serialize)]
struct InfoResponse {
    #[serde(rename = "ElectPeer")]
    elect_peer: ElectPeer,
    #[serde(rename = "IsMaster")]
    is_master: bool,
    /// The elected endpoint master's proxied (data-plane) address, when known.
    /// `None` before any endpoint has been elected, or if the endpoint has no
    /// proxied address configured.
    #[serde(rename = "EPMasterProxiedAddr", skip_serializing_if = "Option::is_none")]
    ep_master_proxied_addr: Option<String>,
}

async fn info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let ep_master_proxied_addr = state
        .sync_manager
        .sentinel()
        .get_master_peer()
        .and_then(|peer| peer.proxied_addr);
    Json(InfoResponse {
        elect_peer: state.sync_manager.get(),
        is_master: state.sync_manager.is_master(),
        ep_master_proxied_addr,
    })
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let body = metrics::render(&state.sync_manager);
    ([(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tower::ServiceExt;

    use crate::endpoint_monitor::{EndpointMonitor, EndpointMonitorConfig};
    use crate::sentinel::Sentinel;
    use crate::sync_manager::SyncManager;

    fn app() -> Router {
        let monitor = EndpointMonitor::new(
            &[],
            0,
            EndpointMonitorConfig {
                interval: Duration::from_secs(60),
                timeout: Duration::from_secs(1),
                url: "/health".to_string(),
                failure_count: 1,
                recover_count: 1,
                check_code: true,
            },
        );
        let sentinel = Sentinel::new(monitor, "/to_master", "/to_slave", Duration::from_millis(1));
        let sync_manager = SyncManager::new("10.0.0.1:9000", "10.0.0.2:9000", Duration::from_secs(1), 3, 2, sentinel);
        router(AppState { sync_manager })
    }

    #[tokio::test]
    async fn info_reports_pending_init_before_any_election() {
        let resp = app()
            .oneshot(axum::http::Request::get("/info").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), axum::http::StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v["IsMaster"], false);
        assert_eq!(v["ElectPeer"]["Type"], "init");
    }

    #[tokio::test]
    async fn sync_handles_an_inbound_election_message() {
        let body = serde_json::json!({
            "PeerId": "10.0.0.1:9000",
            "Time": chrono::Utc::now(),
            "Type": "init",
            "EPMasterId": "",
        });
        let resp = app()
            .oneshot(
                axum::http::Request::post("/sync")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_endpoint_serves_prometheus_text() {
        let resp = app()
            .oneshot(axum::http::Request::get("/metrics").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), axum::http::StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("sentinel_on_duty"));
    }
}
