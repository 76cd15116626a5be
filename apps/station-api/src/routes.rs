//! 路由定义
//!
//! - 健康检查：/health
//! - 状态查询：/api/status, /api/metrics, /api/upload-queue/attention
//! - 系统指令：/api/system/start, /api/system/stop, /api/system/emergency-stop

use crate::AppState;
use crate::handlers::*;
use crate::middleware::request_context;
use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/status", get(get_status))
        .route("/api/metrics", get(get_metrics))
        .route("/api/upload-queue/attention", get(list_attention_entries))
        .route("/api/system/start", post(start_system))
        .route("/api/system/stop", post(stop_system))
        .route("/api/system/emergency-stop", post(emergency_stop))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        // 注入 request_id/trace_id
        .layer(middleware::from_fn(request_context))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::StationSession;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use domain::UploadQueueEntry;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use station_config::StationConfig;
    use station_pipeline::{Aggregator, AggregatorConfig, NoopUploadTransport};
    use station_storage::{InMemoryRecordStore, InMemoryUploadQueueStore, UploadQueueStore};
    use std::sync::Arc;
    use tokio::sync::broadcast;
    use tower::ServiceExt;

    fn test_config(plc_port: u16) -> StationConfig {
        StationConfig {
            http_addr: "127.0.0.1:0".to_string(),
            database_url: "sqlite::memory:".to_string(),
            log_level: "info".to_string(),
            plc_host: "127.0.0.1".to_string(),
            plc_port,
            plc_unit_id: 1,
            scanner_host: None,
            scanner_port: None,
            axis_host: None,
            axis_port: None,
            axis_register_port: 502,
            axis_unit_id: 1,
            line_pc_listen_addr: "127.0.0.1".to_string(),
            line_pc_listen_port: None,
            connect_timeout_ms: 500,
            operation_timeout_ms: 500,
            buffer_size: 1024,
            line_pc_max_frame_bytes: 65_536,
            plc_poll_interval_ms: 100,
            scan_timeout_ms: 1000,
            plc_reg_scan_trigger: 0,
            plc_reg_tightening_trigger: 1,
            plc_reg_scan_result: 2,
            plc_reg_tightening_result: 3,
            plc_reg_heartbeat: 4,
            axis_reg_base: 0,
            axis_poll_interval_ms: 100,
            axis_failure_threshold: 3,
            axis_recovery_delay_ms: 500,
            axis_validate_on_init: true,
            axis_max_operation_timeout_seconds: 5,
            axis_max_reconnect_attempts: 1,
            reconnect_interval_seconds: 1,
            target_torque: 29.0,
            torque_lower_limit: 28.0,
            torque_upper_limit: 30.0,
            upload_url: None,
            upload_timeout_ms: 1000,
            retry_max_retries: 2,
            retry_interval_seconds: 60,
            retry_batch_size: 20,
        }
    }

    async fn refused_port() -> u16 {
        let spare = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        spare.local_addr().unwrap().port()
    }

    fn app_with_queue(config: StationConfig, queue: Arc<InMemoryUploadQueueStore>) -> Router {
        let (events, _) = broadcast::channel(64);
        let aggregator = Aggregator::with_config(
            Arc::new(InMemoryRecordStore::new()),
            queue,
            Arc::new(NoopUploadTransport),
            AggregatorConfig {
                max_retries: config.retry_max_retries,
                ..AggregatorConfig::default()
            },
        )
        .with_events(events.clone());
        let session = Arc::new(StationSession::new(config, aggregator, events));
        create_router(AppState { session })
    }

    fn app(config: StationConfig) -> Router {
        app_with_queue(config, Arc::new(InMemoryUploadQueueStore::new()))
    }

    async fn call(app: Router, method: &str, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_carries_request_ids() {
        let response = app(test_config(502))
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        assert!(response.headers().contains_key("x-trace-id"));
    }

    #[tokio::test]
    async fn status_reports_idle_station() {
        let (status, body) = call(app(test_config(502)), "GET", "/api/status").await;
        assert_eq!(status, StatusCode::OK);
        let data = &body["data"];
        assert_eq!(data["running"], false);
        assert_eq!(data["handshakeState"], "Idle");
        assert_eq!(data["devices"].as_array().unwrap().len(), 4);
        assert_eq!(data["devices"][0]["device"], "PLC");
        assert_eq!(data["devices"][0]["configured"], true);
        assert_eq!(data["devices"][1]["configured"], false);
        assert!(data["currentSample"].is_null());
    }

    #[tokio::test]
    async fn stop_without_start_conflicts() {
        let app = app(test_config(502));
        let (status, body) = call(app.clone(), "POST", "/api/system/stop").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "SYSTEM.STATE_CONFLICT");

        let (status, _) = call(app, "POST", "/api/system/emergency-stop").await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn start_fails_when_plc_unreachable() {
        let app = app(test_config(refused_port().await));
        let (status, body) = call(app.clone(), "POST", "/api/system/start").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"]["code"], "DEVICE.UNAVAILABLE");

        let (_, body) = call(app, "GET", "/api/status").await;
        assert_eq!(body["data"]["running"], false);
    }

    #[tokio::test]
    async fn metrics_snapshot_is_exposed() {
        let (status, body) = call(app(test_config(502)), "GET", "/api/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"]["uploadFailure"].is_u64());
        assert!(body["data"]["connectionDrops"].is_u64());
    }

    #[tokio::test]
    async fn attention_lists_exhausted_entries() {
        let queue = Arc::new(InMemoryUploadQueueStore::new());
        queue
            .enqueue(UploadQueueEntry::new("rec-stuck", "SN-STUCK", "{}", 1))
            .await
            .unwrap();
        queue
            .enqueue(UploadQueueEntry::new("rec-fresh", "SN-FRESH", "{}", 2))
            .await
            .unwrap();
        queue.record_failure("rec-stuck", 10).await.unwrap();
        queue.record_failure("rec-stuck", 20).await.unwrap();

        let app = app_with_queue(test_config(502), queue);
        let (status, body) = call(app.clone(), "GET", "/api/upload-queue/attention").await;
        assert_eq!(status, StatusCode::OK);
        let entries = body["data"].as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["barcode"], "SN-STUCK");
        assert_eq!(entries[0]["recordId"], "rec-stuck");
        assert_eq!(entries[0]["retryCount"], 2);

        let (_, body) = call(app, "GET", "/api/status").await;
        assert_eq!(body["data"]["needsAttention"], 1);
        assert_eq!(body["data"]["retryableUploads"], 1);
    }
}
