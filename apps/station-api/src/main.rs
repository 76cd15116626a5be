//! 拧紧工位控制器：装配会话与 HTTP 状态/指令接口。

mod events;
mod handlers;
mod middleware;
mod routes;
mod session;
mod utils;

use session::StationSession;
use station_config::StationConfig;
use station_pipeline::{
    Aggregator, AggregatorConfig, HttpUploadTransport, NoopUploadTransport, UploadTransport,
};
use station_storage::{SqliteRecordStore, SqliteUploadQueueStore, connect_pool};
use station_telemetry::init_tracing;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;

const EVENT_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct AppState {
    pub session: Arc<StationSession>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    let config = StationConfig::from_env()?;
    init_tracing();

    // 本地 SQLite：生产记录 + 上传重试队列
    let pool = connect_pool(&config.database_url).await?;
    let records = Arc::new(SqliteRecordStore::new(pool.clone()));
    let queue = Arc::new(SqliteUploadQueueStore::new(pool));

    // 未配置上传地址时走空通道
    let transport: Arc<dyn UploadTransport> = match &config.upload_url {
        Some(url) => Arc::new(HttpUploadTransport::new(
            url.clone(),
            Duration::from_millis(config.upload_timeout_ms),
        )?),
        None => Arc::new(NoopUploadTransport),
    };

    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    let aggregator = Aggregator::with_config(
        records,
        queue,
        transport,
        AggregatorConfig {
            max_retries: config.retry_max_retries,
            batch_size: config.retry_batch_size,
            retry_interval: Duration::from_secs(config.retry_interval_seconds),
            ..AggregatorConfig::default()
        },
    )
    .with_events(events.clone());

    let http_addr = config.http_addr.clone();
    let session = Arc::new(StationSession::new(config, aggregator, events));
    let app = routes::create_router(AppState {
        session: session.clone(),
    });

    let listener = tokio::net::TcpListener::bind(&http_addr).await?;
    info!(target: "station.api", addr = %http_addr, "http_listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if session.is_running().await {
        session.stop_system().await?;
    }
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
