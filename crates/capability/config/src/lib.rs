//! 工位运行配置加载。

use std::env;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 工位运行配置。
#[derive(Debug, Clone)]
pub struct StationConfig {
    pub http_addr: String,
    pub database_url: String,
    pub log_level: String,
    // 设备端点
    pub plc_host: String,
    pub plc_port: u16,
    pub plc_unit_id: u8,
    pub scanner_host: Option<String>,
    pub scanner_port: Option<u16>,
    pub axis_host: Option<String>,
    pub axis_port: Option<u16>,
    pub axis_register_port: u16,
    pub axis_unit_id: u8,
    pub line_pc_listen_addr: String,
    pub line_pc_listen_port: Option<u16>,
    pub connect_timeout_ms: u64,
    pub operation_timeout_ms: u64,
    pub buffer_size: usize,
    /// 上位机单帧上限（字节），超长帧整行丢弃
    pub line_pc_max_frame_bytes: usize,
    // PLC 握手
    pub plc_poll_interval_ms: u64,
    pub scan_timeout_ms: u64,
    pub plc_reg_scan_trigger: u16,
    pub plc_reg_tightening_trigger: u16,
    pub plc_reg_scan_result: u16,
    pub plc_reg_tightening_result: u16,
    pub plc_reg_heartbeat: u16,
    // 拧紧轴
    pub axis_reg_base: u16,
    pub axis_poll_interval_ms: u64,
    pub axis_failure_threshold: u32,
    pub axis_recovery_delay_ms: u64,
    pub axis_validate_on_init: bool,
    pub axis_max_operation_timeout_seconds: u64,
    pub axis_max_reconnect_attempts: u32,
    pub reconnect_interval_seconds: u64,
    pub target_torque: f32,
    pub torque_lower_limit: f32,
    pub torque_upper_limit: f32,
    // 上传与重试
    pub upload_url: Option<String>,
    pub upload_timeout_ms: u64,
    pub retry_max_retries: u32,
    pub retry_interval_seconds: u64,
    pub retry_batch_size: usize,
}

impl StationConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let plc_host = read_optional("STATION_PLC_HOST")
            .ok_or_else(|| ConfigError::Missing("STATION_PLC_HOST".to_string()))?;
        let http_addr =
            env::var("STATION_HTTP_ADDR").unwrap_or_else(|_| "127.0.0.1:8090".to_string());
        let database_url = env::var("STATION_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://station.db?mode=rwc".to_string());
        let log_level = env::var("STATION_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let target_torque = read_f32_with_default("STATION_TARGET_TORQUE", 29.0)?;
        let torque_lower_limit = read_f32_with_default("STATION_TORQUE_LOWER_LIMIT", 28.0)?;
        let torque_upper_limit = read_f32_with_default("STATION_TORQUE_UPPER_LIMIT", 30.0)?;
        if torque_lower_limit > torque_upper_limit {
            return Err(ConfigError::Invalid(
                "STATION_TORQUE_LOWER_LIMIT".to_string(),
                format!("{} > upper limit {}", torque_lower_limit, torque_upper_limit),
            ));
        }

        Ok(Self {
            http_addr,
            database_url,
            log_level,
            plc_host,
            plc_port: read_with_default("STATION_PLC_PORT", 502)?,
            plc_unit_id: read_with_default("STATION_PLC_UNIT_ID", 1)?,
            scanner_host: read_optional("STATION_SCANNER_HOST"),
            scanner_port: read_optional_parsed("STATION_SCANNER_PORT")?,
            axis_host: read_optional("STATION_AXIS_HOST"),
            axis_port: read_optional_parsed("STATION_AXIS_PORT")?,
            axis_register_port: read_with_default("STATION_AXIS_REGISTER_PORT", 502)?,
            axis_unit_id: read_with_default("STATION_AXIS_UNIT_ID", 1)?,
            line_pc_listen_addr: env::var("STATION_LINE_PC_LISTEN_ADDR")
                .unwrap_or_else(|_| "0.0.0.0".to_string()),
            line_pc_listen_port: read_optional_parsed("STATION_LINE_PC_LISTEN_PORT")?,
            connect_timeout_ms: read_with_default("STATION_CONNECT_TIMEOUT_MS", 3000)?,
            operation_timeout_ms: read_with_default("STATION_OPERATION_TIMEOUT_MS", 1000)?,
            buffer_size: read_with_default("STATION_BUFFER_SIZE", 4096)?,
            line_pc_max_frame_bytes: read_with_default("STATION_LINE_PC_MAX_FRAME_BYTES", 65_536)?,
            plc_poll_interval_ms: read_with_default("STATION_PLC_POLL_INTERVAL_MS", 100)?,
            scan_timeout_ms: read_with_default("STATION_SCAN_TIMEOUT_MS", 10_000)?,
            plc_reg_scan_trigger: read_with_default("STATION_PLC_REG_SCAN_TRIGGER", 0)?,
            plc_reg_tightening_trigger: read_with_default("STATION_PLC_REG_TIGHTENING_TRIGGER", 1)?,
            plc_reg_scan_result: read_with_default("STATION_PLC_REG_SCAN_RESULT", 2)?,
            plc_reg_tightening_result: read_with_default("STATION_PLC_REG_TIGHTENING_RESULT", 3)?,
            plc_reg_heartbeat: read_with_default("STATION_PLC_REG_HEARTBEAT", 4)?,
            axis_reg_base: read_with_default("STATION_AXIS_REG_BASE", 0)?,
            axis_poll_interval_ms: read_with_default("STATION_AXIS_POLL_INTERVAL_MS", 2000)?,
            axis_failure_threshold: read_with_default("STATION_AXIS_FAILURE_THRESHOLD", 3)?,
            axis_recovery_delay_ms: read_with_default("STATION_AXIS_RECOVERY_DELAY_MS", 5000)?,
            axis_validate_on_init: read_bool_with_default("STATION_AXIS_VALIDATE_ON_INIT", true),
            axis_max_operation_timeout_seconds: read_with_default(
                "STATION_AXIS_MAX_OPERATION_TIMEOUT_SECONDS",
                30,
            )?,
            axis_max_reconnect_attempts: read_with_default(
                "STATION_AXIS_MAX_RECONNECT_ATTEMPTS",
                3,
            )?,
            reconnect_interval_seconds: read_with_default("STATION_RECONNECT_INTERVAL_SECONDS", 10)?,
            target_torque,
            torque_lower_limit,
            torque_upper_limit,
            upload_url: read_optional("STATION_UPLOAD_URL"),
            upload_timeout_ms: read_with_default("STATION_UPLOAD_TIMEOUT_MS", 5000)?,
            retry_max_retries: read_with_default("STATION_RETRY_MAX_RETRIES", 5)?,
            retry_interval_seconds: read_with_default("STATION_RETRY_INTERVAL_SECONDS", 60)?,
            retry_batch_size: read_with_default("STATION_RETRY_BATCH_SIZE", 20)?,
        })
    }

    /// 条码枪是否已配置。
    pub fn scanner_configured(&self) -> bool {
        self.scanner_host.is_some() && self.scanner_port.is_some()
    }

    /// 拧紧轴是否已配置。
    pub fn axis_configured(&self) -> bool {
        self.axis_host.is_some()
    }
}

/// 读取带默认值的数值类型环境变量。
fn read_with_default<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    let value = match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => return Ok(default),
    };
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_f32_with_default(key: &str, default: f32) -> Result<f32, ConfigError> {
    let parsed = read_with_default(key, default)?;
    if !parsed.is_finite() {
        return Err(ConfigError::Invalid(key.to_string(), parsed.to_string()));
    }
    Ok(parsed)
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn read_optional_parsed<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(value) if value.is_empty() => Ok(None),
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(key.to_string(), value)),
        Err(_) => Ok(None),
    }
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}
