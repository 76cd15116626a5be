use station_config::{ConfigError, StationConfig};

// 环境变量是进程级共享状态，所有断言放在同一个测试里顺序执行。
#[test]
fn load_config_from_env() {
    // Rust 2024 中 set_var 需要显式标注 unsafe（测试进程内可控）。
    unsafe {
        std::env::remove_var("STATION_PLC_HOST");
    }
    assert!(matches!(
        StationConfig::from_env(),
        Err(ConfigError::Missing(key)) if key == "STATION_PLC_HOST"
    ));

    unsafe {
        std::env::set_var("STATION_PLC_HOST", "192.168.0.10");
        std::env::set_var("STATION_HTTP_ADDR", "127.0.0.1:8091");
        std::env::set_var("STATION_SCANNER_HOST", "192.168.0.11");
        std::env::set_var("STATION_SCANNER_PORT", "9004");
        std::env::set_var("STATION_AXIS_VALIDATE_ON_INIT", "false");
        std::env::set_var("STATION_TARGET_TORQUE", "12.5");
    }

    let config = StationConfig::from_env().expect("config");
    assert_eq!(config.http_addr, "127.0.0.1:8091");
    assert_eq!(config.plc_host, "192.168.0.10");
    assert_eq!(config.plc_port, 502);
    assert_eq!(config.plc_poll_interval_ms, 100);
    assert_eq!(config.axis_poll_interval_ms, 2000);
    assert_eq!(config.axis_failure_threshold, 3);
    assert_eq!(config.axis_recovery_delay_ms, 5000);
    assert_eq!(config.retry_max_retries, 5);
    assert_eq!(config.plc_reg_heartbeat, 4);
    assert_eq!(config.line_pc_max_frame_bytes, 65_536);
    assert!(!config.axis_validate_on_init);
    assert!(config.scanner_configured());
    assert!(!config.axis_configured());
    assert!((config.target_torque - 12.5).abs() < f32::EPSILON);
    assert!(config.upload_url.is_none());

    unsafe {
        std::env::set_var("STATION_PLC_POLL_INTERVAL_MS", "fast");
    }
    assert!(matches!(
        StationConfig::from_env(),
        Err(ConfigError::Invalid(key, _)) if key == "STATION_PLC_POLL_INTERVAL_MS"
    ));
    unsafe {
        std::env::remove_var("STATION_PLC_POLL_INTERVAL_MS");
    }
}
