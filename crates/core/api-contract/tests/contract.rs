use api_contract::{
    ApiResponse, DeviceStatusDto, StationStatusDto, SystemCommandResponse, UploadQueueEntryDto,
};
use serde_json::Value;

fn device(name: &str, connected: bool) -> DeviceStatusDto {
    DeviceStatusDto {
        device: name.to_string(),
        state: if connected { "Connected" } else { "Disconnected" }.to_string(),
        connected,
        configured: true,
    }
}

#[test]
fn station_status_is_camel_case() {
    let status = StationStatusDto {
        running: true,
        handshake_state: "ScanConfirmed".to_string(),
        current_barcode: Some("SN-0001".to_string()),
        devices: vec![device("PLC", true), device("LinePC", false)],
        current_sample: None,
        partial_records: 3,
        unsaved_records: 1,
        retryable_uploads: 1,
        needs_attention: 2,
        failed_records: 2,
    };
    let value = serde_json::to_value(status).expect("serialize");
    assert_eq!(value["handshakeState"], "ScanConfirmed");
    assert_eq!(value["currentBarcode"], "SN-0001");
    assert_eq!(value["partialRecords"], 3);
    assert_eq!(value["unsavedRecords"], 1);
    assert_eq!(value["needsAttention"], 2);
    assert_eq!(value["devices"][1]["device"], "LinePC");
    assert_eq!(value["devices"][1]["connected"], false);
    assert!(value["currentSample"].is_null());
    assert!(value.get("handshake_state").is_none());
}

#[test]
fn queue_entry_round_trips_through_envelope() {
    let response = ApiResponse::success(vec![UploadQueueEntryDto {
        record_id: "0b9e3c1a-5d0f-4a57-9a43-3f1f6f0c2a11".to_string(),
        barcode: "SN-STUCK".to_string(),
        retry_count: 5,
        created_at_ms: 1_700_000_000_000,
        last_attempt_ms: 1_700_000_060_000,
    }]);
    let value = serde_json::to_value(&response).expect("serialize");
    assert_eq!(value["success"], true);
    assert!(value["error"].is_null());
    assert_eq!(value["data"][0]["retryCount"], 5);
    assert_eq!(
        value["data"][0]["recordId"],
        "0b9e3c1a-5d0f-4a57-9a43-3f1f6f0c2a11"
    );
    assert_eq!(value["data"][0]["lastAttemptMs"], 1_700_000_060_000_i64);
}

#[test]
fn system_command_response_parses() {
    let payload = r#"{"running":false,"message":"system stopped"}"#;
    let response: SystemCommandResponse = serde_json::from_str(payload).expect("parse");
    assert!(!response.running);
    assert_eq!(response.message, "system stopped");

    let error = serde_json::to_value(ApiResponse::<()>::error("DEVICE.UNAVAILABLE", "plc connection failed"))
        .expect("serialize");
    assert_eq!(error["error"]["code"], "DEVICE.UNAVAILABLE");
    assert_eq!(error["data"], Value::Null);
}
