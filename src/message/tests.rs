use super::*;
use serde_json::json;

fn noise_message() -> DeviceMessage {
    serde_json::from_value(json!({
        "name": "NoiseSensor",
        "topic": "safetyenvironmental",
        "uuid": "7fc17e8f-1e1c-43f8-a2d1-9ff4bcfbf9ff",
        "timestamp": "2024-03-01T10:15:00",
        "category": "DATA",
        "module_uuids": ["b1d7e0a4-0001"],
        "data": {
            "noise_sensor": { "noise": 70.2, "uuid": "b1d7e0a4-0001" }
        }
    }))
    .unwrap()
}

#[test]
fn test_decode_data_message() {
    let msg = noise_message();
    assert_eq!(msg.category, Category::Data);
    assert_eq!(msg.module_uuids, vec!["b1d7e0a4-0001"]);
    assert!(validate(&msg).is_ok());

    let modules: Vec<_> = msg.modules().collect();
    assert_eq!(modules.len(), 1);
    assert_eq!(modules[0].name, "noise_sensor");
    assert_eq!(modules[0].uuid, Some("b1d7e0a4-0001"));

    let values: Vec<_> = modules[0].values().collect();
    assert_eq!(values.len(), 1);
    assert_eq!(values[0].0, "noise");
}

#[test]
fn test_announcement_has_no_payload() {
    let msg = DeviceMessage::announcement("SmokeSensor", "safetyenvironmental", "abc", Category::Connected);
    let encoded = serde_json::to_value(&msg).unwrap();
    assert_eq!(encoded["category"], json!("CONNECTED"));
    assert!(encoded.get("data").is_none());
    assert!(encoded.get("module_uuids").is_none());
    assert!(validate(&msg).is_ok());
}

#[test]
fn test_data_constructor_injects_module_uuids_in_order() {
    let mut first = Map::new();
    first.insert("temperature".to_string(), json!(20.1));
    let mut second = Map::new();
    second.insert("pm25".to_string(), json!(9.2));

    let uuids = vec!["m-1".to_string(), "m-2".to_string()];
    let msg = DeviceMessage::data(
        "AirQualityModified",
        "safetyenvironmental",
        "dev",
        vec![
            ("temperature_humidity_sensor".to_string(), first),
            ("air_quality_sensor".to_string(), second),
        ],
        &uuids,
    );

    let keys: Vec<_> = msg.data.keys().cloned().collect();
    assert_eq!(keys, vec!["temperature_humidity_sensor", "air_quality_sensor"]);
    assert_eq!(msg.module_uuids, uuids);
    assert_eq!(msg.data["air_quality_sensor"]["uuid"], json!("m-2"));
    assert!(validate(&msg).is_ok());
}

#[test]
fn test_module_uuid_falls_back_to_position() {
    let msg: DeviceMessage = serde_json::from_value(json!({
        "name": "SmokeSensor",
        "topic": "safetyenvironmental",
        "uuid": "5a84f26b",
        "timestamp": "2024-03-01T10:15:00",
        "category": "DATA",
        "module_uuids": ["smoke-module"],
        "data": { "smoke_sensor": { "smoke": false } }
    }))
    .unwrap();

    let entry = msg.modules().next().unwrap();
    assert_eq!(entry.uuid, Some("smoke-module"));
}

#[test]
fn test_missing_header_fields() {
    let mut msg = noise_message();
    msg.uuid.clear();
    assert_eq!(validate(&msg), Err(ValidationError::MissingUuid));

    let mut msg = noise_message();
    msg.name.clear();
    assert_eq!(validate(&msg), Err(ValidationError::MissingName));

    let mut msg = noise_message();
    msg.timestamp = "yesterday".to_string();
    assert!(matches!(validate(&msg), Err(ValidationError::InvalidTimestamp(_))));
}

#[test]
fn test_module_count_mismatch() {
    let mut msg = noise_message();
    msg.module_uuids.push("extra".to_string());
    assert_eq!(
        validate(&msg),
        Err(ValidationError::ModuleCountMismatch { uuids: 2, modules: 1 })
    );
}

#[test]
fn test_module_must_be_object() {
    let mut msg = noise_message();
    msg.data.insert("noise_sensor".to_string(), json!(70.0));
    assert!(matches!(validate(&msg), Err(ValidationError::ModuleNotObject(_))));
}

#[test]
fn test_unknown_category_rejected_by_decoder() {
    let result: Result<DeviceMessage, _> = serde_json::from_value(json!({
        "name": "NoiseSensor",
        "topic": "safetyenvironmental",
        "uuid": "x",
        "timestamp": "2024-03-01T10:15:00",
        "category": "REBOOTED"
    }));
    assert!(result.is_err());
}

#[test]
fn test_short_uuid() {
    assert_eq!(short_uuid("7fc17e8f-1e1c"), "7fc17e");
    assert_eq!(short_uuid("abc"), "abc");
}
