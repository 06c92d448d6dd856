//! Diagnostics dump for an entry, with credentials and serials redacted

use crate::coordinator::Coordinator;
use crate::entry::ConfigEntry;
use serde_json::{Map, Value, json};

pub const TO_REDACT: [&str; 4] = ["password", "username", "ecu_id", "serial_number"];
pub const REDACTED: &str = "**REDACTED**";

/// Replace every value under a redacted key, at any depth
pub fn redact(value: &Value, keys: &[&str]) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let v = if keys.contains(&k.as_str()) {
                        Value::String(REDACTED.to_string())
                    } else {
                        redact(v, keys)
                    };
                    (k.clone(), v)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|v| redact(v, keys)).collect()),
        other => other.clone(),
    }
}

pub fn entry_diagnostics(entry: &ConfigEntry, coordinator: &Coordinator) -> Value {
    let entry_data = serde_json::to_value(&entry.data).unwrap_or(Value::Null);
    let latest = coordinator.latest_data();
    let data = if latest.is_empty() {
        Value::Null
    } else {
        redact(&Value::Object(Map::clone(&latest)), &TO_REDACT)
    };

    let mut coordinator_info = json!({
        "device_id": coordinator.device_id(),
        "device_name": coordinator.device_name(),
        "firmware_version": coordinator.firmware_version(),
        "is_leader": coordinator.is_leader(),
        "last_update_success": coordinator.last_update_success(),
        "data": data,
    });
    if coordinator.is_leader() {
        coordinator_info["cluster_id"] = Value::String(coordinator.cluster_id());
        coordinator_info["cluster_name"] = Value::String(coordinator.cluster_name());
    }

    json!({
        "entry": {
            "entry_id": entry.entry_id,
            "version": entry.version,
            "domain": entry.domain,
            "title": entry.title,
            "data": redact(&entry_data, &TO_REDACT),
            "unique_id": entry.unique_id,
        },
        "coordinator": coordinator_info,
    })
}
