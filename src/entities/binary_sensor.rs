//! Connectivity binary sensors

use super::params::{is_truthy_flag, param_bool};
use super::sensor::truthy;
use super::{EntityCategory, EntityMeta};
use crate::coordinator::DeviceData;
use serde_json::{Value, json};

#[derive(Debug, Clone, Copy)]
pub struct BinarySensorDescription {
    pub key: &'static str,
    pub meta: EntityMeta,
    is_on_fn: fn(&DeviceData) -> Option<bool>,
    attributes_fn: Option<fn(&DeviceData) -> Value>,
}

const CONNECTIVITY: EntityMeta = EntityMeta {
    device_class: Some("connectivity"),
    entity_category: Some(EntityCategory::Diagnostic),
    ..EntityMeta::EMPTY
};

fn status_section<'a>(data: &'a DeviceData, section: &str) -> Option<&'a Value> {
    data.get("status")?.get(section).filter(|v| v.is_object())
}

pub static BINARY_SENSORS: &[BinarySensorDescription] = &[
    BinarySensorDescription {
        key: "mqtt_valid",
        meta: CONNECTIVITY,
        is_on_fn: |data| param_bool(data.get("params")?, "mqtt_valid"),
        attributes_fn: None,
    },
    BinarySensorDescription {
        key: "wifi_connected",
        meta: CONNECTIVITY,
        is_on_fn: |data| {
            let connected = status_section(data, "wifi_status")?.get("connected")?;
            (!connected.is_null()).then(|| is_truthy_flag(connected))
        },
        attributes_fn: Some(|data| {
            let ssid = status_section(data, "wifi_status").and_then(|w| w.get("ssid"));
            if truthy(ssid) {
                json!({ "ssid": ssid })
            } else {
                json!({})
            }
        }),
    },
    BinarySensorDescription {
        key: "lte_connected",
        meta: CONNECTIVITY,
        is_on_fn: |data| {
            let operator = status_section(data, "lte_status")?.get("operator_name")?;
            (!operator.is_null()).then(|| truthy(Some(operator)))
        },
        attributes_fn: Some(|data| {
            let operator = status_section(data, "lte_status").and_then(|l| l.get("operator_name"));
            if truthy(operator) {
                json!({ "operator": operator })
            } else {
                json!({})
            }
        }),
    },
];

pub fn is_on(description: &BinarySensorDescription, data: &DeviceData) -> Option<bool> {
    (description.is_on_fn)(data)
}

pub fn attributes(description: &BinarySensorDescription, data: &DeviceData) -> Option<Value> {
    description.attributes_fn.map(|f| f(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find(key: &str) -> &'static BinarySensorDescription {
        BINARY_SENSORS
            .iter()
            .find(|d| d.key == key)
            .unwrap_or_else(|| panic!("no binary sensor {key}"))
    }

    fn data(value: Value) -> DeviceData {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn mqtt_from_params() {
        let d = data(json!({"params": [{"name": "mqtt_valid", "value": [true]}]}));
        assert_eq!(is_on(find("mqtt_valid"), &d), Some(true));
        assert_eq!(is_on(find("mqtt_valid"), &DeviceData::new()), None);
    }

    #[test]
    fn wifi_state_and_ssid() {
        let d = data(json!({"status": {"wifi_status": {"connected": true, "ssid": "home"}}}));
        assert_eq!(is_on(find("wifi_connected"), &d), Some(true));
        assert_eq!(attributes(find("wifi_connected"), &d), Some(json!({"ssid": "home"})));

        let d = data(json!({"status": {"wifi_status": {"connected": 0, "ssid": ""}}}));
        assert_eq!(is_on(find("wifi_connected"), &d), Some(false));
        assert_eq!(attributes(find("wifi_connected"), &d), Some(json!({})));

        let d = data(json!({"status": {"wifi_status": {}}}));
        assert_eq!(is_on(find("wifi_connected"), &d), None);
    }

    #[test]
    fn lte_follows_operator() {
        let d = data(json!({"status": {"lte_status": {"operator_name": "Telia"}}}));
        assert_eq!(is_on(find("lte_connected"), &d), Some(true));
        assert_eq!(attributes(find("lte_connected"), &d), Some(json!({"operator": "Telia"})));

        let d = data(json!({"status": {"lte_status": {"operator_name": ""}}}));
        assert_eq!(is_on(find("lte_connected"), &d), Some(false));

        assert_eq!(is_on(find("lte_connected"), &DeviceData::new()), None);
    }
}
