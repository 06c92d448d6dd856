//! Shared device fixtures for the integration tests
#![allow(dead_code)]

use homevolt_local::api::{HomevoltApi, RetryPolicy};
use homevolt_local::config::{DeviceConfig, RequestConfig};
use homevolt_local::entry::{ConfigEntry, SetupOptions};
use mockito::{Mock, ServerGuard};
use serde_json::{Value, json};
use std::time::Duration;

/// Request settings without backoff waits or retries
pub fn fast_request_config() -> RequestConfig {
    RequestConfig {
        timeout_secs: 5,
        max_retries: 0,
        retry_base_delay_ms: 0,
        retry_max_delay_ms: 0,
        retry_jitter: 0.0,
        cache_expiry_secs: 600,
    }
}

pub fn fast_api(server: &ServerGuard) -> HomevoltApi {
    HomevoltApi::new(&server.url(), None, None, None).with_retry_policy(RetryPolicy::immediate(3))
}

pub fn device_for(server: &ServerGuard) -> DeviceConfig {
    DeviceConfig {
        host: server.url(),
        username: None,
        password: None,
    }
}

pub fn entry_for(server: &ServerGuard) -> ConfigEntry {
    ConfigEntry::new("Homevolt ecu123", Some("ecu123".into()), device_for(server))
}

pub fn setup_options() -> SetupOptions {
    SetupOptions {
        session: None,
        request: fast_request_config(),
        poll_interval: Duration::from_secs(3600),
    }
}

pub fn status_json() -> Value {
    json!({
        "up_time": 86_400_000,
        "firmware": {"esp": "2.5.0"},
        "wifi_status": {"connected": true, "ssid": "home", "rssi": -58},
        "lte_status": {"operator_name": "", "rssi": null}
    })
}

pub fn single_ems_json() -> Value {
    json!({
        "ems": [{
            "ecu_id": "ecu123",
            "ecu_host": "",
            "op_state_str": "Running",
            "ems_data": {
                "soc_avg": 6500, "power": 1500, "energy_produced": 2000,
                "energy_consumed": 1000, "frequency": 50010, "sys_temp": 310,
                "avail_cap": 9000, "state_str": "Charging",
                "alarm_str": [], "warning_str": ["Low temp"], "info_str": []
            },
            "ems_info": {"fw_version": "3.2.1", "rated_power": 6000, "serial_number": "SN1"},
            "bms_data": [{"soc": 65, "serial_number": "B1"}],
            "ems_prediction": {"avail_ch_pwr": 5000}
        }],
        "sensors": [
            {"type": "grid", "total_power": -300, "energy_imported": 1200.5, "energy_exported": 300.1, "rssi": -70}
        ]
    })
}

/// Leader of a two-unit cluster
pub fn leader_ems_json() -> Value {
    json!({
        "ems": [
            {"ecu_id": "ecu123", "ecu_host": "", "ems_data": {"power": 1500, "soc_avg": 6000},
             "ems_info": {"rated_power": 6000}},
            {"ecu_id": "ecu456", "ecu_host": "10.0.0.8", "ems_data": {"power": 1000, "soc_avg": 7000},
             "ems_info": {"rated_power": 6000}}
        ],
        "aggregated": {"ems_data": {"power": 2500, "soc_avg": 6500}, "ems_info": {"rated_power": 12000}},
        "sensors": []
    })
}

pub fn params_json() -> Value {
    json!([
        {"name": "settings_local", "value": [true]},
        {"name": "ecu_main_fuse_size_a", "value": [25]},
        {"name": "ledstrip_mode", "value": ["soc"]},
        {"name": "mqtt_valid", "value": [true]},
        {"name": "ecu_mdns_instance_name", "value": [""]}
    ])
}

pub fn schedule_json(local_mode: bool) -> Value {
    json!({"local_mode": local_mode, "schedule_id": "s1", "schedule": []})
}

async fn get_mock(server: &mut ServerGuard, path: &str, body: &Value) -> Mock {
    server
        .mock("GET", path)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
        .create_async()
        .await
}

/// GET mocks for every aggregate endpoint
pub async fn mock_device(server: &mut ServerGuard, ems: Value, local_mode: bool) -> Vec<Mock> {
    vec![
        get_mock(server, "/status.json", &status_json()).await,
        get_mock(server, "/ems.json", &ems).await,
        get_mock(server, "/mains_data.json", &json!({"mains_voltage_rms": 230.1, "frequency": 50.0})).await,
        get_mock(server, "/params.json", &params_json()).await,
        get_mock(server, "/schedule.json", &schedule_json(local_mode)).await,
        get_mock(server, "/ota_manifest.json", &json!({"version": "3.3.0"})).await,
    ]
}

/// Console reply the firmware gives for a successful command
pub fn console_ok(command: &str) -> String {
    json!({"command": command, "output": "OK", "exit_code": 0}).to_string()
}
