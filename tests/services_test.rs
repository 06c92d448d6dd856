mod common;

use common::{console_ok, entry_for, leader_ems_json, mock_device, setup_options, single_ems_json};
use homevolt_local::entry::setup_entry;
use homevolt_local::error::HomevoltError;
use homevolt_local::services::{ServiceCall, ServiceRegistry};
use mockito::{Matcher, Server};
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn charge_service_reaches_the_device() {
    let mut server = Server::new_async().await;
    let _mocks = mock_device(&mut server, single_ems_json(), true).await;
    let loaded = setup_entry(entry_for(&server), setup_options()).await.unwrap();
    let registry = ServiceRegistry::new();
    registry.register(Arc::clone(&loaded.coordinator));

    let console = server
        .mock("POST", "/console.json")
        .match_body(Matcher::UrlEncoded(
            "cmd".into(),
            "sched_set 1 -s 2000 --min 20 --max 80".into(),
        ))
        .with_status(200)
        .with_body(console_ok("sched_set 1 -s 2000 --min 20 --max 80"))
        .expect(1)
        .create_async()
        .await;

    let call = ServiceCall::from_parts(
        "set_charge",
        json!({"device_id": "ecu123", "setpoint": 2000, "min_soc": 20, "max_soc": 80}),
    )
    .unwrap();
    registry.call(&call).await.unwrap();
    console.assert_async().await;
}

#[tokio::test]
async fn cluster_id_resolves_to_the_leader() {
    let mut server = Server::new_async().await;
    let _mocks = mock_device(&mut server, leader_ems_json(), true).await;
    let loaded = setup_entry(entry_for(&server), setup_options()).await.unwrap();
    let registry = ServiceRegistry::new();
    registry.register(Arc::clone(&loaded.coordinator));

    let console = server
        .mock("POST", "/console.json")
        .match_body(Matcher::UrlEncoded(
            "cmd".into(),
            "sched_set 5 -s 0 -c 3000 -d 2000".into(),
        ))
        .with_status(200)
        .with_body(console_ok("sched_set 5 -s 0 -c 3000 -d 2000"))
        .expect(1)
        .create_async()
        .await;

    let call = ServiceCall::from_parts(
        "set_grid_charge_discharge",
        json!({
            "device_id": "ecu123_cluster",
            "setpoint": 0,
            "charge_setpoint": 3000,
            "discharge_setpoint": 2000
        }),
    )
    .unwrap();
    registry.call(&call).await.unwrap();
    console.assert_async().await;
}

#[tokio::test]
async fn idle_offline_and_clear_schedule() {
    let mut server = Server::new_async().await;
    let _mocks = mock_device(&mut server, single_ems_json(), true).await;
    let loaded = setup_entry(entry_for(&server), setup_options()).await.unwrap();
    let registry = ServiceRegistry::new();
    registry.register(Arc::clone(&loaded.coordinator));

    let idle = server
        .mock("POST", "/console.json")
        .match_body(Matcher::UrlEncoded("cmd".into(), "sched_set 0 --offline".into()))
        .with_status(200)
        .with_body(console_ok("sched_set 0 --offline"))
        .expect(1)
        .create_async()
        .await;
    let clear = server
        .mock("POST", "/console.json")
        .match_body(Matcher::UrlEncoded("cmd".into(), "sched_clear".into()))
        .with_status(200)
        .with_body(console_ok("sched_clear"))
        .expect(1)
        .create_async()
        .await;

    let idle_call =
        ServiceCall::from_parts("set_idle", json!({"device_id": "ecu123", "offline": true})).unwrap();
    registry.call(&idle_call).await.unwrap();
    let clear_call =
        ServiceCall::from_parts("clear_schedule", json!({"device_id": "ecu123"})).unwrap();
    registry.call(&clear_call).await.unwrap();

    idle.assert_async().await;
    clear.assert_async().await;
}

#[tokio::test]
async fn remote_mode_blocks_services() {
    let mut server = Server::new_async().await;
    let _mocks = mock_device(&mut server, single_ems_json(), false).await;
    let loaded = setup_entry(entry_for(&server), setup_options()).await.unwrap();
    let registry = ServiceRegistry::new();
    registry.register(Arc::clone(&loaded.coordinator));
    let console = server
        .mock("POST", "/console.json")
        .expect(0)
        .create_async()
        .await;

    let call = ServiceCall::from_parts("set_discharge", json!({"device_id": "ecu123"})).unwrap();
    let err = registry.call(&call).await.unwrap_err();
    assert!(matches!(err, HomevoltError::NotLocalMode { .. }));
    console.assert_async().await;
}

#[tokio::test]
async fn unknown_device_is_not_found() {
    let mut server = Server::new_async().await;
    let _mocks = mock_device(&mut server, single_ems_json(), true).await;
    let loaded = setup_entry(entry_for(&server), setup_options()).await.unwrap();
    let registry = ServiceRegistry::new();
    registry.register(Arc::clone(&loaded.coordinator));

    let call = ServiceCall::from_parts("set_charge", json!({"device_id": "other"})).unwrap();
    let err = registry.call(&call).await.unwrap_err();
    assert!(matches!(err, HomevoltError::NotFound { .. }));

    assert!(registry.unregister(&loaded.coordinator));
    assert!(registry.is_empty());
    let call = ServiceCall::from_parts("set_charge", json!({"device_id": "ecu123"})).unwrap();
    assert!(matches!(
        registry.call(&call).await,
        Err(HomevoltError::NotFound { .. })
    ));
}

#[test]
fn malformed_calls_are_rejected() {
    assert!(matches!(
        ServiceCall::from_parts("set_turbo", json!({"device_id": "x"})),
        Err(HomevoltError::NotFound { .. })
    ));
    assert!(matches!(
        ServiceCall::from_parts("set_charge", json!(["x"])),
        Err(HomevoltError::Validation { .. })
    ));
    assert!(matches!(
        ServiceCall::from_parts("set_charge", json!({"setpoint": 100})),
        Err(HomevoltError::Validation { .. })
    ));
    // grid charge/discharge needs a baseline setpoint
    assert!(matches!(
        ServiceCall::from_parts("set_grid_charge_discharge", json!({"device_id": "x"})),
        Err(HomevoltError::Validation { .. })
    ));
}
