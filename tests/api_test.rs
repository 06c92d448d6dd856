mod common;

use common::{console_ok, fast_api, schedule_json};
use homevolt_local::api::{
    ControlMode, HomevoltApi, ManualClock, ModeParams, RetryPolicy, ScheduleEntry,
};
use homevolt_local::error::HomevoltError;
use mockito::{Matcher, Server};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn get_status_returns_json() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/status.json")
        .with_status(200)
        .with_body(r#"{"up_time": 1000}"#)
        .create_async()
        .await;

    let api = fast_api(&server);
    let status = api.get_status().await.unwrap();
    assert_eq!(status["up_time"], 1000);
    mock.assert_async().await;
}

#[tokio::test]
async fn unauthorized_is_not_retried() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/ems.json")
        .with_status(401)
        .expect(1)
        .create_async()
        .await;

    let err = fast_api(&server).get_ems().await.unwrap_err();
    assert!(matches!(err, HomevoltError::Auth { .. }));
    mock.assert_async().await;
}

#[tokio::test]
async fn rate_limit_is_not_retried() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/ems.json")
        .with_status(429)
        .expect(1)
        .create_async()
        .await;

    let err = fast_api(&server).get_ems().await.unwrap_err();
    assert!(matches!(err, HomevoltError::RateLimit { .. }));
    assert_eq!(err.translation_key(), "rate_limited");
    mock.assert_async().await;
}

#[tokio::test]
async fn server_errors_retry_then_fail_as_connection() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/status.json")
        .with_status(503)
        .expect(4)
        .create_async()
        .await;

    let err = fast_api(&server).request("/status.json", 3).await.unwrap_err();
    let HomevoltError::Connection { message } = &err else {
        panic!("expected connection error, got {err:?}");
    };
    assert!(message.contains("after 4 attempts"), "{message}");
    assert!(message.contains("Server error: 503"), "{message}");
    mock.assert_async().await;
}

#[tokio::test]
async fn other_client_errors_fail_immediately() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/nodes.json")
        .with_status(404)
        .expect(1)
        .create_async()
        .await;

    let err = fast_api(&server).get_nodes().await.unwrap_err();
    assert!(matches!(err, HomevoltError::Api { .. }));
    mock.assert_async().await;
}

#[tokio::test]
async fn invalid_json_is_an_api_error() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/status.json")
        .with_status(200)
        .with_body("<html>oops</html>")
        .expect(1)
        .create_async()
        .await;

    let err = fast_api(&server).request("/status.json", 3).await.unwrap_err();
    assert!(err.to_string().contains("Invalid JSON"), "{err}");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_connection_allows_one_retry() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/status.json")
        .with_status(500)
        .expect(2)
        .create_async()
        .await;

    assert!(fast_api(&server).test_connection().await.is_err());
    mock.assert_async().await;
}

#[tokio::test]
async fn cached_data_covers_failures_until_expiry() {
    let mut server = Server::new_async().await;
    let clock = Arc::new(ManualClock::new());
    let api = fast_api(&server).with_clock(clock.clone());

    let ok = server
        .mock("GET", "/mains_data.json")
        .with_status(200)
        .with_body(r#"{"frequency": 50.0}"#)
        .create_async()
        .await;
    assert_eq!(api.get_mains().await.unwrap()["frequency"], 50.0);
    ok.remove_async().await;

    let _mock = server
        .mock("GET", "/mains_data.json")
        .with_status(500)
        .create_async()
        .await;

    clock.advance(Duration::from_secs(599));
    assert_eq!(api.get_mains().await.unwrap()["frequency"], 50.0);
    assert!(api.get_cached("/mains_data.json").is_some());

    clock.advance(Duration::from_secs(1));
    assert!(api.get_cached("/mains_data.json").is_none());
    let err = api.get_mains().await.unwrap_err();
    assert!(matches!(err, HomevoltError::Connection { .. }));
}

#[tokio::test]
async fn auth_failures_bypass_the_cache() {
    let mut server = Server::new_async().await;
    let api = fast_api(&server);

    let ok = server
        .mock("GET", "/params.json")
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;
    api.get_params().await.unwrap();
    ok.remove_async().await;

    let _mock = server
        .mock("GET", "/params.json")
        .with_status(401)
        .create_async()
        .await;
    let err = api.get_params().await.unwrap_err();
    assert!(matches!(err, HomevoltError::Auth { .. }));

    api.clear_cache();
    assert!(api.get_cached("/params.json").is_none());
}

#[tokio::test]
async fn aggregate_replaces_failed_endpoints_with_empty_objects() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/status.json")
        .with_status(200)
        .with_body(r#"{"up_time": 5}"#)
        .create_async()
        .await;
    let _mock = server
        .mock("GET", "/params.json")
        .with_status(200)
        .with_body(r#"[{"name": "a", "value": 1}]"#)
        .create_async()
        .await;

    let api = HomevoltApi::new(&server.url(), None, None, None)
        .with_retry_policy(RetryPolicy::immediate(0));
    let data = api.get_all_data().await.unwrap();

    let keys: Vec<&str> = data.keys().map(String::as_str).collect();
    for key in ["status", "ems", "mains", "params", "schedule", "ota_manifest"] {
        assert!(keys.contains(&key), "missing {key}");
    }
    assert_eq!(data["status"]["up_time"], 5);
    assert!(data["params"].is_array());
    assert_eq!(data["ems"], json!({}));
    assert_eq!(data["ota_manifest"], json!({}));
}

#[tokio::test]
async fn aggregate_propagates_auth_errors() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/status.json")
        .with_status(401)
        .create_async()
        .await;

    let err = fast_api(&server).get_all_data().await.unwrap_err();
    assert!(matches!(err, HomevoltError::Auth { .. }));
}

#[tokio::test]
async fn basic_auth_is_sent_with_password() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/status.json")
        // admin:secret
        .match_header("authorization", "Basic YWRtaW46c2VjcmV0")
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    let api = HomevoltApi::new(&server.url(), Some("secret"), None, None);
    api.get_status().await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn no_auth_header_without_password() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/status.json")
        .match_header("authorization", Matcher::Missing)
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    fast_api(&server).get_status().await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn set_param_posts_form_with_store() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/params.json")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("k".into(), "ecu_main_fuse_size_a".into()),
            Matcher::UrlEncoded("v".into(), "32".into()),
            Matcher::UrlEncoded("store".into(), "1".into()),
        ]))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    fast_api(&server)
        .set_param("ecu_main_fuse_size_a", "32")
        .await
        .unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn writes_are_never_retried() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/params.json")
        .with_status(500)
        .expect(1)
        .create_async()
        .await;

    let err = fast_api(&server).set_param("k", "v").await.unwrap_err();
    assert!(matches!(err, HomevoltError::Api { .. }));
    mock.assert_async().await;
}

#[tokio::test]
async fn console_json_reply_is_parsed() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/console.json")
        .match_header("accept", "application/json")
        .match_body(Matcher::UrlEncoded("cmd".into(), "sched_clear".into()))
        .with_status(200)
        .with_body(console_ok("sched_clear"))
        .create_async()
        .await;

    let result = fast_api(&server).clear_schedule().await.unwrap();
    assert_eq!(result.command, "sched_clear");
    assert_eq!(result.exit_code, 0);
    mock.assert_async().await;
}

#[tokio::test]
async fn console_error_transcript_becomes_command_error() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/console.json")
        .with_status(200)
        .with_body(
            "esp32> reset_hard\nBad thing\nCommand 'reset_hard' returned non-zero error code: 0x1 (ERROR)\n",
        )
        .create_async()
        .await;

    let err = fast_api(&server).reboot().await.unwrap_err();
    let HomevoltError::Command { message } = &err else {
        panic!("expected command error, got {err:?}");
    };
    assert_eq!(message, "Bad thing");
}

#[tokio::test]
async fn console_bad_request_is_invalid_command() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/console.json")
        .with_status(400)
        .create_async()
        .await;

    let err = fast_api(&server).send_console_command("nope").await.unwrap_err();
    assert!(matches!(err, HomevoltError::Api { .. }));
    assert!(err.to_string().contains("Invalid command 'nope'"), "{err}");
}

#[tokio::test]
async fn mode_change_requires_local_mode() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/schedule.json")
        .with_status(200)
        .with_body(schedule_json(false).to_string())
        .create_async()
        .await;
    let console = server
        .mock("POST", "/console.json")
        .expect(0)
        .create_async()
        .await;

    let err = fast_api(&server)
        .set_charge(&ModeParams::with_setpoint(3000))
        .await
        .unwrap_err();
    assert!(matches!(err, HomevoltError::NotLocalMode { .. }));
    assert_eq!(err.translation_key(), "not_local_mode");
    console.assert_async().await;
}

#[tokio::test]
async fn missing_local_mode_flag_counts_as_remote() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/schedule.json")
        .with_status(200)
        .with_body(json!({"schedule": []}).to_string())
        .create_async()
        .await;
    let console = server
        .mock("POST", "/console.json")
        .expect(0)
        .create_async()
        .await;

    let api = fast_api(&server);
    let err = api
        .set_charge(&ModeParams::default())
        .await
        .unwrap_err();
    assert!(matches!(err, HomevoltError::NotLocalMode { .. }));
    let entries = [ScheduleEntry::new(ControlMode::SolarCharge)];
    let err = api.set_schedule(&entries).await.unwrap_err();
    assert!(matches!(err, HomevoltError::NotLocalMode { .. }));
    console.assert_async().await;
}

#[tokio::test]
async fn schedule_replacement_requires_local_mode() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/schedule.json")
        .with_status(200)
        .with_body(schedule_json(false).to_string())
        .create_async()
        .await;
    let console = server
        .mock("POST", "/console.json")
        .expect(0)
        .create_async()
        .await;

    let entries = [
        ScheduleEntry::new(ControlMode::GridCharge).setpoint(2000),
        ScheduleEntry::new(ControlMode::Idle),
    ];
    let err = fast_api(&server).set_schedule(&entries).await.unwrap_err();
    assert!(matches!(err, HomevoltError::NotLocalMode { .. }));
    console.assert_async().await;
}

#[tokio::test]
async fn unreachable_host_retries_then_fails_as_connection() {
    let api = HomevoltApi::new("127.0.0.1:1", None, None, None)
        .with_retry_policy(RetryPolicy::immediate(2));

    let err = api.get_status().await.unwrap_err();
    let HomevoltError::Connection { message } = &err else {
        panic!("expected connection error, got {err:?}");
    };
    assert!(message.contains("after 3 attempts"), "{message}");
}

#[tokio::test]
async fn loosely_shaped_console_json_does_not_abort_schedule() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/schedule.json")
        .with_status(200)
        .with_body(schedule_json(true).to_string())
        .create_async()
        .await;
    let console = server
        .mock("POST", "/console.json")
        .with_status(200)
        .with_body(r#"{"command":null,"output":null,"exit_code":"0"}"#)
        .expect(2)
        .create_async()
        .await;

    let entries = [
        ScheduleEntry::new(ControlMode::GridCharge).setpoint(2000),
        ScheduleEntry::new(ControlMode::Idle),
    ];
    let results = fast_api(&server).set_schedule(&entries).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].command, "sched_set 3 -s 2000");
    assert_eq!(results[1].command, "sched_add 0");
    assert_eq!(results[1].exit_code, 0);
    console.assert_async().await;
}

#[tokio::test]
async fn split_setpoints_are_rejected_for_grid_charge() {
    let mut server = Server::new_async().await;
    let schedule = server
        .mock("GET", "/schedule.json")
        .expect(0)
        .create_async()
        .await;

    let params = ModeParams {
        charge_setpoint: Some(4000),
        ..ModeParams::with_setpoint(3000)
    };
    let err = fast_api(&server).set_grid_charge(&params).await.unwrap_err();
    assert!(matches!(err, HomevoltError::Validation { .. }));
    schedule.assert_async().await;
}

#[tokio::test]
async fn mode_change_sends_sched_set() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/schedule.json")
        .with_status(200)
        .with_body(schedule_json(true).to_string())
        .create_async()
        .await;
    let console = server
        .mock("POST", "/console.json")
        .match_body(Matcher::UrlEncoded(
            "cmd".into(),
            "sched_set 1 -s 3000 --max 90".into(),
        ))
        .with_status(200)
        .with_body(console_ok("sched_set 1 -s 3000 --max 90"))
        .expect(1)
        .create_async()
        .await;

    let params = ModeParams::with_setpoint(3000).soc_window(None, Some(90));
    fast_api(&server).set_charge(&params).await.unwrap();
    console.assert_async().await;
}

#[tokio::test]
async fn idle_offline_flag() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/schedule.json")
        .with_status(200)
        .with_body(schedule_json(true).to_string())
        .create_async()
        .await;
    let console = server
        .mock("POST", "/console.json")
        .match_body(Matcher::UrlEncoded("cmd".into(), "sched_set 0 --offline".into()))
        .with_status(200)
        .with_body("ok")
        .expect(1)
        .create_async()
        .await;

    let result = fast_api(&server).set_idle(true).await.unwrap();
    assert_eq!(result.output, "ok");
    console.assert_async().await;
}

#[tokio::test]
async fn soc_out_of_range_fails_before_any_request() {
    let mut server = Server::new_async().await;
    let schedule = server
        .mock("GET", "/schedule.json")
        .expect(0)
        .create_async()
        .await;

    let params = ModeParams::default().soc_window(Some(10), Some(101));
    let err = fast_api(&server).set_discharge(&params).await.unwrap_err();
    assert!(matches!(err, HomevoltError::Validation { .. }));
    schedule.assert_async().await;
}

#[tokio::test]
async fn schedule_replacement_sends_set_then_add() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/schedule.json")
        .with_status(200)
        .with_body(schedule_json(true).to_string())
        .create_async()
        .await;

    let first_cmd = "sched_set 3 --from 2025-01-01T00:00:00 --to 2025-01-01T06:00:00 -s 5000";
    let second_cmd = "sched_add 0 --from 2025-01-01T06:00:00 --to 2025-01-01T07:00:00";
    let first = server
        .mock("POST", "/console.json")
        .match_body(Matcher::UrlEncoded("cmd".into(), first_cmd.into()))
        .with_status(200)
        .with_body(console_ok(first_cmd))
        .expect(1)
        .create_async()
        .await;
    let second = server
        .mock("POST", "/console.json")
        .match_body(Matcher::UrlEncoded("cmd".into(), second_cmd.into()))
        .with_status(200)
        .with_body(console_ok(second_cmd))
        .expect(1)
        .create_async()
        .await;

    let entries = [
        ScheduleEntry::new(ControlMode::GridCharge)
            .window("2025-01-01T00:00:00", "2025-01-01T06:00:00")
            .setpoint(5000),
        ScheduleEntry::new(ControlMode::Idle).window("2025-01-01T06:00:00", "2025-01-01T07:00:00"),
    ];
    let results = fast_api(&server).set_schedule(&entries).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].command, first_cmd);
    assert_eq!(results[1].command, second_cmd);
    first.assert_async().await;
    second.assert_async().await;
}

#[tokio::test]
async fn empty_schedule_is_rejected_without_io() {
    let mut server = Server::new_async().await;
    let schedule = server
        .mock("GET", "/schedule.json")
        .expect(0)
        .create_async()
        .await;
    let console = server
        .mock("POST", "/console.json")
        .expect(0)
        .create_async()
        .await;

    let err = fast_api(&server).set_schedule(&[]).await.unwrap_err();
    assert!(err.to_string().contains("cannot be empty"), "{err}");
    schedule.assert_async().await;
    console.assert_async().await;
}

#[tokio::test]
async fn shared_session_is_left_open() {
    let server = Server::new_async().await;
    let api = HomevoltApi::new(&server.url(), None, None, Some(reqwest::Client::new()));
    assert!(api.has_session());
    api.close();
    assert!(api.has_session());
}
