use homevolt_local::logging::{LogContext, get_logger, get_logger_with_context, parse_log_level};
use tracing::Level;

#[test]
fn parse_levels_case_insensitively() {
    assert_eq!(parse_log_level("trace").unwrap(), Level::TRACE);
    assert_eq!(parse_log_level("Warn").unwrap(), Level::WARN);
    assert_eq!(parse_log_level("ERROR").unwrap(), Level::ERROR);
    let err = parse_log_level("loud").unwrap_err();
    assert!(err.to_string().contains("Invalid log level: loud"));
}

#[test]
fn logger_carries_context() {
    let logger = get_logger_with_context(
        LogContext::new("coordinator")
            .with_device_id("ecu123")
            .with_field("host", "http://10.0.0.2"),
    );
    let context = logger.context();
    assert_eq!(context.component, "coordinator");
    assert_eq!(context.device_id.as_deref(), Some("ecu123"));
    assert_eq!(context.extra_fields["host"], "http://10.0.0.2");

    // Logging without an installed subscriber is a no-op
    logger.info("refreshed");
    get_logger("web").debug("request");
}
