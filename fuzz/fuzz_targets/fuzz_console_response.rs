#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Console replies are JSON, plain text or an error transcript
    let body = String::from_utf8_lossy(data);
    let _ = homevolt_local::api::parse_console_response("sched_set 1", &body);
});
