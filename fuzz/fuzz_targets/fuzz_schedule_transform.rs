#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary JSON as the device's schedule list
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) {
        let _ = homevolt_local::entities::sensor::transform_schedule(Some(&value));
    }
});
