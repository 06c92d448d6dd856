//! Device endpoints, identity strings and tuning defaults

pub const DOMAIN: &str = "homevolt_local";

pub const DEFAULT_USERNAME: &str = "admin";
pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

// Device HTTP API
pub const ENDPOINT_STATUS: &str = "/status.json";
pub const ENDPOINT_EMS: &str = "/ems.json";
pub const ENDPOINT_NODES: &str = "/nodes.json";
pub const ENDPOINT_MAINS: &str = "/mains_data.json";
pub const ENDPOINT_PARAMS: &str = "/params.json";
pub const ENDPOINT_SCHEDULE: &str = "/schedule.json";
pub const ENDPOINT_ERROR_REPORT: &str = "/error_report.json";
pub const ENDPOINT_OTA_MANIFEST: &str = "/ota_manifest.json";
pub const ENDPOINT_CONSOLE: &str = "/console.json";

// Retry and cache
pub const MAX_RETRIES: u32 = 3;
pub const RETRY_BASE_DELAY_MS: u64 = 1_000;
pub const RETRY_MAX_DELAY_MS: u64 = 30_000;
pub const RETRY_JITTER: f64 = 0.5;
pub const CACHE_EXPIRY_SECS: u64 = 600;

// Device registry
pub const MANUFACTURER: &str = "Tibber";
pub const MODEL: &str = "Homevolt Battery";
pub const MODEL_CLUSTER: &str = "Homevolt Battery Cluster";
