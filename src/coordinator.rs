//! Periodic refresh of the aggregate device data
//!
//! The coordinator owns the API client, publishes the latest data snapshot
//! through a `watch` channel and derives the device identity (ECU id, name,
//! firmware, cluster role) from whatever data it currently holds.

use crate::api::HomevoltApi;
use crate::entities::params::param_string;
use crate::error::{HomevoltError, Result};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::{MissedTickBehavior, interval};

/// Aggregate endpoint data keyed by logical name (`status`, `ems`, ...)
pub type DeviceData = Map<String, Value>;

const FALLBACK_DEVICE_ID: &str = "homevolt";
const HOSTNAME_MARKER: &str = "homevolt";

/// First ECU id in an EMS payload
///
/// Accepts the nested `{"ems": [{"ecu_id": ..}]}` form, the flat
/// `{"ecu_id": ..}` form and a bare list of systems.
pub fn extract_ecu_id(ems: &Value) -> Option<String> {
    let candidate = match ems {
        Value::Object(map) => match map.get("ems") {
            Some(Value::Array(list)) if !list.is_empty() => list[0].get("ecu_id"),
            _ => map.get("ecu_id"),
        },
        Value::Array(list) => list.first().and_then(|first| first.get("ecu_id")),
        _ => None,
    }?;

    match candidate {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Device id embedded in a hostname such as `homevolt-abc123.local`
///
/// Matches `homevolt`, an optional `_` or `-`, then an ASCII alphanumeric run.
pub fn device_id_from_host(host: &str) -> Option<String> {
    let alnum_run = |s: &str| -> String {
        s.chars()
            .take_while(char::is_ascii_alphanumeric)
            .collect()
    };

    let mut search_from = 0;
    while let Some(pos) = host[search_from..].find(HOSTNAME_MARKER) {
        let start = search_from + pos;
        let rest = &host[start + HOSTNAME_MARKER.len()..];

        if let Some(after_sep) = rest.strip_prefix(['_', '-']) {
            let id = alnum_run(after_sep);
            if !id.is_empty() {
                return Some(id);
            }
        }
        let id = alnum_run(rest);
        if !id.is_empty() {
            return Some(id);
        }
        search_from = start + 1;
    }
    None
}

/// Polling coordinator for one device
pub struct Coordinator {
    api: Arc<HomevoltApi>,
    host: String,
    initial_data: Arc<DeviceData>,
    data_tx: watch::Sender<Arc<DeviceData>>,
    last_update_success: AtomicBool,
    last_update: Mutex<Option<DateTime<Utc>>>,
    update_interval: Duration,
    refresh_lock: tokio::sync::Mutex<()>,
    logger: StructuredLogger,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("host", &self.host)
            .field("update_interval", &self.update_interval)
            .field("last_update_success", &self.last_update_success())
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    pub fn new(
        api: Arc<HomevoltApi>,
        host: &str,
        initial_data: DeviceData,
        update_interval: Duration,
    ) -> Self {
        let (data_tx, _) = watch::channel(Arc::new(DeviceData::new()));
        let logger =
            get_logger_with_context(LogContext::new("coordinator").with_field("host", host));
        Self {
            api,
            host: host.to_string(),
            initial_data: Arc::new(initial_data),
            data_tx,
            last_update_success: AtomicBool::new(false),
            last_update: Mutex::new(None),
            update_interval,
            refresh_lock: tokio::sync::Mutex::new(()),
            logger,
        }
    }

    pub const fn api(&self) -> &Arc<HomevoltApi> {
        &self.api
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub const fn update_interval(&self) -> Duration {
        self.update_interval
    }

    /// Latest successful refresh, or an empty map before the first one
    pub fn latest_data(&self) -> Arc<DeviceData> {
        self.data_tx.borrow().clone()
    }

    /// Latest data, falling back to the setup-time data while it is empty
    pub fn data(&self) -> Arc<DeviceData> {
        let latest = self.latest_data();
        if latest.is_empty() {
            Arc::clone(&self.initial_data)
        } else {
            latest
        }
    }

    /// Receive every published data snapshot
    pub fn subscribe(&self) -> watch::Receiver<Arc<DeviceData>> {
        self.data_tx.subscribe()
    }

    pub fn last_update_success(&self) -> bool {
        self.last_update_success.load(Ordering::Relaxed)
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        *self
            .last_update
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetch all endpoints and publish the result
    pub async fn refresh(&self) -> Result<Arc<DeviceData>> {
        let _guard = self.refresh_lock.lock().await;
        match self.api.get_all_data().await {
            Ok(data) => {
                let data = Arc::new(data);
                self.data_tx.send_replace(Arc::clone(&data));
                self.last_update_success.store(true, Ordering::Relaxed);
                *self
                    .last_update
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
                Ok(data)
            }
            Err(err) => {
                self.last_update_success.store(false, Ordering::Relaxed);
                Err(HomevoltError::update_failed(format!(
                    "Error communicating with API: {err}"
                )))
            }
        }
    }

    /// Initial refresh during setup; failures abort setup
    pub async fn first_refresh(&self) -> Result<()> {
        self.refresh().await.map(|_| ())
    }

    /// Refresh after a write; failures are logged, not returned
    pub async fn request_refresh(&self) {
        if let Err(e) = self.refresh().await {
            self.logger.warn(&format!("Refresh after command failed: {e}"));
        }
    }

    /// Poll until `shutdown` fires
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = interval(self.update_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately and setup already refreshed
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.refresh().await {
                        self.logger.error(&format!("Update failed: {e}"));
                    }
                }
                _ = shutdown.recv() => {
                    self.logger.info("Shutdown signal received");
                    break;
                }
            }
        }
    }

    /// ECU id, else the id in the hostname, else `"homevolt"`
    pub fn device_id(&self) -> String {
        let data = self.data();
        data.get("ems")
            .and_then(extract_ecu_id)
            .or_else(|| device_id_from_host(&self.host))
            .unwrap_or_else(|| FALLBACK_DEVICE_ID.to_string())
    }

    /// User-configured mDNS name, else a name derived from the device id
    pub fn device_name(&self) -> String {
        let data = self.data();
        if let Some(name) = data
            .get("params")
            .and_then(|params| param_string(params, "ecu_mdns_instance_name"))
            .filter(|name| !name.is_empty())
        {
            return name;
        }

        let device_id = self.device_id();
        if device_id == FALLBACK_DEVICE_ID {
            "Homevolt Battery".to_string()
        } else {
            format!("Homevolt {device_id}")
        }
    }

    pub fn firmware_version(&self) -> Option<String> {
        self.data()
            .get("status")
            .and_then(|status| status.get("firmware"))
            .and_then(|firmware| firmware.get("esp"))
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    /// A leader's EMS payload lists more than one unit
    pub fn is_leader(&self) -> bool {
        self.data()
            .get("ems")
            .and_then(|ems| ems.get("ems"))
            .and_then(Value::as_array)
            .is_some_and(|units| units.len() > 1)
    }

    pub fn cluster_id(&self) -> String {
        format!("{}_cluster", self.device_id())
    }

    pub fn cluster_name(&self) -> String {
        format!("{} Cluster", self.device_name())
    }
}
