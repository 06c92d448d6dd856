//! Interactive setup: user, reauth, reconfigure and zeroconf steps
//!
//! Every step that talks to the device builds a short-lived client and closes
//! it before returning, whatever the outcome.

use crate::api::HomevoltApi;
use crate::config::{DeviceConfig, RequestConfig};
use crate::coordinator::{device_id_from_host, extract_ecu_id};
use crate::entry::ConfigEntry;
use crate::error::HomevoltError;
use crate::logging::{StructuredLogger, get_logger};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::IpAddr;

/// Outcome of a flow step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowResult {
    /// Ask (again) for input; `errors["base"]` carries the failure key
    Form {
        step_id: &'static str,
        errors: BTreeMap<String, String>,
        description_placeholders: BTreeMap<String, String>,
    },
    CreateEntry {
        entry: ConfigEntry,
    },
    Abort {
        reason: &'static str,
    },
}

impl FlowResult {
    fn form(step_id: &'static str, error: Option<&'static str>) -> Self {
        Self::Form {
            step_id,
            errors: error
                .map(|e| BTreeMap::from([("base".to_string(), e.to_string())]))
                .unwrap_or_default(),
            description_placeholders: BTreeMap::new(),
        }
    }

    fn form_for_host(step_id: &'static str, error: Option<&'static str>, host: &str) -> Self {
        let mut result = Self::form(step_id, error);
        if let Self::Form {
            description_placeholders,
            ..
        } = &mut result
        {
            description_placeholders.insert("host".into(), host.to_string());
        }
        result
    }

    /// Error key of a re-shown form
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Form { errors, .. } => errors.get("base").map(String::as_str),
            _ => None,
        }
    }
}

/// Username and password as entered by the user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// mDNS announcement of a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZeroconfInfo {
    pub ip_address: IpAddr,
    /// Service instance name, e.g. `homevolt-abc123._http._tcp.local.`
    pub name: String,
}

fn error_key(err: &HomevoltError) -> &'static str {
    match err {
        HomevoltError::Auth { .. } => "invalid_auth",
        HomevoltError::RateLimit { .. } => "rate_limited",
        HomevoltError::Connection { .. } => "cannot_connect",
        _ => "unknown",
    }
}

/// Unique id for a device: ECU id, else hostname id, else the host itself
pub fn unique_id_for(host: &str, ems: Option<&Value>) -> String {
    ems.and_then(extract_ecu_id)
        .or_else(|| device_id_from_host(host))
        .unwrap_or_else(|| host.to_string())
}

/// One configuration flow over a set of existing entries
pub struct ConfigFlow {
    entries: Vec<ConfigEntry>,
    session: Option<Client>,
    request: RequestConfig,
    discovered: Option<(String, String)>,
    logger: StructuredLogger,
}

impl ConfigFlow {
    pub fn new(entries: Vec<ConfigEntry>) -> Self {
        Self {
            entries,
            session: None,
            request: RequestConfig::default(),
            discovered: None,
            logger: get_logger("config_flow"),
        }
    }

    #[must_use]
    pub fn with_session(mut self, session: Client) -> Self {
        self.session = Some(session);
        self
    }

    #[must_use]
    pub fn with_request_config(mut self, request: RequestConfig) -> Self {
        self.request = request;
        self
    }

    pub fn entries(&self) -> &[ConfigEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<ConfigEntry> {
        self.entries
    }

    fn entry_mut(&mut self, entry_id: &str) -> Option<&mut ConfigEntry> {
        self.entries.iter_mut().find(|e| e.entry_id == entry_id)
    }

    fn configured(&mut self, unique_id: &str) -> Option<&mut ConfigEntry> {
        self.entries
            .iter_mut()
            .find(|e| e.unique_id.as_deref() == Some(unique_id))
    }

    /// Test the connection and optionally read EMS; the client is always closed
    async fn probe(&self, device: &DeviceConfig, read_ems: bool) -> Result<Option<Value>, &'static str> {
        let api = HomevoltApi::from_config(device, &self.request, self.session.clone());
        let result = async {
            api.test_connection().await?;
            if read_ems {
                api.get_ems().await.map(Some)
            } else {
                Ok(None)
            }
        }
        .await;
        api.close();

        result.map_err(|err| {
            let key = error_key(&err);
            if key == "unknown" {
                self.logger.error(&format!("Unexpected error probing {}: {err}", device.host));
            }
            key
        })
    }

    /// Manual setup from a host and optional credentials
    pub async fn step_user(&mut self, input: Option<DeviceConfig>) -> FlowResult {
        let Some(device) = input else {
            return FlowResult::form("user", None);
        };

        let ems = match self.probe(&device, true).await {
            Ok(ems) => ems,
            Err(key) => return FlowResult::form("user", Some(key)),
        };
        let unique_id = unique_id_for(&device.host, ems.as_ref());
        if self.configured(&unique_id).is_some() {
            return FlowResult::Abort {
                reason: "already_configured",
            };
        }

        let entry = ConfigEntry::new(format!("Homevolt {unique_id}"), Some(unique_id), device);
        self.entries.push(entry.clone());
        FlowResult::CreateEntry { entry }
    }

    /// New credentials for an entry whose setup failed authentication
    pub async fn step_reauth(&mut self, entry_id: &str, input: Option<Credentials>) -> FlowResult {
        let Some(entry) = self.entry_mut(entry_id) else {
            return FlowResult::Abort {
                reason: "entry_not_found",
            };
        };
        let host = entry.data.host.clone();
        let Some(credentials) = input else {
            return FlowResult::form_for_host("reauth_confirm", None, &host);
        };

        let device = DeviceConfig {
            host: host.clone(),
            username: credentials.username,
            password: credentials.password,
        };
        if let Err(key) = self.probe(&device, false).await {
            return FlowResult::form_for_host("reauth_confirm", Some(key), &host);
        }

        if let Some(entry) = self.entry_mut(entry_id) {
            entry.data = device;
        }
        FlowResult::Abort {
            reason: "reauth_successful",
        }
    }

    /// Point an entry at a new host, refusing a different device
    pub async fn step_reconfigure(&mut self, entry_id: &str, input: Option<DeviceConfig>) -> FlowResult {
        let Some(entry) = self.entry_mut(entry_id) else {
            return FlowResult::Abort {
                reason: "entry_not_found",
            };
        };
        let current_unique_id = entry.unique_id.clone();
        let Some(device) = input else {
            return FlowResult::form("reconfigure", None);
        };

        let ems = match self.probe(&device, true).await {
            Ok(ems) => ems,
            Err(key) => return FlowResult::form("reconfigure", Some(key)),
        };
        let unique_id = unique_id_for(&device.host, ems.as_ref());
        if current_unique_id.is_some_and(|current| current != unique_id) {
            return FlowResult::Abort {
                reason: "different_device",
            };
        }

        if let Some(entry) = self.entry_mut(entry_id) {
            entry.data = device;
        }
        FlowResult::Abort {
            reason: "reconfigure_successful",
        }
    }

    /// Discovery; a known device only gets its host updated
    pub fn step_zeroconf(&mut self, info: &ZeroconfInfo) -> FlowResult {
        let host = info.ip_address.to_string();
        self.logger
            .debug(&format!("Zeroconf discovery: {} at {host}", info.name));

        let device_id = device_id_from_host(&info.name).unwrap_or_else(|| host.clone());
        if let Some(entry) = self.configured(&device_id) {
            entry.data.host = host;
            return FlowResult::Abort {
                reason: "already_configured",
            };
        }

        let result = FlowResult::form_for_host("zeroconf_confirm", None, &host);
        self.discovered = Some((host, device_id));
        result
    }

    /// Credentials for a discovered device
    pub async fn step_zeroconf_confirm(&mut self, input: Option<Credentials>) -> FlowResult {
        let Some((host, mut device_id)) = self.discovered.clone() else {
            return FlowResult::Abort {
                reason: "no_discovery",
            };
        };
        let Some(credentials) = input else {
            return FlowResult::form_for_host("zeroconf_confirm", None, &host);
        };

        let device = DeviceConfig {
            host: host.clone(),
            username: credentials.username,
            password: credentials.password,
        };
        let ems = match self.probe(&device, true).await {
            Ok(ems) => ems,
            Err(key) => return FlowResult::form_for_host("zeroconf_confirm", Some(key), &host),
        };

        if let Some(ecu_id) = ems.as_ref().and_then(extract_ecu_id) {
            if let Some(entry) = self.configured(&ecu_id) {
                entry.data.host = host;
                return FlowResult::Abort {
                    reason: "already_configured",
                };
            }
            device_id = ecu_id;
        }

        let entry = ConfigEntry::new(format!("Homevolt {device_id}"), Some(device_id), device);
        self.entries.push(entry.clone());
        self.discovered = None;
        FlowResult::CreateEntry { entry }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unique_id_precedence() {
        let ems = json!({"ems": [{"ecu_id": "ecu9"}]});
        assert_eq!(unique_id_for("homevolt-abc.local", Some(&ems)), "ecu9");
        assert_eq!(unique_id_for("homevolt-abc.local", Some(&json!({}))), "abc");
        assert_eq!(unique_id_for("10.0.0.5", None), "10.0.0.5");
    }

    #[tokio::test]
    async fn empty_input_shows_form() {
        let mut flow = ConfigFlow::new(Vec::new());
        assert_eq!(flow.step_user(None).await, FlowResult::form("user", None));
    }

    #[test]
    fn zeroconf_updates_known_host() {
        let entry = ConfigEntry::new(
            "Homevolt abc123",
            Some("abc123".into()),
            DeviceConfig {
                host: "10.0.0.2".into(),
                username: None,
                password: None,
            },
        );
        let mut flow = ConfigFlow::new(vec![entry]);
        let info = ZeroconfInfo {
            ip_address: "10.0.0.9".parse().unwrap(),
            name: "homevolt-abc123._http._tcp.local.".into(),
        };
        assert_eq!(
            flow.step_zeroconf(&info),
            FlowResult::Abort {
                reason: "already_configured"
            }
        );
        assert_eq!(flow.entries()[0].data.host, "10.0.0.9");
    }

    #[test]
    fn zeroconf_new_device_asks_for_credentials() {
        let mut flow = ConfigFlow::new(Vec::new());
        let info = ZeroconfInfo {
            ip_address: "10.0.0.9".parse().unwrap(),
            name: "homevolt-new1._http._tcp.local.".into(),
        };
        let FlowResult::Form {
            step_id,
            description_placeholders,
            ..
        } = flow.step_zeroconf(&info)
        else {
            panic!("expected form");
        };
        assert_eq!(step_id, "zeroconf_confirm");
        assert_eq!(description_placeholders["host"], "10.0.0.9");
    }

    #[tokio::test]
    async fn unknown_entry_aborts() {
        let mut flow = ConfigFlow::new(Vec::new());
        assert_eq!(
            flow.step_reauth("missing", None).await,
            FlowResult::Abort {
                reason: "entry_not_found"
            }
        );
    }
}
