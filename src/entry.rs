//! Config entry lifecycle: setup and unload
//!
//! Setting up an entry probes the device, captures the initial data used
//! for identification, starts a coordinator and instantiates the entities.

use crate::api::HomevoltApi;
use crate::config::{Config, DeviceConfig, RequestConfig};
use crate::constants::{DEFAULT_SCAN_INTERVAL_SECS, DOMAIN};
use crate::coordinator::Coordinator;
use crate::entities::{Entity, build_entities};
use crate::error::HomevoltError;
use crate::logging::{LogContext, get_logger_with_context};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Schema version of [`ConfigEntry`]
pub const ENTRY_VERSION: u32 = 1;

/// A configured device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub entry_id: String,
    pub version: u32,
    pub domain: String,
    pub title: String,
    pub unique_id: Option<String>,
    pub data: DeviceConfig,
}

impl ConfigEntry {
    pub fn new(title: impl Into<String>, unique_id: Option<String>, data: DeviceConfig) -> Self {
        Self {
            entry_id: Uuid::new_v4().simple().to_string(),
            version: ENTRY_VERSION,
            domain: DOMAIN.to_string(),
            title: title.into(),
            unique_id,
            data,
        }
    }
}

/// Why an entry could not be set up
#[derive(Debug, Error)]
pub enum SetupError {
    /// Credentials rejected; the entry needs reauthentication
    #[error("Authentication failed for {host}: {source}")]
    AuthFailed {
        host: String,
        #[source]
        source: HomevoltError,
    },

    /// Transient failure; setup should be retried later
    #[error("Device not ready ({translation_key}): {source}")]
    NotReady {
        translation_key: &'static str,
        #[source]
        source: HomevoltError,
    },

    #[error("Setup failed: {0}")]
    Failed(#[from] HomevoltError),
}

impl SetupError {
    fn from_probe(host: &str, err: HomevoltError) -> Self {
        match err {
            HomevoltError::Auth { .. } => Self::AuthFailed {
                host: host.to_string(),
                source: err,
            },
            HomevoltError::RateLimit { .. } => Self::NotReady {
                translation_key: "rate_limited",
                source: err,
            },
            HomevoltError::Connection { .. } => Self::NotReady {
                translation_key: "cannot_connect",
                source: err,
            },
            other => Self::Failed(other),
        }
    }

    pub const fn translation_key(&self) -> &'static str {
        match self {
            Self::AuthFailed { .. } => "invalid_auth",
            Self::NotReady {
                translation_key, ..
            } => *translation_key,
            Self::Failed(err) => err.translation_key(),
        }
    }

    pub const fn requires_reauth(&self) -> bool {
        matches!(self, Self::AuthFailed { .. })
    }
}

/// Runtime knobs for [`setup_entry`]
#[derive(Debug, Clone)]
pub struct SetupOptions {
    /// Shared HTTP client; when absent the API client creates and owns one
    pub session: Option<Client>,
    pub request: RequestConfig,
    pub poll_interval: Duration,
}

impl Default for SetupOptions {
    fn default() -> Self {
        Self {
            session: None,
            request: RequestConfig::default(),
            poll_interval: Duration::from_secs(DEFAULT_SCAN_INTERVAL_SECS),
        }
    }
}

impl SetupOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            session: None,
            request: config.request.clone(),
            poll_interval: config.poll_interval(),
        }
    }
}

/// An entry that finished setup
#[derive(Debug)]
pub struct LoadedEntry {
    pub entry: ConfigEntry,
    pub coordinator: Arc<Coordinator>,
    pub entities: Vec<Entity>,
}

/// Probe the device and bring the entry up
pub async fn setup_entry(
    entry: ConfigEntry,
    options: SetupOptions,
) -> Result<LoadedEntry, SetupError> {
    let host = entry.data.host.clone();
    let logger = get_logger_with_context(
        LogContext::new("entry").with_field("entry_id", entry.entry_id.as_str()),
    );
    let api = Arc::new(HomevoltApi::from_config(
        &entry.data,
        &options.request,
        options.session,
    ));

    let probe = async {
        api.test_connection().await?;
        api.get_all_data().await
    };
    let initial_data = match probe.await {
        Ok(data) => data,
        Err(err) => {
            api.close();
            logger.warn(&format!("Setup of {host} failed: {err}"));
            return Err(SetupError::from_probe(&host, err));
        }
    };

    let coordinator = Arc::new(Coordinator::new(
        Arc::clone(&api),
        &host,
        initial_data,
        options.poll_interval,
    ));
    if let Err(err) = coordinator.first_refresh().await {
        api.close();
        return Err(SetupError::NotReady {
            translation_key: "cannot_connect",
            source: err,
        });
    }

    let entities = build_entities(&coordinator);
    logger.info(&format!(
        "Set up {} ({}) with {} entities",
        entry.title,
        coordinator.device_id(),
        entities.len()
    ));
    Ok(LoadedEntry {
        entry,
        coordinator,
        entities,
    })
}

/// Tear the entry down and release the HTTP client
pub fn unload_entry(loaded: LoadedEntry) -> ConfigEntry {
    loaded.coordinator.api().close();
    get_logger_with_context(
        LogContext::new("entry").with_field("entry_id", loaded.entry.entry_id.as_str()),
    )
    .info("Unloaded entry");
    loaded.entry
}
