//! Device registry records for the ECU and its cluster

use crate::constants::{DOMAIN, MANUFACTURER, MODEL, MODEL_CLUSTER};
use crate::coordinator::Coordinator;
use serde::{Deserialize, Serialize};

/// Which device an entity is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    /// The physical battery controller answering the API
    Ecu,
    /// Virtual device for a leader's aggregated cluster view
    Cluster,
}

/// `(domain, id)` pair identifying a device
pub type DeviceIdentifier = (String, String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub identifiers: Vec<DeviceIdentifier>,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sw_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub via_device: Option<DeviceIdentifier>,
}

impl DeviceInfo {
    /// Id part of the first identifier
    pub fn id(&self) -> Option<&str> {
        self.identifiers.first().map(|(_, id)| id.as_str())
    }
}

pub fn ecu_device_info(coordinator: &Coordinator) -> DeviceInfo {
    DeviceInfo {
        identifiers: vec![(DOMAIN.to_string(), coordinator.device_id())],
        name: coordinator.device_name(),
        manufacturer: MANUFACTURER.to_string(),
        model: MODEL.to_string(),
        sw_version: coordinator.firmware_version(),
        via_device: None,
    }
}

/// Cluster device, linked to the ECU through `via_device`
pub fn cluster_device_info(coordinator: &Coordinator) -> DeviceInfo {
    DeviceInfo {
        identifiers: vec![(DOMAIN.to_string(), coordinator.cluster_id())],
        name: coordinator.cluster_name(),
        manufacturer: MANUFACTURER.to_string(),
        model: MODEL_CLUSTER.to_string(),
        sw_version: None,
        via_device: Some((DOMAIN.to_string(), coordinator.device_id())),
    }
}

pub fn device_info(coordinator: &Coordinator, device_type: DeviceType) -> DeviceInfo {
    match device_type {
        DeviceType::Ecu => ecu_device_info(coordinator),
        DeviceType::Cluster => cluster_device_info(coordinator),
    }
}
