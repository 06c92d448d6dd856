//! Entities derived from the coordinator data
//!
//! Each platform module holds static descriptions (key, metadata, how to read
//! the value). [`build_entities`] instantiates them for a coordinator; an
//! [`Entity`] renders its current state from a data snapshot and, for the
//! writable platforms, forwards user actions to the API.

pub mod binary_sensor;
pub mod button;
pub mod number;
pub mod params;
pub mod select;
pub mod sensor;
pub mod switch;

use crate::coordinator::{Coordinator, DeviceData};
use crate::device::{DeviceInfo, DeviceType, device_info};
use crate::error::{HomevoltError, Result};
use binary_sensor::BinarySensorDescription;
use button::ButtonDescription;
use number::NumberDescription;
use select::SelectDescription;
use sensor::SensorDescription;
use serde::Serialize;
use serde_json::Value;
use switch::SwitchDescription;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Sensor,
    BinarySensor,
    Number,
    Switch,
    Select,
    Button,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityCategory {
    Config,
    Diagnostic,
}

/// Presentation metadata shared by all platforms
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EntityMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_class: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_category: Option<EntityCategory>,
    pub enabled_by_default: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<&'static [&'static str]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    /// Number input style (`box` or `slider`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<&'static str>,
}

impl EntityMeta {
    pub const EMPTY: Self = Self {
        unit: None,
        device_class: None,
        state_class: None,
        entity_category: None,
        enabled_by_default: true,
        options: None,
        min: None,
        max: None,
        step: None,
        mode: None,
    };
}

/// Rendered entity, as served by the REST bridge
#[derive(Debug, Clone, Serialize)]
pub struct EntityState {
    pub unique_id: String,
    pub key: &'static str,
    pub platform: Platform,
    pub device_type: DeviceType,
    /// Id of the device the entity belongs to
    pub device: String,
    pub state: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Value>,
    #[serde(flatten)]
    pub meta: EntityMeta,
}

#[derive(Debug, Clone, Copy)]
pub enum EntityKind {
    Sensor(&'static SensorDescription),
    BinarySensor(&'static BinarySensorDescription),
    Number(&'static NumberDescription),
    Switch(&'static SwitchDescription),
    Select(&'static SelectDescription),
    Button(&'static ButtonDescription),
}

impl EntityKind {
    pub const fn key(&self) -> &'static str {
        match self {
            Self::Sensor(d) => d.key,
            Self::BinarySensor(d) => d.key,
            Self::Number(d) => d.key,
            Self::Switch(d) => d.key,
            Self::Select(d) => d.key,
            Self::Button(d) => d.key,
        }
    }

    pub const fn platform(&self) -> Platform {
        match self {
            Self::Sensor(_) => Platform::Sensor,
            Self::BinarySensor(_) => Platform::BinarySensor,
            Self::Number(_) => Platform::Number,
            Self::Switch(_) => Platform::Switch,
            Self::Select(_) => Platform::Select,
            Self::Button(_) => Platform::Button,
        }
    }

    fn meta(&self) -> EntityMeta {
        match self {
            Self::Sensor(d) => d.meta,
            Self::BinarySensor(d) => d.meta,
            Self::Number(d) => d.meta(),
            Self::Switch(d) => d.meta,
            Self::Select(d) => d.meta(),
            Self::Button(d) => d.meta,
        }
    }
}

/// One entity instance bound to a device
#[derive(Debug, Clone)]
pub struct Entity {
    unique_id: String,
    device_type: DeviceType,
    device: DeviceInfo,
    kind: EntityKind,
}

impl Entity {
    /// Instantiate `kind` on the ECU or cluster device of `coordinator`
    pub fn new(coordinator: &Coordinator, device_type: DeviceType, kind: EntityKind) -> Self {
        let owner = match device_type {
            DeviceType::Ecu => coordinator.device_id(),
            DeviceType::Cluster => coordinator.cluster_id(),
        };
        Self {
            unique_id: format!("{owner}_{}", kind.key()),
            device_type,
            device: device_info(coordinator, device_type),
            kind,
        }
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub const fn key(&self) -> &'static str {
        self.kind.key()
    }

    pub const fn platform(&self) -> Platform {
        self.kind.platform()
    }

    pub const fn device_type(&self) -> DeviceType {
        self.device_type
    }

    pub const fn device(&self) -> &DeviceInfo {
        &self.device
    }

    pub const fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Render the entity against a data snapshot
    pub fn state(&self, data: &DeviceData) -> EntityState {
        let (state, attributes) = match self.kind {
            EntityKind::Sensor(d) => (
                sensor::native_value(d, self.device_type, data),
                sensor::attributes(d, self.device_type, data),
            ),
            EntityKind::BinarySensor(d) => (
                binary_sensor::is_on(d, data).map_or(Value::Null, Value::Bool),
                binary_sensor::attributes(d, data),
            ),
            EntityKind::Number(d) => (number::native_value(d, data).map_or(Value::Null, Value::from), None),
            EntityKind::Switch(d) => (switch::is_on(d, data).map_or(Value::Null, Value::Bool), None),
            EntityKind::Select(d) => (
                select::current_option(d, data).map_or(Value::Null, |o| Value::String(o.to_string())),
                None,
            ),
            EntityKind::Button(_) => (Value::Null, None),
        };

        EntityState {
            unique_id: self.unique_id.clone(),
            key: self.key(),
            platform: self.platform(),
            device_type: self.device_type,
            device: self.device.id().unwrap_or_default().to_string(),
            state,
            attributes,
            meta: self.kind.meta(),
        }
    }

    /// Write a new value for a number, switch or select
    pub async fn set_value(&self, coordinator: &Coordinator, value: &Value) -> Result<()> {
        match self.kind {
            EntityKind::Number(d) => number::set_value(d, coordinator, value).await,
            EntityKind::Switch(d) => switch::set_value(d, coordinator, value).await,
            EntityKind::Select(d) => select::select_option(d, coordinator, value).await,
            _ => Err(HomevoltError::validation(
                "value",
                format!("{} does not accept values", self.unique_id),
            )),
        }
    }

    pub async fn press(&self, coordinator: &Coordinator) -> Result<()> {
        match self.kind {
            EntityKind::Button(d) => button::press(d, coordinator).await,
            _ => Err(HomevoltError::validation(
                "entity",
                format!("{} is not a button", self.unique_id),
            )),
        }
    }
}

/// Every entity for the coordinator's device (and cluster, for a leader)
pub fn build_entities(coordinator: &Coordinator) -> Vec<Entity> {
    let mut entities = sensor::build(coordinator);
    let ecu = |kind| Entity::new(coordinator, DeviceType::Ecu, kind);
    entities.extend(binary_sensor::BINARY_SENSORS.iter().map(|d| ecu(EntityKind::BinarySensor(d))));
    entities.extend(number::NUMBERS.iter().map(|d| ecu(EntityKind::Number(d))));
    entities.extend(switch::SWITCHES.iter().map(|d| ecu(EntityKind::Switch(d))));
    entities.extend(select::SELECTS.iter().map(|d| ecu(EntityKind::Select(d))));
    entities.extend(button::BUTTONS.iter().map(|d| ecu(EntityKind::Button(d))));
    entities
}

/// Entity with the given unique id
pub fn find_entity<'a>(entities: &'a [Entity], unique_id: &str) -> Option<&'a Entity> {
    entities.iter().find(|e| e.unique_id == unique_id)
}
