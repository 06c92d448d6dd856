//! Telemetry sensors
//!
//! Values come from the EMS, mains, status, schedule and OTA payloads. The
//! firmware reports several quantities in scaled integer units (centi-percent,
//! milli-hertz, deci-degrees, Wh); the value functions convert them.
//!
//! A cluster leader additionally exposes cluster copies of the
//! cluster-capable sensors, evaluated over the `aggregated` EMS block.

use super::{Entity, EntityCategory, EntityKind, EntityMeta};
use crate::api::ControlMode;
use crate::coordinator::{Coordinator, DeviceData};
use crate::device::DeviceType;
use chrono::{DateTime, Utc};
use serde_json::{Map, Number, Value, json};

type ValueFn = fn(&Value) -> Option<Value>;
type AttributesFn = fn(&Value) -> Value;

#[derive(Debug, Clone, Copy)]
pub struct SensorDescription {
    pub key: &'static str,
    /// Top-level key of the aggregate data this sensor reads
    pub data_key: &'static str,
    /// `Cluster` marks sensors that also get a cluster copy on a leader
    pub device_type: DeviceType,
    /// External sensor type (`grid`, `solar`, `load`) that must be present
    pub requires_sensor: Option<&'static str>,
    pub meta: EntityMeta,
    pub value_fn: ValueFn,
    pub attributes_fn: Option<AttributesFn>,
}

impl SensorDescription {
    const fn new(key: &'static str, data_key: &'static str, value_fn: ValueFn) -> Self {
        Self {
            key,
            data_key,
            device_type: DeviceType::Ecu,
            requires_sensor: None,
            meta: EntityMeta::EMPTY,
            value_fn,
            attributes_fn: None,
        }
    }

    const fn unit(mut self, unit: &'static str) -> Self {
        self.meta.unit = Some(unit);
        self
    }

    const fn class(mut self, device_class: &'static str) -> Self {
        self.meta.device_class = Some(device_class);
        self
    }

    const fn measurement(mut self) -> Self {
        self.meta.state_class = Some("measurement");
        self
    }

    const fn total_increasing(mut self) -> Self {
        self.meta.state_class = Some("total_increasing");
        self
    }

    const fn diagnostic(mut self) -> Self {
        self.meta.entity_category = Some(EntityCategory::Diagnostic);
        self
    }

    const fn disabled(mut self) -> Self {
        self.meta.enabled_by_default = false;
        self
    }

    const fn cluster(mut self) -> Self {
        self.device_type = DeviceType::Cluster;
        self
    }

    const fn external(mut self, sensor_type: &'static str) -> Self {
        self.requires_sensor = Some(sensor_type);
        self
    }

    const fn attributes(mut self, attributes_fn: AttributesFn) -> Self {
        self.attributes_fn = Some(attributes_fn);
        self
    }
}

// Units and classes
const PERCENT: &str = "%";
const WATT: &str = "W";
const WATT_HOUR: &str = "Wh";
const KILO_WATT_HOUR: &str = "kWh";
const HERTZ: &str = "Hz";
const VOLT: &str = "V";
const CELSIUS: &str = "°C";
const DAYS: &str = "d";
const DBM: &str = "dBm";

// Payload helpers

fn object(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| v.is_object())
}

/// Python-style truthiness, used for the few presence checks the device relies on
pub(crate) fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

fn first_ems(data: &Value) -> Option<&Value> {
    object(data.get("ems")?.as_array()?.first())
}

fn ems_section<'a>(data: &'a Value, section: &str) -> Option<&'a Value> {
    object(first_ems(data)?.get(section))
}

fn first_bms(data: &Value) -> Option<&Value> {
    object(first_ems(data)?.get("bms_data")?.as_array()?.first())
}

/// The EMS entry describing this unit (empty `ecu_host`)
fn local_ems(data: &Value) -> Option<&Value> {
    data.get("ems")?
        .as_array()?
        .iter()
        .find(|ems| ems.is_object() && !truthy(ems.get("ecu_host")))
}

fn local_ems_section<'a>(data: &'a Value, section: &str) -> Option<&'a Value> {
    object(local_ems(data)?.get(section))
}

fn sensor_by_type<'a>(data: &'a Value, sensor_type: &str) -> Option<&'a Value> {
    data.get("sensors")?
        .as_array()?
        .iter()
        .find(|s| s.get("type").and_then(Value::as_str) == Some(sensor_type))
}

fn field(section: Option<&Value>, key: &str) -> Option<Value> {
    section?.get(key).filter(|v| !v.is_null()).cloned()
}

fn scaled(value: Option<Value>, divisor: f64) -> Option<Value> {
    let raw = value?.as_f64()?;
    Number::from_f64(raw / divisor).map(Value::Number)
}

fn list_len(value: Option<&Value>) -> Option<Value> {
    value?.as_array().map(|items| Value::from(items.len()))
}

fn messages(data: &Value, key: &str) -> Value {
    json!({ "messages": field(local_ems_section(data, "ems_data"), key) })
}

fn utc_from_epoch(value: &Value) -> Option<String> {
    let secs = value.as_f64()?;
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round().clamp(0.0, 999_999_999.0) as u32;
    DateTime::<Utc>::from_timestamp(whole as i64, nanos).map(|dt| dt.to_rfc3339())
}

/// Add `type_name`, `from_utc` and `to_utc` to each schedule entry
pub fn transform_schedule(schedule: Option<&Value>) -> Value {
    let Some(entries) = schedule.and_then(Value::as_array) else {
        return Value::Null;
    };

    entries
        .iter()
        .map(|entry| {
            let Some(fields) = entry.as_object() else {
                return entry.clone();
            };
            let mut out = fields.clone();
            if let Some(kind) = fields.get("type").filter(|t| !t.is_null()) {
                let name = kind.as_u64().and_then(ControlMode::from_code).map_or_else(
                    || {
                        let label = kind.as_str().map_or_else(|| kind.to_string(), str::to_string);
                        format!("unknown_{label}")
                    },
                    |mode| mode.name().to_string(),
                );
                out.insert("type_name".into(), Value::String(name));
            }
            for (src, dst) in [("from", "from_utc"), ("to", "to_utc")] {
                if let Some(ts) = fields.get(src).and_then(utc_from_epoch) {
                    out.insert(dst.into(), Value::String(ts));
                }
            }
            Value::Object(out)
        })
        .collect()
}

pub static EMS_SENSORS: &[SensorDescription] = &[
    SensorDescription::new("battery_soc", "ems", |d| {
        scaled(field(ems_section(d, "ems_data"), "soc_avg"), 100.0)
            .or_else(|| field(first_bms(d), "soc"))
            .or_else(|| field(Some(d), "battery_soc"))
    })
    .unit(PERCENT)
    .class("battery")
    .measurement()
    .cluster(),
    SensorDescription::new("inverter_power", "ems", |d| {
        field(ems_section(d, "ems_data"), "power").or_else(|| field(Some(d), "inverter_power"))
    })
    .unit(WATT)
    .class("power")
    .measurement()
    .cluster(),
    // Wh on the wire, reported in kWh
    SensorDescription::new("inverter_energy_produced", "ems", |d| {
        scaled(field(ems_section(d, "ems_data"), "energy_produced"), 1000.0)
    })
    .unit(KILO_WATT_HOUR)
    .class("energy")
    .total_increasing()
    .cluster(),
    SensorDescription::new("inverter_energy_consumed", "ems", |d| {
        scaled(field(ems_section(d, "ems_data"), "energy_consumed"), 1000.0)
    })
    .unit(KILO_WATT_HOUR)
    .class("energy")
    .total_increasing()
    .cluster(),
    SensorDescription::new("ems_frequency", "ems", |d| {
        scaled(field(ems_section(d, "ems_data"), "frequency"), 1000.0)
            .or_else(|| field(Some(d), "grid_frequency"))
    })
    .unit(HERTZ)
    .class("frequency")
    .measurement()
    .cluster(),
    SensorDescription::new("system_temperature", "ems", |d| {
        scaled(field(ems_section(d, "ems_data"), "sys_temp"), 10.0)
    })
    .unit(CELSIUS)
    .class("temperature")
    .measurement(),
    SensorDescription::new("available_capacity", "ems", |d| {
        field(ems_section(d, "ems_data"), "avail_cap")
    })
    .unit(WATT_HOUR)
    .class("energy_storage")
    .measurement()
    .diagnostic()
    .cluster(),
    SensorDescription::new("operation_state", "ems", |d| {
        field(first_ems(d), "op_state_str").or_else(|| field(Some(d), "ems_state"))
    })
    .cluster(),
    SensorDescription::new("battery_state", "ems", |d| {
        field(ems_section(d, "ems_data"), "state_str")
    })
    .cluster(),
    SensorDescription::new("firmware_version", "ems", |d| {
        field(local_ems_section(d, "ems_info"), "fw_version")
    })
    .diagnostic(),
    SensorDescription::new("alarm_messages", "ems", |d| {
        list_len(local_ems_section(d, "ems_data").and_then(|s| s.get("alarm_str")))
    })
    .measurement()
    .diagnostic()
    .attributes(|d| messages(d, "alarm_str")),
    SensorDescription::new("warning_messages", "ems", |d| {
        list_len(local_ems_section(d, "ems_data").and_then(|s| s.get("warning_str")))
    })
    .measurement()
    .diagnostic()
    .attributes(|d| messages(d, "warning_str")),
    SensorDescription::new("info_messages", "ems", |d| {
        list_len(local_ems_section(d, "ems_data").and_then(|s| s.get("info_str")))
    })
    .measurement()
    .diagnostic()
    .attributes(|d| messages(d, "info_str")),
    SensorDescription::new("rated_power", "ems", |d| {
        field(ems_section(d, "ems_info"), "rated_power")
    })
    .unit(WATT)
    .class("power")
    .diagnostic(),
    SensorDescription::new("avail_charge_power", "ems", |d| {
        field(ems_section(d, "ems_prediction"), "avail_ch_pwr")
    })
    .unit(WATT)
    .class("power")
    .measurement()
    .cluster(),
    SensorDescription::new("avail_discharge_power", "ems", |d| {
        field(ems_section(d, "ems_prediction"), "avail_di_pwr")
    })
    .unit(WATT)
    .class("power")
    .measurement()
    .cluster(),
    SensorDescription::new("avail_charge_energy", "ems", |d| {
        field(ems_section(d, "ems_prediction"), "avail_ch_energy")
    })
    .unit(WATT_HOUR)
    .class("energy_storage")
    .measurement()
    .cluster(),
    SensorDescription::new("avail_discharge_energy", "ems", |d| {
        field(ems_section(d, "ems_prediction"), "avail_di_energy")
    })
    .unit(WATT_HOUR)
    .class("energy_storage")
    .measurement()
    .cluster(),
    SensorDescription::new("avail_inverter_charge_power", "ems", |d| {
        field(ems_section(d, "ems_prediction"), "avail_inv_ch_pwr")
    })
    .unit(WATT)
    .class("power")
    .measurement()
    .cluster(),
    SensorDescription::new("avail_inverter_discharge_power", "ems", |d| {
        field(ems_section(d, "ems_prediction"), "avail_inv_di_pwr")
    })
    .unit(WATT)
    .class("power")
    .measurement()
    .cluster(),
];

pub static MAINS_SENSORS: &[SensorDescription] = &[
    SensorDescription::new("mains_voltage", "mains", |d| field(Some(d), "mains_voltage_rms"))
        .unit(VOLT)
        .class("voltage")
        .measurement()
        .disabled(),
    SensorDescription::new("mains_frequency", "mains", |d| field(Some(d), "frequency"))
        .unit(HERTZ)
        .class("frequency")
        .measurement()
        .disabled(),
];

pub static STATUS_SENSORS: &[SensorDescription] = &[
    // up_time is in milliseconds
    SensorDescription::new("uptime", "status", |d| {
        let millis = d.get("up_time").and_then(Value::as_f64).unwrap_or(0.0);
        Number::from_f64(millis / 86_400_000.0).map(Value::Number)
    })
    .unit(DAYS)
    .class("duration")
    .total_increasing()
    .diagnostic()
    .disabled(),
    SensorDescription::new("wifi_rssi", "status", |d| field(d.get("wifi_status"), "rssi"))
        .unit(DBM)
        .class("signal_strength")
        .measurement()
        .diagnostic(),
    SensorDescription::new("lte_rssi", "status", |d| field(d.get("lte_status"), "rssi"))
        .unit(DBM)
        .class("signal_strength")
        .measurement()
        .diagnostic(),
];

pub static SCHEDULE_SENSORS: &[SensorDescription] = &[SensorDescription::new(
    "schedule_mode",
    "schedule",
    |d| {
        let mode = if truthy(d.get("local_mode")) { "local" } else { "remote" };
        Some(Value::String(mode.to_string()))
    },
)
.attributes(|d| {
    json!({
        "schedule_id": d.get("schedule_id").cloned().unwrap_or(Value::Null),
        "schedule": transform_schedule(d.get("schedule")),
    })
})];

pub static EMS_MODE_SENSORS: &[SensorDescription] = &[SensorDescription::new(
    "ems_mode",
    "ems",
    |d| {
        let leader = d
            .get("ems")
            .and_then(Value::as_array)
            .is_some_and(|units| units.len() > 1);
        Some(Value::String(if leader { "leader" } else { "follower" }.to_string()))
    },
)
.diagnostic()];

pub static OTA_SENSORS: &[SensorDescription] =
    &[SensorDescription::new("ota_version", "ota_manifest", |d| field(Some(d), "version")).diagnostic()];

pub static EXTERNAL_SENSORS: &[SensorDescription] = &[
    SensorDescription::new("grid_power", "ems", |d| field(sensor_by_type(d, "grid"), "total_power"))
        .unit(WATT)
        .class("power")
        .measurement()
        .external("grid"),
    SensorDescription::new("grid_energy_imported", "ems", |d| {
        field(sensor_by_type(d, "grid"), "energy_imported")
    })
    .unit(KILO_WATT_HOUR)
    .class("energy")
    .total_increasing()
    .external("grid"),
    SensorDescription::new("grid_energy_exported", "ems", |d| {
        field(sensor_by_type(d, "grid"), "energy_exported")
    })
    .unit(KILO_WATT_HOUR)
    .class("energy")
    .total_increasing()
    .external("grid"),
    SensorDescription::new("grid_rssi", "ems", |d| field(sensor_by_type(d, "grid"), "rssi"))
        .unit(DBM)
        .class("signal_strength")
        .measurement()
        .diagnostic()
        .external("grid"),
    SensorDescription::new("solar_power", "ems", |d| field(sensor_by_type(d, "solar"), "total_power"))
        .unit(WATT)
        .class("power")
        .measurement()
        .external("solar"),
    SensorDescription::new("solar_energy_imported", "ems", |d| {
        field(sensor_by_type(d, "solar"), "energy_imported")
    })
    .unit(KILO_WATT_HOUR)
    .class("energy")
    .total_increasing()
    .external("solar"),
    SensorDescription::new("solar_energy_exported", "ems", |d| {
        field(sensor_by_type(d, "solar"), "energy_exported")
    })
    .unit(KILO_WATT_HOUR)
    .class("energy")
    .total_increasing()
    .disabled()
    .external("solar"),
    SensorDescription::new("solar_rssi", "ems", |d| field(sensor_by_type(d, "solar"), "rssi"))
        .unit(DBM)
        .class("signal_strength")
        .measurement()
        .diagnostic()
        .external("solar"),
    SensorDescription::new("load_power", "ems", |d| field(sensor_by_type(d, "load"), "total_power"))
        .unit(WATT)
        .class("power")
        .measurement()
        .external("load"),
    SensorDescription::new("load_energy_imported", "ems", |d| {
        field(sensor_by_type(d, "load"), "energy_imported")
    })
    .unit(KILO_WATT_HOUR)
    .class("energy")
    .total_increasing()
    .external("load"),
    SensorDescription::new("load_energy_exported", "ems", |d| {
        field(sensor_by_type(d, "load"), "energy_exported")
    })
    .unit(KILO_WATT_HOUR)
    .class("energy")
    .total_increasing()
    .external("load"),
    SensorDescription::new("load_rssi", "ems", |d| field(sensor_by_type(d, "load"), "rssi"))
        .unit(DBM)
        .class("signal_strength")
        .measurement()
        .diagnostic()
        .disabled()
        .external("load"),
];

/// Only on the cluster device; reads `aggregated.ems_info`
pub static CLUSTER_ONLY_SENSORS: &[SensorDescription] = &[SensorDescription::new(
    "rated_power",
    "ems",
    |d| field(ems_section(d, "ems_info"), "rated_power"),
)
.unit(WATT)
.class("power")
.diagnostic()
.cluster()];

pub fn all_sensors() -> impl Iterator<Item = &'static SensorDescription> {
    EMS_SENSORS
        .iter()
        .chain(MAINS_SENSORS)
        .chain(STATUS_SENSORS)
        .chain(SCHEDULE_SENSORS)
        .chain(EMS_MODE_SENSORS)
        .chain(OTA_SENSORS)
        .chain(EXTERNAL_SENSORS)
}

/// Whether the EMS payload lists an external sensor of `sensor_type`
pub fn has_external_sensor(data: &DeviceData, sensor_type: &str) -> bool {
    data.get("ems")
        .is_some_and(|ems| sensor_by_type(ems, sensor_type).is_some())
}

/// Sensor entities for the ECU, plus cluster copies on a leader
pub fn build(coordinator: &Coordinator) -> Vec<Entity> {
    let data = coordinator.data();
    let leader = coordinator.is_leader();
    let mut entities = Vec::new();

    for description in all_sensors() {
        if let Some(sensor_type) = description.requires_sensor
            && !has_external_sensor(&data, sensor_type)
        {
            continue;
        }
        entities.push(Entity::new(coordinator, DeviceType::Ecu, EntityKind::Sensor(description)));
        if leader && description.device_type == DeviceType::Cluster {
            entities.push(Entity::new(
                coordinator,
                DeviceType::Cluster,
                EntityKind::Sensor(description),
            ));
        }
    }

    if leader {
        entities.extend(
            CLUSTER_ONLY_SENSORS
                .iter()
                .map(|d| Entity::new(coordinator, DeviceType::Cluster, EntityKind::Sensor(d))),
        );
    }
    entities
}

/// Slice of the aggregate data a sensor is evaluated over
///
/// Cluster copies of EMS sensors see `{"ems": [aggregated], "sensors": ..}`
/// so the same value functions work on the aggregated block.
pub fn sensor_data(description: &SensorDescription, device_type: DeviceType, data: &DeviceData) -> Value {
    let slice = object(data.get(description.data_key))
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()));

    if device_type == DeviceType::Cluster && description.data_key == "ems" {
        let aggregated = slice
            .get("aggregated")
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));
        let sensors = slice.get("sensors").cloned().unwrap_or_else(|| json!([]));
        return json!({ "ems": [aggregated], "sensors": sensors });
    }
    slice
}

pub fn native_value(description: &SensorDescription, device_type: DeviceType, data: &DeviceData) -> Value {
    (description.value_fn)(&sensor_data(description, device_type, data)).unwrap_or(Value::Null)
}

pub fn attributes(
    description: &SensorDescription,
    device_type: DeviceType,
    data: &DeviceData,
) -> Option<Value> {
    description
        .attributes_fn
        .map(|f| f(&sensor_data(description, device_type, data)))
}
