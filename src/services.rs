//! Device services (immediate mode changes and schedule clearing)
//!
//! A call names the target by `device_id`, which may be either the ECU id or
//! the cluster id of a registered coordinator. Successful calls refresh the
//! coordinator so entity states reflect the new mode.

use crate::api::ModeParams;
use crate::coordinator::Coordinator;
use crate::error::{HomevoltError, Result};
use crate::logging::{StructuredLogger, get_logger};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock};

pub const SERVICE_NAMES: [&str; 10] = [
    "clear_schedule",
    "set_idle",
    "set_charge",
    "set_discharge",
    "set_grid_charge",
    "set_grid_discharge",
    "set_grid_charge_discharge",
    "set_solar_charge",
    "set_solar_charge_discharge",
    "set_full_solar_export",
];

/// Optional setpoint and SOC window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeCall {
    pub device_id: String,
    #[serde(default, deserialize_with = "coerce::optional")]
    pub setpoint: Option<u32>,
    #[serde(default, deserialize_with = "coerce::optional")]
    pub min_soc: Option<u8>,
    #[serde(default, deserialize_with = "coerce::optional")]
    pub max_soc: Option<u8>,
}

impl ModeCall {
    fn params(&self) -> ModeParams {
        ModeParams {
            setpoint: self.setpoint,
            ..ModeParams::default()
        }
        .soc_window(self.min_soc, self.max_soc)
    }
}

/// Grid charge/discharge with a required baseline setpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridChargeDischargeCall {
    pub device_id: String,
    #[serde(deserialize_with = "coerce::required")]
    pub setpoint: u32,
    #[serde(default, deserialize_with = "coerce::optional")]
    pub charge_setpoint: Option<u32>,
    #[serde(default, deserialize_with = "coerce::optional")]
    pub discharge_setpoint: Option<u32>,
    #[serde(default, deserialize_with = "coerce::optional")]
    pub min_soc: Option<u8>,
    #[serde(default, deserialize_with = "coerce::optional")]
    pub max_soc: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitModeCall {
    pub device_id: String,
    #[serde(default, deserialize_with = "coerce::optional")]
    pub setpoint: Option<u32>,
    #[serde(default, deserialize_with = "coerce::optional")]
    pub charge_setpoint: Option<u32>,
    #[serde(default, deserialize_with = "coerce::optional")]
    pub discharge_setpoint: Option<u32>,
    #[serde(default, deserialize_with = "coerce::optional")]
    pub min_soc: Option<u8>,
    #[serde(default, deserialize_with = "coerce::optional")]
    pub max_soc: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "service", rename_all = "snake_case")]
pub enum ServiceCall {
    ClearSchedule {
        device_id: String,
    },
    SetIdle {
        device_id: String,
        #[serde(default)]
        offline: bool,
    },
    SetCharge(ModeCall),
    SetDischarge(ModeCall),
    SetGridCharge(ModeCall),
    SetGridDischarge(ModeCall),
    SetGridChargeDischarge(GridChargeDischargeCall),
    SetSolarCharge(ModeCall),
    SetSolarChargeDischarge(SplitModeCall),
    SetFullSolarExport(ModeCall),
}

impl ServiceCall {
    /// Build a call from a service name and its JSON arguments
    pub fn from_parts(service: &str, args: Value) -> Result<Self> {
        if !SERVICE_NAMES.contains(&service) {
            return Err(HomevoltError::not_found(format!("Unknown service {service}")));
        }
        let Value::Object(mut fields) = args else {
            return Err(HomevoltError::validation(
                "body",
                "service arguments must be a JSON object",
            ));
        };
        fields.insert("service".into(), Value::String(service.to_string()));
        serde_json::from_value(Value::Object(fields))
            .map_err(|e| HomevoltError::validation(service, e.to_string()))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ClearSchedule { .. } => "clear_schedule",
            Self::SetIdle { .. } => "set_idle",
            Self::SetCharge(_) => "set_charge",
            Self::SetDischarge(_) => "set_discharge",
            Self::SetGridCharge(_) => "set_grid_charge",
            Self::SetGridDischarge(_) => "set_grid_discharge",
            Self::SetGridChargeDischarge(_) => "set_grid_charge_discharge",
            Self::SetSolarCharge(_) => "set_solar_charge",
            Self::SetSolarChargeDischarge(_) => "set_solar_charge_discharge",
            Self::SetFullSolarExport(_) => "set_full_solar_export",
        }
    }

    pub fn device_id(&self) -> &str {
        match self {
            Self::ClearSchedule { device_id } | Self::SetIdle { device_id, .. } => device_id,
            Self::SetCharge(c)
            | Self::SetDischarge(c)
            | Self::SetGridCharge(c)
            | Self::SetGridDischarge(c)
            | Self::SetSolarCharge(c)
            | Self::SetFullSolarExport(c) => &c.device_id,
            Self::SetGridChargeDischarge(c) => &c.device_id,
            Self::SetSolarChargeDischarge(c) => &c.device_id,
        }
    }

    /// Run against `coordinator`'s device
    async fn execute(&self, coordinator: &Coordinator) -> Result<()> {
        let api = coordinator.api();
        match self {
            Self::ClearSchedule { .. } => api.clear_schedule().await?,
            Self::SetIdle { offline, .. } => api.set_idle(*offline).await?,
            Self::SetCharge(c) => api.set_charge(&c.params()).await?,
            Self::SetDischarge(c) => api.set_discharge(&c.params()).await?,
            Self::SetGridCharge(c) => api.set_grid_charge(&c.params()).await?,
            Self::SetGridDischarge(c) => api.set_grid_discharge(&c.params()).await?,
            Self::SetGridChargeDischarge(c) => {
                let params = ModeParams {
                    charge_setpoint: c.charge_setpoint,
                    discharge_setpoint: c.discharge_setpoint,
                    ..ModeParams::default()
                }
                .soc_window(c.min_soc, c.max_soc);
                api.set_grid_charge_discharge(c.setpoint, &params).await?
            }
            Self::SetSolarCharge(c) => api.set_solar_charge(&c.params()).await?,
            Self::SetSolarChargeDischarge(c) => {
                let params = ModeParams {
                    setpoint: c.setpoint,
                    charge_setpoint: c.charge_setpoint,
                    discharge_setpoint: c.discharge_setpoint,
                    min_soc: c.min_soc,
                    max_soc: c.max_soc,
                };
                api.set_solar_charge_discharge(&params).await?
            }
            Self::SetFullSolarExport(c) => api.set_full_solar_export(&c.params()).await?,
        };
        Ok(())
    }
}

/// Coordinators that services can target
pub struct ServiceRegistry {
    coordinators: RwLock<Vec<Arc<Coordinator>>>,
    logger: StructuredLogger,
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            coordinators: RwLock::new(Vec::new()),
            logger: get_logger("services"),
        }
    }

    pub fn register(&self, coordinator: Arc<Coordinator>) {
        self.coordinators
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(coordinator);
    }

    /// Drop a coordinator; returns whether it was registered
    pub fn unregister(&self, coordinator: &Arc<Coordinator>) -> bool {
        let mut coordinators = self
            .coordinators
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = coordinators.len();
        coordinators.retain(|c| !Arc::ptr_eq(c, coordinator));
        coordinators.len() != before
    }

    pub fn len(&self) -> usize {
        self.coordinators
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Coordinator owning the ECU or cluster device `device_id`
    pub fn resolve(&self, device_id: &str) -> Result<Arc<Coordinator>> {
        self.coordinators
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|c| c.device_id() == device_id || c.cluster_id() == device_id)
            .cloned()
            .ok_or_else(|| HomevoltError::not_found(format!("Device {device_id} not found")))
    }

    /// Execute `call` and refresh the target coordinator
    pub async fn call(&self, call: &ServiceCall) -> Result<()> {
        let coordinator = self.resolve(call.device_id()).inspect_err(|e| {
            self.logger.error(&e.to_string());
        })?;
        self.logger.info(&format!(
            "Service {} for device {}",
            call.name(),
            call.device_id()
        ));
        call.execute(&coordinator).await?;
        coordinator.request_refresh().await;
        Ok(())
    }
}

/// Integer fields that also accept numeric strings such as `"3000"`
mod coerce {
    use serde::de::{Deserialize, Deserializer, Error};
    use serde_json::Value;

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn to_int<T: TryFrom<u64>>(value: &Value) -> Result<T, String> {
        let number = match value {
            Value::Number(n) => n.as_u64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.is_finite() && *f >= 0.0)
                    .map(|f| f as u64)
            }),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<u64>().ok().or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite() && *f >= 0.0)
                        .map(|f| f as u64)
                })
            }
            _ => None,
        }
        .ok_or_else(|| format!("expected a non-negative integer, got {value}"))?;
        T::try_from(number).map_err(|_| format!("{number} is out of range"))
    }

    pub fn optional<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: TryFrom<u64>,
    {
        match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => Ok(None),
            Some(value) => to_int(&value).map(Some).map_err(D::Error::custom),
        }
    }

    pub fn required<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: TryFrom<u64>,
    {
        to_int(&Value::deserialize(deserializer)?).map_err(D::Error::custom)
    }
}
