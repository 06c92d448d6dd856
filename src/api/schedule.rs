//! Battery control modes and `sched_set` / `sched_add` command encoding

use crate::error::{HomevoltError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Battery control modes understood by the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    Idle,
    InverterCharge,
    InverterDischarge,
    GridCharge,
    GridDischarge,
    GridChargeDischarge,
    FrequencyReserve,
    SolarCharge,
    SolarChargeDischarge,
    FullSolarExport,
}

impl ControlMode {
    pub const ALL: [Self; 10] = [
        Self::Idle,
        Self::InverterCharge,
        Self::InverterDischarge,
        Self::GridCharge,
        Self::GridDischarge,
        Self::GridChargeDischarge,
        Self::FrequencyReserve,
        Self::SolarCharge,
        Self::SolarChargeDischarge,
        Self::FullSolarExport,
    ];

    pub const fn code(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::InverterCharge => 1,
            Self::InverterDischarge => 2,
            Self::GridCharge => 3,
            Self::GridDischarge => 4,
            Self::GridChargeDischarge => 5,
            Self::FrequencyReserve => 6,
            Self::SolarCharge => 7,
            Self::SolarChargeDischarge => 8,
            Self::FullSolarExport => 9,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|m| u64::from(m.code()) == code)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::InverterCharge => "inverter_charge",
            Self::InverterDischarge => "inverter_discharge",
            Self::GridCharge => "grid_charge",
            Self::GridDischarge => "grid_discharge",
            Self::GridChargeDischarge => "grid_charge_discharge",
            Self::FrequencyReserve => "frequency_reserve",
            Self::SolarCharge => "solar_charge",
            Self::SolarChargeDischarge => "solar_charge_discharge",
            Self::FullSolarExport => "full_solar_export",
        }
    }

    /// Modes that accept separate charge (`-c`) and discharge (`-d`) limits
    pub const fn has_split_setpoints(self) -> bool {
        matches!(self, Self::GridChargeDischarge | Self::SolarChargeDischarge)
    }
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Optional limits for an immediate mode change
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeParams {
    /// Power setpoint in watts
    pub setpoint: Option<u32>,
    /// Max charge power in watts (split-setpoint modes only)
    pub charge_setpoint: Option<u32>,
    /// Max discharge power in watts (split-setpoint modes only)
    pub discharge_setpoint: Option<u32>,
    pub min_soc: Option<u8>,
    pub max_soc: Option<u8>,
}

impl ModeParams {
    pub const fn with_setpoint(setpoint: u32) -> Self {
        Self {
            setpoint: Some(setpoint),
            charge_setpoint: None,
            discharge_setpoint: None,
            min_soc: None,
            max_soc: None,
        }
    }

    #[must_use]
    pub const fn soc_window(mut self, min_soc: Option<u8>, max_soc: Option<u8>) -> Self {
        self.min_soc = min_soc;
        self.max_soc = max_soc;
        self
    }

    /// SOC bounds, and split setpoints only where `mode` takes them
    pub fn validate(&self, mode: ControlMode) -> Result<()> {
        if !mode.has_split_setpoints() {
            for (field, value) in [
                ("charge_setpoint", self.charge_setpoint),
                ("discharge_setpoint", self.discharge_setpoint),
            ] {
                if value.is_some() {
                    return Err(HomevoltError::validation(
                        field,
                        format!("not supported by {mode}"),
                    ));
                }
            }
        }
        check_soc("min_soc", self.min_soc)?;
        check_soc("max_soc", self.max_soc)
    }
}

fn check_soc(field: &str, value: Option<u8>) -> Result<()> {
    match value {
        Some(v) if v > 100 => Err(HomevoltError::validation(
            field,
            format!("must be between 0 and 100, got {v}"),
        )),
        _ => Ok(()),
    }
}

/// `sched_set <mode>` followed by `-s`, `-c`, `-d`, `--min`, `--max` as present
pub fn build_mode_command(mode: ControlMode, params: &ModeParams) -> String {
    let mut cmd = format!("sched_set {}", mode.code());
    if let Some(setpoint) = params.setpoint {
        cmd.push_str(&format!(" -s {setpoint}"));
    }
    if mode.has_split_setpoints() {
        if let Some(charge) = params.charge_setpoint {
            cmd.push_str(&format!(" -c {charge}"));
        }
        if let Some(discharge) = params.discharge_setpoint {
            cmd.push_str(&format!(" -d {discharge}"));
        }
    }
    if let Some(min_soc) = params.min_soc {
        cmd.push_str(&format!(" --min {min_soc}"));
    }
    if let Some(max_soc) = params.max_soc {
        cmd.push_str(&format!(" --max {max_soc}"));
    }
    cmd
}

/// One entry of a bulk schedule replacement
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    /// Control mode code, 0..=9
    #[serde(rename = "type")]
    pub mode: u8,
    /// ISO-8601 start
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_time: Option<String>,
    /// ISO-8601 end
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_soc: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_soc: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setpoint: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_charge: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_discharge: Option<u32>,
    /// Grid import limit in watts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_limit: Option<u32>,
    /// Grid export limit in watts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_limit: Option<u32>,
}

impl ScheduleEntry {
    pub fn new(mode: ControlMode) -> Self {
        Self {
            mode: mode.code(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn window(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.from_time = Some(from.into());
        self.to_time = Some(to.into());
        self
    }

    #[must_use]
    pub const fn setpoint(mut self, watts: u32) -> Self {
        self.setpoint = Some(watts);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if ControlMode::from_code(u64::from(self.mode)).is_none() {
            return Err(HomevoltError::validation(
                "type",
                format!("unknown control mode {}", self.mode),
            ));
        }
        check_soc("min_soc", self.min_soc)?;
        check_soc("max_soc", self.max_soc)
    }

    /// Argument string without the `sched_set` / `sched_add` prefix
    ///
    /// Field order is fixed: type, `--from`, `--to`, `--min`, `--max`, `-s`,
    /// `-c`, `-d`, `-l`, `-x`.
    pub fn to_command_args(&self) -> String {
        let mut parts = vec![self.mode.to_string()];
        let mut push = |flag: &str, value: Option<String>| {
            if let Some(value) = value {
                parts.push(format!("{flag} {value}"));
            }
        };
        push("--from", self.from_time.clone());
        push("--to", self.to_time.clone());
        push("--min", self.min_soc.map(|v| v.to_string()));
        push("--max", self.max_soc.map(|v| v.to_string()));
        push("-s", self.setpoint.map(|v| v.to_string()));
        push("-c", self.max_charge.map(|v| v.to_string()));
        push("-d", self.max_discharge.map(|v| v.to_string()));
        push("-l", self.import_limit.map(|v| v.to_string()));
        push("-x", self.export_limit.map(|v| v.to_string()));
        parts.join(" ")
    }
}
