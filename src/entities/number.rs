//! Numeric configuration parameters

use super::params::param_int;
use super::{EntityCategory, EntityMeta};
use crate::coordinator::{Coordinator, DeviceData};
use crate::error::{HomevoltError, Result};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberMode {
    Box,
    Slider,
}

#[derive(Debug, Clone, Copy)]
pub struct NumberDescription {
    pub key: &'static str,
    pub unit: &'static str,
    pub min: i64,
    pub max: i64,
    pub mode: NumberMode,
}

impl NumberDescription {
    pub const fn meta(&self) -> EntityMeta {
        EntityMeta {
            unit: Some(self.unit),
            entity_category: Some(EntityCategory::Config),
            min: Some(self.min as f64),
            max: Some(self.max as f64),
            step: Some(1.0),
            mode: Some(match self.mode {
                NumberMode::Box => "box",
                NumberMode::Slider => "slider",
            }),
            ..EntityMeta::EMPTY
        }
    }

    fn check(&self, value: i64) -> Result<()> {
        if (self.min..=self.max).contains(&value) {
            Ok(())
        } else {
            Err(HomevoltError::validation(
                self.key,
                format!("must be between {} and {}, got {value}", self.min, self.max),
            ))
        }
    }
}

pub static NUMBERS: &[NumberDescription] = &[
    NumberDescription {
        key: "ecu_main_fuse_size_a",
        unit: "A",
        min: 0,
        max: 100,
        mode: NumberMode::Box,
    },
    NumberDescription {
        key: "ecu_group_fuse_size_a",
        unit: "A",
        min: 0,
        max: 100,
        mode: NumberMode::Box,
    },
    NumberDescription {
        key: "ledstrip_bright_max",
        unit: "%",
        min: 0,
        max: 100,
        mode: NumberMode::Slider,
    },
    NumberDescription {
        key: "ledstrip_bright_min",
        unit: "%",
        min: 0,
        max: 100,
        mode: NumberMode::Slider,
    },
    NumberDescription {
        key: "ledstrip_mode_on_hue",
        unit: "°",
        min: 0,
        max: 360,
        mode: NumberMode::Slider,
    },
    NumberDescription {
        key: "ledstrip_mode_on_saturation",
        unit: "%",
        min: 0,
        max: 100,
        mode: NumberMode::Slider,
    },
];

pub fn native_value(description: &NumberDescription, data: &DeviceData) -> Option<i64> {
    param_int(data.get("params")?, description.key)
}

/// Integer from a JSON number or numeric string, truncated toward zero
fn requested_value(key: &str, value: &Value) -> Result<i64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number
        .filter(|f| f.is_finite())
        .map(|f| f.trunc() as i64)
        .ok_or_else(|| HomevoltError::validation(key, format!("expected a number, got {value}")))
}

/// Write the parameter and refresh
pub async fn set_value(
    description: &NumberDescription,
    coordinator: &Coordinator,
    value: &Value,
) -> Result<()> {
    let value = requested_value(description.key, value)?;
    description.check(value)?;
    coordinator
        .api()
        .set_param(description.key, &value.to_string())
        .await?;
    coordinator.request_refresh().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_param_ints() {
        let data = json!({"params": [
            {"name": "ecu_main_fuse_size_a", "value": [25]},
            {"name": "ledstrip_mode_on_hue", "value": 200.7}
        ]});
        let data = data.as_object().cloned().unwrap_or_default();
        assert_eq!(native_value(&NUMBERS[0], &data), Some(25));
        assert_eq!(native_value(&NUMBERS[4], &data), Some(200));
        assert_eq!(native_value(&NUMBERS[1], &data), None);
        assert_eq!(native_value(&NUMBERS[0], &DeviceData::new()), None);
    }

    #[test]
    fn requested_values_truncate() {
        assert_eq!(requested_value("k", &json!(16)).unwrap(), 16);
        assert_eq!(requested_value("k", &json!(16.9)).unwrap(), 16);
        assert_eq!(requested_value("k", &json!(" 40 ")).unwrap(), 40);
        assert!(requested_value("k", &json!("x")).is_err());
        assert!(requested_value("k", &json!(null)).is_err());
    }

    #[test]
    fn range_checks() {
        let hue = &NUMBERS[4];
        assert!(hue.check(360).is_ok());
        assert!(hue.check(361).is_err());
        assert!(NUMBERS[0].check(-1).is_err());
        assert_eq!(NUMBERS[2].meta().max, Some(100.0));
        assert_eq!(NUMBERS[0].meta().unit, Some("A"));
    }
}
