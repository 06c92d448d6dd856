//! Boolean configuration parameters

use super::params::{is_truthy_flag, param_bool};
use super::{EntityCategory, EntityMeta};
use crate::coordinator::{Coordinator, DeviceData};
use crate::error::{HomevoltError, Result};
use serde_json::Value;

#[derive(Debug, Clone, Copy)]
pub struct SwitchDescription {
    pub key: &'static str,
    pub meta: EntityMeta,
}

const CONFIG: EntityMeta = EntityMeta {
    entity_category: Some(EntityCategory::Config),
    ..EntityMeta::EMPTY
};

const DIAGNOSTIC: EntityMeta = EntityMeta {
    entity_category: Some(EntityCategory::Diagnostic),
    ..EntityMeta::EMPTY
};

pub static SWITCHES: &[SwitchDescription] = &[
    // Local mode gates every schedule and mode command
    SwitchDescription {
        key: "settings_local",
        meta: CONFIG,
    },
    SwitchDescription {
        key: "ota_enable",
        meta: DIAGNOSTIC,
    },
    SwitchDescription {
        key: "ota_enable_esp32",
        meta: DIAGNOSTIC,
    },
    SwitchDescription {
        key: "ota_enable_hub_web",
        meta: DIAGNOSTIC,
    },
    SwitchDescription {
        key: "ota_enable_bg95_m3",
        meta: DIAGNOSTIC,
    },
];

pub fn is_on(description: &SwitchDescription, data: &DeviceData) -> Option<bool> {
    param_bool(data.get("params")?, description.key)
}

fn requested_state(key: &str, value: &Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) if s.eq_ignore_ascii_case("on") => Ok(true),
        Value::String(s) if s.eq_ignore_ascii_case("off") || s == "false" || s == "0" => Ok(false),
        Value::String(_) | Value::Number(_) => Ok(is_truthy_flag(value)),
        _ => Err(HomevoltError::validation(
            key,
            format!("expected a boolean, got {value}"),
        )),
    }
}

/// Write `"true"`/`"false"` and refresh
pub async fn set_value(
    description: &SwitchDescription,
    coordinator: &Coordinator,
    value: &Value,
) -> Result<()> {
    let on = requested_state(description.key, value)?;
    coordinator
        .api()
        .set_param(description.key, if on { "true" } else { "false" })
        .await?;
    coordinator.request_refresh().await;
    Ok(())
}
