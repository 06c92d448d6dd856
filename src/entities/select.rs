//! LED strip mode selector

use super::params::find_param;
use super::{EntityCategory, EntityMeta};
use crate::coordinator::{Coordinator, DeviceData};
use crate::error::{HomevoltError, Result};
use serde_json::Value;

pub const LEDSTRIP_MODES: &[&str] = &["unset", "off", "on", "soc", "dem", "ser"];

#[derive(Debug, Clone, Copy)]
pub struct SelectDescription {
    pub key: &'static str,
    pub options: &'static [&'static str],
    /// Option shown when the parameter is empty or missing
    pub empty_option: &'static str,
}

impl SelectDescription {
    pub const fn meta(&self) -> EntityMeta {
        EntityMeta {
            entity_category: Some(EntityCategory::Config),
            options: Some(self.options),
            ..EntityMeta::EMPTY
        }
    }
}

pub static SELECTS: &[SelectDescription] = &[SelectDescription {
    key: "ledstrip_mode",
    options: LEDSTRIP_MODES,
    empty_option: "unset",
}];

/// Current option; `None` for a value outside the option list
pub fn current_option(description: &SelectDescription, data: &DeviceData) -> Option<&'static str> {
    let raw = data
        .get("params")
        .and_then(|params| find_param(params, description.key));
    let value = match raw {
        None | Some(Value::Null) => "",
        Some(Value::String(s)) => s.as_str(),
        Some(_) => return None,
    };
    if value.is_empty() {
        return Some(description.empty_option);
    }
    description.options.iter().copied().find(|o| *o == value)
}

pub async fn select_option(
    description: &SelectDescription,
    coordinator: &Coordinator,
    value: &Value,
) -> Result<()> {
    let option = value
        .as_str()
        .and_then(|v| description.options.iter().find(|o| **o == v))
        .ok_or_else(|| {
            HomevoltError::validation(
                description.key,
                format!(
                    "invalid option {value}, expected one of {}",
                    description.options.join(", ")
                ),
            )
        })?;
    coordinator.api().set_param(description.key, option).await?;
    coordinator.request_refresh().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn with_mode(value: Value) -> DeviceData {
        let data = json!({"params": [{"name": "ledstrip_mode", "value": value}]});
        data.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn current_options() {
        let select = &SELECTS[0];
        assert_eq!(current_option(select, &with_mode(json!(["soc"]))), Some("soc"));
        assert_eq!(current_option(select, &with_mode(json!("off"))), Some("off"));
        assert_eq!(current_option(select, &with_mode(json!(""))), Some("unset"));
        assert_eq!(current_option(select, &DeviceData::new()), Some("unset"));
        assert_eq!(current_option(select, &with_mode(json!("rainbow"))), None);
    }

    #[test]
    fn meta_lists_options() {
        assert_eq!(SELECTS[0].meta().options, Some(LEDSTRIP_MODES));
    }
}
