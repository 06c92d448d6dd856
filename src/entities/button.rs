//! One-shot device actions

use super::{EntityCategory, EntityMeta};
use crate::api::ModeParams;
use crate::coordinator::Coordinator;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonAction {
    ClearSchedule,
    SetIdle,
    SetCharge,
    SetDischarge,
    SetSolarCharge,
    SetFullSolarExport,
    Reboot,
}

#[derive(Debug, Clone, Copy)]
pub struct ButtonDescription {
    pub key: &'static str,
    pub meta: EntityMeta,
    pub action: ButtonAction,
}

const CONFIG: EntityMeta = EntityMeta {
    entity_category: Some(EntityCategory::Config),
    ..EntityMeta::EMPTY
};

pub static BUTTONS: &[ButtonDescription] = &[
    ButtonDescription {
        key: "clear_schedule",
        meta: CONFIG,
        action: ButtonAction::ClearSchedule,
    },
    ButtonDescription {
        key: "set_idle",
        meta: CONFIG,
        action: ButtonAction::SetIdle,
    },
    ButtonDescription {
        key: "set_charge",
        meta: CONFIG,
        action: ButtonAction::SetCharge,
    },
    ButtonDescription {
        key: "set_discharge",
        meta: CONFIG,
        action: ButtonAction::SetDischarge,
    },
    ButtonDescription {
        key: "set_solar_charge",
        meta: CONFIG,
        action: ButtonAction::SetSolarCharge,
    },
    ButtonDescription {
        key: "set_full_solar_export",
        meta: CONFIG,
        action: ButtonAction::SetFullSolarExport,
    },
    ButtonDescription {
        key: "reboot",
        meta: EntityMeta {
            device_class: Some("restart"),
            entity_category: Some(EntityCategory::Diagnostic),
            ..EntityMeta::EMPTY
        },
        action: ButtonAction::Reboot,
    },
];

/// Run the action; everything but a reboot refreshes afterwards
pub async fn press(description: &ButtonDescription, coordinator: &Coordinator) -> Result<()> {
    let api = coordinator.api();
    let defaults = ModeParams::default();
    match description.action {
        ButtonAction::ClearSchedule => api.clear_schedule().await?,
        ButtonAction::SetIdle => api.set_idle(false).await?,
        ButtonAction::SetCharge => api.set_charge(&defaults).await?,
        ButtonAction::SetDischarge => api.set_discharge(&defaults).await?,
        ButtonAction::SetSolarCharge => api.set_solar_charge(&defaults).await?,
        ButtonAction::SetFullSolarExport => api.set_full_solar_export(&defaults).await?,
        ButtonAction::Reboot => {
            api.reboot().await?;
            return Ok(());
        }
    };
    coordinator.request_refresh().await;
    Ok(())
}
