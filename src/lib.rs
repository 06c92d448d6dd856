//! # homevolt-local - local bridge for the Tibber Homevolt battery
//!
//! Talks to the battery's local HTTP API (JSON status endpoints, parameter
//! writes and the console command channel), polls it on an interval and
//! exposes the result as typed entities, device services and a small REST
//! bridge.
//!
//! ## Architecture
//!
//! - `api`: HTTP client with retry, last-good cache and console commands
//! - `coordinator`: periodic refresh and device identity
//! - `device`: ECU and cluster device records
//! - `entities`: sensors, binary sensors, numbers, switches, selects, buttons
//! - `services`: immediate mode changes addressed by device id
//! - `entry` / `config_flow`: entry setup, unload and interactive configuration
//! - `diagnostics`: redacted state dump
//! - `web`: REST bridge
//! - `config` / `logging` / `error`: ambient plumbing

pub mod api;
pub mod config;
pub mod config_flow;
pub mod constants;
pub mod coordinator;
pub mod device;
pub mod diagnostics;
pub mod entities;
pub mod entry;
pub mod error;
pub mod logging;
pub mod services;
pub mod web;

// Re-export commonly used types
pub use api::HomevoltApi;
pub use config::Config;
pub use coordinator::Coordinator;
pub use error::{HomevoltError, Result};
