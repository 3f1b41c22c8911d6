// src/config/mod.rs

//! Planner configuration.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate values and parse durations (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    DefaultsSection, FrontgateSection, PilotSection, PlanConfig, RawPlanConfig, RawWaitSection,
    WaitPolicy,
};
pub use validate::parse_duration;
