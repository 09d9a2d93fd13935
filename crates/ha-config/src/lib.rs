//! YAML configuration for the integration host
//!
//! - [`CoreConfig`] - the `homeassistant:` section (home location, unit system)
//! - [`UnitSystem`] - metric/imperial choice with length conversion
//! - [`load_yaml`] / [`integration_config`] - reading `configuration.yaml`
//!   and deserializing one integration's section
//!
//! # Example
//!
//! ```ignore
//! use ha_config::{integration_config, load_yaml};
//!
//! let root = load_yaml("/config", "configuration.yaml")?;
//! let velbus: Option<VelbusYaml> = integration_config(&root, "velbus")?;
//! ```

mod core_config;
mod error;
mod loader;
mod units;

pub use core_config::CoreConfig;
pub use error::{ConfigError, ConfigResult};
pub use loader::{integration_config, load_yaml, load_yaml_string};
pub use units::{UnitSystem, KM_PER_MILE, LENGTH_KILOMETERS, LENGTH_MILES};

// Re-export serde_yaml::Value for convenience
pub use serde_yaml::Value;
