//! Reading configuration.yaml and extracting integration sections

use crate::error::{ConfigError, ConfigResult};
use serde::de::DeserializeOwned;
use serde_yaml::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Load a YAML file relative to the config directory
pub fn load_yaml(config_dir: impl AsRef<Path>, filename: &str) -> ConfigResult<Value> {
    let path: PathBuf = config_dir.as_ref().join(filename);
    debug!("Loading YAML file: {:?}", path);

    let content = fs::read_to_string(&path).map_err(|e| ConfigError::ReadFile {
        path: path.clone(),
        source: e,
    })?;

    serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseYaml { path, source: e })
}

/// Parse YAML from a string
pub fn load_yaml_string(content: &str) -> ConfigResult<Value> {
    serde_yaml::from_str(content).map_err(|e| ConfigError::ParseYaml {
        path: PathBuf::from("<string>"),
        source: e,
    })
}

/// Deserialize the section named `domain` from the configuration root
///
/// Returns `Ok(None)` when the integration is not configured. A section
/// present but empty (`velbus:`) deserializes from an empty mapping.
pub fn integration_config<T: DeserializeOwned>(root: &Value, domain: &str) -> ConfigResult<Option<T>> {
    let Some(section) = root.get(domain) else {
        return Ok(None);
    };

    let section = match section {
        Value::Null => Value::Mapping(serde_yaml::Mapping::new()),
        other => other.clone(),
    };

    serde_yaml::from_value(section)
        .map(Some)
        .map_err(|e| ConfigError::invalid(domain, e.to_string()))
}
