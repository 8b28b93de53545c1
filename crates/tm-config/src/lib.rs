//! Container configuration loading for the tag manager
//!
//! A container is the static rule set (variables, tags, triggers and
//! instructions) an engine boots from. It is written in YAML, optionally
//! split over several files with these custom tags:
//!
//! - `!include path` - Include another YAML file
//! - `!include_dir_list dir` - Include every YAML file in a directory as a list
//! - `!include_dir_merge_list dir` - Concatenate the lists of every YAML file in a directory
//! - `!env_var VAR [default]` - Environment variable substitution
//!
//! Files ending in `.json` are parsed as JSON and get no tag processing.
//!
//! # Example
//!
//! ```ignore
//! use tm_config::load_container;
//!
//! let value = load_container("/etc/tm", "container.yaml")?;
//! let config: EngineConfig = tm_config::from_value(value)?;
//! ```

mod error;
mod loader;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_container, load_yaml_string, ContainerLoader};

// Re-export serde_yaml::Value for convenience
pub use serde_yaml::Value;

/// Deserialize a loaded container value into a typed configuration
pub fn from_value<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, serde_yaml::Error> {
    serde_yaml::from_value(value)
}
