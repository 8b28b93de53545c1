//! Container configuration

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tm_variable_store::VariableStore;
use tracing::debug;

use crate::error::EngineResult;
use crate::instruction::InstructionConfig;
use crate::trigger::TriggerConfig;

/// Tag declared by a container
///
/// The engine only needs the id; hosts decide how a `kind` is executed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagConfig {
    pub id: String,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// A complete container: variables, tags, triggers and instructions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Initial variable values; `null` declares a variable without a value
    #[serde(default)]
    pub variables: IndexMap<String, serde_json::Value>,
    #[serde(default)]
    pub tags: Vec<TagConfig>,
    #[serde(default)]
    pub triggers: Vec<TriggerConfig>,
    #[serde(default)]
    pub instructions: Vec<InstructionConfig>,
}

impl EngineConfig {
    /// Convert a loaded YAML document
    pub fn from_yaml_value(value: serde_yaml::Value) -> EngineResult<Self> {
        Ok(serde_yaml::from_value(value)?)
    }

    pub fn from_yaml_str(content: &str) -> EngineResult<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_json_str(content: &str) -> EngineResult<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Declare the configured variables in a store
    pub fn apply_variables(&self, store: &VariableStore) {
        for (name, value) in &self.variables {
            if value.is_null() {
                store.declare(name.clone());
            } else {
                store.set(name, value.clone());
            }
        }
        debug!(count = self.variables.len(), "Applied container variables");
    }
}
