//! Container loader
//!
//! Walks the parsed YAML tree and expands the custom include and
//! environment tags. Paths in include tags resolve relative to the file that
//! contains them.

use crate::error::{ConfigError, ConfigResult};
use serde_yaml::value::TaggedValue;
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Loads container files and expands custom tags
pub struct ContainerLoader {
    /// Base directory for the top-level file
    config_dir: PathBuf,
    /// Files currently being loaded, outermost first
    include_chain: Vec<PathBuf>,
}

impl ContainerLoader {
    /// Create a loader rooted at the given directory
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            include_chain: Vec::new(),
        }
    }

    /// Load a container file
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> ConfigResult<Value> {
        let path = self.resolve_path(path.as_ref());
        debug!(path = %path.display(), "Loading container file");

        if self.include_chain.contains(&path) {
            let chain = self
                .include_chain
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(ConfigError::CircularInclude { path, chain });
        }

        let content = fs::read_to_string(&path).map_err(|source| ConfigError::ReadFile {
            path: path.clone(),
            source,
        })?;

        if path.extension().map(|ext| ext == "json").unwrap_or(false) {
            return parse_json(&content, &path);
        }

        self.include_chain.push(path.clone());
        let result = self.load_string(&content, &path);
        self.include_chain.pop();

        result
    }

    /// Parse YAML content and expand its tags
    pub fn load_string(&mut self, content: &str, source_path: &Path) -> ConfigResult<Value> {
        let value: Value =
            serde_yaml::from_str(content).map_err(|source| ConfigError::ParseYaml {
                path: source_path.to_path_buf(),
                source,
            })?;

        self.expand(value, source_path)
    }

    fn expand(&mut self, value: Value, source_path: &Path) -> ConfigResult<Value> {
        match value {
            Value::Tagged(tagged) => self.expand_tagged(*tagged, source_path),
            Value::Mapping(map) => {
                let mut result = Mapping::with_capacity(map.len());
                for (k, v) in map {
                    result.insert(k, self.expand(v, source_path)?);
                }
                Ok(Value::Mapping(result))
            }
            Value::Sequence(seq) => seq
                .into_iter()
                .map(|v| self.expand(v, source_path))
                .collect::<ConfigResult<Vec<_>>>()
                .map(Value::Sequence),
            other => Ok(other),
        }
    }

    fn expand_tagged(&mut self, tagged: TaggedValue, source_path: &Path) -> ConfigResult<Value> {
        let tag = tagged.tag.to_string();
        trace!(%tag, "Expanding tag");

        match tag.as_str() {
            "!include" => {
                let path = self.tag_path(&tag, &tagged.value, source_path)?;
                self.load_file(path)
            }
            "!include_dir_list" => {
                let dir = self.tag_path(&tag, &tagged.value, source_path)?;
                let mut items = Vec::new();
                for file in yaml_files(&dir)? {
                    items.push(self.load_file(&file)?);
                }
                Ok(Value::Sequence(items))
            }
            "!include_dir_merge_list" => {
                let dir = self.tag_path(&tag, &tagged.value, source_path)?;
                let mut items = Vec::new();
                for file in yaml_files(&dir)? {
                    match self.load_file(&file)? {
                        Value::Sequence(seq) => items.extend(seq),
                        Value::Null => {}
                        other => items.push(other),
                    }
                }
                Ok(Value::Sequence(items))
            }
            "!env_var" => env_var(&tagged.value),
            _ => {
                // Unknown tags are kept, their contents still expanded
                let value = self.expand(tagged.value, source_path)?;
                Ok(Value::Tagged(Box::new(TaggedValue {
                    tag: tagged.tag,
                    value,
                })))
            }
        }
    }

    fn tag_path(&self, tag: &str, value: &Value, source_path: &Path) -> ConfigResult<PathBuf> {
        let raw = value.as_str().ok_or_else(|| ConfigError::InvalidIncludePath {
            path: format!("{:?}", value),
            reason: format!("{} expects a path string", tag),
        })?;

        let raw = Path::new(raw);
        if raw.is_absolute() {
            return Ok(raw.to_path_buf());
        }
        let base = source_path.parent().unwrap_or(&self.config_dir);
        Ok(base.join(raw))
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config_dir.join(path)
        }
    }

    /// Get the config directory
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }
}

/// `!env_var NAME` or `!env_var NAME fallback`
fn env_var(value: &Value) -> ConfigResult<Value> {
    let raw = value.as_str().ok_or_else(|| ConfigError::InvalidTagValue {
        tag: "!env_var".to_string(),
        reason: "variable name must be a string".to_string(),
    })?;

    let mut parts = raw.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or_default();
    let fallback = parts.next().map(str::trim);

    match (std::env::var(name), fallback) {
        (Ok(v), _) => {
            debug!(var = name, "Substituted environment variable");
            Ok(Value::String(v))
        }
        (Err(_), Some(fallback)) => Ok(Value::String(fallback.to_string())),
        (Err(_), None) => Err(ConfigError::EnvVarNotFound {
            var: name.to_string(),
        }),
    }
}

fn parse_json(content: &str, path: &Path) -> ConfigResult<Value> {
    let json: serde_json::Value =
        serde_json::from_str(content).map_err(|source| ConfigError::ParseJson {
            path: path.to_path_buf(),
            source,
        })?;
    serde_yaml::to_value(json).map_err(|source| ConfigError::ParseYaml {
        path: path.to_path_buf(),
        source,
    })
}

/// YAML files directly inside `dir`, sorted by name
fn yaml_files(dir: &Path) -> ConfigResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(ConfigError::DirectoryNotFound {
            path: dir.to_path_buf(),
        });
    }

    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|source| ConfigError::ReadFile {
            path: dir.to_path_buf(),
            source,
        })?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .map(|ext| ext == "yaml" || ext == "yml")
                .unwrap_or(false)
        })
        .collect();

    files.sort();
    Ok(files)
}

/// Load a container file with full tag processing
pub fn load_container(
    config_dir: impl Into<PathBuf>,
    file: impl AsRef<Path>,
) -> ConfigResult<Value> {
    ContainerLoader::new(config_dir).load_file(file)
}

/// Load a YAML string with tag processing
pub fn load_yaml_string(
    config_dir: impl Into<PathBuf>,
    content: &str,
    source_name: &str,
) -> ConfigResult<Value> {
    let mut loader = ContainerLoader::new(config_dir);
    let source = loader.config_dir().join(source_name);
    loader.load_string(content, &source)
}
