//! In-place editing of a node's JSON config file.
//!
//! The document stays an opaque `serde_json::Value`; callers address fields by
//! dotted path (`Addresses.Swarm`). Key order is preserved across rewrites so
//! diffs of the file stay readable.

use std::path::Path;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ConfigError;

/// Parsed node configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeConfig(Value);

impl Default for NodeConfig {
    fn default() -> Self {
        Self(Value::Object(Map::new()))
    }
}

impl From<Value> for NodeConfig {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

fn split_path(path: &str) -> Result<Vec<&str>, ConfigError> {
    let segments: Vec<&str> = path.split('.').collect();
    if path.is_empty() || segments.iter().any(|s| s.is_empty()) {
        return Err(ConfigError::InvalidPath(path.to_string()));
    }
    Ok(segments)
}

impl NodeConfig {
    /// Read and parse a config file.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Self::parse(path, &text)
    }

    fn parse(path: &Path, text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text)
            .map(Self)
            .map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Serialize with two-space indentation.
    pub fn to_pretty_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(&self.0)?)
    }

    /// Write the config, replacing the file atomically.
    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = self.to_pretty_string()?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "config".to_string());
        let tmp = path.with_file_name(format!(
            ".{file_name}.{}.tmp",
            uuid::Uuid::new_v4().as_simple()
        ));

        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        tokio::fs::write(&tmp, text).await.map_err(write_err)?;
        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(write_err(e));
        }
        Ok(())
    }

    /// Value at `path`, or `None` if any segment is missing.
    pub fn get(&self, path: &str) -> Result<Option<&Value>, ConfigError> {
        let mut current = &self.0;
        for segment in split_path(path)? {
            match current {
                Value::Object(map) => match map.get(segment) {
                    Some(next) => current = next,
                    None => return Ok(None),
                },
                _ => {
                    return Err(ConfigError::NotAnObject {
                        path: path.to_string(),
                    })
                }
            }
        }
        Ok(Some(current))
    }

    /// String value at `path`, if present and a string.
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).ok().flatten().and_then(Value::as_str)
    }

    /// Set `path` to `value`, creating intermediate objects as needed.
    pub fn set<T: Serialize>(&mut self, path: &str, value: T) -> Result<(), ConfigError> {
        let segments = split_path(path)?;
        let value = serde_json::to_value(value)?;
        let not_object = || ConfigError::NotAnObject {
            path: path.to_string(),
        };

        let (last, parents) = segments.split_last().ok_or_else(|| ConfigError::InvalidPath(path.to_string()))?;
        let mut current = &mut self.0;
        for segment in parents {
            let map = current.as_object_mut().ok_or_else(not_object)?;
            current = map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        current
            .as_object_mut()
            .ok_or_else(not_object)?
            .insert(last.to_string(), value);
        Ok(())
    }

    /// Append `value` to the array at `path`, creating it if missing.
    pub fn push<T: Serialize>(&mut self, path: &str, value: T) -> Result<(), ConfigError> {
        let mut items = match self.get(path)? {
            Some(Value::Array(items)) => items.clone(),
            Some(Value::Null) | None => Vec::new(),
            Some(_) => {
                return Err(ConfigError::NotAnObject {
                    path: path.to_string(),
                })
            }
        };
        items.push(serde_json::to_value(value)?);
        self.set(path, Value::Array(items))
    }

    /// The whole document.
    pub fn value(&self) -> &Value {
        &self.0
    }

    /// The whole document, mutably.
    pub fn value_mut(&mut self) -> &mut Value {
        &mut self.0
    }

    /// Consume into the underlying document.
    pub fn into_value(self) -> Value {
        self.0
    }
}
