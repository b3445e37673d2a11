//! Search keys: which document fields are searched and how much each counts.

use crate::error::{ConfigurationError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Field name written either as a dotted string or as explicit segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyName {
    Dotted(String),
    Path(Vec<String>),
}

impl KeyName {
    fn path(&self) -> Vec<String> {
        match self {
            KeyName::Dotted(name) => name.split('.').map(str::to_string).collect(),
            KeyName::Path(segments) => segments.clone(),
        }
    }

    fn label(&self) -> String {
        match self {
            KeyName::Dotted(name) => name.clone(),
            KeyName::Path(segments) => segments.join("."),
        }
    }
}

impl From<&str> for KeyName {
    fn from(name: &str) -> Self {
        KeyName::Dotted(name.to_string())
    }
}

/// A key as configured by the caller.
///
/// Deserializes from `"title"`, `["author", "name"]` or
/// `{"name": "title", "weight": 2}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeySpec {
    Name(String),
    Path(Vec<String>),
    Weighted {
        #[serde(default)]
        name: Option<KeyName>,
        #[serde(default)]
        weight: Option<f64>,
    },
}

impl KeySpec {
    pub fn weighted(name: impl Into<KeyName>, weight: f64) -> Self {
        KeySpec::Weighted {
            name: Some(name.into()),
            weight: Some(weight),
        }
    }
}

impl From<&str> for KeySpec {
    fn from(name: &str) -> Self {
        KeySpec::Name(name.to_string())
    }
}

/// A resolved key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Key {
    pub path: Vec<String>,
    /// Path joined with `.`
    pub id: String,
    pub weight: f64,
    /// Label reported back in match details
    pub src: String,
}

/// Resolve one key spec. Weights are still raw here.
pub fn create_key(spec: &KeySpec) -> Result<Key> {
    let (name, weight) = match spec {
        KeySpec::Name(name) => (KeyName::Dotted(name.clone()), 1.0),
        KeySpec::Path(segments) => (KeyName::Path(segments.clone()), 1.0),
        KeySpec::Weighted { name, weight } => {
            let name = name.clone().ok_or(ConfigurationError::MissingKeyName)?;
            let weight = weight.unwrap_or(1.0);
            if !(weight.is_finite() && weight > 0.0) {
                return Err(ConfigurationError::InvalidWeight {
                    key: name.label(),
                    weight,
                }
                .into());
            }
            (name, weight)
        }
    };

    let path = name.path();
    if path.is_empty() || path.iter().all(|segment| segment.is_empty()) {
        return Err(ConfigurationError::EmptyKeyPath.into());
    }

    Ok(Key {
        id: path.join("."),
        path,
        weight,
        src: name.label(),
    })
}

/// Registry of resolved keys with weights normalized to sum to 1.
#[derive(Debug, Clone, Default)]
pub struct KeyStore {
    keys: Vec<Key>,
    key_map: HashMap<String, usize>,
}

impl KeyStore {
    pub fn new(specs: &[KeySpec]) -> Result<Self> {
        let mut keys = specs.iter().map(create_key).collect::<Result<Vec<_>>>()?;

        let total_weight: f64 = keys.iter().map(|k| k.weight).sum();
        for key in &mut keys {
            key.weight /= total_weight;
        }

        Ok(Self::from_keys(keys))
    }

    /// Wrap keys that were already normalized, e.g. from a snapshot
    pub fn from_keys(keys: Vec<Key>) -> Self {
        let key_map = keys
            .iter()
            .enumerate()
            .map(|(i, key)| (key.id.clone(), i))
            .collect();
        Self { keys, key_map }
    }

    pub fn get(&self, id: &str) -> Option<&Key> {
        self.key_map.get(id).map(|&i| &self.keys[i])
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.key_map.get(id).copied()
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
