// Dataset descriptor supplied alongside the model records

use crate::data::Value;
use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    #[default]
    Numeric,
    Categorical,
}

/// One hyperparameter of the DR technique being compared
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Hyperparameter {
    pub name: String,
    #[serde(default)]
    pub kind: ParameterKind,
    /// Allowed values, if the sweep used a fixed grid
    #[serde(default)]
    pub values: Vec<Json>,
}

impl Hyperparameter {
    pub fn numeric(name: &str) -> Self {
        Self { name: name.to_string(), kind: ParameterKind::Numeric, values: Vec::new() }
    }

    pub fn categorical(name: &str) -> Self {
        Self { name: name.to_string(), kind: ParameterKind::Categorical, values: Vec::new() }
    }

    pub fn is_categorical(&self) -> bool {
        self.kind == ParameterKind::Categorical
    }

    /// Allowed values converted to engine scalars; unsupported JSON is skipped
    pub fn allowed_values(&self) -> Vec<Value> {
        self.values
            .iter()
            .filter_map(|v| match v {
                Json::Number(n) => n.as_f64().map(Value::Number),
                Json::String(s) => Some(Value::Text(s.clone())),
                _ => None,
            })
            .collect()
    }
}

/// Hyperparameter and objective names of a model collection
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
pub struct Metadata {
    #[serde(default)]
    pub hyperparameters: Vec<Hyperparameter>,
    #[serde(default)]
    pub objectives: Vec<String>,
}

impl Metadata {
    pub fn from_json(value: Json) -> Result<Self> {
        let meta: Metadata = serde_json::from_value(value)?;
        meta.validate()?;
        Ok(meta)
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        let names = self
            .hyperparameters
            .iter()
            .map(|h| h.name.as_str())
            .chain(self.objectives.iter().map(String::as_str));
        for name in names {
            if name.is_empty() {
                return Err(EngineError::invalid("attribute names must not be empty"));
            }
            if !seen.insert(name) {
                return Err(EngineError::invalid(format!("attribute '{}' declared twice", name)));
            }
        }
        Ok(())
    }

    pub fn hyperparameter_names(&self) -> Vec<String> {
        self.hyperparameters.iter().map(|h| h.name.clone()).collect()
    }
}
