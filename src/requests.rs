// Collaborator services and stale-response handling

use crate::error::{EngineError, Result};
use crate::index::IdSet;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Comma-joined id list, the form external services take
pub fn join_ids(ids: &IdSet) -> String {
    ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(",")
}

// =============================================================================
// Generations
// =============================================================================

/// Monotonic source of request generations
#[derive(Debug, Default)]
pub struct GenerationCounter {
    last: u64,
}

impl GenerationCounter {
    pub fn next(&mut self) -> u64 {
        self.last += 1;
        self.last
    }

    pub fn current(&self) -> u64 {
        self.last
    }
}

/// Identifies one outgoing request on a channel
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RequestTag {
    pub channel: String,
    pub generation: u64,
}

/// Accepts only the response to the newest request issued per channel.
/// Each tag is accepted at most once.
#[derive(Debug, Default)]
pub struct ResponseGate {
    counter: GenerationCounter,
    latest: HashMap<String, u64>,
}

impl ResponseGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&mut self, channel: &str) -> RequestTag {
        let generation = self.counter.next();
        self.latest.insert(channel.to_string(), generation);
        debug!(channel, generation, "request issued");
        RequestTag { channel: channel.to_string(), generation }
    }

    pub fn is_current(&self, tag: &RequestTag) -> bool {
        self.latest.get(&tag.channel) == Some(&tag.generation)
    }

    /// Hand back the response if its request is still the newest one,
    /// drop it otherwise.
    pub fn accept<T>(&mut self, tag: &RequestTag, response: T) -> Option<T> {
        if self.is_current(tag) {
            self.latest.remove(&tag.channel);
            Some(response)
        } else {
            warn!(channel = %tag.channel, generation = tag.generation, "discarding stale response");
            None
        }
    }
}

// =============================================================================
// Response shapes
// =============================================================================

/// Correlation strength per hyperparameter and objective
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationTable(BTreeMap<String, BTreeMap<String, f64>>);

impl CorrelationTable {
    pub fn from_json(value: Json) -> Result<Self> {
        let table: CorrelationTable = serde_json::from_value(value)?;
        for (row, cols) in &table.0 {
            if let Some((col, _)) = cols.iter().find(|(_, v)| !v.is_finite()) {
                return Err(EngineError::invalid(format!("non-finite correlation for {}/{}", row, col)));
            }
        }
        Ok(table)
    }

    pub fn insert(&mut self, hyperparameter: &str, objective: &str, strength: f64) {
        self.0
            .entry(hyperparameter.to_string())
            .or_default()
            .insert(objective.to_string(), strength);
    }

    pub fn get(&self, hyperparameter: &str, objective: &str) -> Option<f64> {
        self.0.get(hyperparameter)?.get(objective).copied()
    }

    /// Hyperparameters ordered by absolute correlation with one objective
    pub fn ranked(&self, objective: &str) -> Vec<(&str, f64)> {
        let mut rows: Vec<(&str, f64)> = self
            .0
            .iter()
            .filter_map(|(h, cols)| cols.get(objective).map(|v| (h.as_str(), *v)))
            .collect();
        rows.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()).then(a.0.cmp(b.0)));
        rows
    }
}

/// One rule of a surrogate model explaining an objective
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub condition: String,
    pub precision: f64,
    pub recall: f64,
    pub support: f64,
}

/// One embedded point of a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingPoint {
    pub id: i64,
    pub coordinates: Vec<f64>,
}

/// Embedding of one model as reported by the detail service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDetail {
    pub model_id: i64,
    pub dimensionality: usize,
    pub points: Vec<EmbeddingPoint>,
}

// =============================================================================
// Services
// =============================================================================

pub trait CorrelationService {
    fn correlations(&self, ids: &IdSet) -> Result<CorrelationTable>;
}

pub trait SurrogateService {
    fn rules(&self, ids: &IdSet, objective: &str, bins: usize) -> Result<Vec<Rule>>;
}

pub trait DetailService {
    fn model_detail(&self, model_id: i64) -> Result<ModelDetail>;
}
