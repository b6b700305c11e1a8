// Library exports for crossview

pub mod data;
pub mod dataset;
pub mod error;
pub mod extrema;
pub mod index;
pub mod metadata;
pub mod parser;
pub mod propagation;
pub mod requests;
pub mod runtime;
pub mod series;
pub mod sort;

pub use error::{EngineError, Result};

use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EngineOptions {
    #[serde(default = "default_histogram_bins")]
    pub histogram_bins: usize,
    #[serde(default = "default_extrema_padding")]
    pub extrema_padding: f64,
    #[serde(default = "default_sentinel_model_id")]
    pub sentinel_model_id: i64,
    #[serde(default = "default_encoded_suffix")]
    pub encoded_suffix: String,
    #[serde(default = "default_histogram_suffix")]
    pub histogram_suffix: String,
}

fn default_histogram_bins() -> usize { 10 }
fn default_extrema_padding() -> f64 { 0.05 }
fn default_sentinel_model_id() -> i64 { -1 }
fn default_encoded_suffix() -> String { "_code".to_string() }
fn default_histogram_suffix() -> String { "_hist".to_string() }

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            histogram_bins: default_histogram_bins(),
            extrema_padding: default_extrema_padding(),
            sentinel_model_id: default_sentinel_model_id(),
            encoded_suffix: default_encoded_suffix(),
            histogram_suffix: default_histogram_suffix(),
        }
    }
}

impl EngineOptions {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let options: EngineOptions = serde_json::from_str(&text)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if self.histogram_bins == 0 {
            return Err(EngineError::invalid("histogram_bins must be at least 1"));
        }
        if !self.extrema_padding.is_finite() || self.extrema_padding < 0.0 {
            return Err(EngineError::invalid("extrema_padding must be a non-negative number"));
        }
        if self.encoded_suffix.is_empty() || self.histogram_suffix.is_empty() {
            return Err(EngineError::invalid("attribute suffixes must not be empty"));
        }
        Ok(())
    }

    /// Name of the histogram dimension/group of an attribute
    pub fn histogram_name(&self, attribute: &str) -> String {
        format!("{}{}", attribute, self.histogram_suffix)
    }

    /// Name of the numeric shadow attribute of a categorical attribute
    pub fn encoded_name(&self, attribute: &str) -> String {
        format!("{}{}", attribute, self.encoded_suffix)
    }
}
