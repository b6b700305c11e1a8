use crate::error::{EngineError, Result};
use crate::extrema::Extrema;
use crate::index::Key;
use serde::Serialize;
use std::ops::Range;

/// How a histogram dimension turns an attribute value into a bin index
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Binning {
    /// `bins` equal-width bins starting at `min`; values past either end
    /// land in the first or last bin.
    Uniform { min: f64, width: f64, bins: usize },
    /// One bin per listed value, in list order
    Categories(Vec<Key>),
}

impl Binning {
    pub fn uniform(extrema: Extrema, bins: usize) -> Result<Self> {
        if bins == 0 {
            return Err(EngineError::invalid("a histogram needs at least one bin"));
        }
        let width = if extrema.interval() > 0.0 {
            extrema.interval() / bins as f64
        } else {
            1.0
        };
        Ok(Binning::Uniform { min: extrema.min, width, bins })
    }

    /// Duplicates are dropped, first occurrence wins
    pub fn categories(keys: Vec<Key>) -> Result<Self> {
        let mut unique: Vec<Key> = Vec::with_capacity(keys.len());
        for key in keys {
            if !unique.contains(&key) {
                unique.push(key);
            }
        }
        if unique.is_empty() {
            return Err(EngineError::invalid("a categorical histogram needs at least one category"));
        }
        Ok(Binning::Categories(unique))
    }

    pub fn len(&self) -> usize {
        match self {
            Binning::Uniform { bins, .. } => *bins,
            Binning::Categories(keys) => keys.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bin(&self, key: &Key) -> Option<usize> {
        match self {
            Binning::Uniform { min, width, bins } => {
                let v = key.as_number().filter(|v| v.is_finite())?;
                let idx = ((v - min) / width).floor().max(0.0) as usize;
                Some(idx.min(bins.saturating_sub(1)))
            }
            Binning::Categories(keys) => keys.iter().position(|k| k == key),
        }
    }

    /// Every bin index, for materializing empty bins
    pub fn range(&self) -> Range<i64> {
        0..self.len() as i64
    }

    /// Value interval `[lo, hi)` covered by a uniform bin
    pub fn bounds(&self, bin: usize) -> Option<(f64, f64)> {
        match self {
            Binning::Uniform { min, width, bins } if bin < *bins => {
                let lo = min + width * bin as f64;
                Some((lo, lo + width))
            }
            _ => None,
        }
    }

    pub fn label(&self, bin: usize) -> Option<String> {
        match self {
            Binning::Uniform { .. } => self.bounds(bin).map(|(lo, hi)| format!("{:.3}-{:.3}", lo, hi)),
            Binning::Categories(keys) => keys.get(bin).map(Key::to_string),
        }
    }
}
