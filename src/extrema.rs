use crate::error::{EngineError, Result};
use crate::index::{Dimension, Group, Reducer, Tally};
use serde::Serialize;
use std::collections::HashMap;
use std::ops::Range;

/// Min/max of an attribute or of a group's bins.
///
/// Degenerate inputs (no values, only non-finite values) produce `{0, 0}`
/// instead of infinities, so nothing downstream ever sees NaN.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Extrema {
    pub min: f64,
    pub max: f64,
}

impl Extrema {
    pub fn new(min: f64, max: f64) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn from_values<I: IntoIterator<Item = f64>>(values: I) -> Self {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for v in values.into_iter().filter(|v| v.is_finite()) {
            if v < min { min = v; }
            if v > max { max = v; }
        }
        if min == f64::INFINITY {
            return Self::default();
        }
        Self { min, max }
    }

    pub fn interval(&self) -> f64 {
        self.max - self.min
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn merge(&self, other: &Extrema) -> Extrema {
        Extrema { min: self.min.min(other.min), max: self.max.max(other.max) }
    }

    /// Pad both ends by `ratio` of the interval. A zero-width interval is
    /// widened by one unit on each side.
    pub fn padded(&self, ratio: f64) -> Result<Extrema> {
        if !ratio.is_finite() || ratio < 0.0 {
            return Err(EngineError::invalid(format!("padding ratio must be >= 0, got {}", ratio)));
        }
        if self.interval() == 0.0 {
            return Ok(Extrema { min: self.min - 1.0, max: self.max + 1.0 });
        }
        let padding = self.interval() * ratio;
        Ok(Extrema { min: self.min - padding, max: self.max + padding })
    }

    /// Integer bin positions covered, `floor(min)..floor(max) + 1`.
    /// Fails when either end does not fit in an `i64`.
    pub fn bin_range(&self) -> Result<Range<i64>> {
        // 2^63; `i64::MAX as f64` rounds up to it
        const BOUND: f64 = 9_223_372_036_854_775_808.0;
        let (lo, hi) = (self.min.floor(), self.max.floor());
        if !(lo >= -BOUND && hi < BOUND) {
            return Err(EngineError::invalid(format!(
                "bin keys [{}, {}] do not fit in integer bin positions",
                self.min, self.max
            )));
        }
        let end = (hi as i64)
            .checked_add(1)
            .ok_or_else(|| EngineError::invalid(format!("bin key {} is too large", self.max)))?;
        Ok(lo as i64..end)
    }
}

/// Extrema of a numeric dimension, read from its first and last sorted keys
pub fn dimension_extrema(dimension: &Dimension) -> Extrema {
    match dimension.key_bounds() {
        Some((lo, hi)) => match (lo.as_number(), hi.as_number()) {
            (Some(lo), Some(hi)) if lo.is_finite() && hi.is_finite() => Extrema::new(lo, hi),
            _ => Extrema::from_values(
                dimension.order().iter().filter_map(|&r| dimension.key_of(r).as_number()),
            ),
        },
        None => Extrema::default(),
    }
}

/// Smallest and largest bin count of a group
pub fn count_extrema<R: Reducer>(group: &Group<R>) -> Extrema {
    let mut counts: Vec<usize> = group.all().iter().map(|(_, acc)| acc.count()).collect();
    counts.sort_unstable();
    match (counts.first(), counts.last()) {
        (Some(&lo), Some(&hi)) => Extrema::new(lo as f64, hi as f64),
        _ => Extrema::default(),
    }
}

/// Extrema of a group's numeric bin keys
pub fn key_extrema<R: Reducer>(group: &Group<R>) -> Extrema {
    Extrema::from_values(group.all().iter().filter_map(|(k, _)| k.as_number()))
}

/// Per-axis extrema of a group keyed by pairs
pub fn pair_key_extrema<R: Reducer>(group: &Group<R>) -> (Extrema, Extrema) {
    let pairs: Vec<(f64, f64)> = group.all().iter().filter_map(|(k, _)| k.as_pair()).collect();
    (
        Extrema::from_values(pairs.iter().map(|p| p.0)),
        Extrema::from_values(pairs.iter().map(|p| p.1)),
    )
}

/// Attribute extrema computed once when a dataset is built
#[derive(Debug, Clone, Default)]
pub struct ExtremaCache {
    entries: HashMap<String, Extrema>,
}

impl ExtremaCache {
    pub fn insert(&mut self, attribute: &str, extrema: Extrema) {
        self.entries.insert(attribute.to_string(), extrema);
    }

    pub fn get(&self, attribute: &str) -> Option<Extrema> {
        self.entries.get(attribute).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
