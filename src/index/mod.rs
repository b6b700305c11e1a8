// Multi-dimensional indexing: dimensions, filters, incrementally maintained groups

pub mod crossfilter;
pub mod dimension;
pub mod filter;
pub mod group;
pub mod key;
pub mod reducer;

pub use crossfilter::Crossfilter;
pub use dimension::{Dimension, DimensionId};
pub use filter::Filter;
pub use group::{Group, GroupId};
pub use key::Key;
pub use reducer::{Aggregate, BinReducer, Count, CountReducer, IdReducer, OwnerReducer, Reducer, Sentinel, Tally};

use serde::Serialize;
use std::collections::BTreeSet;

/// A set of record ids, compared by content
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct IdSet(BTreeSet<i64>);

impl IdSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: i64) -> bool {
        self.0.insert(id)
    }

    pub fn contains(&self, id: i64) -> bool {
        self.0.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = i64> + '_ {
        self.0.iter().copied()
    }

    pub fn extend(&mut self, ids: impl IntoIterator<Item = i64>) {
        self.0.extend(ids);
    }

    pub fn to_vec(&self) -> Vec<i64> {
        self.iter().collect()
    }

    pub fn intersection(&self, other: &IdSet) -> IdSet {
        IdSet(self.0.intersection(&other.0).copied().collect())
    }
}

impl FromIterator<i64> for IdSet {
    fn from_iter<I: IntoIterator<Item = i64>>(iter: I) -> Self {
        IdSet(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[i64; N]> for IdSet {
    fn from(ids: [i64; N]) -> Self {
        ids.into_iter().collect()
    }
}
