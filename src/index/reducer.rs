// Reducers: the add/remove/initial triples behind every group.
//
// Groups are maintained incrementally, so every reducer must be invertible:
// remove(add(acc, r), r) == acc.

use crate::data::Record;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;

/// Accumulators expose a record count used for sorting and extrema
pub trait Tally {
    fn count(&self) -> usize;
}

pub trait Reducer {
    type Acc: Tally + Clone + Debug + PartialEq;

    fn initial(&self) -> Self::Acc;
    fn add(&self, acc: &mut Self::Acc, record: &Record);
    fn remove(&self, acc: &mut Self::Acc, record: &Record);
}

fn decrement(count: &mut usize) {
    debug_assert!(*count > 0, "remove() without matching add()");
    *count = count.saturating_sub(1);
}

// =============================================================================
// Count
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Count {
    pub count: usize,
}

impl Tally for Count {
    fn count(&self) -> usize {
        self.count
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CountReducer;

impl Reducer for CountReducer {
    type Acc = Count;

    fn initial(&self) -> Count {
        Count::default()
    }

    fn add(&self, acc: &mut Count, _record: &Record) {
        acc.count += 1;
    }

    fn remove(&self, acc: &mut Count, _record: &Record) {
        decrement(&mut acc.count);
    }
}

// =============================================================================
// Count + record ids
// =============================================================================

/// Count plus the ids of the records in the bin, for later highlighting
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct IdTally {
    pub count: usize,
    pub ids: BTreeSet<i64>,
}

impl Tally for IdTally {
    fn count(&self) -> usize {
        self.count
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IdReducer;

impl Reducer for IdReducer {
    type Acc = IdTally;

    fn initial(&self) -> IdTally {
        IdTally::default()
    }

    fn add(&self, acc: &mut IdTally, record: &Record) {
        acc.count += 1;
        acc.ids.insert(record.id);
    }

    fn remove(&self, acc: &mut IdTally, record: &Record) {
        decrement(&mut acc.count);
        acc.ids.remove(&record.id);
    }
}

// =============================================================================
// Count + per-owner breakdown
// =============================================================================

/// Count plus how many records of each owner (e.g. model id) landed in the bin.
/// Owners whose count drops to zero are removed so the map stays canonical.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct OwnerTally {
    pub count: usize,
    pub owners: BTreeMap<i64, usize>,
}

impl Tally for OwnerTally {
    fn count(&self) -> usize {
        self.count
    }
}

#[derive(Debug, Clone)]
pub struct OwnerReducer {
    pub owner: String,
}

impl OwnerReducer {
    pub fn new(owner: &str) -> Self {
        Self { owner: owner.to_string() }
    }

    fn owner_of(&self, record: &Record) -> i64 {
        record.number(&self.owner).map(|n| n as i64).unwrap_or(record.id)
    }
}

impl Reducer for OwnerReducer {
    type Acc = OwnerTally;

    fn initial(&self) -> OwnerTally {
        OwnerTally::default()
    }

    fn add(&self, acc: &mut OwnerTally, record: &Record) {
        acc.count += 1;
        *acc.owners.entry(self.owner_of(record)).or_default() += 1;
    }

    fn remove(&self, acc: &mut OwnerTally, record: &Record) {
        decrement(&mut acc.count);
        let owner = self.owner_of(record);
        if let Some(n) = acc.owners.get_mut(&owner) {
            decrement(n);
            if *n == 0 {
                acc.owners.remove(&owner);
            }
        }
    }
}

// =============================================================================
// Tagged accumulator set used by datasets
// =============================================================================

/// Marker value of an attribute whose records a reducer must ignore
#[derive(Debug, Clone, PartialEq)]
pub struct Sentinel {
    pub attribute: String,
    pub value: i64,
}

impl Sentinel {
    pub fn new(attribute: &str, value: i64) -> Self {
        Self { attribute: attribute.to_string(), value }
    }

    pub fn matches(&self, record: &Record) -> bool {
        record.number(&self.attribute) == Some(self.value as f64)
    }
}

/// The closed set of accumulator shapes dataset groups use
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Aggregate {
    Count(Count),
    Ids(IdTally),
    Owners(OwnerTally),
}

impl Aggregate {
    pub fn ids(&self) -> Option<&BTreeSet<i64>> {
        match self {
            Aggregate::Ids(t) => Some(&t.ids),
            _ => None,
        }
    }

    pub fn owners(&self) -> Option<&BTreeMap<i64, usize>> {
        match self {
            Aggregate::Owners(t) => Some(&t.owners),
            _ => None,
        }
    }
}

impl Tally for Aggregate {
    fn count(&self) -> usize {
        match self {
            Aggregate::Count(c) => c.count,
            Aggregate::Ids(t) => t.count,
            Aggregate::Owners(t) => t.count,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ReducerKind {
    Count,
    Ids,
    Owners(OwnerReducer),
}

/// Reducer over [`Aggregate`], optionally ignoring sentinel records
#[derive(Debug, Clone)]
pub struct BinReducer {
    kind: ReducerKind,
    skip: Option<Sentinel>,
}

impl BinReducer {
    pub fn count() -> Self {
        Self { kind: ReducerKind::Count, skip: None }
    }

    pub fn ids() -> Self {
        Self { kind: ReducerKind::Ids, skip: None }
    }

    pub fn owners(owner: &str) -> Self {
        Self { kind: ReducerKind::Owners(OwnerReducer::new(owner)), skip: None }
    }

    pub fn skipping(mut self, sentinel: Sentinel) -> Self {
        self.skip = Some(sentinel);
        self
    }

    fn skips(&self, record: &Record) -> bool {
        self.skip.as_ref().is_some_and(|s| s.matches(record))
    }
}

impl Reducer for BinReducer {
    type Acc = Aggregate;

    fn initial(&self) -> Aggregate {
        match &self.kind {
            ReducerKind::Count => Aggregate::Count(CountReducer.initial()),
            ReducerKind::Ids => Aggregate::Ids(IdReducer.initial()),
            ReducerKind::Owners(r) => Aggregate::Owners(r.initial()),
        }
    }

    fn add(&self, acc: &mut Aggregate, record: &Record) {
        if self.skips(record) {
            return;
        }
        match (&self.kind, acc) {
            (ReducerKind::Count, Aggregate::Count(c)) => CountReducer.add(c, record),
            (ReducerKind::Ids, Aggregate::Ids(t)) => IdReducer.add(t, record),
            (ReducerKind::Owners(r), Aggregate::Owners(t)) => r.add(t, record),
            _ => debug_assert!(false, "accumulator shape does not match reducer"),
        }
    }

    fn remove(&self, acc: &mut Aggregate, record: &Record) {
        if self.skips(record) {
            return;
        }
        match (&self.kind, acc) {
            (ReducerKind::Count, Aggregate::Count(c)) => CountReducer.remove(c, record),
            (ReducerKind::Ids, Aggregate::Ids(t)) => IdReducer.remove(t, record),
            (ReducerKind::Owners(r), Aggregate::Owners(t)) => r.remove(t, record),
            _ => debug_assert!(false, "accumulator shape does not match reducer"),
        }
    }
}
