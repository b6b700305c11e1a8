use super::dimension::DimensionId;
use super::key::Key;
use super::reducer::{Reducer, Tally};
use crate::data::Record;
use std::any::Any;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::rc::Rc;

/// Maps a dimension key to the bin it lands in
pub type BinFn = Rc<dyn Fn(&Key) -> Key>;

/// Typed handle to a group inside a [`super::Crossfilter`]
pub struct GroupId<R> {
    pub(crate) index: usize,
    _reducer: PhantomData<fn() -> R>,
}

impl<R> GroupId<R> {
    pub(crate) fn new(index: usize) -> Self {
        Self { index, _reducer: PhantomData }
    }
}

impl<R> Clone for GroupId<R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for GroupId<R> {}

impl<R> std::fmt::Debug for GroupId<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GroupId({})", self.index)
    }
}

/// An incrementally maintained aggregation over one dimension.
///
/// Bins exist for every key observed in the data, even when their
/// accumulator currently holds nothing.
pub struct Group<R: Reducer> {
    dimension: DimensionId,
    bin: BinFn,
    reducer: R,
    bins: BTreeMap<Key, R::Acc>,
}

impl<R: Reducer> Group<R> {
    pub(crate) fn new(dimension: DimensionId, bin: BinFn, reducer: R) -> Self {
        Self { dimension, bin, reducer, bins: BTreeMap::new() }
    }

    pub fn dimension(&self) -> DimensionId {
        self.dimension
    }

    pub fn reducer(&self) -> &R {
        &self.reducer
    }

    /// Number of bins, empty ones included
    pub fn size(&self) -> usize {
        self.bins.len()
    }

    pub fn get(&self, key: &Key) -> Option<&R::Acc> {
        self.bins.get(key)
    }

    /// All bins in ascending key order
    pub fn all(&self) -> Vec<(Key, R::Acc)> {
        self.bins.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    /// The `n` bins with the largest counts, ties broken by ascending key
    pub fn top(&self, n: usize) -> Vec<(Key, R::Acc)> {
        let mut bins: Vec<(&Key, &R::Acc)> = self.bins.iter().collect();
        bins.sort_by(|a, b| b.1.count().cmp(&a.1.count()).then_with(|| a.0.cmp(b.0)));
        bins.into_iter().take(n).map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    pub(crate) fn ensure_bin(&mut self, key: &Key) {
        let bin = (self.bin)(key);
        if !self.bins.contains_key(&bin) {
            let initial = self.reducer.initial();
            self.bins.insert(bin, initial);
        }
    }
}

/// Object-safe view of a group, so one crossfilter can hold groups with
/// different accumulator types.
pub(crate) trait GroupState {
    fn dimension(&self) -> DimensionId;
    fn prepare(&mut self, key: &Key);
    fn add(&mut self, key: &Key, record: &Record);
    fn remove(&mut self, key: &Key, record: &Record);
    fn as_any(&self) -> &dyn Any;
}

impl<R: Reducer + 'static> GroupState for Group<R> {
    fn dimension(&self) -> DimensionId {
        self.dimension
    }

    fn prepare(&mut self, key: &Key) {
        self.ensure_bin(key);
    }

    fn add(&mut self, key: &Key, record: &Record) {
        let bin = (self.bin)(key);
        let reducer = &self.reducer;
        let acc = self.bins.entry(bin).or_insert_with(|| reducer.initial());
        reducer.add(acc, record);
    }

    fn remove(&mut self, key: &Key, record: &Record) {
        let bin = (self.bin)(key);
        let reducer = &self.reducer;
        let acc = self.bins.entry(bin).or_insert_with(|| reducer.initial());
        reducer.remove(acc, record);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
