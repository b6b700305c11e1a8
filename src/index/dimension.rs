use super::filter::Filter;
use super::key::Key;

/// Handle to a dimension inside a [`super::Crossfilter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DimensionId(pub(crate) usize);

/// A sorted, filterable projection of the record set by one key function.
///
/// `keys` is indexed by record position; `order` lists record positions in
/// ascending key order so contiguous filters resolve by binary search.
pub struct Dimension {
    name: String,
    scope: usize,
    keys: Vec<Key>,
    order: Vec<usize>,
    filter: Filter,
    passes: Vec<bool>,
    span: Option<(usize, usize)>,
}

impl Dimension {
    pub(crate) fn new(name: &str, scope: usize, keys: Vec<Key>) -> Self {
        let mut order: Vec<usize> = (0..keys.len()).collect();
        order.sort_by(|&a, &b| keys[a].cmp(&keys[b]).then(a.cmp(&b)));
        let len = keys.len();
        Self {
            name: name.to_string(),
            scope,
            keys,
            order,
            filter: Filter::All,
            passes: vec![true; len],
            span: Some((0, len)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn scope(&self) -> usize {
        self.scope
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn key_of(&self, record: usize) -> &Key {
        &self.keys[record]
    }

    pub fn passes(&self, record: usize) -> bool {
        self.passes[record]
    }

    /// Record positions in ascending key order
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Smallest and largest key, if any
    pub fn key_bounds(&self) -> Option<(&Key, &Key)> {
        let first = self.order.first()?;
        let last = self.order.last()?;
        Some((&self.keys[*first], &self.keys[*last]))
    }

    /// Replace the filter and return the records whose pass state flipped,
    /// paired with their new state.
    ///
    /// Contiguous filters (all, exact, range) only visit the positions between
    /// the old and new span boundaries; other filters evaluate every key.
    pub(crate) fn apply(&mut self, filter: Filter) -> Vec<(usize, bool)> {
        let new_span = filter.sorted_span(self.order.len(), |i| self.keys[self.order[i]].clone());
        let mut changed = Vec::new();

        match (self.span, new_span) {
            (Some((a0, b0)), Some((a1, b1))) => {
                let ranges = [(a0.min(a1), a0.max(a1)), (b0.min(b1), b0.max(b1))];
                for (start, end) in ranges {
                    for pos in start..end {
                        let was = pos >= a0 && pos < b0;
                        let now = pos >= a1 && pos < b1;
                        if was != now {
                            changed.push((self.order[pos], now));
                        }
                    }
                }
            }
            _ => {
                for (record, key) in self.keys.iter().enumerate() {
                    let now = filter.accepts(key);
                    if self.passes[record] != now {
                        changed.push((record, now));
                    }
                }
            }
        }

        for &(record, now) in &changed {
            self.passes[record] = now;
        }
        self.filter = filter;
        self.span = new_span;
        changed
    }
}
