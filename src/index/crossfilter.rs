use super::dimension::{Dimension, DimensionId};
use super::filter::Filter;
use super::group::{BinFn, Group, GroupId, GroupState};
use super::key::Key;
use super::reducer::Reducer;
use super::IdSet;
use crate::data::Record;
use crate::error::{EngineError, Result};
use std::rc::Rc;
use tracing::{debug, trace};

/// Multi-dimensional filter index over one shared record array.
///
/// Own-dimension exclusion is tracked per *scope*: a group ignores the
/// filters of every dimension sharing its dimension's scope, and respects
/// all others. Per record we keep, for each scope, how many of its
/// dimensions reject the record, plus how many scopes reject it at all.
pub struct Crossfilter {
    label: String,
    records: Vec<Record>,
    dimensions: Vec<Dimension>,
    scopes: Vec<String>,
    scope_rejections: Vec<Vec<u16>>,
    rejected_scopes: Vec<u16>,
    groups: Vec<Box<dyn GroupState>>,
}

impl Crossfilter {
    pub fn new(label: &str, records: Vec<Record>) -> Self {
        let n = records.len();
        Self {
            label: label.to_string(),
            records,
            dimensions: Vec::new(),
            scopes: Vec::new(),
            scope_rejections: Vec::new(),
            rejected_scopes: vec![0; n],
            groups: Vec::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn size(&self) -> usize {
        self.records.len()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    // =========================================================================
    // Dimensions
    // =========================================================================

    /// Register a dimension. `scope` names the attribute the dimension
    /// projects; it defaults to the dimension's own name.
    ///
    /// Fails with a schema error when the key function yields nothing for a record.
    pub fn dimension<F>(&mut self, name: &str, scope: Option<&str>, key_fn: F) -> Result<DimensionId>
    where
        F: Fn(&Record) -> Option<Key>,
    {
        let keys = self
            .records
            .iter()
            .map(|r| key_fn(r).ok_or_else(|| EngineError::schema(&self.label, r.id, name)))
            .collect::<Result<Vec<Key>>>()?;

        let scope_name = scope.unwrap_or(name);
        let scope = match self.scopes.iter().position(|s| s == scope_name) {
            Some(idx) => idx,
            None => {
                self.scopes.push(scope_name.to_string());
                self.scope_rejections.push(vec![0; self.records.len()]);
                self.scopes.len() - 1
            }
        };

        self.dimensions.push(Dimension::new(name, scope, keys));
        trace!(dataset = %self.label, dimension = name, scope = scope_name, "dimension registered");
        Ok(DimensionId(self.dimensions.len() - 1))
    }

    pub fn find_dimension(&self, name: &str) -> Option<DimensionId> {
        self.dimensions.iter().position(|d| d.name() == name).map(DimensionId)
    }

    pub fn dimension_ref(&self, id: DimensionId) -> Option<&Dimension> {
        self.dimensions.get(id.0)
    }

    fn dimension_checked(&self, id: DimensionId) -> Result<&Dimension> {
        self.dimensions
            .get(id.0)
            .ok_or_else(|| EngineError::UnknownDimension(format!("#{}", id.0)))
    }

    /// Scope name of a dimension
    pub fn scope_of(&self, id: DimensionId) -> Option<&str> {
        self.dimensions.get(id.0).map(|d| self.scopes[d.scope()].as_str())
    }

    // =========================================================================
    // Filtering
    // =========================================================================

    /// Replace a dimension's filter and incrementally update every group.
    ///
    /// Only records whose pass state flipped are visited, and a group is only
    /// touched when the record's activity *for that group* changed. Returns
    /// the number of records whose pass state on this dimension flipped.
    pub fn filter(&mut self, id: DimensionId, filter: Filter) -> Result<usize> {
        self.dimension_checked(id)?;
        let dim = &mut self.dimensions[id.0];
        let scope = dim.scope();
        let changes = dim.apply(filter);

        let group_scopes: Vec<usize> = self
            .groups
            .iter()
            .map(|g| self.dimensions[g.dimension().0].scope())
            .collect();

        let mut touched = 0usize;
        for &(r, passes) in &changes {
            let own = &mut self.scope_rejections[scope][r];
            let was_rejected_here = *own > 0;
            if passes {
                debug_assert!(*own > 0);
                *own = own.saturating_sub(1);
            } else {
                *own += 1;
            }
            let now_rejected_here = *own > 0;
            if was_rejected_here == now_rejected_here {
                continue;
            }

            let before = self.rejected_scopes[r];
            let after = if now_rejected_here { before + 1 } else { before - 1 };
            self.rejected_scopes[r] = after;

            // Groups in this scope see no change: their own scope is excluded.
            for (g, group) in self.groups.iter_mut().enumerate() {
                let gs = group_scopes[g];
                if gs == scope {
                    continue;
                }
                let excluded = u16::from(self.scope_rejections[gs][r] > 0);
                let was_active = before - excluded == 0;
                let is_active = after - excluded == 0;
                if was_active == is_active {
                    continue;
                }
                let key = self.dimensions[group.dimension().0].key_of(r);
                if is_active {
                    group.add(key, &self.records[r]);
                } else {
                    group.remove(key, &self.records[r]);
                }
                touched += 1;
            }
        }

        debug!(
            dataset = %self.label,
            dimension = self.dimensions[id.0].name(),
            changed = changes.len(),
            group_updates = touched,
            "filter applied"
        );
        Ok(changes.len())
    }

    /// Clear every dimension's filter
    pub fn clear_all(&mut self) -> Result<()> {
        for idx in 0..self.dimensions.len() {
            if !self.dimensions[idx].filter().is_all() {
                self.filter(DimensionId(idx), Filter::All)?;
            }
        }
        Ok(())
    }

    /// Whether a record passes every dimension's filter
    pub fn is_selected(&self, record: usize) -> bool {
        self.rejected_scopes[record] == 0
    }

    /// Whether a record counts for groups in `scope` (own-scope filters ignored)
    fn is_active_in(&self, record: usize, scope: usize) -> bool {
        let excluded = u16::from(self.scope_rejections[scope][record] > 0);
        self.rejected_scopes[record] - excluded == 0
    }

    /// Ids of the records passing every active filter, recomputed on each call
    pub fn filtered_ids(&self) -> IdSet {
        self.records
            .iter()
            .enumerate()
            .filter(|(idx, _)| self.is_selected(*idx))
            .map(|(_, r)| r.id)
            .collect()
    }

    /// Ids of the records passing every filter outside `id`'s scope
    pub fn filtered_ids_excluding(&self, id: DimensionId) -> Result<IdSet> {
        let scope = self.dimension_checked(id)?.scope();
        Ok(self
            .records
            .iter()
            .enumerate()
            .filter(|(idx, _)| self.is_active_in(*idx, scope))
            .map(|(_, r)| r.id)
            .collect())
    }

    /// Selected records in ascending key order of the dimension
    pub fn all(&self, id: DimensionId) -> Result<Vec<&Record>> {
        let dim = self.dimension_checked(id)?;
        Ok(dim
            .order()
            .iter()
            .filter(|&&r| self.is_selected(r))
            .map(|&r| &self.records[r])
            .collect())
    }

    /// The `n` selected records with the largest keys, largest first
    pub fn top(&self, id: DimensionId, n: usize) -> Result<Vec<&Record>> {
        let dim = self.dimension_checked(id)?;
        Ok(dim
            .order()
            .iter()
            .rev()
            .filter(|&&r| self.is_selected(r))
            .take(n)
            .map(|&r| &self.records[r])
            .collect())
    }

    /// The `n` selected records with the smallest keys, smallest first
    pub fn bottom(&self, id: DimensionId, n: usize) -> Result<Vec<&Record>> {
        let dim = self.dimension_checked(id)?;
        Ok(dim
            .order()
            .iter()
            .filter(|&&r| self.is_selected(r))
            .take(n)
            .map(|&r| &self.records[r])
            .collect())
    }

    // =========================================================================
    // Groups
    // =========================================================================

    /// Build a group over a dimension. Bins are created for every observed
    /// key; records active for the dimension's scope are added once.
    pub fn group<R, F>(&mut self, id: DimensionId, bin: F, reducer: R) -> Result<GroupId<R>>
    where
        R: Reducer + 'static,
        F: Fn(&Key) -> Key + 'static,
    {
        let dim = self.dimension_checked(id)?;
        let scope = dim.scope();
        let bin: BinFn = Rc::new(bin);
        let mut group = Group::new(id, bin, reducer);

        for r in 0..self.records.len() {
            let key = dim.key_of(r);
            group.prepare(key);
            if self.is_active_in(r, scope) {
                group.add(key, &self.records[r]);
            }
        }

        self.groups.push(Box::new(group));
        Ok(GroupId::new(self.groups.len() - 1))
    }

    /// Group keyed by the raw dimension key
    pub fn group_identity<R>(&mut self, id: DimensionId, reducer: R) -> Result<GroupId<R>>
    where
        R: Reducer + 'static,
    {
        self.group(id, Key::clone, reducer)
    }

    pub fn group_ref<R: Reducer + 'static>(&self, id: GroupId<R>) -> Result<&Group<R>> {
        self.groups
            .get(id.index)
            .and_then(|g| g.as_any().downcast_ref::<Group<R>>())
            .ok_or_else(|| EngineError::UnknownGroup(format!("#{}", id.index)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::reducer::{Count, CountReducer, IdReducer};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn scenario() -> Crossfilter {
        let records = vec![
            Record::new(1).with("x", 1.0).with("y", 10.0),
            Record::new(2).with("x", 2.0).with("y", 20.0),
            Record::new(3).with("x", 2.0).with("y", 30.0),
            Record::new(4).with("x", 3.0).with("y", 40.0),
            Record::new(5).with("x", 5.0).with("y", 50.0),
        ];
        Crossfilter::new("test", records)
    }

    fn number_key(attr: &'static str) -> impl Fn(&Record) -> Option<Key> {
        move |r| r.number(attr).map(Key::num)
    }

    fn floor_bin(k: &Key) -> Key {
        Key::num(k.as_number().unwrap_or(0.0).floor())
    }

    fn counts(group: &Group<CountReducer>) -> Vec<(f64, usize)> {
        group
            .all()
            .into_iter()
            .map(|(k, c)| (k.as_number().unwrap(), c.count))
            .collect()
    }

    #[test]
    fn test_histogram_unfiltered() {
        let mut cf = scenario();
        let x = cf.dimension("x", None, number_key("x")).unwrap();
        let g = cf.group(x, floor_bin, CountReducer).unwrap();
        assert_eq!(counts(cf.group_ref(g).unwrap()), vec![(1.0, 1), (2.0, 2), (3.0, 1), (5.0, 1)]);
    }

    #[test]
    fn test_other_dimension_filter_updates_group() {
        let mut cf = scenario();
        let x = cf.dimension("x", None, number_key("x")).unwrap();
        let y = cf.dimension("y", None, number_key("y")).unwrap();
        let g = cf.group(x, floor_bin, CountReducer).unwrap();

        cf.filter(y, Filter::function(|k| k.as_number() != Some(30.0))).unwrap();
        assert_eq!(counts(cf.group_ref(g).unwrap()), vec![(1.0, 1), (2.0, 1), (3.0, 1), (5.0, 1)]);

        cf.filter(y, Filter::All).unwrap();
        assert_eq!(counts(cf.group_ref(g).unwrap()), vec![(1.0, 1), (2.0, 2), (3.0, 1), (5.0, 1)]);
    }

    #[test]
    fn test_own_dimension_filter_ignored() {
        let mut cf = scenario();
        let x = cf.dimension("x", None, number_key("x")).unwrap();
        let y = cf.dimension("y", None, number_key("y")).unwrap();
        let gx = cf.group(x, floor_bin, CountReducer).unwrap();
        let gy = cf.group_identity(y, CountReducer).unwrap();

        cf.filter(x, Filter::range(2.0, 3.0).unwrap()).unwrap();

        assert_eq!(counts(cf.group_ref(gx).unwrap()), vec![(1.0, 1), (2.0, 2), (3.0, 1), (5.0, 1)]);
        let gy = cf.group_ref(gy).unwrap();
        assert_eq!(gy.get(&Key::num(10.0)), Some(&Count { count: 0 }));
        assert_eq!(gy.get(&Key::num(20.0)), Some(&Count { count: 1 }));
    }

    #[test]
    fn test_shared_scope_excludes_both_dimensions() {
        let mut cf = scenario();
        let x = cf.dimension("x", None, number_key("x")).unwrap();
        let x_hist = cf.dimension("x_hist", Some("x"), number_key("x")).unwrap();
        let g = cf.group(x_hist, floor_bin, CountReducer).unwrap();

        cf.filter(x, Filter::Exact(Key::num(5.0))).unwrap();
        assert_eq!(counts(cf.group_ref(g).unwrap()), vec![(1.0, 1), (2.0, 2), (3.0, 1), (5.0, 1)]);
        assert_eq!(cf.scope_of(x_hist), Some("x"));
        assert_eq!(cf.filtered_ids(), IdSet::from([5]));
    }

    #[test]
    fn test_filtered_ids_and_top_bottom() {
        let mut cf = scenario();
        let x = cf.dimension("x", None, number_key("x")).unwrap();
        let y = cf.dimension("y", None, number_key("y")).unwrap();
        cf.filter(y, Filter::range(15.0, 45.0).unwrap()).unwrap();

        assert_eq!(cf.filtered_ids(), IdSet::from([2, 3, 4]));
        let top: Vec<i64> = cf.top(x, 2).unwrap().iter().map(|r| r.id).collect();
        assert_eq!(top, vec![4, 3]);
        let bottom: Vec<i64> = cf.bottom(x, 1).unwrap().iter().map(|r| r.id).collect();
        assert_eq!(bottom, vec![2]);
        assert_eq!(cf.all(x).unwrap().len(), 3);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut cf = scenario();
        let x = cf.dimension("x", None, number_key("x")).unwrap();
        cf.filter(x, Filter::range(1.0, 2.0).unwrap()).unwrap();
        assert_eq!(cf.filter(x, Filter::All).unwrap(), 4);
        let first = cf.filtered_ids();
        assert_eq!(cf.filter(x, Filter::All).unwrap(), 0);
        assert_eq!(cf.filtered_ids(), first);
    }

    #[test]
    fn test_missing_attribute_is_schema_error() {
        let mut cf = scenario();
        let res = cf.dimension("z", None, number_key("z"));
        assert!(matches!(res, Err(EngineError::Schema { .. })));
    }

    #[test]
    fn test_group_ids_track_membership() {
        let mut cf = scenario();
        let x = cf.dimension("x", None, number_key("x")).unwrap();
        let y = cf.dimension("y", None, number_key("y")).unwrap();
        let g = cf.group(x, floor_bin, IdReducer).unwrap();
        cf.filter(y, Filter::range(25.0, 100.0).unwrap()).unwrap();

        let group = cf.group_ref(g).unwrap();
        assert_eq!(group.get(&Key::num(2.0)).unwrap().ids, std::collections::BTreeSet::from([3]));
        assert_eq!(group.top(1)[0].0, Key::num(2.0));
    }

    #[test]
    fn test_wrong_handle_type_is_error() {
        let mut cf = scenario();
        let x = cf.dimension("x", None, number_key("x")).unwrap();
        let g = cf.group(x, floor_bin, CountReducer).unwrap();
        let bogus: GroupId<IdReducer> = GroupId::new(g.index);
        assert!(cf.group_ref(bogus).is_err());
    }

    #[test]
    fn test_filtered_ids_excluding_scope() {
        let mut cf = scenario();
        let x = cf.dimension("x", None, number_key("x")).unwrap();
        let x_hist = cf.dimension("x_hist", Some("x"), number_key("x")).unwrap();
        let y = cf.dimension("y", None, number_key("y")).unwrap();
        cf.filter(x, Filter::range(2.0, 4.0).unwrap()).unwrap();
        cf.filter(y, Filter::range(0.0, 35.0).unwrap()).unwrap();

        assert_eq!(cf.filtered_ids(), IdSet::from([2, 3]));
        assert_eq!(cf.filtered_ids_excluding(x_hist).unwrap(), IdSet::from([1, 2, 3]));
        assert_eq!(cf.filtered_ids_excluding(y).unwrap(), IdSet::from([2, 3, 4]));
    }

    /// One randomly chosen filter on dimension `0`, `1` or `2`
    #[derive(Debug, Clone)]
    enum Step {
        All(usize),
        Exact(usize, u8),
        Range(usize, u8, u8),
        Set(usize, Vec<u8>),
        Below(usize, u8),
    }

    impl Step {
        fn dimension(&self) -> usize {
            match self {
                Step::All(d) | Step::Exact(d, _) | Step::Range(d, _, _) | Step::Set(d, _) | Step::Below(d, _) => *d,
            }
        }

        fn filter(&self) -> Filter {
            match self {
                Step::All(_) => Filter::All,
                Step::Exact(_, v) => Filter::Exact(Key::num(*v as f64)),
                Step::Range(_, lo, width) => Filter::range(*lo as f64, (*lo + *width) as f64).unwrap(),
                Step::Set(_, vs) => Filter::set(vs.iter().map(|&v| v as f64)),
                Step::Below(_, t) => {
                    let t = *t as f64;
                    Filter::function(move |k| k.as_number().is_some_and(|v| v < t))
                }
            }
        }
    }

    fn step() -> impl Strategy<Value = Step> {
        let dim = 0usize..3;
        prop_oneof![
            dim.clone().prop_map(Step::All),
            (dim.clone(), 0u8..8).prop_map(|(d, v)| Step::Exact(d, v)),
            (dim.clone(), 0u8..8, 0u8..5).prop_map(|(d, lo, w)| Step::Range(d, lo, w)),
            (dim.clone(), prop::collection::vec(0u8..8, 0..4)).prop_map(|(d, vs)| Step::Set(d, vs)),
            (dim, 0u8..9).prop_map(|(d, t)| Step::Below(d, t)),
        ]
    }

    /// Counts per bin for a group in `scope`, recomputed from scratch
    fn recount(
        records: &[(f64, f64)],
        filters: &[Filter],
        keys: impl Fn(&(f64, f64)) -> [f64; 3],
        scopes: [usize; 3],
        dim: usize,
        bin: impl Fn(f64) -> f64,
    ) -> Vec<(f64, usize)> {
        let mut bins: BTreeMap<Key, usize> = BTreeMap::new();
        for record in records {
            let k = keys(record);
            let slot = bins.entry(Key::num(bin(k[dim]))).or_default();
            let active = (0..3)
                .filter(|&d| scopes[d] != scopes[dim])
                .all(|d| filters[d].accepts(&Key::num(k[d])));
            if active {
                *slot += 1;
            }
        }
        bins.into_iter().map(|(k, c)| (k.as_number().unwrap(), c)).collect()
    }

    proptest! {
        #[test]
        fn prop_groups_match_recount(
            values in prop::collection::vec((0u8..8, 0u8..8), 1..30),
            steps in prop::collection::vec(step(), 0..12),
        ) {
            let records: Vec<(f64, f64)> = values.iter().map(|&(x, y)| (x as f64, y as f64)).collect();
            let mut cf = Crossfilter::new(
                "random",
                records.iter().enumerate().map(|(i, &(x, y))| Record::new(i as i64).with("x", x).with("y", y)).collect(),
            );
            // "a" and "a_hist" share a scope; "a_hist" keys on x / 2
            let dims = [
                cf.dimension("a", None, number_key("x")).unwrap(),
                cf.dimension("a_hist", Some("a"), |r| r.number("x").map(|x| Key::num((x / 2.0).floor()))).unwrap(),
                cf.dimension("b", None, number_key("y")).unwrap(),
            ];
            let ga = cf.group(dims[0], floor_bin, CountReducer).unwrap();
            let gh = cf.group_identity(dims[1], CountReducer).unwrap();
            let gb = cf.group_identity(dims[2], CountReducer).unwrap();

            let keys = |&(x, y): &(f64, f64)| [x, (x / 2.0).floor(), y];
            let scopes = [0, 0, 1];
            let mut filters = vec![Filter::All, Filter::All, Filter::All];
            for step in &steps {
                let d = step.dimension();
                cf.filter(dims[d], step.filter()).unwrap();
                filters[d] = step.filter();

                prop_assert_eq!(counts(cf.group_ref(ga).unwrap()), recount(&records, &filters, keys, scopes, 0, f64::floor));
                prop_assert_eq!(counts(cf.group_ref(gh).unwrap()), recount(&records, &filters, keys, scopes, 1, |k| k));
                prop_assert_eq!(counts(cf.group_ref(gb).unwrap()), recount(&records, &filters, keys, scopes, 2, |k| k));

                let selected: IdSet = records
                    .iter()
                    .enumerate()
                    .filter(|(_, r)| (0..3).all(|d| filters[d].accepts(&Key::num(keys(*r)[d]))))
                    .map(|(i, _)| i as i64)
                    .collect();
                prop_assert_eq!(cf.filtered_ids(), selected);
            }
        }

        #[test]
        fn prop_second_clear_changes_nothing(
            values in prop::collection::vec(0u8..8, 1..30),
            first in step(),
        ) {
            let mut cf = Crossfilter::new(
                "random",
                values.iter().enumerate().map(|(i, &x)| Record::new(i as i64).with("x", x as f64)).collect(),
            );
            let x = cf.dimension("x", None, number_key("x")).unwrap();
            cf.filter(x, first.filter()).unwrap();
            cf.filter(x, Filter::All).unwrap();

            let before = cf.filtered_ids();
            prop_assert_eq!(before.len(), values.len());
            prop_assert_eq!(cf.filter(x, Filter::All).unwrap(), 0);
            prop_assert_eq!(cf.filtered_ids(), before);
        }
    }
}
