// Datasets: named dimensions, groups and caches over one shared record array

pub mod binning;
pub mod detail;
pub mod dissonance;
pub mod model;
pub mod surrogate;

pub use binning::Binning;
pub use detail::DetailDataset;
pub use dissonance::DissonanceDataset;
pub use model::ModelDataset;
pub use surrogate::SurrogateDataset;

use crate::data::{Record, RecordBatch, ID_ATTRIBUTE};
use crate::error::{EngineError, Result};
use crate::extrema::{count_extrema, dimension_extrema, key_extrema, pair_key_extrema, Extrema, ExtremaCache};
use crate::index::{
    Aggregate, BinReducer, Crossfilter, Dimension, DimensionId, Filter, Group, GroupId, IdSet, Key,
};
use crate::series::SeriesMap;
use crate::sort::{sort_heatmap_group, sort_histogram_group, SortCriterion, SortSettings, SortedBin, SortedCell};
use crate::EngineOptions;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::ops::Range;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    Plain,
    Model,
    Dissonance,
    Detail,
    Surrogate,
}

/// Access to the shared base of every concrete dataset shape
pub trait DatasetShape {
    fn kind(&self) -> DatasetKind;
    fn dataset(&self) -> &Dataset;
    fn dataset_mut(&mut self) -> &mut Dataset;

    /// Whether selections on this dataset live in the shared model id space
    fn shares_id_space(&self) -> bool {
        true
    }
}

/// Sort state of a heatmap, one entry per axis
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HeatmapSort {
    pub x: SortSettings,
    pub y: SortSettings,
}

/// Dimensions, groups and caches over one record array.
///
/// Histogram dimensions share the exclusion scope of their raw attribute,
/// so brushing either leaves both histograms of that attribute untouched.
pub struct Dataset {
    index: Crossfilter,
    dimensions: BTreeMap<String, DimensionId>,
    groups: BTreeMap<String, GroupId<BinReducer>>,
    histograms: HashMap<String, Binning>,
    heatmaps: HashMap<String, (Binning, Binning)>,
    extrema: ExtremaCache,
    series_attributes: Vec<String>,
    series: HashMap<String, SeriesMap>,
    histogram_sort: HashMap<String, SortSettings>,
    heatmap_sort: HashMap<String, HeatmapSort>,
    options: EngineOptions,
}

impl Dataset {
    pub fn new(name: &str, batch: RecordBatch, options: EngineOptions) -> Result<Self> {
        options.validate()?;
        info!(dataset = name, records = batch.len(), "building dataset");
        Ok(Self {
            index: Crossfilter::new(name, batch.records),
            dimensions: BTreeMap::new(),
            groups: BTreeMap::new(),
            histograms: HashMap::new(),
            heatmaps: HashMap::new(),
            extrema: ExtremaCache::default(),
            series_attributes: Vec::new(),
            series: HashMap::new(),
            histogram_sort: HashMap::new(),
            heatmap_sort: HashMap::new(),
            options,
        })
    }

    /// A dataset with a raw and a histogram dimension for every attribute
    /// that is numeric in all records.
    pub fn from_numeric_attributes(name: &str, batch: RecordBatch, options: EngineOptions) -> Result<Self> {
        let attributes = batch.numeric_attributes();
        let mut dataset = Dataset::new(name, batch, options)?;
        dataset.add_id_dimension()?;
        for attr in &attributes {
            dataset.add_attribute(attr)?;
            let binning = Binning::uniform(dataset.extrema(attr)?, dataset.options.histogram_bins)?;
            dataset.add_histogram(attr, binning, BinReducer::ids())?;
        }
        dataset.set_series_attributes(attributes);
        Ok(dataset)
    }

    pub fn name(&self) -> &str {
        self.index.label()
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn records(&self) -> &[Record] {
        self.index.records()
    }

    pub fn len(&self) -> usize {
        self.index.size()
    }

    pub fn is_empty(&self) -> bool {
        self.index.size() == 0
    }

    // =========================================================================
    // Construction
    // =========================================================================

    /// Register a named dimension. `scope` defaults to the name itself.
    pub fn add_dimension<F>(&mut self, name: &str, scope: Option<&str>, key_fn: F) -> Result<DimensionId>
    where
        F: Fn(&Record) -> Option<Key>,
    {
        if self.dimensions.contains_key(name) {
            return Err(EngineError::invalid(format!("dimension '{}' registered twice", name)));
        }
        let id = self.index.dimension(name, scope, key_fn)?;
        self.dimensions.insert(name.to_string(), id);
        Ok(id)
    }

    /// Dimension over record ids, used to apply selections made elsewhere
    pub fn add_id_dimension(&mut self) -> Result<DimensionId> {
        self.add_dimension(ID_ATTRIBUTE, None, |r| Some(Key::num(r.id as f64)))
    }

    /// Raw dimension over a numeric attribute; its extrema are cached
    pub fn add_attribute(&mut self, attribute: &str) -> Result<DimensionId> {
        let attr = attribute.to_string();
        let id = self.add_dimension(attribute, None, move |r| r.number(&attr).map(Key::num))?;
        if let Some(dim) = self.index.dimension_ref(id) {
            self.extrema.insert(attribute, dimension_extrema(dim));
        }
        Ok(id)
    }

    /// Raw dimension over a text attribute
    pub fn add_text_attribute(&mut self, attribute: &str) -> Result<DimensionId> {
        let attr = attribute.to_string();
        self.add_dimension(attribute, None, move |r| r.text(&attr).map(Key::text))
    }

    /// Histogram dimension and group `<attribute><histogram_suffix>`, keyed by
    /// bin index and sharing the attribute's exclusion scope. Values outside
    /// a categorical binning are a schema error.
    pub fn add_histogram(
        &mut self,
        attribute: &str,
        binning: Binning,
        reducer: BinReducer,
    ) -> Result<GroupId<BinReducer>> {
        let name = self.options.histogram_name(attribute);
        let attr = attribute.to_string();
        let bins = binning.clone();
        let dim = self.add_dimension(&name, Some(attribute), move |r| {
            let key = Key::from_value(r.get(&attr)?);
            bins.bin(&key).map(|b| Key::num(b as f64))
        })?;
        let group = self.index.group_identity(dim, reducer)?;
        self.groups.insert(name.clone(), group);
        self.histograms.insert(name, binning);
        Ok(group)
    }

    /// Composite dimension `<x>:<y>` keyed by the pair of numeric values,
    /// with a heatmap group binning each axis independently.
    pub fn add_composite(
        &mut self,
        axes: (&str, &str),
        numeric: (&str, &str),
        binnings: (Binning, Binning),
        reducer: BinReducer,
    ) -> Result<GroupId<BinReducer>> {
        let name = composite_name(axes.0, axes.1);
        for record in self.records() {
            for (attr, binning) in [(numeric.0, &binnings.0), (numeric.1, &binnings.1)] {
                let binned = record.number(attr).and_then(|v| binning.bin(&Key::num(v)));
                if binned.is_none() {
                    return Err(EngineError::schema(self.name(), record.id, attr));
                }
            }
        }

        let (ax, ay) = (numeric.0.to_string(), numeric.1.to_string());
        let dim = self.add_dimension(&name, None, move |r| Some(Key::pair(r.number(&ax)?, r.number(&ay)?)))?;

        let (bx, by) = binnings.clone();
        let group = self.index.group(
            dim,
            move |key| {
                // Every record was checked against both binnings above
                let (x, y) = key.as_pair().unwrap_or_default();
                let xi = bx.bin(&Key::num(x)).unwrap_or(0);
                let yi = by.bin(&Key::num(y)).unwrap_or(0);
                Key::pair(xi as f64, yi as f64)
            },
            reducer,
        )?;
        self.groups.insert(name.clone(), group);
        self.heatmaps.insert(name, binnings);
        Ok(group)
    }

    /// Group over an existing dimension with an arbitrary bin function
    pub fn add_group<F>(&mut self, name: &str, dimension: &str, bin: F, reducer: BinReducer) -> Result<GroupId<BinReducer>>
    where
        F: Fn(&Key) -> Key + 'static,
    {
        if self.groups.contains_key(name) {
            return Err(EngineError::invalid(format!("group '{}' registered twice", name)));
        }
        let dim = self.dimension_id(dimension)?;
        let group = self.index.group(dim, bin, reducer)?;
        self.groups.insert(name.to_string(), group);
        Ok(group)
    }

    pub(crate) fn cache_extrema(&mut self, attribute: &str, extrema: Extrema) {
        self.extrema.insert(attribute, extrema);
    }

    pub fn set_series_attributes(&mut self, attributes: Vec<String>) {
        self.series_attributes = attributes;
        self.series.clear();
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    pub fn dimension_id(&self, key: &str) -> Result<DimensionId> {
        self.dimensions
            .get(key)
            .copied()
            .ok_or_else(|| EngineError::UnknownDimension(key.to_string()))
    }

    pub fn dimension(&self, key: &str) -> Result<&Dimension> {
        let id = self.dimension_id(key)?;
        self.index
            .dimension_ref(id)
            .ok_or_else(|| EngineError::UnknownDimension(key.to_string()))
    }

    pub fn has_dimension(&self, key: &str) -> bool {
        self.dimensions.contains_key(key)
    }

    pub fn dimension_names(&self) -> impl Iterator<Item = &str> {
        self.dimensions.keys().map(String::as_str)
    }

    pub fn group(&self, key: &str) -> Result<&Group<BinReducer>> {
        let id = self
            .groups
            .get(key)
            .ok_or_else(|| EngineError::UnknownGroup(key.to_string()))?;
        self.index.group_ref(*id)
    }

    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    /// Histogram group names, sorted
    pub fn histogram_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.histograms.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Ids currently counted in one histogram bin, for highlighting
    pub fn bin_ids(&self, group: &str, bin: usize) -> Result<IdSet> {
        let acc = self.group(group)?.get(&Key::num(bin as f64));
        Ok(acc
            .and_then(Aggregate::ids)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default())
    }

    pub fn binning(&self, group: &str) -> Option<&Binning> {
        self.histograms.get(group)
    }

    pub fn heatmap_binnings(&self, group: &str) -> Option<&(Binning, Binning)> {
        self.heatmaps.get(group)
    }

    /// Extrema of an attribute (cached at construction), else of a group's
    /// bin counts, else of a dimension's numeric keys.
    pub fn extrema(&self, key: &str) -> Result<Extrema> {
        if let Some(e) = self.extrema.get(key) {
            return Ok(e);
        }
        if let Ok(group) = self.group(key) {
            return Ok(count_extrema(group));
        }
        self.dimension(key).map(dimension_extrema)
    }

    pub fn padded_extrema(&self, key: &str) -> Result<Extrema> {
        self.extrema(key)?.padded(self.options.extrema_padding)
    }

    // =========================================================================
    // Filtering
    // =========================================================================

    /// Replace a dimension's filter. Returns how many records flipped.
    pub fn filter(&mut self, key: &str, filter: Filter) -> Result<usize> {
        let id = self.dimension_id(key)?;
        self.index.filter(id, filter)
    }

    /// Restrict a histogram dimension to the given bin indices
    pub fn filter_bins(&mut self, group: &str, bins: &[usize]) -> Result<usize> {
        if !self.histograms.contains_key(group) {
            return Err(EngineError::UnknownGroup(group.to_string()));
        }
        let filter = if bins.is_empty() {
            Filter::All
        } else {
            Filter::set(bins.iter().map(|&b| Key::num(b as f64)))
        };
        self.filter(group, filter)
    }

    /// Restrict the dataset to the given record ids
    pub fn filter_ids(&mut self, ids: Option<&IdSet>) -> Result<usize> {
        let filter = match ids {
            Some(ids) => Filter::ids(ids),
            None => Filter::All,
        };
        self.filter(ID_ATTRIBUTE, filter)
    }

    pub fn clear_all(&mut self) -> Result<()> {
        self.index.clear_all()
    }

    pub fn currently_filtered_ids(&self) -> IdSet {
        self.index.filtered_ids()
    }

    /// Records passing this dataset's own filters, ignoring ids pushed in
    /// through `filter_ids`
    pub fn local_ids(&self) -> Result<IdSet> {
        match self.dimensions.get(ID_ATTRIBUTE) {
            Some(&id) => self.index.filtered_ids_excluding(id),
            None => Ok(self.index.filtered_ids()),
        }
    }

    /// `local_ids`, or `None` when no local filter rejects anything
    pub fn local_selection(&self) -> Result<Option<IdSet>> {
        let ids = self.local_ids()?;
        Ok(if ids.len() == self.len() { None } else { Some(ids) })
    }

    pub fn all(&self, key: &str) -> Result<Vec<&Record>> {
        self.index.all(self.dimension_id(key)?)
    }

    pub fn top(&self, key: &str, n: usize) -> Result<Vec<&Record>> {
        self.index.top(self.dimension_id(key)?, n)
    }

    pub fn bottom(&self, key: &str, n: usize) -> Result<Vec<&Record>> {
        self.index.bottom(self.dimension_id(key)?, n)
    }

    // =========================================================================
    // Series
    // =========================================================================

    /// Series map for a variant attribute, built once and cached
    pub fn series(&mut self, variant: &str) -> Result<&SeriesMap> {
        if !self.series.contains_key(variant) {
            let map = SeriesMap::build(self.index.records(), &self.series_attributes, variant)?;
            debug!(dataset = %self.name(), variant, series = map.series_count(), "series built");
            self.series.insert(variant.to_string(), map);
        }
        self.series
            .get(variant)
            .ok_or_else(|| EngineError::invalid(format!("no series for '{}'", variant)))
    }

    pub fn expand_to_series(&mut self, variant: &str, ids: &IdSet) -> Result<IdSet> {
        Ok(self.series(variant)?.expand(ids))
    }

    // =========================================================================
    // Sorting
    // =========================================================================

    /// Sort a histogram group for display into caller-held settings
    pub fn sorted_histogram(
        &self,
        group: &str,
        settings: &mut SortSettings,
        criterion: SortCriterion,
    ) -> Result<Vec<SortedBin<Aggregate>>> {
        let g = self.group(group)?;
        let interval = match self.histograms.get(group) {
            Some(binning) => binning.range(),
            None => key_extrema(g).bin_range()?,
        };
        sort_histogram_group(g, settings, criterion, interval)
    }

    /// Sort a histogram group and remember the order in the dataset
    pub fn sort_histogram(&mut self, group: &str, criterion: SortCriterion) -> Result<Vec<SortedBin<Aggregate>>> {
        let mut settings = self.histogram_sort.get(group).cloned().unwrap_or_default();
        let bins = self.sorted_histogram(group, &mut settings, criterion)?;
        self.histogram_sort.insert(group.to_string(), settings);
        Ok(bins)
    }

    pub fn histogram_sort(&self, group: &str) -> Option<&SortSettings> {
        self.histogram_sort.get(group)
    }

    /// Sort both axes of a heatmap group into caller-held settings
    pub fn sorted_heatmap(
        &self,
        group: &str,
        state: &mut HeatmapSort,
        criteria: (SortCriterion, SortCriterion),
    ) -> Result<Vec<SortedCell<Aggregate>>> {
        let g = self.group(group)?;
        let intervals: (Range<i64>, Range<i64>) = match self.heatmaps.get(group) {
            Some((bx, by)) => (bx.range(), by.range()),
            None => {
                let (ex, ey) = pair_key_extrema(g);
                (ex.bin_range()?, ey.bin_range()?)
            }
        };
        sort_heatmap_group(g, (&mut state.x, &mut state.y), criteria, intervals)
    }

    pub fn sort_heatmap(
        &mut self,
        group: &str,
        criteria: (SortCriterion, SortCriterion),
    ) -> Result<Vec<SortedCell<Aggregate>>> {
        let mut state = self.heatmap_sort.get(group).cloned().unwrap_or_default();
        let cells = self.sorted_heatmap(group, &mut state, criteria)?;
        self.heatmap_sort.insert(group.to_string(), state);
        Ok(cells)
    }

    pub fn heatmap_sort(&self, group: &str) -> Option<&HeatmapSort> {
        self.heatmap_sort.get(group)
    }
}

pub fn composite_name(x: &str, y: &str) -> String {
    format!("{}:{}", x, y)
}

/// Fail with a schema error unless every record has every attribute as a number
pub(crate) fn require_numbers(dataset: &str, records: &[Record], attributes: &[String]) -> Result<()> {
    for record in records {
        for attr in attributes {
            if !record.number(attr).is_some_and(f64::is_finite) {
                return Err(EngineError::schema(dataset, record.id, attr));
            }
        }
    }
    Ok(())
}

impl DatasetShape for Dataset {
    fn kind(&self) -> DatasetKind {
        DatasetKind::Plain
    }

    fn dataset(&self) -> &Dataset {
        self
    }

    fn dataset_mut(&mut self) -> &mut Dataset {
        self
    }
}
