use crate::dataset::{Dataset, HeatmapSort};
use crate::error::Result;
use crate::index::{Aggregate, IdSet, Tally};
use crate::sort::{SortCriterion, SortSettings, SortedBin, SortedCell};
use serde::Serialize;
use std::any::Any;

/// A widget drawing aggregates pulled from its operator's dataset.
///
/// Charts never own authoritative state: `render` re-reads the dataset.
pub trait Chart {
    fn name(&self) -> &str;

    /// A sibling changed the selection
    fn on_filter(&mut self, ids: &IdSet);

    /// A sibling hovers a record, or stopped hovering
    fn on_highlight(&mut self, id: Option<i64>);

    fn render(&mut self, dataset: &Dataset) -> Result<()>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

// =============================================================================
// Histogram
// =============================================================================

/// Sortable histogram over one histogram group
pub struct HistogramChart {
    name: String,
    group: String,
    criterion: SortCriterion,
    settings: SortSettings,
    bins: Vec<SortedBin<Aggregate>>,
    highlighted: Option<i64>,
    selected: usize,
}

impl HistogramChart {
    pub fn new(name: &str, group: &str) -> Self {
        Self {
            name: name.to_string(),
            group: group.to_string(),
            criterion: SortCriterion::Natural,
            settings: SortSettings::default(),
            bins: Vec::new(),
            highlighted: None,
            selected: 0,
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn criterion(&self) -> SortCriterion {
        self.criterion
    }

    /// Takes effect on the next render
    pub fn set_criterion(&mut self, criterion: SortCriterion) {
        self.criterion = criterion;
    }

    pub fn settings(&self) -> &SortSettings {
        &self.settings
    }

    /// Bins in display order as of the last render
    pub fn bins(&self) -> &[SortedBin<Aggregate>] {
        &self.bins
    }

    pub fn highlighted(&self) -> Option<i64> {
        self.highlighted
    }

    /// Size of the selection last announced by a sibling
    pub fn selected(&self) -> usize {
        self.selected
    }

    /// Natural bin indices under a brush spanning display positions
    pub fn natural_bins(&self, display: std::ops::Range<usize>) -> Vec<usize> {
        let mut bins: Vec<usize> = display.filter_map(|d| self.settings.permutation.invert(d)).collect();
        bins.sort_unstable();
        bins
    }

    /// Display position of the bin holding the highlighted record
    pub fn highlighted_position(&self) -> Option<usize> {
        let id = self.highlighted?;
        self.bins
            .iter()
            .find(|b| b.value.ids().is_some_and(|ids| ids.contains(&id)))
            .map(|b| b.display)
    }

    pub fn view(&self) -> HistogramView {
        HistogramView {
            name: self.name.clone(),
            group: self.group.clone(),
            criterion: self.criterion,
            bins: self
                .bins
                .iter()
                .map(|b| BinView { natural: b.natural, display: b.display, count: b.value.count() })
                .collect(),
        }
    }
}

impl Chart for HistogramChart {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_filter(&mut self, ids: &IdSet) {
        self.selected = ids.len();
    }

    fn on_highlight(&mut self, id: Option<i64>) {
        self.highlighted = id;
    }

    fn render(&mut self, dataset: &Dataset) -> Result<()> {
        self.bins = dataset.sorted_histogram(&self.group, &mut self.settings, self.criterion)?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BinView {
    pub natural: usize,
    pub display: usize,
    pub count: usize,
}

/// Serializable snapshot of a histogram chart
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramView {
    pub name: String,
    pub group: String,
    pub criterion: SortCriterion,
    pub bins: Vec<BinView>,
}

// =============================================================================
// Heatmap
// =============================================================================

/// Heatmap over a composite group, each axis sortable on its own
pub struct HeatmapChart {
    name: String,
    group: String,
    criteria: (SortCriterion, SortCriterion),
    sort: HeatmapSort,
    cells: Vec<SortedCell<Aggregate>>,
    highlighted: Option<i64>,
}

impl HeatmapChart {
    pub fn new(name: &str, group: &str) -> Self {
        Self {
            name: name.to_string(),
            group: group.to_string(),
            criteria: (SortCriterion::Natural, SortCriterion::Natural),
            sort: HeatmapSort::default(),
            cells: Vec::new(),
            highlighted: None,
        }
    }

    pub fn set_criteria(&mut self, x: SortCriterion, y: SortCriterion) {
        self.criteria = (x, y);
    }

    pub fn sort(&self) -> &HeatmapSort {
        &self.sort
    }

    pub fn cells(&self) -> &[SortedCell<Aggregate>] {
        &self.cells
    }

    pub fn highlighted(&self) -> Option<i64> {
        self.highlighted
    }
}

impl Chart for HeatmapChart {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_filter(&mut self, _ids: &IdSet) {}

    fn on_highlight(&mut self, id: Option<i64>) {
        self.highlighted = id;
    }

    fn render(&mut self, dataset: &Dataset) -> Result<()> {
        self.cells = dataset.sorted_heatmap(&self.group, &mut self.sort, self.criteria)?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Record, RecordBatch};
    use crate::index::Filter;
    use crate::EngineOptions;

    fn dataset() -> Dataset {
        let records = [1.0, 2.0, 2.0, 3.0, 5.0]
            .iter()
            .enumerate()
            .map(|(i, &x)| Record::new(i as i64 + 1).with("x", x).with("y", x * 2.0))
            .collect();
        let options = EngineOptions { histogram_bins: 4, ..Default::default() };
        Dataset::from_numeric_attributes("t", RecordBatch::new(records).unwrap(), options).unwrap()
    }

    #[test]
    fn test_histogram_render_and_brush_mapping() {
        let ds = dataset();
        let mut chart = HistogramChart::new("x", "x_hist");
        chart.set_criterion(SortCriterion::Desc);
        chart.render(&ds).unwrap();

        let counts: Vec<usize> = chart.view().bins.iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![2, 1, 1, 1]);
        // the fullest bin is displayed first and maps back to natural bin 1
        assert_eq!(chart.natural_bins(0..1), vec![1]);
        assert_eq!(chart.natural_bins(0..2), vec![0, 1]);
    }

    #[test]
    fn test_highlight_position() {
        let ds = dataset();
        let mut chart = HistogramChart::new("x", "x_hist");
        chart.render(&ds).unwrap();
        chart.on_highlight(Some(5));
        assert_eq!(chart.highlighted_position(), Some(3));
        chart.on_highlight(None);
        assert_eq!(chart.highlighted_position(), None);
    }

    #[test]
    fn test_render_reflects_other_filters() {
        let mut ds = dataset();
        let mut chart = HistogramChart::new("x", "x_hist");
        ds.filter("y", Filter::range(4.0, 100.0).unwrap()).unwrap();
        chart.render(&ds).unwrap();
        let total: usize = chart.view().bins.iter().map(|b| b.count).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn test_unknown_group_fails_render() {
        let ds = dataset();
        let mut chart = HeatmapChart::new("h", "x:y");
        assert!(chart.render(&ds).is_err());
    }
}
