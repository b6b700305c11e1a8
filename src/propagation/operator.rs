use super::{Broadcaster, Panel, SelectionTracker, WidgetId};
use crate::dataset::{Dataset, DatasetKind, DatasetShape};
use crate::error::Result;
use crate::index::{Filter, IdSet};
use crate::series::SeriesMap;
use tracing::{debug, info};

/// A root widget owning one dataset and the panels drawing it.
///
/// Isolated operators keep selections to themselves: their record ids do
/// not live in the shared model id space.
pub struct Operator {
    name: String,
    shape: Box<dyn DatasetShape>,
    panels: Broadcaster<Panel>,
    isolated: bool,
    tracker: SelectionTracker,
}

impl Operator {
    pub fn new(name: &str, shape: Box<dyn DatasetShape>) -> Self {
        let isolated = !shape.shares_id_space();
        Self {
            name: name.to_string(),
            shape,
            panels: Broadcaster::new(),
            isolated,
            tracker: SelectionTracker::default(),
        }
    }

    pub fn isolated(mut self, isolated: bool) -> Self {
        self.isolated = isolated;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_isolated(&self) -> bool {
        self.isolated
    }

    pub fn kind(&self) -> DatasetKind {
        self.shape.kind()
    }

    pub fn dataset(&self) -> &Dataset {
        self.shape.dataset()
    }

    pub fn shape(&self) -> &dyn DatasetShape {
        self.shape.as_ref()
    }

    /// Series map of the dataset; building it never touches filters
    pub fn series(&mut self, variant: &str) -> Result<&SeriesMap> {
        self.shape.dataset_mut().series(variant)
    }

    pub fn add_panel(&mut self, panel: Panel) -> WidgetId {
        let name = panel.name().to_string();
        self.panels.subscribe(&name, panel)
    }

    pub fn find_panel(&self, name: &str) -> Option<WidgetId> {
        self.panels.find(name)
    }

    pub fn panel(&self, id: WidgetId) -> Result<&Panel> {
        self.panels.lookup(id)
    }

    pub fn panel_mut(&mut self, id: WidgetId) -> Result<&mut Panel> {
        self.panels.lookup_mut(id)
    }

    pub fn panel_ids(&self) -> Vec<WidgetId> {
        self.panels.ids()
    }

    fn tracker_for(&mut self, source: Option<(WidgetId, WidgetId)>) -> Result<&mut SelectionTracker> {
        match source {
            Some((panel, chart)) => self.panels.lookup_mut(panel)?.tracker_mut(chart),
            None => Ok(&mut self.tracker),
        }
    }

    /// The only way widgets change this operator's filters. `source` is the
    /// (panel, chart) that was brushed, if any.
    ///
    /// Returns the records passing this operator's own filters when they
    /// differ from the source's last broadcast. Ids pushed in by other
    /// operators are left out so a selection never echoes back to them.
    pub fn brush(
        &mut self,
        source: Option<(WidgetId, WidgetId)>,
        dimension: &str,
        filter: Filter,
    ) -> Result<Option<IdSet>> {
        self.tracker_for(source)?.begin();
        let result = self.apply_and_fan_out(source, dimension, filter);
        self.tracker_for(source)?.finish();
        result
    }

    fn apply_and_fan_out(
        &mut self,
        source: Option<(WidgetId, WidgetId)>,
        dimension: &str,
        filter: Filter,
    ) -> Result<Option<IdSet>> {
        self.shape.dataset_mut().filter(dimension, filter)?;
        let local = self.shape.dataset().local_ids()?;
        if !self.tracker_for(source)?.offer(&local) {
            debug!(operator = %self.name, dimension, "selection unchanged");
            return Ok(None);
        }

        let dataset = self.shape.dataset();
        let ids = dataset.currently_filtered_ids();
        let mut notified = 0;
        if let Some((panel, chart)) = source {
            notified += self.panels.lookup_mut(panel)?.filter(&ids, Some(chart), dataset)?;
        }
        let source_panel = source.map(|(panel, _)| panel);
        self.panels.broadcast(source_panel, |other| {
            notified += other.filter(&ids, None, dataset)?;
            Ok(())
        })?;

        info!(operator = %self.name, dimension, selected = ids.len(), local = local.len(), notified, "selection propagated");
        Ok(Some(local))
    }

    /// Records this operator's own filters keep, `None` when they keep all
    pub fn local_selection(&self) -> Result<Option<IdSet>> {
        self.shape.dataset().local_selection()
    }

    /// Apply a selection made in another operator
    pub fn receive_filter(&mut self, ids: Option<&IdSet>) -> Result<usize> {
        if self.isolated {
            return Ok(0);
        }
        self.shape.dataset_mut().filter_ids(ids)?;
        let dataset = self.shape.dataset();
        let selected = dataset.currently_filtered_ids();
        let mut notified = 0;
        self.panels.broadcast(None, |panel| {
            notified += panel.filter(&selected, None, dataset)?;
            Ok(())
        })?;
        debug!(operator = %self.name, selected = selected.len(), notified, "remote selection applied");
        Ok(notified)
    }

    /// Hover without touching filters. Reaches the source's siblings, and
    /// the other panels too when `propagate` is set.
    pub fn highlight(&mut self, source: Option<(WidgetId, WidgetId)>, id: Option<i64>, propagate: bool) -> Result<usize> {
        let mut notified = 0;
        if let Some((panel, chart)) = source {
            notified += self.panels.lookup_mut(panel)?.highlight(id, Some(chart))?;
        }
        if propagate || source.is_none() {
            let source_panel = source.map(|(panel, _)| panel);
            self.panels.broadcast(source_panel, |other| {
                notified += other.highlight(id, None)?;
                Ok(())
            })?;
        }
        Ok(notified)
    }

    pub fn receive_highlight(&mut self, id: Option<i64>) -> Result<usize> {
        if self.isolated {
            return Ok(0);
        }
        self.highlight(None, id, true)
    }

    /// Swap in a freshly fetched dataset and redraw everything
    pub fn replace_dataset(&mut self, shape: Box<dyn DatasetShape>) -> Result<()> {
        info!(operator = %self.name, records = shape.dataset().len(), "dataset replaced");
        self.shape = shape;
        self.tracker = SelectionTracker::default();
        self.render()
    }

    pub fn render(&mut self) -> Result<()> {
        let dataset = self.shape.dataset();
        self.panels.broadcast(None, |panel| panel.render(dataset))?;
        Ok(())
    }
}
