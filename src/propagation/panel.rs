use super::{Broadcaster, Chart, SelectionTracker, WidgetId};
use crate::dataset::Dataset;
use crate::error::{EngineError, Result};
use crate::index::IdSet;
use tracing::debug;

struct ChartSlot {
    chart: Box<dyn Chart>,
    tracker: SelectionTracker,
}

/// A group of sibling charts over the same dataset
pub struct Panel {
    name: String,
    charts: Broadcaster<ChartSlot>,
}

impl Panel {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), charts: Broadcaster::new() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_chart(&mut self, chart: Box<dyn Chart>) -> WidgetId {
        let name = chart.name().to_string();
        self.charts.subscribe(&name, ChartSlot { chart, tracker: SelectionTracker::default() })
    }

    pub fn remove_chart(&mut self, id: WidgetId) -> Option<Box<dyn Chart>> {
        self.charts.unsubscribe(id).map(|slot| slot.chart)
    }

    pub fn find_chart(&self, name: &str) -> Option<WidgetId> {
        self.charts.find(name)
    }

    pub fn chart_ids(&self) -> Vec<WidgetId> {
        self.charts.ids()
    }

    pub fn len(&self) -> usize {
        self.charts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.charts.is_empty()
    }

    pub fn chart(&self, id: WidgetId) -> Result<&dyn Chart> {
        self.charts.lookup(id).map(|slot| slot.chart.as_ref())
    }

    /// Typed access to a chart, `None` when the id is unknown or the type differs
    pub fn chart_as<T: 'static>(&self, id: WidgetId) -> Option<&T> {
        self.charts.get(id)?.chart.as_any().downcast_ref::<T>()
    }

    pub fn chart_as_mut<T: 'static>(&mut self, id: WidgetId) -> Option<&mut T> {
        self.charts.get_mut(id)?.chart.as_any_mut().downcast_mut::<T>()
    }

    pub(crate) fn tracker_mut(&mut self, chart: WidgetId) -> Result<&mut SelectionTracker> {
        let name = self.name.clone();
        self.charts
            .get_mut(chart)
            .map(|slot| &mut slot.tracker)
            .ok_or_else(|| EngineError::UnknownWidget(format!("{}/{:?}", name, chart)))
    }

    /// Hand a new selection to every chart except `source`, then re-render them
    pub fn filter(&mut self, ids: &IdSet, source: Option<WidgetId>, dataset: &Dataset) -> Result<usize> {
        let notified = self.charts.broadcast(source, |slot| {
            slot.chart.on_filter(ids);
            slot.chart.render(dataset)
        })?;
        debug!(panel = %self.name, notified, selected = ids.len(), "panel filter");
        Ok(notified)
    }

    pub fn highlight(&mut self, id: Option<i64>, source: Option<WidgetId>) -> Result<usize> {
        self.charts.broadcast(source, |slot| {
            slot.chart.on_highlight(id);
            Ok(())
        })
    }

    pub fn render(&mut self, dataset: &Dataset) -> Result<()> {
        self.charts.broadcast(None, |slot| slot.chart.render(dataset))?;
        Ok(())
    }
}
