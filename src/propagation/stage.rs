use super::{Broadcaster, Operator, WidgetId};
use crate::dataset::DatasetShape;
use crate::error::Result;
use crate::index::{Filter, IdSet};
use crate::requests::{RequestTag, ResponseGate};
use tracing::{debug, info};

/// Where an interaction started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Origin {
    pub operator: WidgetId,
    /// Brushed (panel, chart), if a chart started it
    pub widget: Option<(WidgetId, WidgetId)>,
}

impl Origin {
    pub fn operator(operator: WidgetId) -> Self {
        Self { operator, widget: None }
    }

    pub fn chart(operator: WidgetId, panel: WidgetId, chart: WidgetId) -> Self {
        Self { operator, widget: Some((panel, chart)) }
    }
}

/// Root of the propagation tree: fans selections out across operators
#[derive(Default)]
pub struct Stage {
    operators: Broadcaster<Operator>,
    gate: ResponseGate,
}

impl Stage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_operator(&mut self, operator: Operator) -> WidgetId {
        let name = operator.name().to_string();
        self.operators.subscribe(&name, operator)
    }

    pub fn find_operator(&self, name: &str) -> Option<WidgetId> {
        self.operators.find(name)
    }

    pub fn operator(&self, id: WidgetId) -> Result<&Operator> {
        self.operators.lookup(id)
    }

    pub fn operator_mut(&mut self, id: WidgetId) -> Result<&mut Operator> {
        self.operators.lookup_mut(id)
    }

    pub fn operator_ids(&self) -> Vec<WidgetId> {
        self.operators.ids()
    }

    /// Filter a dimension of the origin's dataset and propagate the new
    /// selection. Returns it, or `None` when nothing changed.
    pub fn brush(&mut self, origin: Origin, dimension: &str, filter: Filter) -> Result<Option<IdSet>> {
        let operator = self.operators.lookup_mut(origin.operator)?;
        let Some(ids) = operator.brush(origin.widget, dimension, filter)? else {
            return Ok(None);
        };
        if operator.is_isolated() {
            debug!(operator = %operator.name(), "isolated, not forwarding");
            return Ok(Some(ids));
        }

        let notified = self.propagate(origin.operator)?;
        info!(selected = ids.len(), operators = notified, "stage broadcast");
        Ok(Some(ids))
    }

    /// Hand every shared operator but `source` the intersection of the
    /// other shared operators' own selections.
    fn propagate(&mut self, source: WidgetId) -> Result<usize> {
        let mut selections = Vec::new();
        for (id, _, operator) in self.operators.iter() {
            if !operator.is_isolated() {
                selections.push((id, operator.local_selection()?));
            }
        }

        let mut notified = 0;
        self.operators.broadcast_with(Some(source), |id, other| {
            if !other.is_isolated() {
                other.receive_filter(intersect_others(&selections, id).as_ref())?;
                notified += 1;
            }
            Ok(())
        })?;
        Ok(notified)
    }

    pub fn clear(&mut self, origin: Origin, dimension: &str) -> Result<Option<IdSet>> {
        self.brush(origin, dimension, Filter::All)
    }

    /// Hover broadcast; crosses operators only when `propagate` is set
    pub fn highlight(&mut self, origin: Origin, id: Option<i64>, propagate: bool) -> Result<usize> {
        let operator = self.operators.lookup_mut(origin.operator)?;
        let mut notified = operator.highlight(origin.widget, id, propagate)?;
        if propagate && !operator.is_isolated() {
            self.operators.broadcast(Some(origin.operator), |other| {
                notified += other.receive_highlight(id)?;
                Ok(())
            })?;
        }
        Ok(notified)
    }

    /// Tag an outgoing request for an operator's fresh dataset
    pub fn request(&mut self, channel: &str) -> RequestTag {
        self.gate.issue(channel)
    }

    /// Install a response if it answers the newest request on its channel.
    /// Returns whether it was applied.
    pub fn deliver(&mut self, operator: WidgetId, tag: &RequestTag, shape: Box<dyn DatasetShape>) -> Result<bool> {
        let target = self.operators.lookup_mut(operator)?;
        match self.gate.accept(tag, shape) {
            Some(shape) => {
                target.replace_dataset(shape)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Intersection of every selection but `receiver`'s; `None` if none filter
fn intersect_others(selections: &[(WidgetId, Option<IdSet>)], receiver: WidgetId) -> Option<IdSet> {
    selections
        .iter()
        .filter(|(id, _)| *id != receiver)
        .filter_map(|(_, ids)| ids.as_ref())
        .fold(None, |acc: Option<IdSet>, ids| match acc {
            Some(acc) => Some(acc.intersection(ids)),
            None => Some(ids.clone()),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Record, RecordBatch};
    use crate::dataset::{Dataset, SurrogateDataset};
    use crate::index::Key;
    use crate::propagation::{Chart, HistogramChart, Panel};
    use crate::requests::Rule;
    use crate::EngineOptions;
    use std::any::Any;

    /// Counts every callback it receives
    #[derive(Default)]
    struct Probe {
        name: String,
        filters: usize,
        highlights: usize,
        renders: usize,
    }

    impl Probe {
        fn boxed(name: &str) -> Box<dyn Chart> {
            Box::new(Probe { name: name.to_string(), ..Default::default() })
        }
    }

    impl Chart for Probe {
        fn name(&self) -> &str {
            &self.name
        }
        fn on_filter(&mut self, _ids: &IdSet) {
            self.filters += 1;
        }
        fn on_highlight(&mut self, _id: Option<i64>) {
            self.highlights += 1;
        }
        fn render(&mut self, _dataset: &Dataset) -> Result<()> {
            self.renders += 1;
            Ok(())
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn models(name: &str) -> Box<Dataset> {
        let records = (1..=6).map(|i| Record::new(i).with("x", i as f64).with("y", (i % 3) as f64)).collect();
        Box::new(Dataset::from_numeric_attributes(name, RecordBatch::new(records).unwrap(), EngineOptions::default()).unwrap())
    }

    struct Fixture {
        stage: Stage,
        left: WidgetId,
        right: WidgetId,
        panel: WidgetId,
        charts: [WidgetId; 3],
    }

    fn fixture() -> Fixture {
        let mut stage = Stage::new();
        let mut op = Operator::new("overview", models("overview"));
        let mut panel = Panel::new("histograms");
        let charts = [panel.add_chart(Probe::boxed("a")), panel.add_chart(Probe::boxed("b")), panel.add_chart(Probe::boxed("c"))];
        let panel = op.add_panel(panel);
        let left = stage.add_operator(op);

        let mut other = Operator::new("detail", models("detail"));
        let mut p = Panel::new("p");
        p.add_chart(Probe::boxed("z"));
        other.add_panel(p);
        let right = stage.add_operator(other);
        Fixture { stage, left, right, panel, charts }
    }

    fn probe(stage: &Stage, op: WidgetId, panel: WidgetId, chart: WidgetId) -> (usize, usize, usize) {
        let p = stage.operator(op).unwrap().panel(panel).unwrap().chart_as::<Probe>(chart).unwrap();
        (p.filters, p.highlights, p.renders)
    }

    #[test]
    fn test_brush_excludes_source_and_reaches_siblings_once() {
        let mut f = fixture();
        let origin = Origin::chart(f.left, f.panel, f.charts[1]);
        let ids = f.stage.brush(origin, "x", Filter::range(1.0, 4.0).unwrap()).unwrap();
        assert_eq!(ids, Some(IdSet::from([1, 2, 3])));

        assert_eq!(probe(&f.stage, f.left, f.panel, f.charts[0]), (1, 0, 1));
        assert_eq!(probe(&f.stage, f.left, f.panel, f.charts[1]), (0, 0, 0));
        assert_eq!(probe(&f.stage, f.left, f.panel, f.charts[2]), (1, 0, 1));

        let right = f.stage.operator(f.right).unwrap();
        assert_eq!(right.dataset().currently_filtered_ids(), IdSet::from([1, 2, 3]));
        let rp = right.panel_ids()[0];
        let rc = right.panel(rp).unwrap().chart_ids()[0];
        assert_eq!(probe(&f.stage, f.right, rp, rc), (1, 0, 1));
    }

    #[test]
    fn test_unchanged_selection_not_rebroadcast() {
        let mut f = fixture();
        let origin = Origin::chart(f.left, f.panel, f.charts[0]);
        f.stage.brush(origin, "x", Filter::range(1.0, 4.0).unwrap()).unwrap();
        let again = f.stage.brush(origin, "x", Filter::range(1.0, 3.5).unwrap()).unwrap();
        assert_eq!(again, None);
        assert_eq!(probe(&f.stage, f.left, f.panel, f.charts[1]), (1, 0, 1));
    }

    #[test]
    fn test_cleared_brush_restores_peer_selection() {
        let mut f = fixture();
        let right = Origin::operator(f.right);
        f.stage.brush(right, "x", Filter::range(1.0, 3.0).unwrap()).unwrap();
        assert_eq!(f.stage.operator(f.left).unwrap().dataset().currently_filtered_ids(), IdSet::from([1, 2]));

        // Keeps everything, so the left operator no longer constrains the right
        let left = f.stage.brush(Origin::operator(f.left), "y", Filter::range(0.0, 100.0).unwrap()).unwrap();
        assert_eq!(left.map(|ids| ids.len()), Some(6));
        assert_eq!(f.stage.operator(f.right).unwrap().dataset().currently_filtered_ids(), IdSet::from([1, 2]));

        f.stage.clear(right, "x").unwrap();
        assert_eq!(f.stage.operator(f.right).unwrap().dataset().currently_filtered_ids().len(), 6);
        assert_eq!(f.stage.operator(f.left).unwrap().dataset().currently_filtered_ids().len(), 6);
    }

    #[test]
    fn test_receivers_get_intersection_of_other_selections() {
        let mut f = fixture();
        let third = f.stage.add_operator(Operator::new("third", models("third")));
        let left = Origin::operator(f.left);
        let right = Origin::operator(f.right);
        let ids = |stage: &Stage, op: WidgetId| stage.operator(op).unwrap().dataset().currently_filtered_ids();

        f.stage.brush(left, "x", Filter::range(1.0, 4.0).unwrap()).unwrap();
        let brushed = f.stage.brush(right, "x", Filter::range(2.0, 6.0).unwrap()).unwrap();
        assert_eq!(brushed, Some(IdSet::from([2, 3, 4, 5])));
        assert_eq!(ids(&f.stage, f.left), IdSet::from([2, 3]));
        assert_eq!(ids(&f.stage, f.right), IdSet::from([2, 3]));
        assert_eq!(ids(&f.stage, third), IdSet::from([2, 3]));
        assert_eq!(f.stage.operator(f.left).unwrap().local_selection().unwrap(), Some(IdSet::from([1, 2, 3])));

        f.stage.clear(right, "x").unwrap();
        assert_eq!(ids(&f.stage, f.left), IdSet::from([1, 2, 3]));
        assert_eq!(ids(&f.stage, f.right), IdSet::from([1, 2, 3]));
        assert_eq!(ids(&f.stage, third), IdSet::from([1, 2, 3]));
        assert_eq!(f.stage.operator(f.right).unwrap().local_selection().unwrap(), None);
    }

    #[test]
    fn test_highlight_leaves_filters_alone() {
        let mut f = fixture();
        let origin = Origin::chart(f.left, f.panel, f.charts[2]);
        let n = f.stage.highlight(origin, Some(4), false).unwrap();
        assert_eq!(n, 2);
        assert_eq!(probe(&f.stage, f.left, f.panel, f.charts[0]), (0, 1, 0));
        assert_eq!(probe(&f.stage, f.left, f.panel, f.charts[2]), (0, 0, 0));
        assert_eq!(f.stage.operator(f.left).unwrap().dataset().currently_filtered_ids().len(), 6);

        let n = f.stage.highlight(origin, None, true).unwrap();
        assert_eq!(n, 3);
    }

    #[test]
    fn test_isolated_operator_neither_sends_nor_receives() {
        let mut f = fixture();
        let rules = vec![
            Rule { condition: "x < 3".into(), precision: 0.9, recall: 0.5, support: 4.0 },
            Rule { condition: "y > 1".into(), precision: 0.4, recall: 0.8, support: 2.0 },
        ];
        let surrogate = SurrogateDataset::from_rules(rules, EngineOptions::default()).unwrap();
        let rules_op = f.stage.add_operator(Operator::new("rules", Box::new(surrogate)));
        assert!(f.stage.operator(rules_op).unwrap().is_isolated());

        f.stage.brush(Origin::operator(rules_op), "precision", Filter::range(0.5, 1.0).unwrap()).unwrap();
        assert_eq!(f.stage.operator(f.left).unwrap().dataset().currently_filtered_ids().len(), 6);

        f.stage.brush(Origin::operator(f.left), "id", Filter::Exact(Key::num(1.0))).unwrap();
        let rules_ids = f.stage.operator(rules_op).unwrap().dataset().currently_filtered_ids();
        assert_eq!(rules_ids, IdSet::from([0]));
    }

    #[test]
    fn test_stale_dataset_response_dropped() {
        let mut f = fixture();
        let old = f.stage.request("detail");
        let new = f.stage.request("detail");

        assert!(!f.stage.deliver(f.right, &old, models("stale")).unwrap());
        assert!(f.stage.deliver(f.right, &new, models("fresh")).unwrap());
        assert_eq!(f.stage.operator(f.right).unwrap().dataset().name(), "fresh");
    }

    #[test]
    fn test_real_histograms_follow_remote_selection() {
        let mut f = fixture();
        let mut panel = Panel::new("y");
        let chart = panel.add_chart(Box::new(HistogramChart::new("y", "y_hist")));
        let op = f.stage.operator_mut(f.right).unwrap();
        let pid = op.add_panel(panel);
        op.render().unwrap();

        f.stage.brush(Origin::operator(f.left), "x", Filter::range(1.0, 3.0).unwrap()).unwrap();
        let hist = f.stage.operator(f.right).unwrap().panel(pid).unwrap().chart_as::<HistogramChart>(chart).unwrap();
        let total: usize = hist.view().bins.iter().map(|b| b.count).sum();
        assert_eq!(total, 2);
    }
}
