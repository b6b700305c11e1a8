// Script interpreter: drives one operator through the propagation stage

use crate::dataset::{DatasetKind, DatasetShape};
use crate::error::{EngineError, Result};
use crate::index::{Filter, IdSet};
use crate::parser::{Command, Literal, Script};
use crate::propagation::{HistogramChart, HistogramView, Operator, Origin, Panel, Stage, WidgetId};
use crate::sort::SortCriterion;
use serde::Serialize;
use tracing::{debug, info};

const OPERATOR: &str = "main";
const PANEL: &str = "histograms";

/// Outcome of a `series(variant)` command
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesSummary {
    pub variant: String,
    pub series: usize,
    /// Records selected when the command ran
    pub selected: usize,
    /// That selection grown to whole series
    pub expanded: IdSet,
}

/// Final state after a script ran
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub dataset: String,
    pub kind: DatasetKind,
    pub records: usize,
    pub filtered_ids: IdSet,
    /// Bins in display order
    pub histograms: Vec<HistogramView>,
    pub series: Vec<SeriesSummary>,
}

/// One operator with a histogram chart per histogram group, mounted on a
/// stage so scripted brushes go through the same propagation as widgets.
pub struct Session {
    stage: Stage,
    operator: WidgetId,
    panel: WidgetId,
    series: Vec<SeriesSummary>,
}

impl Session {
    pub fn new(shape: Box<dyn DatasetShape>) -> Result<Self> {
        let mut panel = Panel::new(PANEL);
        for group in shape.dataset().histogram_names() {
            panel.add_chart(Box::new(HistogramChart::new(group, group)));
        }
        let mut operator = Operator::new(OPERATOR, shape);
        let panel = operator.add_panel(panel);
        operator.render()?;

        let mut stage = Stage::new();
        let operator = stage.add_operator(operator);
        Ok(Self { stage, operator, panel, series: Vec::new() })
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    fn operator(&self) -> Result<&Operator> {
        self.stage.operator(self.operator)
    }

    /// The chart drawing a dimension, if any, so it is excluded from its own
    /// brush like an interactive widget would be.
    fn origin_for(&self, dimension: &str) -> Result<Origin> {
        let op = self.operator()?;
        let histogram = op.dataset().options().histogram_name(dimension);
        let panel = op.panel(self.panel)?;
        let chart = panel.find_chart(dimension).or_else(|| panel.find_chart(&histogram));
        Ok(match chart {
            Some(chart) => Origin::chart(self.operator, self.panel, chart),
            None => Origin::operator(self.operator),
        })
    }

    pub fn run(&mut self, command: &Command) -> Result<()> {
        debug!(?command, "running command");
        match command {
            Command::Range { dimension, lo, hi } => {
                let origin = self.origin_for(dimension)?;
                self.stage.brush(origin, dimension, Filter::range(*lo, *hi)?)?;
            }
            Command::Select { dimension, values } => {
                let origin = self.origin_for(dimension)?;
                let filter = Filter::set(values.iter().map(Literal::to_key));
                self.stage.brush(origin, dimension, filter)?;
            }
            Command::Clear { dimension } => {
                let origin = self.origin_for(dimension)?;
                self.stage.clear(origin, dimension)?;
            }
            Command::Sort { group, criterion } => {
                let criterion: SortCriterion = criterion.parse()?;
                let op = self.stage.operator_mut(self.operator)?;
                let panel = op.panel_mut(self.panel)?;
                let chart = panel
                    .find_chart(group)
                    .and_then(|id| panel.chart_as_mut::<HistogramChart>(id))
                    .ok_or_else(|| EngineError::UnknownGroup(group.clone()))?;
                chart.set_criterion(criterion);
                op.render()?;
            }
            Command::Series { variant } => {
                let selected = self.operator()?.dataset().currently_filtered_ids();
                let op = self.stage.operator_mut(self.operator)?;
                let map = op.series(variant)?;
                self.series.push(SeriesSummary {
                    variant: variant.clone(),
                    series: map.series_count(),
                    selected: selected.len(),
                    expanded: map.expand(&selected),
                });
            }
        }
        Ok(())
    }

    pub fn run_script(&mut self, script: &Script) -> Result<()> {
        for command in &script.commands {
            self.run(command)?;
        }
        info!(commands = script.commands.len(), "script finished");
        Ok(())
    }

    pub fn report(&self) -> Result<Report> {
        let op = self.operator()?;
        let dataset = op.dataset();
        let panel = op.panel(self.panel)?;
        let histograms = panel
            .chart_ids()
            .into_iter()
            .filter_map(|id| panel.chart_as::<HistogramChart>(id))
            .map(HistogramChart::view)
            .collect();
        Ok(Report {
            dataset: dataset.name().to_string(),
            kind: op.kind(),
            records: dataset.len(),
            filtered_ids: dataset.currently_filtered_ids(),
            histograms,
            series: self.series.clone(),
        })
    }
}

/// Run a script against a dataset and report the final state
pub fn run_script(shape: Box<dyn DatasetShape>, script: &Script) -> Result<Report> {
    let mut session = Session::new(shape)?;
    session.run_script(script)?;
    session.report()
}
