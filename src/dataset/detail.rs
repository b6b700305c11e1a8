use super::{composite_name, Binning, Dataset, DatasetKind, DatasetShape};
use crate::data::{Record, RecordBatch};
use crate::error::{EngineError, Result};
use crate::index::BinReducer;
use crate::requests::ModelDetail;
use crate::EngineOptions;
use serde::Serialize;
use tracing::info;

const NAME: &str = "detail";

pub const AXIS_PREFIX: &str = "dim_";

/// A point as a scatterplot cell draws it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScatterPoint {
    pub id: i64,
    pub x: f64,
    pub y: f64,
    pub selected: bool,
}

/// Embedding of a single model, with a dimension per coordinate axis and
/// one composite per axis pair for the scatterplot matrix.
pub struct DetailDataset {
    data: Dataset,
    model_id: i64,
    axes: Vec<String>,
    pairs: Vec<(usize, usize)>,
}

impl DetailDataset {
    pub fn build(detail: &ModelDetail, options: EngineOptions) -> Result<Self> {
        if detail.dimensionality == 0 {
            return Err(EngineError::invalid("embedding dimensionality must be at least 1"));
        }
        let axes: Vec<String> = (0..detail.dimensionality).map(|i| format!("{}{}", AXIS_PREFIX, i)).collect();

        let mut records = Vec::with_capacity(detail.points.len());
        for point in &detail.points {
            if point.coordinates.len() > axes.len() {
                return Err(EngineError::invalid(format!(
                    "point {} has {} coordinates, expected {}",
                    point.id,
                    point.coordinates.len(),
                    axes.len()
                )));
            }
            let mut record = Record::new(point.id);
            for (axis, value) in axes.iter().zip(&point.coordinates) {
                record = record.with(axis, *value);
            }
            records.push(record);
        }

        let bins = options.histogram_bins;
        let mut data = Dataset::new(NAME, RecordBatch::new(records)?, options)?;
        data.add_id_dimension()?;
        for axis in &axes {
            data.add_attribute(axis)?;
        }

        let mut pairs = Vec::new();
        for i in 0..axes.len() {
            for j in (i + 1)..axes.len() {
                let bx = Binning::uniform(data.extrema(&axes[i])?, bins)?;
                let by = Binning::uniform(data.extrema(&axes[j])?, bins)?;
                data.add_composite((&axes[i], &axes[j]), (&axes[i], &axes[j]), (bx, by), BinReducer::count())?;
                pairs.push((i, j));
            }
        }

        info!(model = detail.model_id, points = data.len(), axes = axes.len(), "detail dataset ready");
        Ok(Self { data, model_id: detail.model_id, axes, pairs })
    }

    pub fn model_id(&self) -> i64 {
        self.model_id
    }

    pub fn axes(&self) -> &[String] {
        &self.axes
    }

    /// Composite dimension names, row-major over the upper triangle
    pub fn pair_names(&self) -> Vec<String> {
        self.pairs
            .iter()
            .map(|&(i, j)| composite_name(&self.axes[i], &self.axes[j]))
            .collect()
    }

    /// Points of one scatterplot cell with their selection state
    pub fn scatter(&self, x: usize, y: usize) -> Result<Vec<ScatterPoint>> {
        let (ax, ay) = match (self.axes.get(x), self.axes.get(y)) {
            (Some(ax), Some(ay)) => (ax, ay),
            _ => return Err(EngineError::UnknownDimension(format!("{}{}:{}{}", AXIS_PREFIX, x, AXIS_PREFIX, y))),
        };
        let selected = self.data.currently_filtered_ids();
        Ok(self
            .data
            .records()
            .iter()
            .filter_map(|r| {
                Some(ScatterPoint { id: r.id, x: r.number(ax)?, y: r.number(ay)?, selected: selected.contains(r.id) })
            })
            .collect())
    }
}

impl DatasetShape for DetailDataset {
    fn kind(&self) -> DatasetKind {
        DatasetKind::Detail
    }

    fn dataset(&self) -> &Dataset {
        &self.data
    }

    fn dataset_mut(&mut self) -> &mut Dataset {
        &mut self.data
    }
}
