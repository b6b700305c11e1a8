use super::{composite_name, require_numbers, Binning, Dataset, DatasetKind, DatasetShape};
use crate::data::RecordBatch;
use crate::error::Result;
use crate::index::{BinReducer, IdSet, Key, Sentinel};
use crate::EngineOptions;
use tracing::info;

const NAME: &str = "dissonance";

pub const SAMPLE_ID: &str = "sample_id";
pub const MODEL_ID: &str = "model_id";
pub const SAMPLE_DISSONANCE: &str = "sample_dissonance";
pub const MODEL_DISSONANCE: &str = "model_dissonance";

/// Per-sample dissonance: one record per (sample, model) pair. Records whose
/// model id is the sentinel describe a sample alone and are left out of
/// every aggregate.
pub struct DissonanceDataset {
    data: Dataset,
    sentinel: Sentinel,
    sample_histogram: String,
    model_histogram: String,
    heatmap: String,
}

impl DissonanceDataset {
    pub fn build(batch: RecordBatch, options: EngineOptions) -> Result<Self> {
        let required: Vec<String> = [SAMPLE_ID, MODEL_ID, SAMPLE_DISSONANCE, MODEL_DISSONANCE]
            .iter()
            .map(|a| a.to_string())
            .collect();
        require_numbers(NAME, &batch.records, &required)?;

        let sentinel = Sentinel::new(MODEL_ID, options.sentinel_model_id);
        let bins = options.histogram_bins;
        let mut data = Dataset::new(NAME, batch, options)?;
        data.add_id_dimension()?;
        for attr in &required {
            data.add_attribute(attr)?;
        }

        let sample_bins = Binning::uniform(data.extrema(SAMPLE_DISSONANCE)?, bins)?;
        let model_bins = Binning::uniform(data.extrema(MODEL_DISSONANCE)?, bins)?;

        data.add_histogram(
            SAMPLE_DISSONANCE,
            sample_bins.clone(),
            BinReducer::owners(SAMPLE_ID).skipping(sentinel.clone()),
        )?;
        data.add_histogram(
            MODEL_DISSONANCE,
            model_bins.clone(),
            BinReducer::owners(MODEL_ID).skipping(sentinel.clone()),
        )?;
        data.add_composite(
            (SAMPLE_DISSONANCE, MODEL_DISSONANCE),
            (SAMPLE_DISSONANCE, MODEL_DISSONANCE),
            (sample_bins, model_bins),
            BinReducer::count().skipping(sentinel.clone()),
        )?;

        let sample_histogram = data.options().histogram_name(SAMPLE_DISSONANCE);
        let model_histogram = data.options().histogram_name(MODEL_DISSONANCE);
        info!(records = data.len(), "dissonance dataset ready");
        Ok(Self {
            data,
            sentinel,
            sample_histogram,
            model_histogram,
            heatmap: composite_name(SAMPLE_DISSONANCE, MODEL_DISSONANCE),
        })
    }

    pub fn sentinel(&self) -> &Sentinel {
        &self.sentinel
    }

    pub fn sample_histogram(&self) -> &str {
        &self.sample_histogram
    }

    pub fn model_histogram(&self) -> &str {
        &self.model_histogram
    }

    pub fn heatmap(&self) -> &str {
        &self.heatmap
    }

    /// Models counted in one bin of the model-axis histogram
    pub fn models_in_bin(&self, bin: usize) -> Result<IdSet> {
        let group = self.data.group(&self.model_histogram)?;
        Ok(group
            .get(&Key::num(bin as f64))
            .and_then(|acc| acc.owners())
            .map(|owners| owners.keys().copied().collect())
            .unwrap_or_default())
    }

    /// Distinct samples currently passing every filter, sentinel rows included
    pub fn selected_samples(&self) -> IdSet {
        let selected = self.data.currently_filtered_ids();
        self.data
            .records()
            .iter()
            .filter(|r| selected.contains(r.id))
            .filter_map(|r| r.number(SAMPLE_ID).map(|s| s as i64))
            .collect()
    }
}

impl DatasetShape for DissonanceDataset {
    fn kind(&self) -> DatasetKind {
        DatasetKind::Dissonance
    }

    fn dataset(&self) -> &Dataset {
        &self.data
    }

    fn dataset_mut(&mut self) -> &mut Dataset {
        &mut self.data
    }
}
