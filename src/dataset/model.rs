use super::{composite_name, require_numbers, Binning, Dataset, DatasetKind, DatasetShape};
use crate::data::{CategoryCodec, RecordBatch, Value};
use crate::error::{EngineError, Result};
use crate::extrema::Extrema;
use crate::index::{BinReducer, Key};
use crate::metadata::Metadata;
use crate::EngineOptions;
use std::collections::BTreeMap;
use tracing::info;

const NAME: &str = "model";

/// One attribute as the composite dimensions see it
struct Axis {
    name: String,
    /// Numeric attribute read for the pair key (shadow for categoricals)
    numeric: String,
    binning: Binning,
}

/// Dataset over DR model instances: one record per model, with its
/// hyperparameter values and objective scores.
pub struct ModelDataset {
    data: Dataset,
    metadata: Metadata,
    codecs: BTreeMap<String, CategoryCodec>,
    composites: Vec<String>,
}

impl ModelDataset {
    pub fn build(mut batch: RecordBatch, metadata: Metadata, options: EngineOptions) -> Result<Self> {
        options.validate()?;
        metadata.validate()?;

        for record in &batch.records {
            for h in &metadata.hyperparameters {
                let usable = match record.get(&h.name) {
                    Some(Value::Text(_)) => h.is_categorical(),
                    Some(Value::Number(n)) => !h.is_categorical() && n.is_finite(),
                    None => false,
                };
                if !usable {
                    return Err(EngineError::schema(NAME, record.id, &h.name));
                }
            }
        }
        require_numbers(NAME, &batch.records, &metadata.objectives)?;

        let mut codecs = BTreeMap::new();
        for h in metadata.hyperparameters.iter().filter(|h| h.is_categorical()) {
            codecs.insert(h.name.clone(), batch.encode_categorical(&h.name, &options.encoded_suffix));
        }

        let bins = options.histogram_bins;
        let mut data = Dataset::new(NAME, batch, options)?;
        data.add_id_dimension()?;

        let mut hyper_axes = Vec::new();
        for h in &metadata.hyperparameters {
            let allowed: Vec<Key> = h.allowed_values().iter().map(Key::from_value).collect();
            let axis = if let Some(codec) = codecs.get(&h.name) {
                data.add_text_attribute(&h.name)?;
                let shown = if allowed.is_empty() {
                    codec.categories().iter().map(|c| Key::text(c)).collect()
                } else {
                    allowed
                };
                data.add_histogram(&h.name, Binning::categories(shown)?, BinReducer::ids())?;

                let numeric = data.options().encoded_name(&h.name);
                data.cache_extrema(&numeric, Extrema::new(0.0, codec.len().saturating_sub(1) as f64));
                let codes = (0..codec.len()).map(|c| Key::num(c as f64)).collect();
                Axis { name: h.name.clone(), numeric, binning: Binning::categories(codes)? }
            } else {
                data.add_attribute(&h.name)?;
                let binning = if allowed.is_empty() {
                    Binning::uniform(data.extrema(&h.name)?, bins)?
                } else {
                    Binning::categories(allowed)?
                };
                data.add_histogram(&h.name, binning.clone(), BinReducer::ids())?;
                Axis { name: h.name.clone(), numeric: h.name.clone(), binning }
            };
            hyper_axes.push(axis);
        }

        let mut objective_axes = Vec::new();
        for o in &metadata.objectives {
            data.add_attribute(o)?;
            let binning = Binning::uniform(data.extrema(o)?, bins)?;
            data.add_histogram(o, binning.clone(), BinReducer::ids())?;
            objective_axes.push(Axis { name: o.clone(), numeric: o.clone(), binning });
        }

        // hyperparameter x objective and objective x objective, without A:A or B:A
        let mut composites: Vec<String> = Vec::new();
        for a in hyper_axes.iter().chain(objective_axes.iter()) {
            for b in &objective_axes {
                if a.name == b.name || composites.contains(&composite_name(&b.name, &a.name)) {
                    continue;
                }
                data.add_composite(
                    (&a.name, &b.name),
                    (&a.numeric, &b.numeric),
                    (a.binning.clone(), b.binning.clone()),
                    BinReducer::count(),
                )?;
                composites.push(composite_name(&a.name, &b.name));
            }
        }

        data.set_series_attributes(metadata.hyperparameter_names());
        info!(
            models = data.len(),
            hyperparameters = metadata.hyperparameters.len(),
            objectives = metadata.objectives.len(),
            composites = composites.len(),
            "model dataset ready"
        );
        Ok(Self { data, metadata, codecs, composites })
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn codec(&self, attribute: &str) -> Option<&CategoryCodec> {
        self.codecs.get(attribute)
    }

    /// Composite dimension names in construction order
    pub fn composites(&self) -> &[String] {
        &self.composites
    }
}

impl DatasetShape for ModelDataset {
    fn kind(&self) -> DatasetKind {
        DatasetKind::Model
    }

    fn dataset(&self) -> &Dataset {
        &self.data
    }

    fn dataset_mut(&mut self) -> &mut Dataset {
        &mut self.data
    }
}
