use super::{Binning, Dataset, DatasetKind, DatasetShape};
use crate::data::{Record, RecordBatch};
use crate::error::{EngineError, Result};
use crate::extrema::Extrema;
use crate::index::BinReducer;
use crate::requests::Rule;
use crate::EngineOptions;
use tracing::info;

const NAME: &str = "surrogate";

pub const CONDITION: &str = "condition";
pub const PRECISION: &str = "precision";
pub const RECALL: &str = "recall";
pub const SUPPORT: &str = "support";

/// Rules of a surrogate model, one record per rule. Record ids are rule
/// positions, unrelated to model ids.
pub struct SurrogateDataset {
    data: Dataset,
    rules: Vec<Rule>,
}

impl SurrogateDataset {
    pub fn from_rules(rules: Vec<Rule>, options: EngineOptions) -> Result<Self> {
        let mut records = Vec::with_capacity(rules.len());
        for (idx, rule) in rules.iter().enumerate() {
            let id = idx as i64;
            for (attr, value) in [(PRECISION, rule.precision), (RECALL, rule.recall), (SUPPORT, rule.support)] {
                if !value.is_finite() {
                    return Err(EngineError::schema(NAME, id, attr));
                }
            }
            records.push(
                Record::new(id)
                    .with(CONDITION, rule.condition.as_str())
                    .with(PRECISION, rule.precision)
                    .with(RECALL, rule.recall)
                    .with(SUPPORT, rule.support),
            );
        }

        let bins = options.histogram_bins;
        let mut data = Dataset::new(NAME, RecordBatch::new(records)?, options)?;
        data.add_id_dimension()?;
        data.add_text_attribute(CONDITION)?;

        // precision and recall are ratios, binned over the full unit interval
        for attr in [PRECISION, RECALL] {
            data.add_attribute(attr)?;
            data.add_histogram(attr, Binning::uniform(Extrema::new(0.0, 1.0), bins)?, BinReducer::ids())?;
        }
        data.add_attribute(SUPPORT)?;
        let support_bins = Binning::uniform(data.extrema(SUPPORT)?, bins)?;
        data.add_histogram(SUPPORT, support_bins, BinReducer::ids())?;

        info!(rules = rules.len(), "surrogate dataset ready");
        Ok(Self { data, rules })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rule(&self, id: i64) -> Option<&Rule> {
        usize::try_from(id).ok().and_then(|idx| self.rules.get(idx))
    }

    /// Rules passing every filter, in rule order
    pub fn selected_rules(&self) -> Vec<&Rule> {
        self.data
            .currently_filtered_ids()
            .iter()
            .filter_map(|id| self.rule(id))
            .collect()
    }
}

impl DatasetShape for SurrogateDataset {
    fn kind(&self) -> DatasetKind {
        DatasetKind::Surrogate
    }

    fn dataset(&self) -> &Dataset {
        &self.data
    }

    fn dataset_mut(&mut self) -> &mut Dataset {
        &mut self.data
    }

    fn shares_id_space(&self) -> bool {
        false
    }
}
