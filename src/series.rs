use crate::data::Record;
use crate::error::{EngineError, Result};
use crate::index::{IdSet, Key};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

const KEY_SEPARATOR: char = '\u{1f}';

/// Partition of records into series sharing every configuration attribute
/// except one "variant" attribute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesMap {
    pub variant: String,
    record_to_series: BTreeMap<i64, usize>,
    /// Record ids per series, ordered by the variant value
    series_to_records: Vec<Vec<i64>>,
}

impl SeriesMap {
    /// Build the series map. Series ids follow first-seen record order.
    pub fn build(records: &[Record], attributes: &[String], variant: &str) -> Result<Self> {
        if !attributes.iter().any(|a| a == variant) {
            return Err(EngineError::invalid(format!(
                "variant '{}' is not one of the series attributes",
                variant
            )));
        }

        let mut series_ids: HashMap<String, usize> = HashMap::new();
        let mut members: Vec<Vec<(Key, i64)>> = Vec::new();
        let mut record_to_series = BTreeMap::new();

        for record in records {
            let mut key = String::new();
            for attr in attributes.iter().filter(|a| *a != variant) {
                let value = record
                    .get(attr)
                    .ok_or_else(|| EngineError::schema("series", record.id, attr))?;
                key.push_str(&value.render());
                key.push(KEY_SEPARATOR);
            }
            let variant_key = record
                .get(variant)
                .map(Key::from_value)
                .ok_or_else(|| EngineError::schema("series", record.id, variant))?;

            let next = series_ids.len();
            let series = *series_ids.entry(key).or_insert(next);
            if series == members.len() {
                members.push(Vec::new());
            }
            members[series].push((variant_key, record.id));
            record_to_series.insert(record.id, series);
        }

        let series_to_records = members
            .into_iter()
            .map(|mut m| {
                m.sort();
                m.into_iter().map(|(_, id)| id).collect()
            })
            .collect();

        Ok(Self { variant: variant.to_string(), record_to_series, series_to_records })
    }

    pub fn series_count(&self) -> usize {
        self.series_to_records.len()
    }

    pub fn series_of(&self, record: i64) -> Option<usize> {
        self.record_to_series.get(&record).copied()
    }

    pub fn records_of(&self, series: usize) -> Option<&[i64]> {
        self.series_to_records.get(series).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &[i64])> {
        self.series_to_records.iter().enumerate().map(|(i, r)| (i, r.as_slice()))
    }

    /// Extend a selection so it contains every record of each touched series
    pub fn expand(&self, ids: &IdSet) -> IdSet {
        let mut out = ids.clone();
        for id in ids.iter() {
            if let Some(records) = self.series_of(id).and_then(|s| self.records_of(s)) {
                out.extend(records.iter().copied());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn model(id: i64, neighbors: f64, dist: f64, metric: &str) -> Record {
        Record::new(id)
            .with("n_neighbors", neighbors)
            .with("min_dist", dist)
            .with("metric", metric)
            .with("trustworthiness", 0.9)
    }

    fn attrs() -> Vec<String> {
        vec!["n_neighbors".into(), "min_dist".into(), "metric".into()]
    }

    #[test]
    fn test_build_series() {
        let records = vec![
            model(1, 15.0, 0.1, "cosine"),
            model(2, 5.0, 0.1, "cosine"),
            model(3, 15.0, 0.5, "cosine"),
            model(4, 50.0, 0.1, "cosine"),
        ];
        let map = SeriesMap::build(&records, &attrs(), "n_neighbors").unwrap();

        assert_eq!(map.series_count(), 2);
        assert_eq!(map.series_of(1), Some(0));
        assert_eq!(map.series_of(3), Some(1));
        assert_eq!(map.records_of(0), Some(&[2, 1, 4][..]));
    }

    #[test]
    fn test_expand_selection() {
        let records = vec![
            model(1, 15.0, 0.1, "cosine"),
            model(2, 5.0, 0.1, "cosine"),
            model(3, 15.0, 0.1, "euclidean"),
        ];
        let map = SeriesMap::build(&records, &attrs(), "n_neighbors").unwrap();
        assert_eq!(map.expand(&IdSet::from([1])), IdSet::from([1, 2]));
    }

    #[test]
    fn test_unknown_variant() {
        let res = SeriesMap::build(&[], &attrs(), "trustworthiness");
        assert!(matches!(res, Err(EngineError::InvalidArgument(_))));
    }

    #[test]
    fn test_missing_attribute() {
        let records = vec![Record::new(1).with("n_neighbors", 5.0)];
        let res = SeriesMap::build(&records, &attrs(), "n_neighbors");
        assert!(matches!(res, Err(EngineError::Schema { .. })));
    }

    proptest! {
        #[test]
        fn prop_series_partition_records(
            grid in prop::collection::vec((0u8..3, 0u8..3, 0u8..2), 0..40),
        ) {
            let records: Vec<Record> = grid
                .iter()
                .enumerate()
                .map(|(i, &(n, d, m))| model(i as i64, n as f64, d as f64, if m == 0 { "a" } else { "b" }))
                .collect();
            let map = SeriesMap::build(&records, &attrs(), "min_dist").unwrap();

            let mut seen = BTreeSet::new();
            for (_, members) in map.iter() {
                for id in members {
                    prop_assert!(seen.insert(*id), "record {} in two series", id);
                }
            }
            let all: BTreeSet<i64> = records.iter().map(|r| r.id).collect();
            prop_assert_eq!(seen, all);
        }
    }
}
