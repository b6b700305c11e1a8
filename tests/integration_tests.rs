use crossview::data::{Record, RecordBatch};
use crossview::dataset::{Dataset, DatasetShape, ModelDataset};
use crossview::index::{BinReducer, CountReducer, Crossfilter, Filter, GroupId, IdSet, Key, Tally};
use crossview::metadata::Metadata;
use crossview::parser::parse_script;
use crossview::propagation::{HistogramChart, Operator, Origin, Panel, Stage};
use crossview::sort::SortCriterion;
use crossview::EngineOptions;
use pretty_assertions::assert_eq;
use std::fs;
use std::process::Command;

const MODELS: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data/models.json");
const METADATA: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data/metadata.json");
const POINTS: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data/points.csv");

/// Helper function to run crossview and parse its JSON report
fn run_crossview(args: &[&str]) -> Result<serde_json::Value, String> {
    let output = Command::new(env!("CARGO_BIN_EXE_crossview"))
        .args(args)
        .output()
        .map_err(|e| format!("Failed to spawn process: {}", e))?;

    if output.status.success() {
        serde_json::from_slice(&output.stdout).map_err(|e| format!("Report is not JSON: {}", e))
    } else {
        Err(String::from_utf8_lossy(&output.stderr).to_string())
    }
}

fn model_dataset() -> ModelDataset {
    let records: serde_json::Value = serde_json::from_str(&fs::read_to_string(MODELS).unwrap()).unwrap();
    let metadata: serde_json::Value = serde_json::from_str(&fs::read_to_string(METADATA).unwrap()).unwrap();
    ModelDataset::build(
        RecordBatch::from_json(&records).unwrap(),
        Metadata::from_json(metadata).unwrap(),
        EngineOptions::default(),
    )
    .unwrap()
}

fn scenario_records() -> Vec<Record> {
    [(1, 1.0), (2, 2.0), (3, 2.0), (4, 3.0), (5, 5.0)]
        .into_iter()
        .map(|(id, x)| Record::new(id).with("x", x).with("y", id as f64))
        .collect()
}

fn floor_bin(key: &Key) -> Key {
    Key::num(key.as_number().unwrap_or(0.0).floor())
}

fn counts(cf: &Crossfilter, group: GroupId<CountReducer>) -> Vec<(f64, usize)> {
    cf.group_ref(group)
        .unwrap()
        .all()
        .into_iter()
        .map(|(k, c)| (k.as_number().unwrap(), c.count))
        .collect()
}

#[test]
fn test_histogram_sees_other_dimensions_filters_only() {
    let mut cf = Crossfilter::new("scenario", scenario_records());
    let x = cf.dimension("x", None, |r| r.number("x").map(Key::num)).unwrap();
    let y = cf.dimension("y", None, |r| r.number("y").map(Key::num)).unwrap();
    let hist = cf.group(x, floor_bin, CountReducer).unwrap();

    assert_eq!(counts(&cf, hist), vec![(1.0, 1), (2.0, 2), (3.0, 1), (5.0, 1)]);

    cf.filter(y, Filter::function(|k| k.as_number() != Some(3.0))).unwrap();
    assert_eq!(counts(&cf, hist), vec![(1.0, 1), (2.0, 1), (3.0, 1), (5.0, 1)]);

    // Brushing x itself leaves its own histogram alone
    cf.filter(x, Filter::range(1.0, 2.0).unwrap()).unwrap();
    assert_eq!(counts(&cf, hist), vec![(1.0, 1), (2.0, 1), (3.0, 1), (5.0, 1)]);
    assert_eq!(cf.filtered_ids(), IdSet::from([1]));
}

#[test]
fn test_sort_desc_then_natural_restores_order() {
    let batch = RecordBatch::new(scenario_records()).unwrap();
    let mut dataset = Dataset::new("scenario", batch, EngineOptions::default()).unwrap();
    dataset.add_attribute("x").unwrap();
    dataset.add_group("x_floor", "x", floor_bin, BinReducer::count()).unwrap();
    let before = dataset.group("x_floor").unwrap().all();

    let desc = dataset.sort_histogram("x_floor", SortCriterion::Desc).unwrap();
    let keys: Vec<i64> = desc.iter().map(|b| b.key).collect();
    let values: Vec<usize> = desc.iter().map(|b| b.value.count()).collect();
    // Bin 4 is a materialized gap
    assert_eq!(keys, vec![2, 1, 3, 5, 4]);
    assert_eq!(values, vec![2, 1, 1, 1, 0]);
    assert_eq!(dataset.histogram_sort("x_floor").unwrap().criterion, SortCriterion::Desc);

    let natural = dataset.sort_histogram("x_floor", SortCriterion::Natural).unwrap();
    let keys: Vec<i64> = natural.iter().map(|b| b.key).collect();
    assert_eq!(keys, vec![1, 2, 3, 4, 5]);
    assert!(natural.iter().all(|b| b.natural == b.display));
    assert_eq!(dataset.group("x_floor").unwrap().all(), before);
}

#[test]
fn test_model_brush_reaches_other_operator() {
    let mut stage = Stage::new();

    let mut overview = Operator::new("overview", Box::new(model_dataset()));
    let mut panel = Panel::new("hyperparameters");
    let metric = panel.add_chart(Box::new(HistogramChart::new("metric", "metric_hist")));
    let panel = overview.add_panel(panel);
    let overview = stage.add_operator(overview);

    let batch = RecordBatch::new((1..=8).map(|i| Record::new(i).with("rank", i as f64)).collect()).unwrap();
    let ranks = Dataset::from_numeric_attributes("ranks", batch, EngineOptions::default()).unwrap();
    let ranks = stage.add_operator(Operator::new("ranks", Box::new(ranks)));

    let selected = stage
        .brush(Origin::chart(overview, panel, metric), "metric", Filter::set(["cosine"]))
        .unwrap();
    assert_eq!(selected, Some(IdSet::from([1, 2, 3, 4])));
    assert_eq!(
        stage.operator(ranks).unwrap().dataset().currently_filtered_ids(),
        IdSet::from([1, 2, 3, 4])
    );

    let model = stage.operator(overview).unwrap();
    assert_eq!(model.kind(), crossview::dataset::DatasetKind::Model);
    assert!(model.dataset().has_dimension("metric:trustworthiness"));
}

#[test]
fn test_clear_is_idempotent() {
    let mut stage = Stage::new();
    let op = stage.add_operator(Operator::new("overview", Box::new(model_dataset())));
    let origin = Origin::operator(op);

    stage.brush(origin, "trustworthiness", Filter::range(0.8, 1.0).unwrap()).unwrap();
    let first = stage.clear(origin, "trustworthiness").unwrap();
    assert_eq!(first.map(|ids| ids.len()), Some(8));
    let second = stage.clear(origin, "trustworthiness").unwrap();
    assert_eq!(second, None);
    assert_eq!(stage.operator(op).unwrap().dataset().currently_filtered_ids().len(), 8);
}

#[test]
fn test_model_shape_exposes_codec() {
    let model = model_dataset();
    let codec = model.codec("metric").unwrap();
    assert_eq!(codec.categories(), &["cosine".to_string(), "euclidean".to_string()]);
    assert_eq!(model.dataset().records()[4].number("metric_code"), Some(1.0));
}

#[test]
fn test_script_parse_errors_are_reported() {
    let err = parse_script("range(x, 1, 2) | zoom(x)").unwrap_err();
    assert!(matches!(err, crossview::EngineError::Parse(_)));
}

#[test]
fn test_end_to_end_model_report() {
    let report = run_crossview(&[
        "--records",
        MODELS,
        "--metadata",
        METADATA,
        "range(trustworthiness, 0.8, 1) | sort(n_neighbors_hist, desc) | series(min_dist)",
    ])
    .unwrap();

    assert_eq!(report["kind"], "model");
    assert_eq!(report["filtered_ids"], serde_json::json!([1, 2, 3, 5, 6]));

    let hist = report["histograms"]
        .as_array()
        .unwrap()
        .iter()
        .find(|h| h["group"] == "n_neighbors_hist")
        .unwrap();
    assert_eq!(hist["criterion"], "desc");
    assert_eq!(
        hist["bins"],
        serde_json::json!([
            {"natural": 0, "display": 0, "count": 4},
            {"natural": 1, "display": 1, "count": 1}
        ])
    );

    let series = &report["series"][0];
    assert_eq!(series["variant"], "min_dist");
    assert_eq!(series["series"], 4);
    assert_eq!(series["expanded"], serde_json::json!([1, 2, 3, 4, 5, 6]));
}

#[test]
fn test_end_to_end_csv_without_metadata() {
    let report = run_crossview(&["--records", POINTS, "select(y, 2) | clear(y) | range(x, 2, 4)"]).unwrap();
    assert_eq!(report["kind"], "plain");
    assert_eq!(report["records"], 5);
    assert_eq!(report["filtered_ids"], serde_json::json!([2, 3, 4]));
}

#[test]
fn test_end_to_end_bad_script() {
    let result = run_crossview(&["--records", POINTS, "range(x, 1"]);
    assert!(result.is_err());
    assert!(result.unwrap_err().contains("parse"));
}

#[test]
fn test_end_to_end_unknown_dimension() {
    let result = run_crossview(&["--records", POINTS, "clear(nope)"]);
    assert!(result.is_err());
}

#[test]
fn test_end_to_end_rejects_unknown_log_level() {
    let result = run_crossview(&["--records", POINTS, "--log-level", "verbose", "clear(x)"]);
    let err = result.unwrap_err();
    assert!(err.contains("verbose"));

    let report = run_crossview(&["--records", POINTS, "--log-level", "warn", "clear(x)"]).unwrap();
    assert_eq!(report["records"], 5);
}
