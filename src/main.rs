use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use crossview::data::RecordBatch;
use crossview::dataset::{Dataset, DatasetShape, ModelDataset};
use crossview::metadata::Metadata;
use crossview::{parser, runtime, EngineOptions};
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "crossview")]
#[command(about = "Brush, sort and summarize model records with an interaction script", long_about = None)]
struct Args {
    /// Records as a JSON array of objects or a CSV file with a header row
    #[arg(long)]
    records: PathBuf,

    /// Hyperparameter/objective descriptor; without it every numeric
    /// attribute gets a histogram
    #[arg(long)]
    metadata: Option<PathBuf>,

    /// Engine options as JSON
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log verbosity on stderr
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// Interaction script (e.g., 'range(trustworthiness, 0.5, 1) | sort(n_neighbors_hist, desc)')
    script: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

fn load_records(path: &Path) -> Result<RecordBatch> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
    let batch = if is_csv {
        RecordBatch::from_csv(BufReader::new(file))?
    } else {
        let json: serde_json::Value = serde_json::from_reader(BufReader::new(file))?;
        RecordBatch::from_json(&json)?
    };
    Ok(batch)
}

fn load_metadata(path: &Path) -> Result<Metadata> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let json: serde_json::Value = serde_json::from_reader(BufReader::new(file))?;
    Ok(Metadata::from_json(json)?)
}

fn main() -> Result<()> {
    let args = Args::parse();

    FmtSubscriber::builder()
        .with_max_level(Level::from(args.log_level))
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let options = match &args.config {
        Some(path) => EngineOptions::from_path(path).context("Failed to load engine options")?,
        None => EngineOptions::default(),
    };

    // Parse before touching data so a typo fails fast
    let script = parser::parse_script(&args.script).context("Failed to parse script")?;

    let batch = load_records(&args.records).context("Failed to read records")?;
    info!(records = batch.len(), path = %args.records.display(), "records loaded");

    let shape: Box<dyn DatasetShape> = match &args.metadata {
        Some(path) => {
            let metadata = load_metadata(path).context("Failed to read metadata")?;
            Box::new(ModelDataset::build(batch, metadata, options).context("Failed to build model dataset")?)
        }
        None => Box::new(
            Dataset::from_numeric_attributes("records", batch, options).context("Failed to build dataset")?,
        ),
    };

    let report = runtime::run_script(shape, &script).context("Failed to run script")?;

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    serde_json::to_writer_pretty(&mut handle, &report).context("Failed to write report")?;
    writeln!(handle).context("Failed to write report")?;
    handle.flush().context("Failed to flush stdout")?;

    Ok(())
}
