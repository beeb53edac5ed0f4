use anyhow::{bail, Context, Result};
use clap::Parser;
use embedscope_core::{
    join_corpus, parse_jsonl, CancelFlag, ExplorationSession, IterativeParams, LinearParams,
    MergeOutcome, Metric, PatientRecord, ReductionParams, ReportRecord,
};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "embedscope")]
#[command(about = "Explore an embedding corpus: neighbor ranking and 2D/3D projection")]
#[command(version)]
struct Args {
    /// Embedded report records, one JSON object per line
    reports: PathBuf,

    /// Patient demographic records, one JSON object per line
    #[arg(long)]
    patients: Option<PathBuf>,

    /// Reduction method (linear, iterative)
    #[arg(short, long, default_value = "linear")]
    method: String,

    /// Principal components to extract (linear)
    #[arg(long, default_value = "5")]
    components: usize,

    /// Output dimensionality, 2 or 3
    #[arg(short, long, default_value = "3")]
    dimensions: usize,

    /// Truncate vectors to their first N features before the linear fit
    #[arg(long)]
    feature_cap: Option<usize>,

    /// Layout epochs (iterative)
    #[arg(long, default_value = "200")]
    epochs: usize,

    /// kNN edges per point (iterative)
    #[arg(long, default_value = "15")]
    n_neighbors: usize,

    /// Minimum embedded distance between neighbors (iterative)
    #[arg(long, default_value = "0.1")]
    min_dist: f32,

    /// Focal point index to rank the corpus against
    #[arg(short, long)]
    focal: Option<usize>,

    /// Distance metric (euclidean, cosine)
    #[arg(long, default_value = "euclidean")]
    metric: String,

    /// Neighbor count for the ranked report
    #[arg(short = 'k', long, default_value = "10")]
    neighbors: usize,

    /// JSON array of floats to merge into the projection as a query point
    #[arg(long)]
    query_vector: Option<PathBuf>,

    /// Label attached to the merged query point
    #[arg(long, default_value = "query")]
    query_label: String,

    /// Write projected coordinates as JSON to this path
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Log level (debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn reduction_params(&self) -> Result<ReductionParams> {
        match self.method.as_str() {
            "linear" => Ok(ReductionParams::Linear(LinearParams {
                components: self.components,
                dimensions: self.dimensions,
                feature_cap: self.feature_cap,
            })),
            "iterative" => Ok(ReductionParams::Iterative(IterativeParams {
                dimensions: self.dimensions,
                n_neighbors: self.n_neighbors,
                min_dist: self.min_dist,
                epochs: self.epochs,
            })),
            other => bail!("unknown method '{other}', expected linear or iterative"),
        }
    }

    fn metric(&self) -> Result<Metric> {
        match self.metric.as_str() {
            "euclidean" => Ok(Metric::Euclidean),
            "cosine" => Ok(Metric::Cosine),
            other => bail!("unknown metric '{other}', expected euclidean or cosine"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.as_str() {
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let reports: Vec<ReportRecord> = read_jsonl(&args.reports)?;
    let patients: Vec<PatientRecord> = match &args.patients {
        Some(path) => read_jsonl(path)?,
        None => Vec::new(),
    };
    let corpus = join_corpus(reports, &patients)?;

    let mut session = ExplorationSession::new();
    session.load_corpus(corpus)?;
    session.set_metric(args.metric()?)?;
    session.set_neighbor_count(args.neighbors)?;

    let params = args.reduction_params()?;
    session
        .reduce(params, false, &CancelFlag::new(), |current, total| {
            if current % 50 == 0 || current == total {
                info!("layout epoch {current}/{total}");
            }
        })
        .await?;

    if let Some(ratios) = session.explained_variance() {
        let line: Vec<String> = ratios
            .iter()
            .enumerate()
            .map(|(i, r)| format!("PC{} {:.1}%", i + 1, r * 100.0))
            .collect();
        println!("explained variance: {}", line.join(", "));
    }

    if let Some(path) = &args.query_vector {
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        let vector: Vec<f32> = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parse query vector {}", path.display()))?;
        let added = session.add_query_point(vector, &args.query_label)?;
        if added.merge == MergeOutcome::RecomputePending {
            session
                .reduce(params, false, &CancelFlag::new(), |_, _| {})
                .await?;
        }
        let index = session
            .take_camera_focus()
            .context("merged query point has no coordinates")?;
        let projection = session.projection()?;
        println!(
            "query point merged at index {index}: {:?}",
            projection.coordinates[index]
        );
    }

    if let Some(focal) = args.focal {
        session.set_focal(focal)?;
        println!("top {} neighbors of point {focal}:", args.neighbors);
        for row in session.neighbor_report() {
            let labels: Vec<String> = row
                .labels
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            println!(
                "  {:<24} {:>10.4}  {}",
                row.id,
                row.metric_value,
                labels.join(" ")
            );
        }
    }

    let projection = session.projection()?;
    info!(
        "projection ready: {} points in {}D",
        projection.coordinates.len(),
        projection.dimensions
    );
    if let Some(path) = &args.out {
        let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
        serde_json::to_writer_pretty(file, &projection)?;
        println!("coordinates written to {}", path.display());
    }

    Ok(())
}

fn read_jsonl<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Result<Vec<T>> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    Ok(parse_jsonl(BufReader::new(file))?)
}
