use anyhow::Context;
use clap::Parser;
use nuclei_annotator::annotate::TieBreak;
use nuclei_annotator::config::{ClassConfig, Config};
use nuclei_annotator::dispatch::{Dispatcher, JobProcessor, discover_jobs};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// File name of the per-run status report in the output directory
const REPORT_FILE: &str = "annotation_report.json";

/// Process and annotate cell detection and segmentation GeoJSON files.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Directory of <id>_cell_detection.geojson files
    #[arg(long)]
    detection_dir: PathBuf,

    /// Directory of <id>_cells.geojson files
    #[arg(long)]
    segmentation_dir: PathBuf,

    /// Directory of ROI annotation files
    #[arg(long)]
    annotation_dir: PathBuf,

    /// Directory to save the annotated files
    #[arg(long)]
    output_dir: PathBuf,

    /// Number of slides processed in parallel
    #[arg(long)]
    num_workers: Option<usize>,

    /// JSON file with transition rules and colors
    #[arg(long)]
    class_config: Option<PathBuf>,

    /// Overlapping ROI policy: first_in_file_order or smallest_area
    #[arg(long)]
    tie_break: Option<TieBreak>,

    /// Resolve the points of each slide on all cores
    #[arg(long)]
    parallel_points: bool,

    /// Hide the progress bar
    #[arg(long)]
    no_progress: bool,
}

/// Ensure the output directory exists, creating it if necessary
fn ensure_directory(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
        info!("Created output directory: {:?}", path);
        Ok(())
    } else if path.is_dir() {
        Ok(())
    } else {
        Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("output path {:?} exists but is not a directory", path),
        ))
    }
}

fn build_config(args: Args) -> anyhow::Result<Config> {
    let mut config = Config::from_env()?;

    config.detection_dir = args.detection_dir;
    config.segmentation_dir = args.segmentation_dir;
    config.annotation_dir = args.annotation_dir;
    config.output_dir = args.output_dir;
    if let Some(n) = args.num_workers {
        config.num_workers = n;
    }
    if let Some(path) = args.class_config {
        config.classes = ClassConfig::load(&path)?;
    }
    if let Some(tie_break) = args.tie_break {
        config.engine.tie_break = tie_break;
    }
    if args.parallel_points {
        config.engine.parallel_points = true;
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nuclei_annotator=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let show_progress = !args.no_progress;
    let config = build_config(args)?;
    info!(
        "Loaded configuration: workers={}, tie_break={:?}, parallel_points={}, {} rules",
        config.num_workers,
        config.engine.tie_break,
        config.engine.parallel_points,
        config.classes.transitions.len()
    );

    ensure_directory(&config.output_dir).context("Failed to prepare output directory")?;

    let discovery = discover_jobs(
        &config.detection_dir,
        &config.segmentation_dir,
        &config.annotation_dir,
        &config.output_dir,
    )?;
    if discovery.jobs.is_empty() {
        warn!("No complete detection/segmentation/annotation triples found");
    }

    let processor = Arc::new(JobProcessor::from_config(&config));
    let dispatcher =
        Dispatcher::new(processor, config.num_workers).with_progress(show_progress);

    let mut report = dispatcher.run(discovery.jobs).await;
    report.unmatched = discovery.unmatched;
    report.log();

    let report_path = config.output_dir.join(REPORT_FILE);
    match report.write_json(&report_path) {
        Ok(()) => info!("Run report saved to: {}", report_path.display()),
        Err(e) => warn!("Failed to write run report {:?}: {}", report_path, e),
    }

    Ok(())
}
