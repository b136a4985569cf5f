use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use tracing::{info, warn};

use agri_features::config::PipelineConfig;
use agri_features::pipeline::{self, PipelineContext};

#[derive(Parser, Debug)]
#[command(name = "agri_features")]
#[command(about = "Crop monitoring feature preparation and per-parcel trend analysis", long_about = None)]
struct Args {
    /// JSON configuration file; defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the source CSV files and the feature artifact
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Parcel to analyse
    #[arg(long, default_value = "P001")]
    parcel: String,

    /// Seed for the noise added to constant yield series
    #[arg(long)]
    seed: Option<u64>,

    /// Write the dashboard datasets as JSON to this path
    #[arg(long)]
    dashboard_out: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("agri_features=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(dir) = args.data_dir {
        config = config.with_data_dir(dir);
    }
    if args.seed.is_some() {
        config.analysis.seed = args.seed;
    }

    info!(
        "Starting run on {} for target year {}",
        config.data_dir.display(),
        config.target_year
    );

    let mut rng = match config.analysis.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let ctx = PipelineContext::load(config);
    let report = pipeline::run(&ctx, &args.parcel, &mut rng);

    if let Some(rows) = report.feature_rows {
        info!("Feature table: {} rows at {}", rows, ctx.features_path().display());
    }

    if let Some((history, trend)) = &report.ndvi {
        info!(
            "NDVI trend for {}: pente {:.6}, variation moyenne {:.6}, {} moving-average points",
            args.parcel,
            trend.slope,
            trend.mean_variation,
            history.ndvi_moving_avg.len()
        );
        info!(
            "NDVI stats: mean {:.3}, std {:.3}, min {:.3}, max {:.3}",
            history.summary_stats.mean,
            history.summary_stats.std,
            history.summary_stats.min,
            history.summary_stats.max
        );
    }

    if let Some(analysis) = &report.yields {
        info!(
            "Yield trend for {}: pente {:.6} t/ha per day, mean {:.2} t/ha over {} years{}",
            args.parcel,
            analysis.trend.slope,
            analysis.summary.mean,
            analysis.residuals.len(),
            if analysis.noise_injected { " (constant series, noise added)" } else { "" }
        );
    }

    match (&args.dashboard_out, &report.dashboard) {
        (Some(path), Some(data)) => {
            if let Err(e) = data.write_json(path) {
                warn!("Could not export dashboard data: {}", e);
            }
        }
        (Some(path), None) => warn!("No dashboard data to write to {}", path.display()),
        _ => {}
    }

    Ok(())
}
