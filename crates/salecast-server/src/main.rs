//! salecast binary: HTTP server, CSV preprocessing and batch forecasts.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use salecast_core::{
    export, preprocess_file, Criterion, EstimatorKind, HolidayCalendar, Pipeline, PipelineConfig,
    SelectionStrategy,
};
use salecast_server::{start_server, AppState, ServerConfig};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

#[derive(Parser)]
#[command(name = "salecast")]
#[command(about = "Daily sales forecasting with weekly seasonal ARIMA models")]
#[command(version)]
struct Cli {
    /// Logging level, overridden by RUST_LOG
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the upload API
    Serve {
        /// Configuration file (defaults to salecast.toml when present)
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(long)]
        host: Option<String>,

        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Split DateTime into date/time columns and tag holidays
    Preprocess {
        #[arg(short, long, default_value = "input_data.csv")]
        input: PathBuf,

        #[arg(short, long, default_value = "processed_data.csv")]
        output: PathBuf,
    },

    /// Forecast a processed CSV and write the result files
    Forecast {
        #[arg(short, long, default_value = "processed_data.csv")]
        input: PathBuf,

        /// Days to forecast
        #[arg(short, long, default_value_t = 30)]
        days: usize,

        /// Directory for the output CSV files
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        /// Estimation backend: css or anofox
        #[arg(long, default_value = "css")]
        estimator: EstimatorKind,

        /// Model selection criterion: aic or bic
        #[arg(long, default_value = "aic")]
        criterion: Criterion,

        /// Number of top items to report
        #[arg(long, default_value_t = 5)]
        top: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Command::Serve { config, host, port } => serve(config, host, port).await,
        Command::Preprocess { input, output } => {
            let summary = preprocess_file(&input, &output, HolidayCalendar::builtin())
                .with_context(|| format!("failed to preprocess {}", input.display()))?;
            println!(
                "Processed data saved to {} ({} rows, {} on holidays)",
                output.display(),
                summary.rows,
                summary.holiday_rows
            );
            Ok(())
        }
        Command::Forecast {
            input,
            days,
            output_dir,
            estimator,
            criterion,
            top,
        } => {
            let config = PipelineConfig {
                estimator,
                selection: SelectionStrategy::fixed_grid().with_criterion(criterion),
                top_n: top,
                ..PipelineConfig::batch()
            };
            // Fitting is CPU-bound; keep it off the async workers.
            tokio::task::spawn_blocking(move || run_batch(config, &input, days, &output_dir))
                .await
                .context("batch forecast task panicked")?
        }
    }
}

async fn serve(
    config_path: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => ServerConfig::load_from(&path),
        None => ServerConfig::load(),
    }
    .context("failed to load configuration")?;
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }

    let state = Arc::new(AppState::new(config).context("invalid pipeline configuration")?);
    start_server(state).await.context("server error")
}

fn run_batch(config: PipelineConfig, input: &Path, days: usize, output_dir: &Path) -> Result<()> {
    let pipeline = Pipeline::new(config, HolidayCalendar::builtin())?;
    let report = pipeline
        .run_path(input, days)
        .with_context(|| format!("failed to forecast {}", input.display()))?;

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;

    let rounded = report.forecast.rounded();
    let summary_path = output_dir.join("forecast_summary.csv");
    export::write_summary(File::create(&summary_path)?, &rounded)?;
    let raw_path = output_dir.join("quantity_forecast.csv");
    export::write_raw_forecast(File::create(&raw_path)?, &report.forecast.points)?;
    if let Some(rows) = &report.decomposition {
        let path = output_dir.join("decomposition.csv");
        export::write_decomposition(File::create(&path)?, rows)?;
        info!(path = %path.display(), "decomposition written");
    }
    info!(
        summary = %summary_path.display(),
        raw = %raw_path.display(),
        "forecast files written"
    );

    println!(
        "Best model: {} with {} {:.2}",
        report.selection.config, report.selection.criterion, report.selection.score
    );
    if let Some(holdout) = &report.holdout {
        println!(
            "Holdout ({} days): MAE {:.2}, RMSE {:.2}, interval coverage {:.0}%",
            holdout.test_len,
            holdout.mae,
            holdout.rmse,
            holdout.coverage * 100.0
        );
    }

    if !report.top_items.is_empty() {
        println!("\nTop {} Items by Total Quantity:", report.top_items.len());
        for item in &report.top_items {
            println!("{}: {}", item.item, item.quantity);
        }
    }
    for profile in &report.seasonality {
        println!("\nAverage daily quantity for {}:", profile.item);
        for (day, mean) in WEEKDAYS.iter().zip(profile.weekday_means) {
            println!("  {:<10} {:>8.2}", day, mean);
        }
    }

    println!("\nForecast Summary:");
    println!(
        "{:>10}  {:>20}  {:>12}  {:>12}",
        "Date", "Recommended Quantity", "Min Quantity", "Max Quantity"
    );
    for row in &rounded {
        println!(
            "{:>10}  {:>20}  {:>12}  {:>12}",
            row.date.format("%Y-%m-%d").to_string(),
            row.forecast,
            row.lower,
            row.upper
        );
    }
    println!(
        "\nRecommended Quantity is the predicted quantity to prepare each day; \
         Min and Max give a {:.0}% prediction interval.",
        report.forecast.confidence_level * 100.0
    );
    Ok(())
}
