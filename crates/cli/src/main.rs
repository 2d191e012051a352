//! `autocast` -- per-series forecast retraining and scoring.
//!
//! # Commands
//!
//! | Command        | Description                                              |
//! |----------------|----------------------------------------------------------|
//! | `retrain`      | Create or reuse a project and deployment per series      |
//! | `predict`      | Score every deployment in the reference file             |
//! | `predict-file` | Send one CSV file to a deployment and print the response |
//! | `accuracy`     | Backtest accuracy check for one series' project          |
//!
//! # Environment variables
//!
//! | Variable              | Required | Default                           |
//! |-----------------------|----------|-----------------------------------|
//! | `DATAROBOT_API_TOKEN` | yes*     | --                                |
//! | `DATAROBOT_ENDPOINT`  | no       | `https://app.datarobot.com/api/v2` |
//! | `RUST_LOG`            | no       | `autocast=info`                   |
//!
//! \* unless the credentials file provides a token.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use autocast_core::reference::ReferenceStore;
use autocast_core::scores::ScoreStore;
use autocast_pipeline::accuracy::{run_accuracy, AccuracyOptions};
use autocast_pipeline::deployment::select_prediction_server;
use autocast_pipeline::retrain::{load_filtered_dataset, run_retrain};
use autocast_pipeline::scoring::{payload_spec, run_scoring};
use autocast_pipeline::WaitConfig;
use autocast_platform::{Platform, PlatformApi, PredictionClient};

#[derive(Parser, Debug)]
#[command(name = "autocast", version, about = "Per-series forecast retraining and scoring")]
struct Cli {
    /// Credentials YAML with `endpoint` and `token` (defaults to ./drconfig.yaml if present)
    #[arg(long, global = true, env = "AUTOCAST_CREDENTIALS")]
    credentials: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or reuse a project and deployment for every series
    Retrain {
        /// Use case YAML
        #[arg(short, long)]
        config: PathBuf,

        /// Override the configured training timeout (seconds)
        #[arg(long)]
        training_timeout_secs: Option<u64>,
    },

    /// Score every deployment listed in the reference file
    Predict {
        /// Use case YAML
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Send a prediction CSV to one deployment and print the JSON response
    PredictFile {
        /// Deployment to score against
        #[arg(long)]
        deployment_id: String,

        /// CSV file to send
        #[arg(long)]
        file: PathBuf,

        /// Forecast point, e.g. 2021-03-01
        #[arg(long)]
        forecast_point: Option<String>,
    },

    /// Check how often backtest RMSE exceeds a baseline
    Accuracy {
        /// Use case YAML
        #[arg(short, long)]
        config: PathBuf,

        /// Series whose project is checked
        #[arg(long)]
        series: String,

        /// Project to check (defaults to the series' project in the reference file)
        #[arg(long)]
        project_id: Option<String>,

        /// Fixed RMSE baseline (defaults to the model's backtesting score)
        #[arg(long)]
        baseline: Option<f64>,

        /// Multiplier applied to the backtesting score
        #[arg(long, default_value_t = 1.0)]
        multiplier: f64,

        /// Also check rolling windows of this many forecast points
        #[arg(long)]
        window: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    autocast_cli::init_logging(cli.json_logs);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current wait");
            on_signal.cancel();
        }
    });

    match run(cli, &cancel).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("autocast failed: {e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Execute one command. `Ok(false)` means it ran but some series failed.
async fn run(cli: Cli, cancel: &CancellationToken) -> anyhow::Result<bool> {
    let cwd = std::env::current_dir().context("Failed to read working directory")?;
    let credentials_path = autocast_cli::credentials_file(cli.credentials, &cwd);
    let credentials = autocast_cli::load_credentials(credentials_path.as_deref())?;
    tracing::info!(endpoint = %credentials.endpoint, "Using platform endpoint");

    let platform = PlatformApi::new(&credentials.endpoint, &credentials.token)?;

    match cli.command {
        Command::Retrain {
            config,
            training_timeout_secs,
        } => {
            let config = autocast_cli::load_use_case(&config)?;
            let timeout = training_timeout_secs.unwrap_or(config.training_timeout_secs);
            let dataset = load_filtered_dataset(&config)?;
            let mut store = ReferenceStore::load_or_empty(&config.ref_file)?;

            let summary = run_retrain(
                &platform,
                &config,
                &dataset,
                &mut store,
                WaitConfig::with_training_timeout(Duration::from_secs(timeout)),
                cancel,
            )
            .await?;
            store
                .save(&config.ref_file)
                .with_context(|| format!("Failed to write {}", config.ref_file.display()))?;

            println!("{}", autocast_cli::render_retrain_summary(&summary));
            Ok(summary.is_success())
        }

        Command::Predict { config } => {
            let config = autocast_cli::load_use_case(&config)?;
            let dataset = load_filtered_dataset(&config)?;
            let references = ReferenceStore::load(&config.ref_file)
                .with_context(|| format!("Failed to read {}", config.ref_file.display()))?;
            let mut scores = ScoreStore::load_or_empty(&config.out_file)?;

            let client = prediction_client(&platform, &credentials.token).await?;
            let summary = run_scoring(
                &client,
                &dataset,
                &references,
                &payload_spec(&config),
                &mut scores,
                cancel,
            )
            .await;
            scores
                .save(&config.out_file)
                .with_context(|| format!("Failed to write {}", config.out_file.display()))?;

            println!("{}", autocast_cli::render_scoring_summary(&summary));
            Ok(summary.is_success())
        }

        Command::PredictFile {
            deployment_id,
            file,
            forecast_point,
        } => {
            let client = prediction_client(&platform, &credentials.token).await?;
            let response = client
                .predict_file(&deployment_id, &file, forecast_point.as_deref())
                .await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(true)
        }

        Command::Accuracy {
            config,
            series,
            project_id,
            baseline,
            multiplier,
            window,
        } => {
            let config = autocast_cli::load_use_case(&config)?;
            let project_id = match project_id {
                Some(id) => id,
                None => project_from_reference(&config.ref_file, &series)?,
            };
            let dataset = load_filtered_dataset(&config)?;
            let options = AccuracyOptions {
                project_id,
                series,
                baseline,
                baseline_multiplier: multiplier,
                window,
            };

            let report = run_accuracy(
                &platform,
                &config,
                &dataset,
                &options,
                &WaitConfig::default(),
                cancel,
            )
            .await?;
            println!("{}", autocast_cli::render_accuracy_report(&report));
            Ok(true)
        }
    }
}

/// Client for the first prediction server listed by the platform.
async fn prediction_client(platform: &PlatformApi, token: &str) -> anyhow::Result<PredictionClient> {
    let server = select_prediction_server(platform.list_prediction_servers().await?)?;
    tracing::info!(server_id = %server.id, url = %server.url, "Using prediction server");
    Ok(PredictionClient::for_server(&server, token)?)
}

fn project_from_reference(ref_file: &Path, series: &str) -> anyhow::Result<String> {
    let store = ReferenceStore::load(ref_file)
        .with_context(|| format!("Failed to read {}", ref_file.display()))?;
    store
        .get(series)
        .map(|r| r.latest_project.clone())
        .with_context(|| format!("Series '{series}' is not in {}", ref_file.display()))
}
