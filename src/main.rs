//! CLI entry point for the class statistics service.
//!
//! Provides subcommands for serving the HTTP API, converting the CSV source
//! to its Parquet cache, and printing aggregations from the command line.

use std::ffi::OsStr;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use class_stats::analyzers::types::Statistic;
use class_stats::cache::connect_or_disable;
use class_stats::config::AppConfig;
use class_stats::output::{print_json, print_pretty, write_csv};
use class_stats::server::{self, ApiKeys};
use class_stats::service::DataService;
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "class_stats")]
#[command(about = "Per-class descriptive statistics over a cached dataset", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        /// Bind address
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value_t = 8000)]
        port: u16,
    },
    /// Convert the CSV source into its Parquet cache file
    Convert {
        /// CSV file to read (defaults to the configured csv_file_path)
        #[arg(short, long)]
        source: Option<PathBuf>,

        /// Parquet file to write (defaults to the configured parquet_file_path)
        #[arg(short, long)]
        target: Option<PathBuf>,
    },
    /// Print per-class statistics as JSON
    Aggregate {
        /// Statistic to compute: mean or std
        #[arg(long, default_value = "mean")]
        stat: Statistic,

        /// Read the CSV into memory instead of going through the Parquet cache
        #[arg(long, default_value_t = false)]
        in_memory: bool,

        /// Optional: also write the result to this CSV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/class_stats.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("class_stats.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { host, port } => {
            let config = AppConfig::from_env()?;
            let store = connect_or_disable(config.cache_url.as_deref(), &config.cache_prefix).await;
            let service = DataService::from_config(&config, store);
            let state = server::state(service, ApiKeys::new(&config.api_keys));

            let addr: SocketAddr = format!("{host}:{port}")
                .parse()
                .with_context(|| format!("invalid bind address {host}:{port}"))?;
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("binding {addr}"))?;
            server::serve(listener, state).await?;
        }
        Commands::Convert { source, target } => {
            let (source, target) = match (source, target) {
                (Some(source), Some(target)) => (source, target),
                (source, target) => {
                    let config = AppConfig::from_env()?;
                    (
                        source.unwrap_or(config.data.csv_file_path),
                        target.unwrap_or(config.data.parquet_file_path),
                    )
                }
            };
            DataService::convert_csv_to_parquet(&source, &target)?;
            info!(path = %target.display(), "Parquet cache written");
        }
        Commands::Aggregate {
            stat,
            in_memory,
            output,
        } => {
            let config = AppConfig::from_env()?;
            let service = DataService::from_config(&config, None);

            let result = if in_memory {
                service.aggregated_in_memory(stat).await?
            } else {
                service.aggregated(stat).await?
            };

            print_pretty(&result);
            print_json(std::io::stdout().lock(), &result)?;

            if let Some(path) = output {
                write_csv(&path, &result)?;
                info!(path = %path.display(), rows = result.len(), "Result exported");
            }
        }
    }

    Ok(())
}
