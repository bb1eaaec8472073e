//! Performance analytics binary entry point.
//!
//! Runs one pipeline stage per invocation. All logs go to stderr; stdout is
//! reserved for the artifact or gauge text the stage produced.
//!
//! Coverage is excluded because the main function only wires the process
//! environment to the library.

// Enable the coverage attribute when running with nightly for llvm-cov exclusions
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

use std::io::Write;

use perf_analytics::cli::{self, Command};
use perf_analytics::config::{Config, LogFormat, DEFAULT_LOG_LEVEL};
use perf_analytics::error::AppError;
use perf_analytics::pipeline::Pipeline;
use tracing_subscriber::EnvFilter;

#[cfg_attr(coverage_nightly, coverage(off))]
fn init_tracing(level: &str, format: LogFormat) {
    let filter = level
        .parse()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[tokio::main(flavor = "current_thread")]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing(DEFAULT_LOG_LEVEL, LogFormat::Text);
            tracing::error!("Configuration error: {e}");
            std::process::exit(AppError::from(e).exit_code());
        }
    };
    init_tracing(&config.log_level, config.log_format);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match Command::parse(&args) {
        Ok(command) => command,
        Err(e) => {
            tracing::error!("{e}");
            eprint!("{}", cli::USAGE);
            std::process::exit(AppError::from(e).exit_code());
        }
    };

    tracing::debug!(
        data_dir = %config.data_dir.display(),
        baseline_dir = %config.baseline_dir.display(),
        ?command,
        "Configuration loaded"
    );

    let pipeline = Pipeline::from_config(config);
    match cli::execute(&command, &pipeline).await {
        Ok(output) => {
            let mut stdout = std::io::stdout().lock();
            if let Err(e) = stdout.write_all(output.as_bytes()).and_then(|()| stdout.flush()) {
                tracing::error!("Failed to write output: {e}");
                std::process::exit(1);
            }
        }
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(e.exit_code());
        }
    }
}
