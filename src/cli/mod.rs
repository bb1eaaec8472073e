//! Command-line interface.
//!
//! Each command runs a single stage (or the chained `run`) and returns the
//! text destined for stdout. Diagnostics go through `tracing` to stderr.

use std::path::PathBuf;

use crate::error::{AppError, CommandParseError};
use crate::gauge::GaugeCache;
use crate::pipeline::{Pipeline, StageOutcome};
use crate::storage::Artifact;
use crate::traits::{ArtifactStore, TimeProvider};

/// Usage text printed by `help`.
pub const USAGE: &str = "\
Usage: perf-analytics <command> [options]

Commands:
  history-update       Append residuals.json to the rolling history
  anomaly-score        Score residuals.json against its own batch
  threshold-update     Recompute adaptive thresholds from history
  capacity-estimate    Estimate capacity from the latest step-load file
  baseline-record      Record a perf baseline
      --source PATH    Read the summary from PATH instead of perf_summary.json
      --scenario NAME  Override the summary's scenario
  baseline-compare     Compare the two newest baselines per scenario
  publish              Load derived artifacts and print gauges
  run                  history-update, anomaly-score, threshold-update, publish
  schema <artifact>    Print the JSON Schema of an artifact
  help                 Show this message

Artifacts: residuals, history, anomaly-report, thresholds, step-load,
capacity-estimate, baseline, baseline-delta

Environment:
  PERF_DATA_DIR, PERF_BASELINE_DIR, ANOMALY_STD_MULTIPLIER,
  ADAPTIVE_MIN_SAMPLES, ROLLING_HISTORY_MAX, CAPACITY_SCALE_RPS,
  CAPACITY_APPROACHING_RPS, LOG_LEVEL, LOG_FORMAT
";

/// Parsed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Append the residual batch to the rolling history.
    HistoryUpdate,
    /// Score the residual batch.
    AnomalyScore,
    /// Recompute adaptive thresholds.
    ThresholdUpdate,
    /// Estimate capacity.
    CapacityEstimate,
    /// Record a perf baseline.
    BaselineRecord {
        /// Summary file to read instead of `perf_summary.json`.
        source: Option<PathBuf>,
        /// Scenario override.
        scenario: Option<String>,
    },
    /// Compare baselines.
    BaselineCompare,
    /// Refresh and print gauges.
    Publish,
    /// Run the chained stages.
    Run,
    /// Print an artifact schema.
    Schema(Artifact),
    /// Print usage.
    Help,
}

impl Command {
    /// Parse a command from arguments (program name excluded).
    ///
    /// # Errors
    ///
    /// Returns [`CommandParseError`] for missing or unknown commands and
    /// malformed flags.
    pub fn parse(args: &[String]) -> Result<Self, CommandParseError> {
        let Some(first) = args.first() else {
            return Err(CommandParseError::MissingCommand);
        };

        let cmd = first.to_lowercase();
        let rest = &args[1..];
        let command = match cmd.as_str() {
            "history-update" => Self::HistoryUpdate,
            "anomaly-score" => Self::AnomalyScore,
            "threshold-update" => Self::ThresholdUpdate,
            "capacity-estimate" => Self::CapacityEstimate,
            "baseline-compare" => Self::BaselineCompare,
            "publish" => Self::Publish,
            "run" => Self::Run,
            "help" | "--help" | "-h" => Self::Help,

            "baseline-record" => {
                let mut source = None;
                let mut scenario = None;

                let mut i = 0;
                while i < rest.len() {
                    match rest[i].as_str() {
                        "--source" | "-s" => {
                            i += 1;
                            let value = rest
                                .get(i)
                                .ok_or_else(|| CommandParseError::MissingValue("--source".into()))?;
                            source = Some(PathBuf::from(value));
                        }
                        "--scenario" => {
                            i += 1;
                            let value = rest.get(i).ok_or_else(|| {
                                CommandParseError::MissingValue("--scenario".into())
                            })?;
                            if value.trim().is_empty() {
                                return Err(CommandParseError::InvalidValue {
                                    flag: "--scenario".into(),
                                    value: value.clone(),
                                });
                            }
                            scenario = Some(value.clone());
                        }
                        other => return Err(CommandParseError::UnknownFlag(other.to_string())),
                    }
                    i += 1;
                }

                return Ok(Self::BaselineRecord { source, scenario });
            }

            "schema" => {
                let name = rest
                    .first()
                    .ok_or_else(|| CommandParseError::MissingValue("artifact".into()))?;
                if let Some(extra) = rest.get(1) {
                    return Err(CommandParseError::UnknownFlag(extra.clone()));
                }
                return Ok(Self::Schema(name.parse()?));
            }

            _ => return Err(CommandParseError::UnknownCommand(cmd)),
        };

        // Remaining commands take no arguments.
        if let Some(extra) = rest.first() {
            return Err(CommandParseError::UnknownFlag(extra.clone()));
        }
        Ok(command)
    }
}

/// Execute a command and return the text for stdout.
///
/// Skipped stages contribute nothing to stdout.
///
/// # Errors
///
/// Returns [`AppError`] from the failing stage.
pub async fn execute<S, T>(
    command: &Command,
    pipeline: &Pipeline<S, T>,
) -> Result<String, AppError>
where
    S: ArtifactStore,
    T: TimeProvider,
{
    let outcomes = match command {
        Command::Help => return Ok(USAGE.to_string()),
        Command::Schema(artifact) => return Ok(format!("{:#}\n", artifact.schema().as_value())),
        Command::HistoryUpdate => vec![pipeline.update_history().await?],
        Command::AnomalyScore => vec![pipeline.score_anomalies().await?],
        Command::ThresholdUpdate => vec![pipeline.update_thresholds().await?],
        Command::CapacityEstimate => vec![pipeline.estimate_capacity().await?],
        Command::BaselineRecord { source, scenario } => vec![
            pipeline
                .record_baseline(source.as_deref(), scenario.as_deref())
                .await?,
        ],
        Command::BaselineCompare => vec![pipeline.compare_baselines().await?],
        Command::Publish => vec![pipeline.publish(&GaugeCache::new()).await?],
        Command::Run => pipeline.run(&GaugeCache::new()).await?,
    };

    // In `run` only the final gauge text reaches stdout.
    Ok(outcomes
        .iter()
        .rev()
        .find(|o| !o.is_skipped())
        .map(StageOutcome::output)
        .unwrap_or_default()
        .to_string())
}
