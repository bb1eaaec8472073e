//! Error types for the performance analytics pipeline.
//!
//! This module defines a hierarchical error system:
//! - [`AppError`]: Top-level errors returned by pipeline stages
//! - [`StorageError`]: Artifact read/write failures
//! - [`StageError`]: Computation failures a stage cannot safely ignore
//! - [`ConfigError`]: Configuration errors
//! - [`CommandParseError`]: Command-line parsing errors
//!
//! A missing input artifact is deliberately *not* an error: stages report it
//! as a skipped outcome (see [`crate::pipeline::StageOutcome`]).

use thiserror::Error;

/// Top-level application error.
///
/// This is the main error type returned by pipeline stages.
/// It wraps all subsystem errors for unified error handling.
#[derive(Debug, Error)]
pub enum AppError {
    /// Storage error.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Stage computation error.
    #[error("Stage error: {0}")]
    Stage(#[from] StageError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Command-line error.
    #[error("Command error: {0}")]
    Command(#[from] CommandParseError),
}

impl AppError {
    /// Process exit code for this error.
    ///
    /// Usage errors exit with `2`; everything else exits with `1`.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Command(_) => 2,
            Self::Storage(_) | Self::Stage(_) | Self::Config(_) => 1,
        }
    }
}

/// Artifact storage errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The artifact exists but could not be read.
    #[error("Failed to read {key}: {message}")]
    ReadFailed {
        /// Artifact key.
        key: String,
        /// Description of the failure.
        message: String,
    },

    /// The artifact exists but does not parse as the expected structure.
    #[error("Malformed artifact {key}: {message}")]
    Malformed {
        /// Artifact key.
        key: String,
        /// Parser error description.
        message: String,
    },

    /// The artifact could not be persisted.
    #[error("Failed to write {key}: {message}")]
    WriteFailed {
        /// Artifact key.
        key: String,
        /// Description of the failure.
        message: String,
    },

    /// Listing artifacts under a prefix failed.
    #[error("Failed to list {prefix}: {message}")]
    ListFailed {
        /// Key prefix that was listed.
        prefix: String,
        /// Description of the failure.
        message: String,
    },
}

impl StorageError {
    /// Returns true if the artifact was present but unparseable.
    #[must_use]
    pub const fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed { .. })
    }
}

/// Stage computation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StageError {
    /// Step-load results contained no leading stable step.
    #[error("No stable capacity: none of {steps} step(s) ran without errors or timeouts")]
    NoStableCapacity {
        /// Number of step rows inspected.
        steps: usize,
    },

    /// A value in an input artifact is outside its domain.
    #[error("Invalid input in {artifact}: {reason}")]
    InvalidInput {
        /// Artifact the value came from.
        artifact: String,
        /// Why the value is invalid.
        reason: String,
    },
}

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Configuration value is invalid.
    #[error("Invalid value for {var}: {reason}")]
    InvalidValue {
        /// The variable name.
        var: String,
        /// Why the value is invalid.
        reason: String,
    },
}

/// Error parsing command-line arguments.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandParseError {
    /// No command provided.
    #[error("No command provided. Use 'help' for available commands.")]
    MissingCommand,

    /// Unknown command.
    #[error("Unknown command: '{0}'. Use 'help' for available commands.")]
    UnknownCommand(String),

    /// Unknown flag.
    #[error("Unknown flag: '{0}'")]
    UnknownFlag(String),

    /// Missing value for flag.
    #[error("Missing value for '{0}'")]
    MissingValue(String),

    /// Invalid value for a flag or positional argument.
    #[error("Invalid value '{value}' for '{flag}'")]
    InvalidValue {
        /// The flag or argument with the invalid value.
        flag: String,
        /// The invalid value that was provided.
        value: String,
    },
}
