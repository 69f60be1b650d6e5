//! # Error Types
//!
//! Defines `SynthKitError`, the unified error enum for every hard failure in
//! the SynthKit pipeline. Degradations (unprofilable columns, dependency
//! cycles, individual subject failures) are not errors: they are logged and
//! recorded in the quality report instead.

use thiserror::Error;

/// All errors that can occur in SynthKit operations.
#[derive(Error, Debug)]
pub enum SynthKitError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Failed to load {path}: {message}\n  Check the file for TOML syntax errors or unknown values.\n  Example: [generate]\n  subjects = 100\n  seed = 42")]
    ConfigFile { path: String, message: String },

    #[error("Generation exhausted for domain {domain}: 0 of {requested} subjects could be generated\n  Every subject attempt failed, including retries. Run with --verbose to see per-subject failures.")]
    ExhaustedGeneration { domain: String, requested: usize },

    #[error("Variable {variable} not found in domain {domain}")]
    VariableNotFound { domain: String, variable: String },

    #[error("Sampling failed for {domain}.{variable}: {message}")]
    Sampling {
        domain: String,
        variable: String,
        message: String,
    },

    #[error("Could not produce a synthetic substitute for {variable} after {attempts} attempts\n  Every candidate collided with a real source value")]
    IdentifierExhausted { variable: String, attempts: usize },

    #[error("Failed to read domain {path}: {message}")]
    Input { path: String, message: String },

    #[error("Output error: {message}: {source}")]
    Output {
        message: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(String),
}

impl SynthKitError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        SynthKitError::Configuration {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SynthKitError>;
