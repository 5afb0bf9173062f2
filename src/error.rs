//! Error types.
//!
//! Two layers:
//!
//! - `FitError`: the typed taxonomy returned by the library (catalog, cache,
//!   inference, selection, extraction).
//! - `AppError`: what the `sedfit` binary prints, carrying a process exit code.
//!
//! Library code never picks exit codes; the conversion below does.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the fitting engine.
#[derive(Debug, Error)]
pub enum FitError {
    #[error("Model '{0}' is already registered.")]
    DuplicateModel(String),

    #[error("Unknown model '{0}'.")]
    UnknownModel(String),

    #[error("Model '{model}' expects {expected} parameters, got {got}.")]
    InvalidParameters {
        model: String,
        expected: usize,
        got: usize,
    },

    #[error("No usable flux densities for {target}/{epoch}: {reason}")]
    DataUnavailable {
        target: String,
        epoch: String,
        reason: String,
    },

    #[error("No cached posterior summary at '{}'.", .0.display())]
    CacheMiss(PathBuf),

    #[error("Cached posterior summary at '{}' is unreadable: {reason}", path.display())]
    MalformedCache { path: PathBuf, reason: String },

    #[error("Run directory '{}' is claimed by another worker (pid {pid}).", path.display())]
    ClaimHeld { path: PathBuf, pid: u32 },

    #[error("Inference failed for {model} at {target}/{epoch}: {reason}")]
    Inference {
        target: String,
        epoch: String,
        model: String,
        reason: String,
    },

    #[error("No model has usable evidence for target '{0}'.")]
    NoViableModel(String),

    #[error("All {failed} target(s) failed; no model was selected.")]
    AllTargetsFailed { failed: usize },

    #[error("Model '{model}' has no parameter for '{param}'.")]
    ParameterNotApplicable { model: String, param: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error at '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FitError {
    /// Attach a path to an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Exit code used when this error reaches the binary.
    pub fn exit_code(&self) -> u8 {
        match self {
            FitError::Config(_)
            | FitError::UnknownModel(_)
            | FitError::DuplicateModel(_)
            | FitError::ParameterNotApplicable { .. } => 2,
            FitError::NoViableModel(_)
            | FitError::AllTargetsFailed { .. }
            | FitError::DataUnavailable { .. } => 3,
            _ => 4,
        }
    }
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<FitError> for AppError {
    fn from(err: FitError) -> Self {
        AppError::new(err.exit_code(), err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
