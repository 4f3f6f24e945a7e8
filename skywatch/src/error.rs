//! Shared error enum and result alias for skywatch.

use thiserror::Error;

/// All errors produced by the engine.
///
/// Only configuration-time errors surface here; per-report and per-action
/// failures are logged and counted, never propagated.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("config error: {0}")]
    Config(String),
    #[error("region file {path}: {msg}")]
    RegionFile { path: String, msg: String },
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
