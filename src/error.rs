//! Error type for the fallible edges of the crate.
//!
//! The wikitext algorithms themselves never fail: malformed markup degrades to
//! "no match". Errors only come from loading configuration files, reading
//! dumps, and external collaborators such as a redirect resolver.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScannerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration in {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("redirect lookup failed: {0}")]
    Resolver(String),
}

pub type Result<T> = std::result::Result<T, ScannerError>;
