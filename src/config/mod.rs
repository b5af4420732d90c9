//! Persisted settings, tools and groups.
//!
//! The document lives in the platform config directory unless `--config`
//! points elsewhere:
//! - Linux: `$XDG_CONFIG_HOME/tapmcp/config.json` or `~/.config/tapmcp/config.json`
//! - macOS: `~/Library/Application Support/tapmcp/config.json`

mod document;
mod store;

pub use document::Document;
pub use store::Store;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode document: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("could not determine the user config directory")]
    NoConfigDir,
}

/// Default location of the document.
pub fn default_path() -> Result<PathBuf, StoreError> {
    dirs::config_dir()
        .map(|dir| dir.join("tapmcp").join("config.json"))
        .ok_or(StoreError::NoConfigDir)
}
