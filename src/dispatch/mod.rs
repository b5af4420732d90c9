//! Turning an invocation back into an outbound HTTP request.

mod replay;
mod select;

pub use replay::{ReplayEngine, Reply};
pub use select::select_tool;

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to create request: {0}")]
    Build(String),

    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to read response: {0}")]
    ReadBody(#[source] reqwest::Error),
}

impl DispatchError {
    /// Whether the request was handed to the network layer. Usage statistics
    /// are only recorded for attempts that got this far.
    pub fn reached_network(&self) -> bool {
        !matches!(self, Self::Build(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectError {
    #[error("method parameter is required")]
    MissingMethod,

    #[error("no tools found in group {0}")]
    EmptyGroup(String),

    #[error("no tool found for method {method} and path {path}")]
    NoMatchForPath { method: String, path: String },

    #[error("no tool found for method {method}")]
    NoMatchForMethod { method: String },
}
