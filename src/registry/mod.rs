//! Shared registries: endpoints seen on the wire, tools, and groups.

mod endpoints;
mod groups;
mod tools;

pub use endpoints::{EndpointRegistry, Observation};
pub use groups::GroupRegistry;
pub use tools::{Registration, ToolRegistry};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("maximum number of tools ({max}) reached")]
    Capacity { max: usize },

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("unknown group: {0}")]
    UnknownGroup(String),
}

/// Change notifications published by the tool and group registries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    ToolAdded(String),
    GroupsRebuilt,
}
