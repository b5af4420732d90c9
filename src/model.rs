//! Records shared by the registries, the store and the protocol server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A target-bound HTTP request reconstructed from a single captured packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

/// One observed `(method, path)` pair and its call statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedCall {
    pub method: String,
    pub path: String,
    /// Query string of the first sighting, without the leading `?`.
    pub query: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub call_count: u64,
}

impl CapturedCall {
    pub fn key(method: &str, path: &str) -> String {
        format!("{method}_{path}")
    }

    /// Path plus query, as it should be appended to the target URL.
    pub fn request_target(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{}", self.path, query),
            None => self.path.clone(),
        }
    }
}

/// A replayable request template exposed as an MCP tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>,
    #[serde(default)]
    pub use_count: u64,
}

/// Parameters of a tool registration, before the registry stamps it.
#[derive(Debug, Clone, Default)]
pub struct ToolSpec {
    pub name: String,
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub description: String,
}

impl ToolSpec {
    pub fn into_tool(self, now: DateTime<Utc>) -> Tool {
        Tool {
            name: self.name,
            method: self.method,
            url: self.url,
            headers: self.headers,
            body: self.body,
            description: self.description,
            created_at: now,
            last_used: None,
            use_count: 0,
        }
    }
}

/// A named cluster of tools exposed as a single MCP tool in grouped mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tool_names: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub use_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>,
}
