use chrono::Utc;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast;

use super::{RegistryError, RegistryEvent};
use crate::config::Store;
use crate::model::{Tool, ToolSpec};

/// Result of a successful [`ToolRegistry::register`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Created(Tool),
    /// The name was taken; the registry was left untouched.
    AlreadyExists,
}

/// Capacity-bounded, name-keyed store of replayable tools.
pub struct ToolRegistry {
    tools: RwLock<BTreeMap<String, Tool>>,
    max_tools: usize,
    store: Arc<Store>,
    events: broadcast::Sender<RegistryEvent>,
}

impl ToolRegistry {
    /// Build the registry from the tools already in the store.
    ///
    /// Persisted tools are always loaded, even past `max_tools`; the bound only
    /// applies to new registrations.
    pub fn new(max_tools: usize, store: Arc<Store>, events: broadcast::Sender<RegistryEvent>) -> Self {
        let tools = store.snapshot().tools;
        log::info!("Loading {} tools from config", tools.len());
        for tool in tools.values() {
            log::debug!("Loaded tool: {} ({} {})", tool.name, tool.method, tool.url);
        }

        Self {
            tools: RwLock::new(tools),
            max_tools,
            store,
            events,
        }
    }

    /// Register a tool. First write wins; a full registry rejects new names.
    pub fn register(&self, spec: ToolSpec) -> Result<Registration, RegistryError> {
        let tool = {
            let mut tools = self.tools.write();

            if tools.contains_key(&spec.name) {
                return Ok(Registration::AlreadyExists);
            }
            if tools.len() >= self.max_tools {
                return Err(RegistryError::Capacity {
                    max: self.max_tools,
                });
            }

            let tool = spec.into_tool(Utc::now());
            tools.insert(tool.name.clone(), tool.clone());
            tool
        };

        if let Err(e) = self.store.persist_tool(&tool) {
            log::warn!("Failed to save config after registering {}: {e}", tool.name);
        }
        let _ = self.events.send(RegistryEvent::ToolAdded(tool.name.clone()));

        Ok(Registration::Created(tool))
    }

    /// Bump `use_count` and `last_used` for `name`, returning the updated tool.
    pub fn record_use(&self, name: &str) -> Result<Tool, RegistryError> {
        let tool = {
            let mut tools = self.tools.write();
            let tool = tools
                .get_mut(name)
                .ok_or_else(|| RegistryError::UnknownTool(name.to_string()))?;
            tool.use_count += 1;
            tool.last_used = Some(Utc::now());
            tool.clone()
        };

        if let Err(e) = self.store.persist_tool(&tool) {
            log::warn!("Failed to save usage stats for {name}: {e}");
        }
        Ok(tool)
    }

    pub fn get(&self, name: &str) -> Option<Tool> {
        self.tools.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.read().contains_key(name)
    }

    /// All tools, ordered by name.
    pub fn snapshot(&self) -> Vec<Tool> {
        self.tools.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.max_tools
    }

    pub fn max_tools(&self) -> usize {
        self.max_tools
    }
}
