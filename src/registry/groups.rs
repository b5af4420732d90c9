use chrono::Utc;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast;

use super::{RegistryError, RegistryEvent, ToolRegistry};
use crate::config::{Store, StoreError};
use crate::model::{Group, Tool};

/// Current set of groups. Only ever replaced wholesale.
pub struct GroupRegistry {
    groups: RwLock<BTreeMap<String, Group>>,
    store: Arc<Store>,
    events: broadcast::Sender<RegistryEvent>,
}

impl GroupRegistry {
    pub fn new(store: Arc<Store>, events: broadcast::Sender<RegistryEvent>) -> Self {
        Self {
            groups: RwLock::new(BTreeMap::new()),
            store,
            events,
        }
    }

    /// Load persisted groups verbatim, minus members that no longer exist.
    ///
    /// Groups left without members are skipped. Returns how many were loaded.
    pub fn load_persisted(&self, tools: &ToolRegistry) -> usize {
        let persisted = self.store.snapshot().groups;
        let mut groups = self.groups.write();
        groups.clear();

        for (name, mut group) in persisted {
            group.tool_names.retain(|member| tools.contains(member));
            if group.tool_names.is_empty() {
                log::debug!("Skipping persisted group {name}: no remaining members");
                continue;
            }
            log::info!("Loaded group: {} with {} tools", name, group.tool_names.len());
            groups.insert(name, group);
        }

        groups.len()
    }

    /// Discard every group and install `next` in its place.
    pub fn replace_all(&self, next: Vec<Group>) -> Result<(), StoreError> {
        {
            let mut groups = self.groups.write();
            groups.clear();
            for group in &next {
                groups.insert(group.name.clone(), group.clone());
            }
        }

        let result = self.store.replace_groups(&next);
        let _ = self.events.send(RegistryEvent::GroupsRebuilt);
        result
    }

    pub fn get(&self, name: &str) -> Option<Group> {
        self.groups.read().get(name).cloned()
    }

    /// Member tools of `name` in stored order.
    pub fn members(&self, name: &str, tools: &ToolRegistry) -> Option<Vec<Tool>> {
        let group = self.get(name)?;
        Some(
            group
                .tool_names
                .iter()
                .filter_map(|member| tools.get(member))
                .collect(),
        )
    }

    pub fn record_use(&self, name: &str) -> Result<Group, RegistryError> {
        let group = {
            let mut groups = self.groups.write();
            let group = groups
                .get_mut(name)
                .ok_or_else(|| RegistryError::UnknownGroup(name.to_string()))?;
            group.use_count += 1;
            group.last_used = Some(Utc::now());
            group.clone()
        };

        if let Err(e) = self.store.persist_group(&group) {
            log::warn!("Failed to save usage stats for group {name}: {e}");
        }
        Ok(group)
    }

    pub fn snapshot(&self) -> BTreeMap<String, Group> {
        self.groups.read().clone()
    }

    pub fn len(&self) -> usize {
        self.groups.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Document;
    use crate::model::ToolSpec;

    fn group(name: &str, members: &[&str]) -> Group {
        Group {
            name: name.to_string(),
            description: format!("{name} operations"),
            tool_names: members.iter().map(|m| m.to_string()).collect(),
            created_at: Utc::now(),
            use_count: 0,
            last_used: None,
        }
    }

    fn tool(name: &str) -> Tool {
        ToolSpec {
            name: name.to_string(),
            method: "GET".to_string(),
            url: format!("http://localhost:3000/{name}"),
            ..Default::default()
        }
        .into_tool(Utc::now())
    }

    fn setup(doc: Document) -> (Arc<Store>, ToolRegistry, GroupRegistry) {
        let (tx, _) = broadcast::channel(16);
        let store = Arc::new(Store::in_memory(doc));
        let tools = ToolRegistry::new(100, Arc::clone(&store), tx.clone());
        let groups = GroupRegistry::new(Arc::clone(&store), tx);
        (store, tools, groups)
    }

    #[test]
    fn test_load_persisted_drops_dangling_members_and_empty_groups() {
        let mut doc = Document::default();
        doc.add_tool(tool("list_users"));
        doc.add_tool(tool("get_user"));
        doc.add_group(group("users", &["list_users", "gone", "get_user"]));
        doc.add_group(group("ghosts", &["gone"]));
        let (_store, tools, groups) = setup(doc);

        assert_eq!(groups.load_persisted(&tools), 1);
        assert_eq!(
            groups.get("users").unwrap().tool_names,
            vec!["list_users", "get_user"]
        );
        assert!(groups.get("ghosts").is_none());
    }

    #[test]
    fn test_replace_all_discards_previous_groups() {
        let (store, _tools, groups) = setup(Document::default());

        groups.replace_all(vec![group("a", &[]), group("b", &[])]).unwrap();
        groups.replace_all(vec![group("c", &[])]).unwrap();

        assert_eq!(groups.snapshot().keys().collect::<Vec<_>>(), vec!["c"]);
        assert_eq!(store.snapshot().groups.keys().collect::<Vec<_>>(), vec!["c"]);
    }

    #[test]
    fn test_members_keep_stored_order() {
        let mut doc = Document::default();
        for name in ["a", "b", "c"] {
            doc.add_tool(tool(name));
        }
        let (_store, tools, groups) = setup(doc);
        groups.replace_all(vec![group("g", &["c", "a", "b"])]).unwrap();

        let names: Vec<_> = groups
            .members("g", &tools)
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["c", "a", "b"]);
        assert!(groups.members("nope", &tools).is_none());
    }

    #[test]
    fn test_record_use() {
        let (_store, _tools, groups) = setup(Document::default());
        groups.replace_all(vec![group("g", &[])]).unwrap();

        groups.record_use("g").unwrap();
        let g = groups.record_use("g").unwrap();

        assert_eq!(g.use_count, 2);
        assert!(g.last_used.is_some());
        assert!(matches!(
            groups.record_use("x"),
            Err(RegistryError::UnknownGroup(_))
        ));
    }
}
