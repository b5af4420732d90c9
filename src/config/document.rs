use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use super::StoreError;
use crate::model::{Group, Tool};

const DEFAULT_MCP_PORT: u16 = 8081;
const DEFAULT_MAX_TOOLS: usize = 100;

/// On-disk document holding settings, discovered tools and groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Document {
    pub mcp_port: u16,
    pub max_tools: usize,
    pub use_llm: bool,
    pub use_grouping: bool,
    pub last_target: String,
    pub tools: BTreeMap<String, Tool>,
    pub groups: BTreeMap<String, Group>,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            mcp_port: DEFAULT_MCP_PORT,
            max_tools: DEFAULT_MAX_TOOLS,
            use_llm: false,
            use_grouping: false,
            last_target: String::new(),
            tools: BTreeMap::new(),
            groups: BTreeMap::new(),
        }
    }
}

impl Document {
    /// Load the document at `path`, writing defaults first if it does not exist.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        if !path.exists() {
            let doc = Self::default();
            doc.save(path)?;
            return Ok(doc);
        }

        let content = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| StoreError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the document as pretty JSON via a temp file renamed over `path`.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(self).map_err(StoreError::Encode)?;
        let tmp = path.with_extension("json.tmp");

        std::fs::write(&tmp, data).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn add_tool(&mut self, tool: Tool) {
        self.tools.insert(tool.name.clone(), tool);
    }

    pub fn get_tool(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    pub fn add_group(&mut self, group: Group) {
        self.groups.insert(group.name.clone(), group);
    }

    pub fn clear_groups(&mut self) {
        self.groups.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn tool(name: &str) -> Tool {
        Tool {
            name: name.to_string(),
            method: "GET".to_string(),
            url: format!("http://localhost:3000/{name}"),
            headers: BTreeMap::new(),
            body: String::new(),
            description: String::new(),
            created_at: Utc::now(),
            last_used: None,
            use_count: 0,
        }
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let doc = Document::load(&path).unwrap();

        assert_eq!(doc, Document::default());
        assert!(path.exists());
    }

    #[test]
    fn test_save_then_load_keeps_tools_and_groups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut doc = Document::default();
        doc.last_target = "http://localhost:3000".to_string();
        doc.add_tool(tool("get_users"));
        doc.add_group(Group {
            name: "users".to_string(),
            description: "user things".to_string(),
            tool_names: vec!["get_users".to_string()],
            created_at: Utc::now(),
            use_count: 2,
            last_used: None,
        });
        doc.save(&path).unwrap();

        let loaded = Document::load(&path).unwrap();
        assert_eq!(loaded, doc);
    }

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"last_target":"http://localhost:9000"}"#).unwrap();

        let doc = Document::load(&path).unwrap();

        assert_eq!(doc.mcp_port, DEFAULT_MCP_PORT);
        assert_eq!(doc.max_tools, DEFAULT_MAX_TOOLS);
        assert_eq!(doc.last_target, "http://localhost:9000");
        assert!(doc.tools.is_empty());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(Document::load(&path), Err(StoreError::Parse { .. })));
    }
}
