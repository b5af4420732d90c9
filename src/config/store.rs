use parking_lot::Mutex;
use std::path::{Path, PathBuf};

use super::{Document, StoreError};
use crate::model::{Group, Tool};

/// Single writer for the persisted [`Document`].
///
/// Every mutation is applied under the lock and flushed before the lock is
/// released, so concurrent writers never interleave partial saves.
pub struct Store {
    path: Option<PathBuf>,
    doc: Mutex<Document>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let doc = Document::load(path)?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            doc: Mutex::new(doc),
        })
    }

    /// Store that never touches the filesystem.
    pub fn in_memory(doc: Document) -> Self {
        Self {
            path: None,
            doc: Mutex::new(doc),
        }
    }

    pub fn snapshot(&self) -> Document {
        self.doc.lock().clone()
    }

    pub fn update<F>(&self, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Document),
    {
        let mut doc = self.doc.lock();
        f(&mut doc);
        match &self.path {
            Some(path) => doc.save(path),
            None => Ok(()),
        }
    }

    pub fn persist_tool(&self, tool: &Tool) -> Result<(), StoreError> {
        self.update(|doc| doc.add_tool(tool.clone()))
    }

    pub fn persist_group(&self, group: &Group) -> Result<(), StoreError> {
        self.update(|doc| doc.add_group(group.clone()))
    }

    pub fn replace_groups(&self, groups: &[Group]) -> Result<(), StoreError> {
        self.update(|doc| {
            doc.clear_groups();
            for group in groups {
                doc.add_group(group.clone());
            }
            doc.use_grouping = true;
        })
    }
}
