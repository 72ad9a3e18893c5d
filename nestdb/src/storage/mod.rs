pub mod node;

use crate::codec;
use crate::error::{NestDbError, Result};
use crate::path;
use crate::query::FieldPath;
use crate::value::{Data, Value};
use std::io::Write;
use std::path::{Path, PathBuf};

pub use node::Node;

/// The in-memory document tree plus its (optional) backing file.
///
/// There is no internal locking: callers sharing a store across threads
/// wrap it themselves (the registry hands out `Arc<Mutex<Store>>`).
#[derive(Debug, Default)]
pub struct DocumentStore {
    root: Node,
    file: Option<PathBuf>,
}

impl DocumentStore {
    /// A store that never touches the filesystem.
    pub fn in_memory() -> Self {
        DocumentStore::default()
    }

    /// A store persisted as a single JSON file. Nothing is read until
    /// [`DocumentStore::initialize`] or [`DocumentStore::load`].
    pub fn persistent(file: impl Into<PathBuf>) -> Self {
        DocumentStore {
            root: Node::default(),
            file: Some(file.into()),
        }
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn is_persistent(&self) -> bool {
        self.file.is_some()
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Create the backing file empty if it does not exist yet, then load it.
    pub fn initialize(&mut self) -> Result<()> {
        if let Some(file) = &self.file {
            if !file.exists() {
                if let Some(dir) = file.parent() {
                    std::fs::create_dir_all(dir)?;
                }
                std::fs::write(file, "{}")?;
                log::info!("Created empty store file {}", file.display());
            }
        }
        self.load()
    }

    pub fn load(&mut self) -> Result<()> {
        let Some(file) = &self.file else {
            return Ok(());
        };
        let text = std::fs::read_to_string(file)?;
        self.root = serde_json::from_str(&text)?;
        log::info!("Loaded store file {}", file.display());
        Ok(())
    }

    /// Rewrite the whole backing file. The tree is written to a temporary
    /// file next to the target, synced to disk, and renamed over it.
    pub fn save(&self) -> Result<()> {
        let Some(file) = &self.file else {
            return Ok(());
        };
        let dir = match file.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, &self.root)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(file)
            .map_err(|e| NestDbError::Persist(format!("{}: {}", file.display(), e.error)))?;
        log::info!("Saved store file {}", file.display());
        Ok(())
    }

    /// Walk from the root, creating empty nodes for missing segments.
    fn get_or_create_node(&mut self, doc_path: &str) -> &mut Node {
        let mut node = &mut self.root;
        for segment in path::segments(doc_path) {
            node = node.child_or_insert(segment);
        }
        node
    }

    /// Walk from the root without creating anything.
    pub fn get_node(&self, node_path: &str) -> Result<&Node> {
        let mut node = &self.root;
        for segment in path::segments(node_path) {
            node = node
                .child(segment)
                .ok_or_else(|| NestDbError::not_found(node_path, segment))?;
        }
        Ok(node)
    }

    fn get_node_mut(&mut self, node_path: &str) -> Result<&mut Node> {
        let mut node = &mut self.root;
        for segment in path::segments(node_path) {
            node = node
                .child_mut(segment)
                .ok_or_else(|| NestDbError::not_found(node_path, segment))?;
        }
        Ok(node)
    }

    fn check_document_path(doc_path: &str) -> Result<()> {
        path::validate(doc_path, false)?;
        path::require_document(doc_path)
    }

    /// Replace the document at `doc_path` wholesale.
    pub fn set(&mut self, doc_path: &str, data: &Data) -> Result<()> {
        Self::check_document_path(doc_path)?;
        codec::validate_data(data)?;

        let node = self.get_or_create_node(doc_path);
        node.data = Some(codec::encode_data(data));
        log::debug!("set {doc_path} ({} fields)", data.len());
        Ok(())
    }

    /// Shallow merge: named top-level fields are overwritten, the rest kept.
    pub fn update(&mut self, doc_path: &str, data: &Data) -> Result<()> {
        Self::check_document_path(doc_path)?;
        let node = self.get_node_mut(doc_path)?;
        let marker = node
            .data
            .as_mut()
            .ok_or_else(|| NestDbError::not_found(doc_path, path::last_segment(doc_path)))?;
        codec::validate_data(data)?;

        for (field, value) in data {
            marker.insert(field.clone(), codec::encode_field(value));
        }
        log::debug!("update {doc_path} ({} fields)", data.len());
        Ok(())
    }

    /// Remove the data marker only; sub-collections below stay in place.
    pub fn delete(&mut self, doc_path: &str) -> Result<()> {
        Self::check_document_path(doc_path)?;
        let node = match self.get_node_mut(doc_path) {
            Ok(node) if node.is_document() => node,
            Ok(_) => {
                log::warn!("delete: document {doc_path} does not exist");
                return Err(NestDbError::not_found(doc_path, path::last_segment(doc_path)));
            }
            Err(e) => {
                log::warn!("delete: document {doc_path} does not exist");
                return Err(e);
            }
        };
        node.data = None;
        log::debug!("delete {doc_path}");
        Ok(())
    }

    pub fn exists(&self, doc_path: &str) -> bool {
        path::classify(doc_path) == path::PathKind::Document
            && self
                .get_node(doc_path)
                .map(Node::is_document)
                .unwrap_or(false)
    }

    /// Decoded body of a document, or `None` when it does not exist.
    pub fn get(&self, doc_path: &str) -> Result<Option<Data>> {
        match self.get_node(doc_path) {
            Ok(Node {
                data: Some(stored), ..
            }) => Ok(Some(codec::decode_data(stored)?)),
            _ => {
                log::warn!("Document {doc_path} does not exist");
                Ok(None)
            }
        }
    }

    /// Single field of a document. The document-id sentinel always resolves
    /// to the final path segment; anything missing yields `default`.
    pub fn get_field(
        &self,
        doc_path: &str,
        field: &FieldPath,
        default: Option<Value>,
    ) -> Result<Option<Value>> {
        let name = match field {
            FieldPath::DocumentId => {
                return Ok(Some(Value::from(path::last_segment(doc_path))));
            }
            FieldPath::Field(name) => name,
        };
        match self.get_node(doc_path) {
            Ok(Node {
                data: Some(stored), ..
            }) => match stored.get(name) {
                Some(raw) => Ok(Some(codec::decode_field(raw)?)),
                None => Ok(default),
            },
            _ => {
                log::warn!("Document {doc_path} does not exist");
                Ok(default)
            }
        }
    }

    /// Every document directly under a collection, in insertion order.
    /// Child nodes without a data marker are skipped; a collection that was
    /// never written to is simply empty.
    pub fn enumerate_collection(&self, collection_path: &str) -> Result<Vec<(String, Data)>> {
        path::validate(collection_path, false)?;
        path::require_collection(collection_path)?;

        let node = match self.get_node(collection_path) {
            Ok(node) => node,
            Err(NestDbError::NotFound { .. }) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        node.children()
            .filter_map(|(id, child)| child.data.as_ref().map(|stored| (id, stored)))
            .map(|(id, stored)| Ok((id.clone(), codec::decode_data(stored)?)))
            .collect()
    }

    /// Decoded dump of the tree below `node_path` (the whole tree for "").
    pub fn raw(&self, node_path: &str) -> Result<serde_json::Value> {
        if node_path.is_empty() || node_path == "/" {
            return self.root.decoded_json();
        }
        self.get_node(node_path)?.decoded_json()
    }

    pub fn clear(&mut self) {
        self.root = Node::default();
        log::debug!("cleared store");
    }
}
