use crate::error::{NestDbError, Result};
use crate::path;
use crate::query::{self, FieldPath, QuerySpec, Q};
use crate::storage::DocumentStore;
use crate::value::{Data, Value};
use std::cell::RefCell;
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Length of ids generated by [`CollectionReference::doc`] and `add`.
pub const GENERATED_ID_LEN: usize = 20;

/// The main entry point: one named tree of collections and documents,
/// either kept purely in memory or backed by a single file.
pub struct Store {
    name: String,
    engine: RefCell<DocumentStore>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.name)
            .field("file", &self.engine.borrow().file())
            .finish()
    }
}

/// Store names become file names, so they follow the path segment rules.
pub fn validate_store_name(name: &str) -> Result<()> {
    if name.is_empty() || !name.chars().all(char::is_alphanumeric) {
        return Err(NestDbError::Name(name.to_string()));
    }
    Ok(())
}

impl Store {
    /// Open a store. With a file, the file is created empty when absent and
    /// then loaded; without one the store lives only in memory.
    pub fn open(name: &str, file: Option<PathBuf>) -> Result<Self> {
        validate_store_name(name)?;
        let engine = match file {
            Some(file) => {
                let mut engine = DocumentStore::persistent(file);
                engine.initialize()?;
                engine
            }
            None => DocumentStore::in_memory(),
        };
        Ok(Store {
            name: name.to_string(),
            engine: RefCell::new(engine),
        })
    }

    pub fn in_memory(name: &str) -> Result<Self> {
        Store::open(name, None)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_persistent(&self) -> bool {
        self.engine.borrow().is_persistent()
    }

    pub fn file(&self) -> Option<PathBuf> {
        self.engine.borrow().file().map(Path::to_path_buf)
    }

    /// Get a collection handle. A missing leading `/` is added.
    pub fn collection(&self, collection_path: &str) -> Result<CollectionReference<'_>> {
        CollectionReference::new(self, path::normalize(collection_path))
    }

    /// Get a document handle. A missing leading `/` is added.
    pub fn doc(&self, doc_path: &str) -> Result<DocumentReference<'_>> {
        DocumentReference::new(self, path::normalize(doc_path))
    }

    /// Drop every collection and document.
    pub fn clear(&self) {
        self.engine.borrow_mut().clear();
    }

    pub fn save(&self) -> Result<()> {
        self.engine.borrow().save()
    }

    /// Reload from the backing file, discarding unsaved changes.
    pub fn load(&self) -> Result<()> {
        self.engine.borrow_mut().load()
    }

    /// Decoded dump of the tree below `node_path`; `""` or `"/"` dumps
    /// everything.
    pub fn raw_data(&self, node_path: &str) -> Result<serde_json::Value> {
        if node_path.is_empty() || node_path == "/" {
            return self.engine.borrow().raw("");
        }
        let node_path = path::normalize(node_path);
        path::validate(&node_path, false)?;
        self.engine.borrow().raw(&node_path)
    }

    fn run(&self, spec: &QuerySpec) -> Result<QuerySnapshot> {
        let documents = self.engine.borrow().enumerate_collection(spec.path())?;
        let rows = query::apply(documents, spec)?;
        let docs = rows
            .into_iter()
            .map(|(id, data)| DocumentSnapshot::new(&path::join(spec.path(), &id), Some(data)))
            .collect();
        Ok(QuerySnapshot { docs })
    }
}

/// A handle to a collection within a store.
#[derive(Debug, Clone)]
pub struct CollectionReference<'a> {
    store: &'a Store,
    path: String,
}

impl<'a> CollectionReference<'a> {
    fn new(store: &'a Store, collection_path: String) -> Result<Self> {
        path::validate(&collection_path, false)?;
        path::require_collection(&collection_path)?;
        Ok(CollectionReference {
            store,
            path: collection_path,
        })
    }

    pub fn id(&self) -> &str {
        path::last_segment(&self.path)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The owning document of a sub-collection; `None` at the root.
    pub fn parent(&self) -> Option<DocumentReference<'a>> {
        path::parent(&self.path).map(|parent| DocumentReference {
            store: self.store,
            path: parent,
        })
    }

    /// Handle to a document in this collection. Without an id a random one
    /// is generated.
    pub fn doc(&self, id: Option<&str>) -> Result<DocumentReference<'a>> {
        let id = match id {
            Some(id) => id.to_string(),
            None => generate_id(),
        };
        DocumentReference::new(self.store, path::join(&self.path, &id))
    }

    /// Create a document with a generated id.
    pub fn add(&self, data: &Data) -> Result<DocumentReference<'a>> {
        let doc = self.doc(None)?;
        doc.set(data)?;
        Ok(doc)
    }

    /// A query over this collection with nothing applied yet.
    pub fn query(&self) -> Query<'a> {
        Query {
            store: self.store,
            spec: QuerySpec::new(self.path.clone()),
        }
    }

    pub fn filter(&self, q: Q) -> Query<'a> {
        self.query().filter(q)
    }

    pub fn exclude(&self, q: Q) -> Query<'a> {
        self.query().exclude(q)
    }

    pub fn order_by(&self, field: impl Into<FieldPath>) -> Result<Query<'a>> {
        self.query().order_by(field)
    }

    pub fn order_by_desc(&self, field: impl Into<FieldPath>) -> Result<Query<'a>> {
        self.query().order_by_desc(field)
    }

    pub fn limit(&self, n: usize) -> Result<Query<'a>> {
        self.query().limit(n)
    }

    pub fn limit_to_last(&self, n: usize) -> Result<Query<'a>> {
        self.query().limit_to_last(n)
    }

    pub fn start_at_document(&self, snapshot: &DocumentSnapshot) -> Result<Query<'a>> {
        self.query().start_at_document(snapshot)
    }

    pub fn start_after_document(&self, snapshot: &DocumentSnapshot) -> Result<Query<'a>> {
        self.query().start_after_document(snapshot)
    }

    pub fn end_at_document(&self, snapshot: &DocumentSnapshot) -> Result<Query<'a>> {
        self.query().end_at_document(snapshot)
    }

    pub fn end_before_document(&self, snapshot: &DocumentSnapshot) -> Result<Query<'a>> {
        self.query().end_before_document(snapshot)
    }

    /// Every document in the collection, in insertion order.
    pub fn get(&self) -> Result<QuerySnapshot> {
        self.query().get()
    }

    pub fn count(&self) -> Result<usize> {
        self.query().count()
    }
}

fn generate_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(GENERATED_ID_LEN);
    id
}

/// A handle to a single document path. The document need not exist.
#[derive(Debug, Clone)]
pub struct DocumentReference<'a> {
    store: &'a Store,
    path: String,
}

impl<'a> DocumentReference<'a> {
    fn new(store: &'a Store, doc_path: String) -> Result<Self> {
        path::validate(&doc_path, false)?;
        path::require_document(&doc_path)?;
        Ok(DocumentReference {
            store,
            path: doc_path,
        })
    }

    pub fn id(&self) -> &str {
        path::last_segment(&self.path)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn parent(&self) -> CollectionReference<'a> {
        CollectionReference {
            store: self.store,
            path: path::parent(&self.path).unwrap_or_else(|| self.path.clone()),
        }
    }

    /// A sub-collection below this document.
    pub fn collection(&self, name: &str) -> Result<CollectionReference<'a>> {
        CollectionReference::new(self.store, path::join(&self.path, name))
    }

    /// Replace the document's data.
    pub fn set(&self, data: &Data) -> Result<()> {
        self.store.engine.borrow_mut().set(&self.path, data)
    }

    /// Overwrite the named top-level fields of an existing document.
    pub fn update(&self, data: &Data) -> Result<()> {
        self.store.engine.borrow_mut().update(&self.path, data)
    }

    pub fn delete(&self) -> Result<()> {
        self.store.engine.borrow_mut().delete(&self.path)
    }

    pub fn exists(&self) -> bool {
        self.store.engine.borrow().exists(&self.path)
    }

    /// Read the document. A missing document yields a snapshot whose
    /// `exists()` is false rather than an error.
    pub fn get(&self) -> Result<DocumentSnapshot> {
        let data = self.store.engine.borrow().get(&self.path)?;
        Ok(DocumentSnapshot::new(&self.path, data))
    }

    /// Read one field; `default` when the field or document is missing.
    pub fn get_field(&self, field: impl Into<FieldPath>, default: Option<Value>) -> Result<Option<Value>> {
        self.store
            .engine
            .borrow()
            .get_field(&self.path, &field.into(), default)
    }
}

/// An immutable read of one document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    path: String,
    data: Option<Data>,
}

impl DocumentSnapshot {
    pub(crate) fn new(doc_path: &str, data: Option<Data>) -> Self {
        DocumentSnapshot {
            path: doc_path.to_string(),
            data,
        }
    }

    pub fn id(&self) -> &str {
        path::last_segment(&self.path)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.data.is_some()
    }

    pub fn data(&self) -> Option<&Data> {
        self.data.as_ref()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.as_ref()?.get(field)
    }

    pub fn get_or(&self, field: &str, default: Value) -> Value {
        self.get(field).cloned().unwrap_or(default)
    }

    /// A live handle to the document this snapshot was read from.
    pub fn reference<'a>(&self, store: &'a Store) -> Result<DocumentReference<'a>> {
        DocumentReference::new(store, self.path.clone())
    }
}

/// A query bound to a store. Builder calls return new queries.
#[derive(Debug, Clone)]
pub struct Query<'a> {
    store: &'a Store,
    spec: QuerySpec,
}

impl<'a> Query<'a> {
    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    fn with(&self, spec: QuerySpec) -> Self {
        Query {
            store: self.store,
            spec,
        }
    }

    pub fn filter(&self, q: Q) -> Self {
        self.with(self.spec.filter(q))
    }

    /// Keep only documents that do not match `q`.
    pub fn exclude(&self, q: Q) -> Self {
        if q.is_empty() {
            return self.clone();
        }
        self.with(self.spec.filter(!q))
    }

    pub fn order_by(&self, field: impl Into<FieldPath>) -> Result<Self> {
        Ok(self.with(self.spec.order_by(field, false)?))
    }

    pub fn order_by_desc(&self, field: impl Into<FieldPath>) -> Result<Self> {
        Ok(self.with(self.spec.order_by(field, true)?))
    }

    pub fn limit(&self, n: usize) -> Result<Self> {
        Ok(self.with(self.spec.limit(n)?))
    }

    pub fn limit_to_last(&self, n: usize) -> Result<Self> {
        Ok(self.with(self.spec.limit_to_last(n)?))
    }

    pub fn start_at<I, V>(&self, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Ok(self.with(self.spec.start_at(values)?))
    }

    pub fn start_after<I, V>(&self, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Ok(self.with(self.spec.start_after(values)?))
    }

    pub fn end_at<I, V>(&self, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Ok(self.with(self.spec.end_at(values)?))
    }

    pub fn end_before<I, V>(&self, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Ok(self.with(self.spec.end_before(values)?))
    }

    pub fn start_at_document(&self, snapshot: &DocumentSnapshot) -> Result<Self> {
        Ok(self.with(self.spec.start_at_document(snapshot)?))
    }

    pub fn start_after_document(&self, snapshot: &DocumentSnapshot) -> Result<Self> {
        Ok(self.with(self.spec.start_after_document(snapshot)?))
    }

    pub fn end_at_document(&self, snapshot: &DocumentSnapshot) -> Result<Self> {
        Ok(self.with(self.spec.end_at_document(snapshot)?))
    }

    pub fn end_before_document(&self, snapshot: &DocumentSnapshot) -> Result<Self> {
        Ok(self.with(self.spec.end_before_document(snapshot)?))
    }

    /// Run the query against the current contents of the collection.
    pub fn get(&self) -> Result<QuerySnapshot> {
        self.store.run(&self.spec)
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.get()?.size())
    }
}

/// The documents a query produced, in result order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySnapshot {
    docs: Vec<DocumentSnapshot>,
}

impl QuerySnapshot {
    pub fn docs(&self) -> &[DocumentSnapshot] {
        &self.docs
    }

    pub fn size(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DocumentSnapshot> {
        self.docs.iter()
    }
}

impl IntoIterator for QuerySnapshot {
    type Item = DocumentSnapshot;
    type IntoIter = std::vec::IntoIter<DocumentSnapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.docs.into_iter()
    }
}

impl<'s> IntoIterator for &'s QuerySnapshot {
    type Item = &'s DocumentSnapshot;
    type IntoIter = std::slice::Iter<'s, DocumentSnapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.docs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::data_from_json;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn data(value: serde_json::Value) -> Data {
        data_from_json(value).unwrap()
    }

    fn setup_test_store() -> Store {
        let store = Store::in_memory("test").unwrap();
        let users = store.collection("users").unwrap();
        for (id, name, age) in [("alice", "Alice", 30), ("bob", "Bob", 25), ("carol", "Carol", 35)] {
            users
                .doc(Some(id))
                .unwrap()
                .set(&data(json!({ "name": name, "age": age })))
                .unwrap();
        }
        store
    }

    fn ids(snapshot: &QuerySnapshot) -> Vec<&str> {
        snapshot.iter().map(DocumentSnapshot::id).collect()
    }

    #[test]
    fn test_store_name_validation() {
        assert!(matches!(Store::in_memory(""), Err(NestDbError::Name(_))));
        assert!(matches!(Store::in_memory("my store"), Err(NestDbError::Name(_))));
        assert!(Store::in_memory("main").is_ok());
    }

    #[test]
    fn test_handles_check_path_kind() {
        let store = Store::in_memory("test").unwrap();
        assert!(store.collection("/users/alice").is_err());
        assert!(store.doc("/users").is_err());
        assert!(store.doc("users/alice").is_ok());
        assert!(store.collection("/a//b").is_err());
    }

    #[test]
    fn test_references() {
        let store = Store::in_memory("test").unwrap();
        let posts = store.doc("users/alice").unwrap().collection("posts").unwrap();
        assert_eq!(posts.path(), "/users/alice/posts");
        assert_eq!(posts.id(), "posts");
        assert_eq!(posts.parent().unwrap().id(), "alice");
        assert_eq!(posts.parent().unwrap().parent().path(), "/users");
        assert!(store.collection("users").unwrap().parent().is_none());
    }

    #[test]
    fn test_add_generates_id() {
        let store = Store::in_memory("test").unwrap();
        let doc = store
            .collection("users")
            .unwrap()
            .add(&data(json!({ "name": "Dan" })))
            .unwrap();
        assert_eq!(doc.id().len(), GENERATED_ID_LEN);
        assert!(doc.id().chars().all(|c| c.is_ascii_hexdigit()));
        assert!(doc.exists());
    }

    #[test]
    fn test_get_missing_document_is_not_an_error() {
        let store = Store::in_memory("test").unwrap();
        let snapshot = store.doc("users/ghost").unwrap().get().unwrap();
        assert!(!snapshot.exists());
        assert_eq!(snapshot.id(), "ghost");
        assert_eq!(snapshot.get_or("age", Value::from(0)), Value::from(0));
    }

    #[test]
    fn test_get_field() {
        let store = setup_test_store();
        let alice = store.doc("users/alice").unwrap();
        assert_eq!(alice.get_field("age", None).unwrap(), Some(Value::from(30)));
        assert_eq!(alice.get_field("__name__", None).unwrap(), Some(Value::from("alice")));
        assert_eq!(
            alice.get_field("missing", Some(Value::from(false))).unwrap(),
            Some(Value::from(false))
        );
    }

    #[test]
    fn test_query_filter_exclude_order() {
        let store = setup_test_store();
        let users = store.collection("users").unwrap();

        let older = users.filter(Q::new("age__gt", 26)).get().unwrap();
        assert_eq!(ids(&older), vec!["alice", "carol"]);

        let not_bob = users.exclude(Q::new("name", "Bob")).get().unwrap();
        assert_eq!(ids(&not_bob), vec!["alice", "carol"]);

        let by_age = users.order_by_desc("age").unwrap().get().unwrap();
        assert_eq!(ids(&by_age), vec!["carol", "alice", "bob"]);

        let chained = users
            .filter(Q::new("age__gte", 25))
            .filter(Q::new("name__icontains", "AR"))
            .count()
            .unwrap();
        assert_eq!(chained, 1);
    }

    #[test]
    fn test_document_cursor_pagination() {
        let store = setup_test_store();
        let users = store.collection("users").unwrap();
        let bob = users.doc(Some("bob")).unwrap().get().unwrap();

        let page = users
            .order_by("age")
            .unwrap()
            .start_after_document(&bob)
            .unwrap()
            .get()
            .unwrap();
        assert_eq!(ids(&page), vec!["alice", "carol"]);
    }

    #[test]
    fn test_snapshot_reference_round_trip() {
        let store = setup_test_store();
        let snapshot = store.doc("users/bob").unwrap().get().unwrap();
        let reference = snapshot.reference(&store).unwrap();
        reference.update(&data(json!({ "age": 26 }))).unwrap();
        assert_eq!(
            store.doc("users/bob").unwrap().get().unwrap().get("age"),
            Some(&Value::from(26))
        );
        assert_eq!(snapshot.get("age"), Some(&Value::from(25)));
    }

    #[test]
    fn test_raw_data() {
        let store = setup_test_store();
        let raw = store.raw_data("users/bob").unwrap();
        assert_eq!(raw, json!({ "__data__": { "name": "Bob", "age": 25 } }));
        assert!(store.raw_data("/teams").is_err());
    }

    #[test]
    fn test_persistent_store_save_and_reopen() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("main.json");
        {
            let store = Store::open("main", Some(file.clone())).unwrap();
            assert!(store.is_persistent());
            store
                .doc("users/alice")
                .unwrap()
                .set(&data(json!({ "name": "Alice" })))
                .unwrap();
            store.save().unwrap();
        }
        let store = Store::open("main", Some(file)).unwrap();
        assert!(store.doc("users/alice").unwrap().exists());
        assert_eq!(store.collection("users").unwrap().count().unwrap(), 1);
    }

    #[test]
    fn test_clear() {
        let store = setup_test_store();
        store.clear();
        assert!(store.collection("users").unwrap().get().unwrap().is_empty());
    }
}
