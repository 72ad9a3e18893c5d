use crate::codec::{self, StoredData, DATA_KEY};
use crate::error::{NestDbError, Result};
use crate::value::data_to_json;
use indexmap::IndexMap;
use serde::de::{self, Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, Serializer};

/// One node of the storage tree, keyed in its parent by a path segment.
///
/// `data` is the document's data marker: present only while a document
/// is set at this node. `children` hold sub-collection (or document)
/// entries, so a node may exist purely as an ancestor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Node {
    pub(crate) data: Option<StoredData>,
    pub(crate) children: IndexMap<String, Node>,
}

impl Node {
    pub fn is_document(&self) -> bool {
        self.data.is_some()
    }

    pub fn child(&self, segment: &str) -> Option<&Node> {
        self.children.get(segment)
    }

    pub fn child_mut(&mut self, segment: &str) -> Option<&mut Node> {
        self.children.get_mut(segment)
    }

    pub fn child_or_insert(&mut self, segment: &str) -> &mut Node {
        self.children.entry(segment.to_string()).or_default()
    }

    pub fn children(&self) -> impl Iterator<Item = (&String, &Node)> {
        self.children.iter()
    }

    /// Plain-JSON dump of this subtree with data markers decoded.
    pub fn decoded_json(&self) -> Result<serde_json::Value> {
        let mut obj = serde_json::Map::new();
        if let Some(stored) = &self.data {
            let data = codec::decode_data(stored)?;
            obj.insert(DATA_KEY.to_string(), serde_json::Value::Object(data_to_json(&data)));
        }
        for (key, child) in &self.children {
            obj.insert(key.clone(), child.decoded_json()?);
        }
        Ok(serde_json::Value::Object(obj))
    }

    fn from_object(obj: serde_json::Map<String, serde_json::Value>) -> Result<Node> {
        let mut data = None;
        let mut children = IndexMap::with_capacity(obj.len());
        for (key, value) in obj {
            match value {
                serde_json::Value::Object(fields) if key == DATA_KEY => {
                    data = Some(fields);
                }
                serde_json::Value::Object(child) => {
                    children.insert(key, Node::from_object(child)?);
                }
                other => {
                    return Err(NestDbError::Corrupt(format!(
                        "entry '{key}' must be an object, got {other}"
                    )))
                }
            }
        }
        Ok(Node { data, children })
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let len = self.children.len() + usize::from(self.data.is_some());
        let mut map = serializer.serialize_map(Some(len))?;
        if let Some(data) = &self.data {
            map.serialize_entry(DATA_KEY, data)?;
        }
        for (key, child) in &self.children {
            map.serialize_entry(key, child)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let obj = serde_json::Map::<String, serde_json::Value>::deserialize(deserializer)?;
        Node::from_object(obj).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serialized_layout() {
        let mut root = Node::default();
        let alice = root.child_or_insert("users").child_or_insert("alice");
        alice.data = Some(json!({ "age": 30 }).as_object().unwrap().clone());
        alice.child_or_insert("posts");

        let text = serde_json::to_value(&root).unwrap();
        assert_eq!(
            text,
            json!({ "users": { "alice": { "__data__": { "age": 30 }, "posts": {} } } })
        );
    }

    #[test]
    fn test_deserialize_round_trip_keeps_child_order() {
        let raw = r#"{"users": {"zed": {"__data__": {}}, "amy": {"__data__": {"a": 1}}}}"#;
        let root: Node = serde_json::from_str(raw).unwrap();
        let users = root.child("users").unwrap();
        let ids: Vec<&String> = users.children().map(|(k, _)| k).collect();
        assert_eq!(ids, vec!["zed", "amy"]);
        assert!(users.child("amy").unwrap().is_document());
        assert!(!users.is_document());
    }

    #[test]
    fn test_non_object_entry_is_rejected() {
        let result: std::result::Result<Node, _> = serde_json::from_str(r#"{"users": 3}"#);
        assert!(result.is_err());
    }
}
