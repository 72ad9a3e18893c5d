use std::fmt;

/// Reserved field name standing for a document's own id.
pub const DOCUMENT_ID_TOKEN: &str = "__name__";

/// Reference to a document field, or to the document id itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldPath {
    DocumentId,
    Field(String),
}

impl FieldPath {
    pub fn document_id() -> Self {
        FieldPath::DocumentId
    }

    pub fn field(name: impl Into<String>) -> Self {
        FieldPath::from(name.into())
    }

    pub fn is_document_id(&self) -> bool {
        matches!(self, FieldPath::DocumentId)
    }

    pub fn as_str(&self) -> &str {
        match self {
            FieldPath::DocumentId => DOCUMENT_ID_TOKEN,
            FieldPath::Field(name) => name,
        }
    }
}

impl From<&str> for FieldPath {
    fn from(name: &str) -> Self {
        if name == DOCUMENT_ID_TOKEN {
            FieldPath::DocumentId
        } else {
            FieldPath::Field(name.to_string())
        }
    }
}

impl From<String> for FieldPath {
    fn from(name: String) -> Self {
        if name == DOCUMENT_ID_TOKEN {
            FieldPath::DocumentId
        } else {
            FieldPath::Field(name)
        }
    }
}

impl From<&FieldPath> for FieldPath {
    fn from(path: &FieldPath) -> Self {
        path.clone()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
