use thiserror::Error;

#[derive(Error, Debug)]
pub enum NestDbError {
    #[error("Invalid path '{path}': {reason}")]
    Path { path: String, reason: String },

    #[error("Name '{0}' is not alphanumeric")]
    Name(String),

    #[error("Initialisation error: {0}")]
    Initialisation(String),

    #[error("Path {path} not found (missing segment '{segment}')")]
    NotFound { path: String, segment: String },

    #[error("Unsupported type: {0}")]
    UnsupportedType(String),

    #[error("Invalid query: {0}")]
    QueryConstruction(String),

    #[error("Filter evaluation error: {0}")]
    FilterEvaluation(String),

    #[error("Corrupt stored value: {0}")]
    Corrupt(String),

    #[error("Invalid pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to persist store file: {0}")]
    Persist(String),
}

impl NestDbError {
    pub(crate) fn path(path: &str, reason: impl Into<String>) -> Self {
        NestDbError::Path {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn not_found(path: &str, segment: &str) -> Self {
        NestDbError::NotFound {
            path: path.to_string(),
            segment: segment.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, NestDbError>;
