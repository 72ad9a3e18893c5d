// Path model: slash-delimited alphanumeric segments, parity decides kind.

use crate::error::{NestDbError, Result};

pub const SEPARATOR: char = '/';

/// What a path points at. Even segment counts address documents,
/// odd counts address collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    Document,
    Collection,
}

/// Split a path into its segments, ignoring leading and trailing slashes.
pub fn segments(path: &str) -> Vec<&str> {
    path.trim_matches(SEPARATOR).split(SEPARATOR).collect()
}

/// Validate path syntax. A `partial` path may omit the leading slash
/// (used for sub-collection names relative to a document).
pub fn validate(path: &str, partial: bool) -> Result<()> {
    if path.is_empty() {
        return Err(NestDbError::path(path, "path cannot be empty"));
    }
    if !partial && !path.starts_with(SEPARATOR) {
        return Err(NestDbError::path(path, "path must start with /"));
    }
    if path.ends_with(SEPARATOR) {
        return Err(NestDbError::path(path, "path must not end with /"));
    }
    if path.contains("//") {
        return Err(NestDbError::path(path, "path must not contain //"));
    }
    let alphanumeric = segments(path)
        .iter()
        .all(|s| !s.is_empty() && s.chars().all(char::is_alphanumeric));
    if !alphanumeric {
        return Err(NestDbError::path(path, "path must be alphanumeric"));
    }
    Ok(())
}

pub fn classify(path: &str) -> PathKind {
    if segments(path).len() % 2 == 0 {
        PathKind::Document
    } else {
        PathKind::Collection
    }
}

pub fn require_document(path: &str) -> Result<()> {
    match classify(path) {
        PathKind::Document => Ok(()),
        PathKind::Collection => Err(NestDbError::path(path, "path doesn't point to a document")),
    }
}

pub fn require_collection(path: &str) -> Result<()> {
    match classify(path) {
        PathKind::Collection => Ok(()),
        PathKind::Document => Err(NestDbError::path(path, "path doesn't point to a collection")),
    }
}

/// Parent path, or `None` for a root collection.
pub fn parent(path: &str) -> Option<String> {
    let segs = segments(path);
    if segs.len() <= 1 {
        return None;
    }
    Some(format!("/{}", segs[..segs.len() - 1].join("/")))
}

/// Final segment: a document id or a collection name.
pub fn last_segment(path: &str) -> &str {
    path.rsplit(SEPARATOR).next().unwrap_or(path)
}

/// Prefix a leading slash when the caller left it off.
pub fn normalize(path: &str) -> String {
    if path.starts_with(SEPARATOR) {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

pub fn join(base: &str, child: &str) -> String {
    format!("{}/{}", base.trim_end_matches(SEPARATOR), child.trim_start_matches(SEPARATOR))
}
