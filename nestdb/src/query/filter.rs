//! Boolean filter trees.
//!
//! A [`Q`] holds leaf lookups (`"field__lookup"`, operand) and nested `Q`s,
//! joined by a connector and optionally negated. Operands may reference
//! other fields of the same document through [`F`].

use crate::error::{NestDbError, Result};
use crate::query::field_path::{FieldPath, DOCUMENT_ID_TOKEN};
use crate::query::lookup::{self, DEFAULT_LOOKUP};
use crate::value::{Data, Value};
use chrono::{DateTime, TimeZone};
use regex::Regex;
use std::fmt;
use std::ops::{BitAnd, BitOr, BitXor, Not};

/// Separator between a field name and a lookup name.
pub const LOOKUP_SEP: &str = "__";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    And,
    Or,
    Xor,
}

impl fmt::Display for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Connector::And => "AND",
            Connector::Or => "OR",
            Connector::Xor => "XOR",
        })
    }
}

/// Reference to another field of the document being evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct F(pub FieldPath);

impl F {
    pub fn new(field: impl Into<FieldPath>) -> Self {
        F(field.into())
    }

    fn resolve(&self, id: &str, doc: &Data) -> Result<Value> {
        match &self.0 {
            FieldPath::DocumentId => Ok(Value::from(id)),
            FieldPath::Field(name) => doc.get(name).cloned().ok_or_else(|| {
                NestDbError::FilterEvaluation(format!("Field {name} not found in document"))
            }),
        }
    }
}

/// Right-hand side of a leaf lookup.
#[derive(Debug, Clone)]
pub enum Operand {
    Value(Value),
    Field(F),
    List(Vec<Operand>),
    Pattern(Regex),
}

/// An operand with every field reference replaced by its value.
#[derive(Debug, Clone)]
pub enum Resolved {
    Value(Value),
    Pattern(Regex),
}

impl Operand {
    fn resolve(&self, id: &str, doc: &Data) -> Result<Resolved> {
        Ok(match self {
            Operand::Value(value) => Resolved::Value(value.clone()),
            Operand::Field(f) => Resolved::Value(f.resolve(id, doc)?),
            Operand::Pattern(re) => Resolved::Pattern(re.clone()),
            Operand::List(items) => Resolved::Value(Value::List(
                items
                    .iter()
                    .map(|item| match item.resolve(id, doc)? {
                        Resolved::Value(value) => Ok(value),
                        Resolved::Pattern(_) => Err(NestDbError::FilterEvaluation(
                            "patterns cannot appear inside a list operand".into(),
                        )),
                    })
                    .collect::<Result<Vec<_>>>()?,
            )),
        })
    }
}

macro_rules! operand_from_value {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Operand {
            fn from(v: $ty) -> Self {
                Operand::Value(Value::from(v))
            }
        })*
    };
}

operand_from_value!(Value, bool, i32, i64, f64, &str, String, Data);

impl<Tz: TimeZone> From<DateTime<Tz>> for Operand {
    fn from(dt: DateTime<Tz>) -> Self {
        Operand::Value(Value::from(dt))
    }
}

impl<T: Into<Value>> From<Vec<T>> for Operand {
    fn from(items: Vec<T>) -> Self {
        Operand::Value(Value::from(items))
    }
}

impl From<F> for Operand {
    fn from(f: F) -> Self {
        Operand::Field(f)
    }
}

impl From<Regex> for Operand {
    fn from(re: Regex) -> Self {
        Operand::Pattern(re)
    }
}

#[derive(Debug, Clone)]
pub enum Child {
    Lookup(String, Operand),
    Node(Q),
}

/// A filter node: children combined by `connector`, then optionally negated.
#[derive(Debug, Clone)]
pub struct Q {
    connector: Connector,
    negated: bool,
    children: Vec<Child>,
}

impl Default for Q {
    fn default() -> Self {
        Q {
            connector: Connector::And,
            negated: false,
            children: Vec::new(),
        }
    }
}

impl Q {
    /// A single lookup such as `Q::new("name__startswith", "A")`.
    pub fn new(expr: impl Into<String>, operand: impl Into<Operand>) -> Self {
        Q::default().and_lookup(expr, operand)
    }

    /// Several lookups that must all hold.
    pub fn all<I, E, O>(lookups: I) -> Self
    where
        I: IntoIterator<Item = (E, O)>,
        E: Into<String>,
        O: Into<Operand>,
    {
        lookups
            .into_iter()
            .fold(Q::default(), |q, (expr, operand)| q.and_lookup(expr, operand))
    }

    /// Append another leaf to this node's children.
    pub fn and_lookup(mut self, expr: impl Into<String>, operand: impl Into<Operand>) -> Self {
        self.children
            .push(Child::Lookup(expr.into(), operand.into()));
        self
    }

    pub fn connector(&self) -> Connector {
        self.connector
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    pub fn children(&self) -> &[Child] {
        &self.children
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    fn combine(self, other: Q, connector: Connector) -> Q {
        if other.is_empty() {
            return self;
        }
        if self.is_empty() {
            return other;
        }
        let mut combined = Q {
            connector,
            ..Q::default()
        };
        combined.add(self, connector);
        combined.add(other, connector);
        combined
    }

    // Nodes sharing the connector are flattened into this one rather than
    // nested; a negated node always stays a distinct child.
    fn add(&mut self, data: Q, connector: Connector) {
        if data.is_empty() {
            return;
        }
        if self.connector != connector {
            let previous = std::mem::take(self);
            self.connector = connector;
            self.children = vec![Child::Node(previous), Child::Node(data)];
        } else if !data.negated && (data.connector == connector || data.len() == 1) {
            self.children.extend(data.children);
        } else {
            self.children.push(Child::Node(data));
        }
    }

    /// Evaluate against one document; `id` backs the document-id sentinel.
    pub fn evaluate(&self, id: &str, doc: &Data) -> Result<bool> {
        let mut results = Vec::with_capacity(self.children.len());
        for child in &self.children {
            results.push(match child {
                Child::Node(q) => q.evaluate(id, doc)?,
                Child::Lookup(expr, operand) => evaluate_lookup(expr, operand, id, doc)?,
            });
        }
        let combined = match self.connector {
            Connector::And => results.iter().all(|r| *r),
            Connector::Or => results.iter().any(|r| *r),
            Connector::Xor => results.iter().filter(|r| **r).count() == 1,
        };
        Ok(combined ^ self.negated)
    }
}

/// Split `"field__lookup"` into its field and lookup name. The document-id
/// token is matched first since it contains the separator itself.
pub fn parse_expression(expr: &str) -> Result<(FieldPath, &str)> {
    if let Some(rest) = expr.strip_prefix(DOCUMENT_ID_TOKEN) {
        return match rest {
            "" => Ok((FieldPath::DocumentId, DEFAULT_LOOKUP)),
            _ => match rest.strip_prefix(LOOKUP_SEP) {
                Some(name) if !name.is_empty() => Ok((FieldPath::DocumentId, name)),
                _ => Err(NestDbError::FilterEvaluation(format!(
                    "Cannot parse query keyword {expr}"
                ))),
            },
        };
    }
    let (field, lookup_name) = match expr.split_once(LOOKUP_SEP) {
        Some((field, name)) => (field, name),
        None => (expr, DEFAULT_LOOKUP),
    };
    if field.is_empty() || lookup_name.is_empty() {
        return Err(NestDbError::FilterEvaluation(format!(
            "Cannot parse query keyword {expr}"
        )));
    }
    Ok((FieldPath::Field(field.to_string()), lookup_name))
}

fn evaluate_lookup(expr: &str, operand: &Operand, id: &str, doc: &Data) -> Result<bool> {
    let (field, lookup_name) = parse_expression(expr)?;
    let db_value = match &field {
        FieldPath::DocumentId => Value::from(id),
        FieldPath::Field(name) => doc.get(name).cloned().ok_or_else(|| {
            NestDbError::FilterEvaluation(format!("Field {name} not found in document"))
        })?,
    };
    let operand = operand.resolve(id, doc)?;
    let (lookup, case_sensitive) = lookup::registry()
        .resolve(db_value.kind(), lookup_name)
        .ok_or_else(|| {
            NestDbError::FilterEvaluation(format!(
                "Lookup \"{lookup_name}\" not found for field \"{field}\""
            ))
        })?;
    lookup.matches(&db_value, &operand, case_sensitive)
}

impl BitAnd for Q {
    type Output = Q;

    fn bitand(self, other: Q) -> Q {
        self.combine(other, Connector::And)
    }
}

impl BitOr for Q {
    type Output = Q;

    fn bitor(self, other: Q) -> Q {
        self.combine(other, Connector::Or)
    }
}

impl BitXor for Q {
    type Output = Q;

    fn bitxor(self, other: Q) -> Q {
        self.combine(other, Connector::Xor)
    }
}

impl Not for Q {
    type Output = Q;

    fn not(mut self) -> Q {
        self.negated = !self.negated;
        self
    }
}

impl fmt::Display for Q {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let children: Vec<String> = self
            .children
            .iter()
            .map(|child| match child {
                Child::Node(q) => q.to_string(),
                Child::Lookup(expr, operand) => format!("({expr}, {operand:?})"),
            })
            .collect();
        if self.negated {
            write!(f, "(NOT ({}: {}))", self.connector, children.join(", "))
        } else {
            write!(f, "({}: {})", self.connector, children.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::data_from_json;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Data {
        data_from_json(value).unwrap()
    }

    #[test]
    fn test_or_and_not() {
        let d = doc(json!({ "a": 1, "b": 5 }));
        assert!((Q::new("a", 1) | Q::new("b", 2)).evaluate("x", &d).unwrap());
        assert!(!(Q::new("a", 1) & Q::new("b", 2)).evaluate("x", &d).unwrap());
        assert!((Q::new("a", 1) & Q::new("b", 5)).evaluate("x", &d).unwrap());
        assert!(!(!Q::new("a", 1)).evaluate("x", &d).unwrap());
    }

    #[test]
    fn test_xor_requires_exactly_one() {
        let d = doc(json!({ "a": 1, "b": 2 }));
        assert!(!(Q::new("a", 1) ^ Q::new("b", 2)).evaluate("x", &d).unwrap());
        assert!((Q::new("a", 1) ^ Q::new("b", 3)).evaluate("x", &d).unwrap());
    }

    #[test]
    fn test_same_connector_is_flattened() {
        let q = Q::new("a", 1) & Q::new("b", 2) & Q::new("c", 3);
        assert_eq!(q.connector(), Connector::And);
        assert_eq!(q.len(), 3);

        let q = (Q::new("a", 1) & Q::new("b", 2)) | Q::new("c", 3);
        assert_eq!(q.connector(), Connector::Or);
        assert_eq!(q.len(), 2);
        assert!(matches!(&q.children()[0], Child::Node(inner) if inner.connector() == Connector::And));
    }

    #[test]
    fn test_negated_child_stays_nested() {
        let q = Q::new("a", 1) & !Q::new("b", 2);
        assert_eq!(q.len(), 2);
        assert!(matches!(&q.children()[1], Child::Node(inner) if inner.is_negated()));
    }

    #[test]
    fn test_empty_side_is_ignored() {
        let q = Q::default() & Q::new("a", 1);
        assert_eq!(q.len(), 1);
        assert!(!q.is_negated());
    }

    #[test]
    fn test_multiple_lookups_in_one_node() {
        let d = doc(json!({ "name": "Alice", "age": 30 }));
        let q = Q::all([("name__startswith", Operand::from("A")), ("age__gte", Operand::from(18))]);
        assert!(q.evaluate("x", &d).unwrap());
    }

    #[test]
    fn test_missing_field_is_an_error() {
        let d = doc(json!({ "a": 1 }));
        let result = Q::new("missing", 1).evaluate("x", &d);
        assert!(matches!(result, Err(NestDbError::FilterEvaluation(_))));
    }

    #[test]
    fn test_unknown_lookup_is_an_error() {
        let d = doc(json!({ "a": 1 }));
        assert!(Q::new("a__nope", 1).evaluate("x", &d).is_err());
        assert!(Q::new("a__in__x", 1).evaluate("x", &d).is_err());
    }

    #[test]
    fn test_f_expression_resolves_against_document() {
        let d = doc(json!({ "spent": 120, "budget": 100 }));
        assert!(Q::new("spent__gt", F::new("budget")).evaluate("x", &d).unwrap());
        assert!(Q::new("spent__lt", F::new("nope")).evaluate("x", &d).is_err());

        let list = Operand::List(vec![Operand::from(1), Operand::from(F::new("budget"))]);
        let d = doc(json!({ "v": 100, "budget": 100 }));
        assert!(Q::new("v__in", list).evaluate("x", &d).unwrap());
    }

    #[test]
    fn test_document_id_expressions() {
        let d = doc(json!({ "a": 1 }));
        assert!(Q::new("__name__", "alice").evaluate("alice", &d).unwrap());
        assert!(Q::new("__name____in", vec!["bob", "alice"]).evaluate("alice", &d).unwrap());
        assert!(Q::new("a", F::new(FieldPath::DocumentId)).evaluate("1", &d).is_ok());
    }

    #[test]
    fn test_parse_expression() {
        assert_eq!(parse_expression("age").unwrap(), (FieldPath::from("age"), "exact"));
        assert_eq!(parse_expression("age__lt").unwrap(), (FieldPath::from("age"), "lt"));
        assert_eq!(parse_expression("__name____gt").unwrap(), (FieldPath::DocumentId, "gt"));
        assert!(parse_expression("__lt").is_err());
        assert!(parse_expression("age__").is_err());
    }

    #[test]
    fn test_display() {
        let q = !(Q::new("a", 1) | Q::new("b", 2));
        assert!(q.to_string().starts_with("(NOT (OR: "));
    }
}
