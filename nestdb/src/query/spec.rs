use crate::error::{NestDbError, Result};
use crate::path;
use crate::query::field_path::FieldPath;
use crate::query::filter::Q;
use crate::store::DocumentSnapshot;
use crate::value::Value;

/// One `order_by` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderClause {
    pub field: FieldPath,
    pub descending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    First(usize),
    Last(usize),
}

/// A positional boundary over the ordered values of a row.
#[derive(Debug, Clone, PartialEq)]
pub struct Cursor {
    pub values: Vec<Value>,
    pub inclusive: bool,
}

#[derive(Debug, Clone, Copy)]
enum Bound {
    Start,
    End,
}

/// Immutable description of a query over one collection.
///
/// Every builder method checks the call against what has been set so far
/// and returns a new spec; `self` is never modified.
#[derive(Debug, Clone)]
pub struct QuerySpec {
    path: String,
    order_by: Vec<OrderClause>,
    limit: Option<Limit>,
    start: Option<Cursor>,
    end: Option<Cursor>,
    filters: Vec<Q>,
}

impl QuerySpec {
    pub fn new(collection_path: impl Into<String>) -> Self {
        QuerySpec {
            path: collection_path.into(),
            order_by: Vec::new(),
            limit: None,
            start: None,
            end: None,
            filters: Vec::new(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn orders(&self) -> &[OrderClause] {
        &self.order_by
    }

    pub fn limit_value(&self) -> Option<Limit> {
        self.limit
    }

    pub fn start(&self) -> Option<&Cursor> {
        self.start.as_ref()
    }

    pub fn end(&self) -> Option<&Cursor> {
        self.end.as_ref()
    }

    pub fn filters(&self) -> &[Q] {
        &self.filters
    }

    pub fn order_by(&self, field: impl Into<FieldPath>, descending: bool) -> Result<Self> {
        let field = field.into();
        if self.order_by.iter().any(|clause| clause.field == field) {
            return Err(NestDbError::QueryConstruction(format!(
                "field '{field}' is already in the order_by list"
            )));
        }
        if self.start.is_some() {
            return Err(NestDbError::QueryConstruction(
                "order_by() must be called before start_at(), start_after() or their document variants".into(),
            ));
        }
        if self.end.is_some() {
            return Err(NestDbError::QueryConstruction(
                "order_by() must be called before end_at(), end_before() or their document variants".into(),
            ));
        }
        let mut next = self.clone();
        next.order_by.push(OrderClause { field, descending });
        Ok(next)
    }

    pub fn limit(&self, n: usize) -> Result<Self> {
        check_limit(n)?;
        if matches!(self.limit, Some(Limit::Last(_))) {
            return Err(NestDbError::QueryConstruction(
                "limit() cannot be combined with limit_to_last()".into(),
            ));
        }
        let mut next = self.clone();
        next.limit = Some(Limit::First(n));
        Ok(next)
    }

    pub fn limit_to_last(&self, n: usize) -> Result<Self> {
        check_limit(n)?;
        if matches!(self.limit, Some(Limit::First(_))) {
            return Err(NestDbError::QueryConstruction(
                "limit_to_last() cannot be combined with limit()".into(),
            ));
        }
        if self.order_by.is_empty() {
            return Err(NestDbError::QueryConstruction(
                "limit_to_last() requires at least one order_by() clause".into(),
            ));
        }
        let mut next = self.clone();
        next.limit = Some(Limit::Last(n));
        Ok(next)
    }

    pub fn start_at<I, V>(&self, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.with_values(Bound::Start, values, true)
    }

    pub fn start_after<I, V>(&self, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.with_values(Bound::Start, values, false)
    }

    pub fn end_at<I, V>(&self, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.with_values(Bound::End, values, true)
    }

    pub fn end_before<I, V>(&self, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.with_values(Bound::End, values, false)
    }

    pub fn start_at_document(&self, snapshot: &DocumentSnapshot) -> Result<Self> {
        self.with_document(Bound::Start, snapshot, true)
    }

    pub fn start_after_document(&self, snapshot: &DocumentSnapshot) -> Result<Self> {
        self.with_document(Bound::Start, snapshot, false)
    }

    pub fn end_at_document(&self, snapshot: &DocumentSnapshot) -> Result<Self> {
        self.with_document(Bound::End, snapshot, true)
    }

    pub fn end_before_document(&self, snapshot: &DocumentSnapshot) -> Result<Self> {
        self.with_document(Bound::End, snapshot, false)
    }

    /// Add a predicate; multiple filters must all hold.
    pub fn filter(&self, q: Q) -> Self {
        let mut next = self.clone();
        if !q.is_empty() {
            next.filters.push(q);
        }
        next
    }

    fn with_values<I, V>(&self, bound: Bound, values: I, inclusive: bool) -> Result<Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            return Err(NestDbError::QueryConstruction(
                "a cursor needs at least one value".into(),
            ));
        }
        if values.len() > self.order_by.len() {
            return Err(NestDbError::QueryConstruction(format!(
                "too many cursor values: got {}, but only {} order_by() clauses",
                values.len(),
                self.order_by.len()
            )));
        }
        Ok(self.with_cursor(bound, Cursor { values, inclusive }))
    }

    // The cursor takes one value per ordered field and always ends on the
    // document id, so the id is added as a trailing order clause (in the
    // direction of the last one) unless the caller already ordered by it.
    fn with_document(&self, bound: Bound, snapshot: &DocumentSnapshot, inclusive: bool) -> Result<Self> {
        if !snapshot.exists() {
            return Err(NestDbError::QueryConstruction(
                "the document must exist to be used as a query cursor".into(),
            ));
        }
        if path::parent(snapshot.path()).as_deref() != Some(self.path.as_str()) {
            return Err(NestDbError::QueryConstruction(format!(
                "document {} does not belong to collection {}",
                snapshot.path(),
                self.path
            )));
        }

        let mut orders = self.order_by.clone();
        let mut values = Vec::with_capacity(orders.len() + 1);
        for clause in &orders {
            let value = match &clause.field {
                FieldPath::DocumentId => Value::from(snapshot.id()),
                FieldPath::Field(name) => snapshot.get(name).cloned().ok_or_else(|| {
                    NestDbError::QueryConstruction(format!(
                        "cannot build a cursor from document {}: order_by field '{name}' does not exist",
                        snapshot.path()
                    ))
                })?,
            };
            values.push(value);
        }
        if !orders.iter().any(|clause| clause.field.is_document_id()) {
            let descending = orders.last().map(|clause| clause.descending).unwrap_or(false);
            orders.push(OrderClause {
                field: FieldPath::DocumentId,
                descending,
            });
            values.push(Value::from(snapshot.id()));
        }

        let mut next = self.with_cursor(bound, Cursor { values, inclusive });
        next.order_by = orders;
        Ok(next)
    }

    fn with_cursor(&self, bound: Bound, cursor: Cursor) -> Self {
        let mut next = self.clone();
        match bound {
            Bound::Start => next.start = Some(cursor),
            Bound::End => next.end = Some(cursor),
        }
        next
    }
}

fn check_limit(n: usize) -> Result<()> {
    if n == 0 {
        return Err(NestDbError::QueryConstruction(
            "limit must be a positive integer".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::data_from_json;
    use serde_json::json;

    fn snapshot(path: &str, data: serde_json::Value) -> DocumentSnapshot {
        DocumentSnapshot::new(path, Some(data_from_json(data).unwrap()))
    }

    #[test]
    fn test_builder_returns_new_spec() {
        let base = QuerySpec::new("/users");
        let ordered = base.order_by("age", false).unwrap();
        assert!(base.orders().is_empty());
        assert_eq!(ordered.orders().len(), 1);
    }

    #[test]
    fn test_duplicate_order_field_rejected() {
        let spec = QuerySpec::new("/users").order_by("age", false).unwrap();
        assert!(matches!(
            spec.order_by("age", true),
            Err(NestDbError::QueryConstruction(_))
        ));
    }

    #[test]
    fn test_order_by_after_cursor_rejected() {
        let spec = QuerySpec::new("/users")
            .order_by("age", false)
            .unwrap()
            .start_at([30])
            .unwrap();
        assert!(spec.order_by("name", false).is_err());

        let spec = QuerySpec::new("/users")
            .order_by("age", false)
            .unwrap()
            .end_before([30])
            .unwrap();
        assert!(spec.order_by("name", false).is_err());
    }

    #[test]
    fn test_limit_rules() {
        let spec = QuerySpec::new("/users");
        assert!(spec.limit(0).is_err());
        assert!(spec.limit_to_last(2).is_err());

        let ordered = spec.order_by("age", false).unwrap();
        assert!(ordered.limit(2).unwrap().limit_to_last(2).is_err());
        assert!(ordered.limit_to_last(2).unwrap().limit(2).is_err());
        assert_eq!(ordered.limit(3).unwrap().limit(1).unwrap().limit_value(), Some(Limit::First(1)));
    }

    #[test]
    fn test_too_many_cursor_values() {
        let spec = QuerySpec::new("/users").order_by("age", false).unwrap();
        assert!(spec.start_at([1, 2]).is_err());
        assert!(spec.end_at([1]).is_ok());
        assert!(QuerySpec::new("/users").start_after([1]).is_err());
    }

    #[test]
    fn test_empty_cursor_rejected() {
        let none: [Value; 0] = [];
        let spec = QuerySpec::new("/users");
        assert!(matches!(
            spec.start_after(none.clone()),
            Err(NestDbError::QueryConstruction(_))
        ));
        let ordered = spec.order_by("age", false).unwrap();
        assert!(ordered.end_before(none.clone()).is_err());
        assert!(ordered.start_at(none.clone()).is_err());
        assert!(ordered.end_at(none).is_err());
    }

    #[test]
    fn test_document_cursor_appends_id() {
        let spec = QuerySpec::new("/users")
            .order_by("age", true)
            .unwrap()
            .start_after_document(&snapshot("/users/bob", json!({ "age": 25 })))
            .unwrap();

        let fields: Vec<(String, bool)> = spec
            .orders()
            .iter()
            .map(|c| (c.field.to_string(), c.descending))
            .collect();
        assert_eq!(fields, vec![("age".to_string(), true), ("__name__".to_string(), true)]);

        let cursor = spec.start().unwrap();
        assert_eq!(cursor.values, vec![Value::from(25), Value::from("bob")]);
        assert!(!cursor.inclusive);
    }

    #[test]
    fn test_document_cursor_without_orders() {
        let spec = QuerySpec::new("/users")
            .end_at_document(&snapshot("/users/bob", json!({})))
            .unwrap();
        assert_eq!(
            spec.orders(),
            &[OrderClause {
                field: FieldPath::DocumentId,
                descending: false
            }]
        );
        assert_eq!(spec.end().unwrap().values, vec![Value::from("bob")]);
    }

    #[test]
    fn test_document_cursor_keeps_existing_id_clause() {
        let spec = QuerySpec::new("/users")
            .order_by(FieldPath::DocumentId, true)
            .unwrap()
            .start_at_document(&snapshot("/users/bob", json!({})))
            .unwrap()
            .end_at_document(&snapshot("/users/amy", json!({})))
            .unwrap();
        assert_eq!(spec.orders().len(), 1);
        assert_eq!(spec.end().unwrap().values, vec![Value::from("amy")]);
    }

    #[test]
    fn test_document_cursor_checks() {
        let spec = QuerySpec::new("/users").order_by("age", false).unwrap();
        let missing = DocumentSnapshot::new("/users/ghost", None);
        assert!(spec.start_at_document(&missing).is_err());

        let elsewhere = snapshot("/teams/red", json!({ "age": 1 }));
        assert!(spec.start_at_document(&elsewhere).is_err());

        let no_field = snapshot("/users/bob", json!({ "name": "Bob" }));
        assert!(spec.start_at_document(&no_field).is_err());
    }

    #[test]
    fn test_empty_filter_is_dropped() {
        let spec = QuerySpec::new("/users").filter(Q::default()).filter(Q::new("a", 1));
        assert_eq!(spec.filters().len(), 1);
    }
}
