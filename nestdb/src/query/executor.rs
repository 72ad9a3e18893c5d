use crate::error::Result;
use crate::query::field_path::FieldPath;
use crate::query::spec::{Cursor, Limit, OrderClause, QuerySpec};
use crate::value::{Data, Value};
use std::cmp::Ordering;

/// A document id with its decoded data.
pub type Row = (String, Data);

/// Run `spec` over the documents of one collection: filter, sort, window
/// on the cursors, then limit.
pub fn apply(documents: Vec<Row>, spec: &QuerySpec) -> Result<Vec<Row>> {
    let mut rows = Vec::with_capacity(documents.len());
    for (id, data) in documents {
        if matches_all(spec, &id, &data)? {
            rows.push((id, data));
        }
    }

    let rows = if spec.orders().is_empty() {
        rows
    } else {
        sort(rows, spec.orders())
    };
    let rows = window(rows, spec);

    Ok(match spec.limit_value() {
        None => rows,
        Some(Limit::First(n)) => rows.into_iter().take(n).collect(),
        Some(Limit::Last(n)) => {
            let skip = rows.len().saturating_sub(n);
            rows.into_iter().skip(skip).collect()
        }
    })
}

fn matches_all(spec: &QuerySpec, id: &str, data: &Data) -> Result<bool> {
    for q in spec.filters() {
        if !q.evaluate(id, data)? {
            return Ok(false);
        }
    }
    Ok(true)
}

// Rows carry their order keys through sorting and windowing.
struct Keyed {
    keys: Vec<Value>,
    row: Row,
}

fn order_key(clause: &OrderClause, row: &Row) -> Option<Value> {
    match &clause.field {
        FieldPath::DocumentId => Some(Value::from(row.0.as_str())),
        FieldPath::Field(name) => row.1.get(name).cloned(),
    }
}

fn sort(rows: Vec<Row>, orders: &[OrderClause]) -> Vec<Row> {
    let mut keyed: Vec<Keyed> = rows
        .into_iter()
        .filter_map(|row| {
            let keys = orders
                .iter()
                .map(|clause| order_key(clause, &row))
                .collect::<Option<Vec<_>>>()?;
            Some(Keyed { keys, row })
        })
        .collect();
    keyed.sort_by(|a, b| compare_keys(&a.keys, &b.keys, orders));
    keyed.into_iter().map(|k| k.row).collect()
}

/// Lexicographic comparison over the shorter of the two key tuples, each
/// position honouring its clause's direction.
fn compare_keys(left: &[Value], right: &[Value], orders: &[OrderClause]) -> Ordering {
    for ((l, r), clause) in left.iter().zip(right.iter()).zip(orders.iter()) {
        let ord = l.total_cmp(r);
        let ord = if clause.descending { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn window(rows: Vec<Row>, spec: &QuerySpec) -> Vec<Row> {
    if spec.start().is_none() && spec.end().is_none() {
        return rows;
    }
    let orders = spec.orders();
    rows.into_iter()
        .filter(|row| {
            let keys: Vec<Value> = orders
                .iter()
                .map_while(|clause| order_key(clause, row))
                .collect();
            after_start(&keys, spec.start(), orders) && before_end(&keys, spec.end(), orders)
        })
        .collect()
}

fn after_start(keys: &[Value], cursor: Option<&Cursor>, orders: &[OrderClause]) -> bool {
    match cursor {
        None => true,
        Some(cursor) => match compare_keys(keys, &cursor.values, orders) {
            Ordering::Greater => true,
            Ordering::Equal => cursor.inclusive,
            Ordering::Less => false,
        },
    }
}

fn before_end(keys: &[Value], cursor: Option<&Cursor>, orders: &[OrderClause]) -> bool {
    match cursor {
        None => true,
        Some(cursor) => match compare_keys(keys, &cursor.values, orders) {
            Ordering::Less => true,
            Ordering::Equal => cursor.inclusive,
            Ordering::Greater => false,
        },
    }
}
