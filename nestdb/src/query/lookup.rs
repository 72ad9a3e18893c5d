//! Typed field lookups (`exact`, `lt`, `contains`, `in`, ...).
//!
//! Lookups are registered once, per value kind, in a static table. A name
//! prefixed with `i` (e.g. `icontains`) selects the case-insensitive form
//! of a lookup registered for strings.

use crate::error::{NestDbError, Result};
use crate::query::filter::Resolved;
use crate::value::{Value, ValueKind};
use once_cell::sync::Lazy;
use regex::RegexBuilder;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

pub const DEFAULT_LOOKUP: &str = "exact";

/// A single comparison between a document value and a resolved operand.
pub trait Lookup: Send + Sync {
    fn name(&self) -> &'static str;

    fn matches(&self, db_value: &Value, operand: &Resolved, case_sensitive: bool) -> Result<bool>;
}

/// Lookup implementations keyed by `(value kind, lookup name)`.
pub struct LookupRegistry {
    entries: HashMap<ValueKind, HashMap<&'static str, Arc<dyn Lookup>>>,
}

impl LookupRegistry {
    fn new() -> Self {
        LookupRegistry {
            entries: HashMap::new(),
        }
    }

    /// Register `lookup` for the given kinds, or for every kind when
    /// `kinds` is empty.
    fn register(&mut self, lookup: impl Lookup + 'static, kinds: &[ValueKind]) {
        let lookup: Arc<dyn Lookup> = Arc::new(lookup);
        let kinds = if kinds.is_empty() { &ValueKind::ALL[..] } else { kinds };
        for kind in kinds {
            self.entries
                .entry(*kind)
                .or_default()
                .insert(lookup.name(), Arc::clone(&lookup));
        }
    }

    /// Find the implementation for `name` on a value of `kind`, returning
    /// it with its case-sensitivity flag.
    pub fn resolve(&self, kind: ValueKind, name: &str) -> Option<(&dyn Lookup, bool)> {
        if let Some(base) = name.strip_prefix('i') {
            if base.len() > 1 && kind == ValueKind::String {
                if let Some(lookup) = self.get(ValueKind::String, base) {
                    return Some((lookup, false));
                }
            }
        }
        self.get(kind, name).map(|lookup| (lookup, true))
    }

    fn get(&self, kind: ValueKind, name: &str) -> Option<&dyn Lookup> {
        self.entries
            .get(&kind)
            .and_then(|by_name| by_name.get(name))
            .map(|lookup| lookup.as_ref())
    }

    pub fn names(&self, kind: ValueKind) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self
            .entries
            .get(&kind)
            .map(|by_name| by_name.keys().copied().collect())
            .unwrap_or_default();
        names.sort_unstable();
        names
    }
}

static REGISTRY: Lazy<LookupRegistry> = Lazy::new(|| {
    let mut registry = LookupRegistry::new();
    registry.register(Compare::new("lt", |o| o == Ordering::Less), &[]);
    registry.register(Compare::new("lte", |o| o != Ordering::Greater), &[]);
    registry.register(Compare::new("gt", |o| o == Ordering::Greater), &[]);
    registry.register(Compare::new("gte", |o| o != Ordering::Less), &[]);
    registry.register(Exact, &[]);
    registry.register(In, &[]);
    registry.register(IsNull, &[]);
    registry.register(Pattern::new("startswith", "^", ""), &[]);
    registry.register(Pattern::new("endswith", "", "$"), &[]);
    registry.register(Pattern::new("contains", "", ""), &[]);
    registry.register(RegexLookup, &[]);
    registry.register(Range, &[]);
    registry
});

pub fn registry() -> &'static LookupRegistry {
    &REGISTRY
}

/// Lower-case strings for case-insensitive comparison; other values as-is.
fn normalize(value: &Value, case_sensitive: bool) -> Cow<'_, Value> {
    match value {
        Value::String(s) if !case_sensitive => Cow::Owned(Value::String(s.to_lowercase())),
        Value::List(items) if !case_sensitive => Cow::Owned(Value::List(
            items
                .iter()
                .map(|v| normalize(v, false).into_owned())
                .collect(),
        )),
        other => Cow::Borrowed(other),
    }
}

fn operand_value<'a>(lookup: &str, operand: &'a Resolved) -> Result<&'a Value> {
    match operand {
        Resolved::Value(value) => Ok(value),
        Resolved::Pattern(re) => Err(NestDbError::FilterEvaluation(format!(
            "lookup '{lookup}' does not accept a compiled pattern ({re})"
        ))),
    }
}

fn ordering(lookup: &str, db_value: &Value, value: &Value) -> Result<Ordering> {
    db_value.compare(value).ok_or_else(|| {
        NestDbError::FilterEvaluation(format!(
            "lookup '{lookup}' cannot compare {} with {}",
            db_value.kind().name(),
            value.kind().name()
        ))
    })
}

struct Compare {
    name: &'static str,
    accept: fn(Ordering) -> bool,
}

impl Compare {
    fn new(name: &'static str, accept: fn(Ordering) -> bool) -> Self {
        Compare { name, accept }
    }
}

impl Lookup for Compare {
    fn name(&self) -> &'static str {
        self.name
    }

    fn matches(&self, db_value: &Value, operand: &Resolved, case_sensitive: bool) -> Result<bool> {
        let value = operand_value(self.name, operand)?;
        let db_value = normalize(db_value, case_sensitive);
        let value = normalize(value, case_sensitive);
        Ok((self.accept)(ordering(self.name, &db_value, &value)?))
    }
}

struct Exact;

impl Lookup for Exact {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn matches(&self, db_value: &Value, operand: &Resolved, case_sensitive: bool) -> Result<bool> {
        let value = operand_value(self.name(), operand)?;
        Ok(normalize(db_value, case_sensitive).loosely_equals(&normalize(value, case_sensitive)))
    }
}

struct In;

impl Lookup for In {
    fn name(&self) -> &'static str {
        "in"
    }

    fn matches(&self, db_value: &Value, operand: &Resolved, case_sensitive: bool) -> Result<bool> {
        let candidates = operand_value(self.name(), operand)?.as_list().ok_or_else(|| {
            NestDbError::FilterEvaluation("lookup 'in' requires a list of values".into())
        })?;
        let db_value = normalize(db_value, case_sensitive);
        Ok(candidates
            .iter()
            .any(|c| normalize(c, case_sensitive).loosely_equals(&db_value)))
    }
}

struct IsNull;

impl Lookup for IsNull {
    fn name(&self) -> &'static str {
        "isnull"
    }

    // Stored values are never null, so a present field is never "null".
    fn matches(&self, _db_value: &Value, operand: &Resolved, _case_sensitive: bool) -> Result<bool> {
        match operand_value(self.name(), operand)? {
            Value::Bool(want_null) => Ok(!want_null),
            other => Err(NestDbError::FilterEvaluation(format!(
                "lookup 'isnull' requires a boolean, got {}",
                other.kind().name()
            ))),
        }
    }
}

/// Anchored search for an escaped literal.
struct Pattern {
    name: &'static str,
    prefix: &'static str,
    suffix: &'static str,
}

impl Pattern {
    fn new(name: &'static str, prefix: &'static str, suffix: &'static str) -> Self {
        Pattern {
            name,
            prefix,
            suffix,
        }
    }
}

impl Lookup for Pattern {
    fn name(&self) -> &'static str {
        self.name
    }

    fn matches(&self, db_value: &Value, operand: &Resolved, case_sensitive: bool) -> Result<bool> {
        let needle = operand_value(self.name, operand)?.to_string();
        let pattern = format!("{}{}{}", self.prefix, regex::escape(&needle), self.suffix);
        let re = RegexBuilder::new(&pattern)
            .case_insensitive(!case_sensitive)
            .build()?;
        Ok(re.is_match(&db_value.to_string()))
    }
}

/// Raw pattern, either as a string or precompiled.
struct RegexLookup;

impl Lookup for RegexLookup {
    fn name(&self) -> &'static str {
        "regex"
    }

    fn matches(&self, db_value: &Value, operand: &Resolved, case_sensitive: bool) -> Result<bool> {
        let text = db_value.to_string();
        match operand {
            Resolved::Pattern(re) if case_sensitive => Ok(re.is_match(&text)),
            Resolved::Pattern(re) => {
                let re = RegexBuilder::new(re.as_str()).case_insensitive(true).build()?;
                Ok(re.is_match(&text))
            }
            Resolved::Value(Value::String(pattern)) => {
                let re = RegexBuilder::new(pattern)
                    .case_insensitive(!case_sensitive)
                    .build()?;
                Ok(re.is_match(&text))
            }
            Resolved::Value(other) => Err(NestDbError::FilterEvaluation(format!(
                "lookup 'regex' requires a string or compiled pattern, got {}",
                other.kind().name()
            ))),
        }
    }
}

/// Inclusive `lo <= value <= hi`.
struct Range;

impl Lookup for Range {
    fn name(&self) -> &'static str {
        "range"
    }

    fn matches(&self, db_value: &Value, operand: &Resolved, case_sensitive: bool) -> Result<bool> {
        let bounds = match operand_value(self.name(), operand)?.as_list() {
            Some(bounds) if bounds.len() == 2 => bounds,
            _ => {
                return Err(NestDbError::FilterEvaluation(
                    "lookup 'range' requires a two-element list".into(),
                ))
            }
        };
        let db_value = normalize(db_value, case_sensitive);
        let lo = normalize(&bounds[0], case_sensitive);
        let hi = normalize(&bounds[1], case_sensitive);
        Ok(ordering("range", &lo, &db_value)? != Ordering::Greater
            && ordering("range", &db_value, &hi)? != Ordering::Greater)
    }
}
