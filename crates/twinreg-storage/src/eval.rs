//! In-process evaluation of compiled query bodies.
//!
//! Supports the subset of the query DSL that [`compile`](crate::query::compile)
//! produces: `match_all`, `match`, `regexp`, `bool` (`must`/`filter`),
//! `nested` with `inner_hits`, multi-key `sort`, `from`/`size` windows and
//! `search_after` cursors.
//! The embedded index, the in-memory store and the SQLite store all search
//! through this module so they agree on query semantics.
//!
//! - `match` is case-insensitive token containment: the field's values are
//!   split on non-alphanumeric characters and every query token must occur
//!   (`operator: "or"` relaxes this to any token).
//! - `regexp` is anchored and applies to each whole field value.
//! - A trailing `.keyword` segment addresses the raw value of the field, as
//!   the keyword subfield of a dynamically mapped string would.
//! - Multi-valued sort fields use their minimum for ascending order and their
//!   maximum for descending order. Documents without the field sort last.
//! - Every hit of a sorted search reports its sort values; passing them back
//!   as `search_after` resumes strictly after that hit.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use regex::Regex;
use serde_json::Value;

use crate::error::RegistryError;
use crate::query::{Hit, SearchHits, KEYWORD_SUBFIELD};

/// Page size applied when the body carries no `size`.
const DEFAULT_SIZE: u64 = 10;

#[derive(Debug)]
enum Condition {
    All,
    Match {
        field: String,
        terms: Vec<String>,
        require_all: bool,
    },
    Regexp {
        field: String,
        pattern: Regex,
    },
    Conjunction(Vec<Condition>),
    Nested {
        path: String,
        inner: Box<Condition>,
        inner_hits: Option<(String, usize)>,
    },
}

#[derive(Debug)]
struct SortClause {
    field: String,
    descending: bool,
}

#[derive(Debug, Clone, PartialEq, PartialOrd)]
enum SortValue {
    Number(f64),
    Text(String),
}

/// Per-clause sort values of one document; `None` where the field is absent.
type SortKeys = Vec<Option<SortValue>>;

/// Runs a query body against `(id, document)` pairs.
pub fn evaluate<'a, I>(body: &Value, documents: I) -> Result<SearchHits, RegistryError>
where
    I: IntoIterator<Item = (&'a str, &'a Value)>,
{
    let condition = match body.get("query") {
        Some(query) => parse_condition(query)?,
        None => Condition::All,
    };
    let sort = parse_sort(body.get("sort"))?;
    let from = window_param(body, "from", 0)?;
    let size = window_param(body, "size", DEFAULT_SIZE)?;
    let cursor = match body.get("search_after") {
        None | Some(Value::Null) => None,
        Some(after) => Some(parse_cursor(after, &sort)?),
    };

    let mut matched: Vec<(SortKeys, Hit)> = Vec::new();
    for (id, source) in documents {
        let mut inner_hits = HashMap::new();
        if matches(&condition, source, &mut inner_hits) {
            let keys: SortKeys = sort.iter().map(|clause| sort_value(source, clause)).collect();
            matched.push((
                keys,
                Hit {
                    id: id.to_string(),
                    source: source.clone(),
                    inner_hits,
                    sort: Vec::new(),
                },
            ));
        }
    }

    if !sort.is_empty() {
        matched.sort_by(|(a, _), (b, _)| compare_keys(&sort, a, b));
    }

    let total = matched.len() as u64;
    if let Some(cursor) = &cursor {
        matched.retain(|(keys, _)| compare_keys(&sort, keys, cursor) == Ordering::Greater);
    }
    let hits = matched
        .into_iter()
        .skip(usize::try_from(from).unwrap_or(usize::MAX))
        .take(usize::try_from(size).unwrap_or(usize::MAX))
        .map(|(keys, mut hit)| {
            hit.sort = keys.iter().map(sort_key_value).collect();
            hit
        })
        .collect();
    Ok(SearchHits { total, hits })
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

fn parse_condition(query: &Value) -> Result<Condition, RegistryError> {
    let (kind, spec) = single_entry(query)?;
    match kind {
        "match_all" => Ok(Condition::All),
        "match" => {
            let (field, spec) = single_entry(spec)?;
            let (text, operator) = match spec {
                Value::Object(params) => (
                    params.get("query").and_then(scalar_text),
                    params.get("operator").and_then(Value::as_str).unwrap_or("or"),
                ),
                other => (scalar_text(other), "or"),
            };
            let text = text.ok_or_else(|| invalid(format!("match on '{field}' has no query")))?;
            Ok(Condition::Match {
                field: field.to_string(),
                terms: tokenize(&text).collect(),
                require_all: operator.eq_ignore_ascii_case("and"),
            })
        }
        "regexp" => {
            let (field, spec) = single_entry(spec)?;
            let value = match spec {
                Value::Object(params) => params.get("value").and_then(Value::as_str),
                other => other.as_str(),
            }
            .ok_or_else(|| invalid(format!("regexp on '{field}' has no value")))?;
            let bad = |e: regex::Error| invalid(format!("bad regular expression '{value}': {e}"));
            // Checked on its own first: an unbalanced `)` would otherwise close
            // the anchoring group and compile.
            Regex::new(value).map_err(bad)?;
            let pattern = Regex::new(&format!("^(?:{value})$")).map_err(bad)?;
            Ok(Condition::Regexp {
                field: field.to_string(),
                pattern,
            })
        }
        "bool" => {
            let mut clauses = Vec::new();
            for key in ["must", "filter"] {
                match spec.get(key) {
                    Some(Value::Array(items)) => {
                        for item in items {
                            clauses.push(parse_condition(item)?);
                        }
                    }
                    Some(item) => clauses.push(parse_condition(item)?),
                    None => {}
                }
            }
            Ok(Condition::Conjunction(clauses))
        }
        "nested" => {
            let path = spec
                .get("path")
                .and_then(Value::as_str)
                .ok_or_else(|| invalid("nested query without path"))?;
            let inner = spec
                .get("query")
                .ok_or_else(|| invalid("nested query without query"))?;
            let inner_hits = spec.get("inner_hits").map(|params| {
                let name = params
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or(path)
                    .to_string();
                let size = params
                    .get("size")
                    .and_then(Value::as_u64)
                    .unwrap_or(3);
                (name, usize::try_from(size).unwrap_or(usize::MAX))
            });
            Ok(Condition::Nested {
                path: path.to_string(),
                inner: Box::new(parse_condition(inner)?),
                inner_hits,
            })
        }
        other => Err(invalid(format!("unsupported query type '{other}'"))),
    }
}

fn parse_sort(sort: Option<&Value>) -> Result<Vec<SortClause>, RegistryError> {
    let items = match sort {
        None => return Ok(Vec::new()),
        Some(Value::Array(items)) => items.as_slice(),
        Some(single) => std::slice::from_ref(single),
    };
    items
        .iter()
        .map(|item| match item {
            Value::String(field) => Ok(SortClause {
                field: field.clone(),
                descending: false,
            }),
            other => {
                let (field, spec) = single_entry(other)?;
                let order = match spec {
                    Value::String(order) => order.as_str(),
                    _ => spec.get("order").and_then(Value::as_str).unwrap_or("asc"),
                };
                Ok(SortClause {
                    field: field.to_string(),
                    descending: order.eq_ignore_ascii_case("desc"),
                })
            }
        })
        .collect()
}

fn parse_cursor(after: &Value, sort: &[SortClause]) -> Result<SortKeys, RegistryError> {
    let values = after
        .as_array()
        .ok_or_else(|| invalid("'search_after' must be an array"))?;
    if sort.is_empty() || values.len() != sort.len() {
        return Err(invalid(format!(
            "'search_after' has {} values for {} sort clauses",
            values.len(),
            sort.len()
        )));
    }
    values
        .iter()
        .map(|value| match value {
            Value::Null => Ok(None),
            Value::Number(n) => n
                .as_f64()
                .map(|n| Some(SortValue::Number(n)))
                .ok_or_else(|| invalid(format!("unusable cursor value {n}"))),
            Value::String(s) => Ok(Some(SortValue::Text(s.clone()))),
            Value::Bool(b) => Ok(Some(SortValue::Text(b.to_string()))),
            other => Err(invalid(format!("unusable cursor value {other}"))),
        })
        .collect()
}

fn window_param(body: &Value, key: &str, default: u64) -> Result<u64, RegistryError> {
    match body.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => value
            .as_u64()
            .ok_or_else(|| invalid(format!("'{key}' must be a non-negative integer"))),
    }
}

fn single_entry(value: &Value) -> Result<(&str, &Value), RegistryError> {
    match value {
        Value::Object(map) if map.len() == 1 => map
            .iter()
            .next()
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| invalid("empty clause")),
        other => Err(invalid(format!("expected a single-key object, got {other}"))),
    }
}

fn invalid(reason: impl Into<String>) -> RegistryError {
    RegistryError::InvalidQuery(reason.into())
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

fn matches(
    condition: &Condition,
    doc: &Value,
    inner_hits: &mut HashMap<String, Vec<Value>>,
) -> bool {
    match condition {
        Condition::All => true,
        Condition::Match {
            field,
            terms,
            require_all,
        } => {
            if terms.is_empty() {
                return false;
            }
            let tokens: HashSet<String> = field_values(doc, field)
                .into_iter()
                .filter_map(scalar_text)
                .flat_map(|text| tokenize(&text).collect::<Vec<_>>())
                .collect();
            if *require_all {
                terms.iter().all(|t| tokens.contains(t))
            } else {
                terms.iter().any(|t| tokens.contains(t))
            }
        }
        Condition::Regexp { field, pattern } => field_values(doc, field)
            .into_iter()
            .filter_map(scalar_text)
            .any(|text| pattern.is_match(&text)),
        Condition::Conjunction(clauses) => {
            // Evaluate every clause so nested clauses record their inner hits.
            clauses
                .iter()
                .map(|c| matches(c, doc, inner_hits))
                .fold(true, |acc, hit| acc && hit)
        }
        Condition::Nested {
            path,
            inner,
            inner_hits: request,
        } => {
            let matched: Vec<Value> = field_values(doc, path)
                .into_iter()
                .filter(|element| {
                    let scoped = scope_under(path, (*element).clone());
                    matches(inner, &scoped, &mut HashMap::new())
                })
                .cloned()
                .collect();
            if matched.is_empty() {
                return false;
            }
            if let Some((name, size)) = request {
                inner_hits.insert(name.clone(), matched.into_iter().take(*size).collect());
            }
            true
        }
    }
}

/// Collects the values at a dot-separated path, flattening arrays at every
/// level. Nulls are skipped.
fn field_values<'a>(doc: &'a Value, path: &str) -> Vec<&'a Value> {
    let path = path
        .strip_suffix(KEYWORD_SUBFIELD)
        .and_then(|p| p.strip_suffix('.'))
        .unwrap_or(path);
    let segments: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    collect_values(doc, &segments, &mut out);
    out
}

fn collect_values<'a>(value: &'a Value, segments: &[&str], out: &mut Vec<&'a Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_values(item, segments, out);
            }
        }
        Value::Null => {}
        _ => match segments.split_first() {
            None => out.push(value),
            Some((head, rest)) => {
                if let Some(child) = value.get(*head) {
                    collect_values(child, rest, out);
                }
            }
        },
    }
}

/// Re-roots a nested element under its path so inner conditions can use
/// full field paths.
fn scope_under(path: &str, element: Value) -> Value {
    path.rsplit('.').fold(element, |acc, segment| {
        let mut map = serde_json::Map::new();
        map.insert(segment.to_string(), acc);
        Value::Object(map)
    })
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}

// ---------------------------------------------------------------------------
// Sorting
// ---------------------------------------------------------------------------

fn compare_keys(
    sort: &[SortClause],
    a: &[Option<SortValue>],
    b: &[Option<SortValue>],
) -> Ordering {
    for ((clause, left), right) in sort.iter().zip(a).zip(b) {
        let ordering = match (left, right) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(l), Some(r)) => {
                let natural = compare_values(l, r);
                if clause.descending {
                    natural.reverse()
                } else {
                    natural
                }
            }
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn sort_value(doc: &Value, clause: &SortClause) -> Option<SortValue> {
    let values = field_values(doc, &clause.field).into_iter().filter_map(|v| match v {
        Value::Number(n) => n.as_f64().map(SortValue::Number),
        Value::String(s) => Some(SortValue::Text(s.clone())),
        Value::Bool(b) => Some(SortValue::Text(b.to_string())),
        _ => None,
    });
    if clause.descending {
        values.max_by(compare_values)
    } else {
        values.min_by(compare_values)
    }
}

fn sort_key_value(key: &Option<SortValue>) -> Value {
    match key {
        Some(SortValue::Number(n)) => {
            serde_json::Number::from_f64(*n).map_or(Value::Null, Value::Number)
        }
        Some(SortValue::Text(text)) => Value::String(text.clone()),
        None => Value::Null,
    }
}

fn compare_values(a: &SortValue, b: &SortValue) -> Ordering {
    a.partial_cmp(b).unwrap_or(Ordering::Equal)
}
